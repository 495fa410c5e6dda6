//! XGBoost JSON model loading and tree-ensemble evaluation.
//!
//! Reads the `learner` layout written by `Booster.save_model("*.json")` and
//! evaluates it the way XGBoost's CPU predictor does: features are `f32`,
//! a numeric split goes left when `value < threshold`, NaN follows the
//! node's default direction, and the margin is `base_score` plus the leaf
//! value of every tree, accumulated in tree order.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::ArrayView1;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::traits::model::{Model, ModelError};

// =============================================================================
// Foreign (on-disk) types
// =============================================================================

fn deserialize_base_score<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    // Newer releases write "[5E-1]" or a one-element array instead of a scalar
    let mut cur = Value::deserialize(deserializer)?;
    loop {
        match cur {
            Value::Number(n) => {
                return n
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| SerdeError::custom("invalid base_score number"));
            }
            Value::String(s) => {
                let t = s.trim();
                let t = t.strip_prefix('[').and_then(|t| t.strip_suffix(']')).unwrap_or(t);
                return t
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| SerdeError::custom(format!("cannot parse base_score from {:?}", s)));
            }
            Value::Array(arr) => match arr.into_iter().next() {
                Some(first) => cur = first,
                None => return Err(SerdeError::custom("empty base_score array")),
            },
            _ => return Err(SerdeError::custom("base_score must be a number, string, or array")),
        }
    }
}

/// `default_left` is an int array in most releases and a bool array in a few.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
struct TreeParam {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_nodes: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct XgbTree {
    tree_param: TreeParam,
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelTrees {
    trees: Vec<XgbTree>,
    #[serde(default)]
    tree_info: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct GbTreeDefinition {
    model: ModelTrees,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
enum GradientBooster {
    Gbtree { model: ModelTrees },
    Dart { gbtree: GbTreeDefinition, weight_drop: Vec<f32> },
    Gblinear {},
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectiveSpec {
    name: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
struct LearnerModelParam {
    #[serde(deserialize_with = "deserialize_base_score")]
    base_score: f32,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    num_class: i64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_feature: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct Learner {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBooster,
    objective: ObjectiveSpec,
    learner_model_param: LearnerModelParam,
}

#[derive(Debug, Clone, Deserialize)]
struct XgbModel {
    learner: Learner,
}

// =============================================================================
// Native representation
// =============================================================================

/// Objectives whose prediction is the raw margin (no link function).
const IDENTITY_OBJECTIVES: &[&str] = &[
    "reg:squarederror",
    "reg:linear",
    "reg:pseudohubererror",
    "reg:absoluteerror",
    "reg:quantileerror",
];

/// One regression tree in struct-of-arrays layout.
///
/// For leaves, `threshold` holds the leaf value: XGBoost stores the split
/// condition and the leaf value in the same slot.
#[derive(Debug, Clone)]
struct Tree {
    left: Box<[u32]>,
    right: Box<[u32]>,
    feature: Box<[u32]>,
    threshold: Box<[f32]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
}

impl Tree {
    fn from_xgb(raw: &XgbTree, tree_idx: usize, num_features: usize) -> Result<Self, ModelError> {
        let num_nodes = raw.tree_param.num_nodes;
        if num_nodes == 0 {
            return Err(ModelError::InvalidModel(format!("tree {} has no nodes", tree_idx)));
        }

        let columns = [
            ("left_children", raw.left_children.len()),
            ("right_children", raw.right_children.len()),
            ("split_indices", raw.split_indices.len()),
            ("split_conditions", raw.split_conditions.len()),
            ("default_left", raw.default_left.len()),
        ];
        for (name, len) in columns {
            if len < num_nodes {
                return Err(ModelError::InvalidModel(format!(
                    "tree {}: {} has {} entries but tree has {} nodes",
                    tree_idx, name, len, num_nodes
                )));
            }
        }

        let mut left = Vec::with_capacity(num_nodes);
        let mut right = Vec::with_capacity(num_nodes);
        let mut feature = Vec::with_capacity(num_nodes);
        let mut is_leaf = Vec::with_capacity(num_nodes);

        for node in 0..num_nodes {
            let l = raw.left_children[node];
            let r = raw.right_children[node];

            if l == -1 {
                left.push(0);
                right.push(0);
                feature.push(0);
                is_leaf.push(true);
                continue;
            }

            if raw.split_type.get(node).copied().unwrap_or(0) != 0 {
                return Err(ModelError::Unsupported(format!(
                    "tree {} node {} uses a categorical split",
                    tree_idx, node
                )));
            }

            // Children always come after their parent, which also rules out cycles
            for child in [l, r] {
                if child <= node as i32 || child as usize >= num_nodes {
                    return Err(ModelError::InvalidModel(format!(
                        "tree {} node {} references child {} but tree has {} nodes",
                        tree_idx, node, child, num_nodes
                    )));
                }
            }

            let split = raw.split_indices[node];
            if split < 0 || split as usize >= num_features {
                return Err(ModelError::InvalidModel(format!(
                    "tree {} node {} splits on feature {} but model has {} features",
                    tree_idx, node, split, num_features
                )));
            }

            left.push(l as u32);
            right.push(r as u32);
            feature.push(split as u32);
            is_leaf.push(false);
        }

        Ok(Self {
            left: left.into_boxed_slice(),
            right: right.into_boxed_slice(),
            feature: feature.into_boxed_slice(),
            threshold: raw.split_conditions[..num_nodes].to_vec().into_boxed_slice(),
            default_left: raw.default_left[..num_nodes].iter().map(|f| f.is_set()).collect(),
            is_leaf: is_leaf.into_boxed_slice(),
        })
    }

    #[inline]
    fn leaf_value(&self, row: &ArrayView1<'_, f32>) -> f32 {
        let mut idx = 0usize;
        while !self.is_leaf[idx] {
            let value = row[self.feature[idx] as usize];
            let go_left = if value.is_nan() {
                self.default_left[idx]
            } else {
                value < self.threshold[idx]
            };
            let next = if go_left { self.left[idx] } else { self.right[idx] };
            idx = next as usize;
        }
        self.threshold[idx]
    }
}

/// A loaded gradient-boosted tree ensemble.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    /// Per-tree DART weights; `None` for plain gbtree
    tree_weights: Option<Vec<f32>>,
    base_score: f32,
    num_features: usize,
    feature_names: Vec<String>,
    objective: String,
}

impl TreeEnsemble {
    /// Load a model saved with `Booster.save_model("model.json")`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let file = File::open(path)?;
        let model: XgbModel = serde_json::from_reader(BufReader::new(file))?;
        Self::from_xgb(model)
    }

    /// Parse a model from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let model: XgbModel = serde_json::from_str(json)?;
        Self::from_xgb(model)
    }

    fn from_xgb(model: XgbModel) -> Result<Self, ModelError> {
        let learner = model.learner;
        let param = learner.learner_model_param;

        if !IDENTITY_OBJECTIVES.contains(&learner.objective.name.as_str()) {
            return Err(ModelError::Unsupported(format!(
                "objective '{}' is not a regression objective",
                learner.objective.name
            )));
        }
        if param.num_class > 1 {
            return Err(ModelError::Unsupported(format!(
                "multi-class model with {} classes",
                param.num_class
            )));
        }

        let (model_trees, tree_weights) = match learner.gradient_booster {
            GradientBooster::Gbtree { model } => (model, None),
            GradientBooster::Dart { gbtree, weight_drop } => (gbtree.model, Some(weight_drop)),
            GradientBooster::Gblinear {} => {
                return Err(ModelError::Unsupported("gblinear booster".to_string()));
            }
        };

        if let Some(weights) = &tree_weights {
            if weights.len() != model_trees.trees.len() {
                return Err(ModelError::InvalidModel(format!(
                    "dart model has {} weights for {} trees",
                    weights.len(),
                    model_trees.trees.len()
                )));
            }
        }
        if model_trees.tree_info.iter().any(|&group| group != 0) {
            return Err(ModelError::Unsupported("trees assigned to more than one output group".to_string()));
        }
        if !learner.feature_names.is_empty() && learner.feature_names.len() != param.num_feature {
            return Err(ModelError::InvalidModel(format!(
                "model lists {} feature names but declares {} features",
                learner.feature_names.len(),
                param.num_feature
            )));
        }

        let trees = model_trees
            .trees
            .iter()
            .enumerate()
            .map(|(idx, tree)| Tree::from_xgb(tree, idx, param.num_feature))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            tree_weights,
            base_score: param.base_score,
            num_features: param.num_feature,
            feature_names: learner.feature_names,
            objective: learner.objective.name,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Feature names recorded in the model file, empty when training used a bare array.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    pub fn base_score(&self) -> f32 {
        self.base_score
    }
}

impl Model for TreeEnsemble {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn predict_row(&self, row: ArrayView1<'_, f32>) -> Result<f32, ModelError> {
        if row.len() != self.num_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.num_features,
                actual: row.len(),
                context: "row length vs model features".to_string(),
            });
        }

        let mut margin = self.base_score;
        match &self.tree_weights {
            None => {
                for tree in &self.trees {
                    margin += tree.leaf_value(&row);
                }
            }
            Some(weights) => {
                for (tree, weight) in self.trees.iter().zip(weights) {
                    margin += tree.leaf_value(&row) * weight;
                }
            }
        }
        Ok(margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use serde_json::json;

    fn stump(feature: i64, threshold: f32, left: f32, right: f32, default_left: i64) -> Value {
        json!({
            "tree_param": {"num_nodes": "3", "num_feature": "2", "num_deleted": "0", "size_leaf_vector": "1"},
            "id": 0,
            "left_children": [1, -1, -1],
            "right_children": [2, -1, -1],
            "parents": [2147483647, 0, 0],
            "split_indices": [feature, 0, 0],
            "split_conditions": [threshold, left, right],
            "split_type": [0, 0, 0],
            "default_left": [default_left, 0, 0],
            "base_weights": [0.0, 0.0, 0.0],
            "loss_changes": [1.0, 0.0, 0.0],
            "sum_hessian": [2.0, 1.0, 1.0],
            "categories": [],
            "categories_nodes": [],
            "categories_segments": [],
            "categories_sizes": []
        })
    }

    fn model_json(trees: Vec<Value>, base_score: Value, objective: &str) -> Value {
        let n = trees.len();
        json!({
            "learner": {
                "attributes": {},
                "feature_names": ["a", "b"],
                "feature_types": ["float", "float"],
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {
                        "gbtree_model_param": {"num_trees": n.to_string(), "num_parallel_tree": "1"},
                        "tree_info": vec![0; n],
                        "trees": trees
                    }
                },
                "learner_model_param": {
                    "base_score": base_score,
                    "num_class": "0",
                    "num_feature": "2",
                    "num_target": "1",
                    "boost_from_average": "1"
                },
                "objective": {"name": objective, "reg_loss_param": {"scale_pos_weight": "1"}}
            },
            "version": [2, 0, 3]
        })
    }

    fn two_stump_model() -> TreeEnsemble {
        let json = model_json(
            vec![stump(0, 3.0, 1.0, 2.0, 1), stump(1, 0.5, 0.25, -0.25, 0)],
            json!("5E-1"),
            "reg:squarederror",
        );
        TreeEnsemble::from_json_str(&json.to_string()).unwrap()
    }

    #[test]
    fn test_parse_and_metadata() {
        let model = two_stump_model();
        assert_eq!(model.num_trees(), 2);
        assert_eq!(model.num_features(), 2);
        assert_eq!(model.feature_names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(model.objective(), "reg:squarederror");
        assert_eq!(model.base_score(), 0.5);
    }

    #[test]
    fn test_split_direction_is_strict_less_than() {
        let model = two_stump_model();
        // a < 3 goes left (1.0); b >= 0.5 goes right (-0.25)
        assert_eq!(model.predict_row(array![2.9f32, 0.5].view()).unwrap(), 0.5 + 1.0 - 0.25);
        // a == threshold goes right
        assert_eq!(model.predict_row(array![3.0f32, 0.0].view()).unwrap(), 0.5 + 2.0 + 0.25);
    }

    #[test]
    fn test_missing_value_follows_default_direction() {
        let model = two_stump_model();
        // tree 0 defaults left, tree 1 defaults right
        let out = model.predict_row(array![f32::NAN, f32::NAN].view()).unwrap();
        assert_eq!(out, 0.5 + 1.0 - 0.25);
    }

    #[test]
    fn test_batch_matches_rows() {
        let model = two_stump_model();
        let matrix = Array2::from_shape_vec((3, 2), vec![0.0, 0.0, 5.0, 1.0, 3.0, 0.4]).unwrap();
        let batch = model.predict_batch(matrix.view()).unwrap();
        for (i, row) in matrix.rows().into_iter().enumerate() {
            assert_eq!(batch[i], model.predict_row(row).unwrap());
        }
    }

    #[test]
    fn test_base_score_variants() {
        for base in [json!(0.5), json!("0.5"), json!("[5E-1]"), json!([0.5])] {
            let json = model_json(vec![stump(0, 1.0, 0.0, 0.0, 0)], base, "reg:squarederror");
            let model = TreeEnsemble::from_json_str(&json.to_string()).unwrap();
            assert_eq!(model.base_score(), 0.5);
        }
    }

    #[test]
    fn test_boolean_default_left() {
        let mut tree = stump(0, 1.0, 7.0, 9.0, 0);
        tree["default_left"] = json!([true, false, false]);
        let json = model_json(vec![tree], json!(0.0), "reg:squarederror");
        let model = TreeEnsemble::from_json_str(&json.to_string()).unwrap();
        assert_eq!(model.predict_row(array![f32::NAN, 0.0].view()).unwrap(), 7.0);
    }

    #[test]
    fn test_rejects_classification_objective() {
        let json = model_json(vec![stump(0, 1.0, 0.0, 0.0, 0)], json!(0.5), "binary:logistic");
        let err = TreeEnsemble::from_json_str(&json.to_string()).unwrap_err();
        assert!(matches!(err, ModelError::Unsupported(_)));
    }

    #[test]
    fn test_rejects_out_of_range_child() {
        let mut tree = stump(0, 1.0, 0.0, 0.0, 0);
        tree["right_children"] = json!([7, -1, -1]);
        let json = model_json(vec![tree], json!(0.5), "reg:squarederror");
        let err = TreeEnsemble::from_json_str(&json.to_string()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(msg) if msg.contains("child 7")));
    }

    #[test]
    fn test_rejects_split_on_unknown_feature() {
        let json = model_json(vec![stump(5, 1.0, 0.0, 0.0, 0)], json!(0.5), "reg:squarederror");
        let err = TreeEnsemble::from_json_str(&json.to_string()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(msg) if msg.contains("feature 5")));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = TreeEnsemble::from_json_str("{\"learner\": 3}").unwrap_err();
        assert!(matches!(err, ModelError::SerializationError(_)));
    }

    #[test]
    fn test_dart_weights_scale_trees() {
        let mut json = model_json(vec![stump(0, 1.0, 2.0, 4.0, 0)], json!(0.0), "reg:squarederror");
        let trees = json["learner"]["gradient_booster"]["model"].clone();
        json["learner"]["gradient_booster"] = json!({
            "name": "dart",
            "gbtree": {"name": "gbtree", "model": trees},
            "weight_drop": [0.5]
        });
        let model = TreeEnsemble::from_json_str(&json.to_string()).unwrap();
        assert_eq!(model.predict_row(array![0.0f32, 0.0].view()).unwrap(), 1.0);
    }

    #[test]
    fn test_row_width_checked() {
        let model = two_stump_model();
        let err = model.predict_row(array![1.0f32].view()).unwrap_err();
        assert!(matches!(err, ModelError::DimensionMismatch { expected: 2, actual: 1, .. }));
    }
}
