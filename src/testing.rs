//! Small hand-built artifacts for tests and local smoke runs.
//!
//! The ensemble is four shallow trees over the full training schema, with
//! leaf values exactly representable in `f32` so expected margins can be
//! written down by hand.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::{json, Value};

use crate::models::artifacts::{ArtifactFiles, ModelArtifact};
use crate::models::xgboost::TreeEnsemble;
use crate::pipeline::encoding::TargetEncodingTable;
use crate::pipeline::record::TripRecord;

/// Training schema of the fixture model; `airport_fee` is a column the
/// feature builder does not know and leaves at zero.
pub const FULL_COLUMNS: [&str; 16] = [
    "trip_miles",
    "hour_sin",
    "hour_cos",
    "weekday",
    "is_weekend",
    "month_num",
    "dur_min",
    "speed_mph",
    "req_to_pickup_min",
    "onscene_to_pickup_min",
    "pair_cnt",
    "pulocationid_cnt",
    "dolocationid_cnt",
    "pulocationid_te",
    "dolocationid_te",
    "airport_fee",
];

/// Margin the fixture ensemble produces for [`sample_record`]:
/// base 0.5, long trip 2.75, busy pickup zone 0.375, weekend -0.125, morning 0.0625.
pub const SAMPLE_MARGIN: f32 = 3.5625;

pub const FIXTURE_BASE_SCORE: f32 = 0.5;

/// The documented example request.
pub fn sample_record() -> TripRecord {
    TripRecord::new("2020-02-01T08:30:00Z", Some(132), Some(48), 5.2)
}

fn tree(nodes: &[(i32, i32, i64, f32, i64)]) -> Value {
    let n = nodes.len();
    json!({
        "tree_param": {
            "num_nodes": n.to_string(),
            "num_feature": FULL_COLUMNS.len().to_string(),
            "num_deleted": "0",
            "size_leaf_vector": "1"
        },
        "id": 0,
        "left_children": nodes.iter().map(|n| n.0).collect::<Vec<_>>(),
        "right_children": nodes.iter().map(|n| n.1).collect::<Vec<_>>(),
        "parents": vec![0; n],
        "split_indices": nodes.iter().map(|n| n.2).collect::<Vec<_>>(),
        "split_conditions": nodes.iter().map(|n| n.3).collect::<Vec<_>>(),
        "split_type": vec![0; n],
        "default_left": nodes.iter().map(|n| n.4).collect::<Vec<_>>(),
        "base_weights": vec![0.0; n],
        "loss_changes": vec![0.0; n],
        "sum_hessian": vec![1.0; n],
        "categories": [],
        "categories_nodes": [],
        "categories_segments": [],
        "categories_sizes": []
    })
}

/// XGBoost JSON for the fixture ensemble.
pub fn sample_model_json(with_feature_names: bool) -> Value {
    // (left, right, split feature, threshold or leaf value, default_left)
    let trees = vec![
        // trip_miles: < 3 | 3..10 | >= 10
        tree(&[(1, 2, 0, 3.0, 1), (-1, -1, 0, 2.0, 0), (3, 4, 0, 10.0, 0), (-1, -1, 0, 2.75, 0), (-1, -1, 0, 3.25, 0)]),
        // pulocationid_te
        tree(&[(1, 2, 13, 20.0, 1), (-1, -1, 0, 0.125, 0), (-1, -1, 0, 0.375, 0)]),
        // is_weekend
        tree(&[(1, 2, 4, 0.5, 1), (-1, -1, 0, 0.25, 0), (-1, -1, 0, -0.125, 0)]),
        // hour_sin
        tree(&[(1, 2, 1, 0.0, 1), (-1, -1, 0, -0.0625, 0), (-1, -1, 0, 0.0625, 0)]),
    ];
    let names: Vec<&str> = if with_feature_names { FULL_COLUMNS.to_vec() } else { Vec::new() };

    json!({
        "learner": {
            "attributes": {},
            "feature_names": names,
            "feature_types": [],
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": {"num_trees": "4", "num_parallel_tree": "1"},
                    "tree_info": [0, 0, 0, 0],
                    "trees": trees
                }
            },
            "learner_model_param": {
                "base_score": "5E-1",
                "num_class": "0",
                "num_feature": FULL_COLUMNS.len().to_string(),
                "num_target": "1",
                "boost_from_average": "1"
            },
            "objective": {"name": "reg:squarederror", "reg_loss_param": {"scale_pos_weight": "1"}}
        },
        "version": [2, 0, 3]
    })
}

pub fn sample_target_encoding_json() -> Value {
    json!({
        "pulocationid": {"means": {"132": 25.0, "48": 18.0, "7": 12.5}, "global": 15.0},
        "dolocationid": {"means": {"48": 22.0, "132": 19.0}, "global": 16.0}
    })
}

pub fn sample_medians_json() -> Value {
    json!({
        "dur_min": 14.5,
        "speed_mph": 11.2,
        "req_to_pickup_min": 3.0,
        "pair_cnt": 120.0,
        "pulocationid_cnt": 5000.0,
        "dolocationid_cnt": 4800.0,
        "pulocationid_te": 15.5,
        "dolocationid_te": 16.5
    })
}

/// Write the four fixture artifacts into `dir`.
pub fn write_artifacts(dir: &Path, files: &ArtifactFiles) -> io::Result<()> {
    fs::write(dir.join(&files.model), sample_model_json(true).to_string())?;
    fs::write(dir.join(&files.columns), json!(FULL_COLUMNS).to_string())?;
    fs::write(dir.join(&files.target_encoding), sample_target_encoding_json().to_string())?;
    fs::write(dir.join(&files.medians), sample_medians_json().to_string())?;
    Ok(())
}

/// The fixture artifact, built in memory.
pub fn sample_artifact() -> ModelArtifact {
    let ensemble = TreeEnsemble::from_json_str(&sample_model_json(true).to_string())
        .expect("fixture ensemble parses");
    let tables: HashMap<String, TargetEncodingTable> =
        serde_json::from_value(sample_target_encoding_json()).expect("fixture tables parse");
    let medians: HashMap<String, f64> =
        serde_json::from_value(sample_medians_json()).expect("fixture medians parse");
    let columns = FULL_COLUMNS.iter().map(|c| c.to_string()).collect();

    ModelArtifact::from_parts(ensemble, columns, tables, medians).expect("fixture parts agree")
}
