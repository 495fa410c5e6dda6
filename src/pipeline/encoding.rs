use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Trained per-identifier means for one categorical field, plus the
/// field-wide mean used when an identifier was never seen in training.
///
/// Keys are kept exactly as they appear in the persisted table. JSON object
/// keys are always strings, so looking up the decimal form of an integer id
/// covers both the string-keyed and integer-keyed serializations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEncodingTable {
    means: HashMap<String, f64>,
    global: f64,
}

/// Which branch of the fallback chain produced an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    /// Identifier present in the trained table
    Trained,
    /// Identifier given but unseen in training
    Unseen,
    /// No identifier on the record
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub value: f64,
    pub source: EncodingSource,
}

impl TargetEncodingTable {
    pub fn new(means: HashMap<String, f64>, global: f64) -> Self {
        Self { means, global }
    }

    /// Table with no trained entries; every lookup yields `global`.
    pub fn fallback_only(global: f64) -> Self {
        Self::new(HashMap::new(), global)
    }

    pub fn global(&self) -> f64 {
        self.global
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Resolve an identifier: trained mean, else global mean for an unseen
    /// id, else global mean when the id is absent altogether.
    pub fn resolve(&self, id: Option<i64>) -> Resolution {
        let Some(id) = id else {
            return Resolution { value: self.global, source: EncodingSource::Missing };
        };

        match self.means.get(&id.to_string()) {
            Some(&value) => Resolution { value, source: EncodingSource::Trained },
            None => Resolution { value: self.global, source: EncodingSource::Unseen },
        }
    }

    pub fn encode(&self, id: Option<i64>) -> f64 {
        self.resolve(id).value
    }
}
