use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Model;
use crate::Datastore;

use super::AgreementScore;

/// One validator keyed by its stable master key. The signing key
/// rotates underneath it; sightings and rolling agreement summaries
/// accumulate here.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Validator {
    pub master_key: String,
    pub signing_key: Option<String>,
    pub chain: Option<String>,
    pub current_index: Option<u64>,
    pub partial: bool,
    pub last_ledger_time: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub agreement_1hour: Option<AgreementScore>,
    pub agreement_24hour: Option<AgreementScore>,
    pub agreement_30day: Option<AgreementScore>,
}

#[async_trait]
impl Model for Validator {
    const ID_PATH: &'static str = "/validators/${master_key}";
    const REQUIRED_FIELDS: &'static [&'static str] = &["master_key"];

    fn apply_defaults(obj: &mut serde_json::Value) {
        if obj.get("partial").is_none() {
            obj["partial"] = serde_json::json!(false);
        }
        if obj.get("revoked").is_none() {
            obj["revoked"] = serde_json::json!(false);
        }
    }

    fn get_id_keys(&self) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        keys.insert("master_key".to_string(), self.master_key.clone());
        keys
    }
}

impl Validator {
    pub fn empty(master_key: &str) -> Self {
        Validator {
            master_key: master_key.to_string(),
            signing_key: None,
            chain: None,
            current_index: None,
            partial: false,
            last_ledger_time: None,
            revoked: false,
            agreement_1hour: None,
            agreement_24hour: None,
            agreement_30day: None,
        }
    }

    /// Load the record for `master_key`, or a fresh one if it has
    /// never been saved.
    pub async fn find_or_empty(datastore: &Datastore, master_key: &str) -> Result<Self> {
        let mut keys = HashMap::new();
        keys.insert("master_key".to_string(), master_key.to_string());
        match Self::find_one(datastore, keys).await? {
            Some(validator) => Ok(validator),
            None => Ok(Self::empty(master_key)),
        }
    }
}

pub mod prelude {
    pub use super::Validator;
    pub use crate::Datastore;
    pub use crate::Model;
}
