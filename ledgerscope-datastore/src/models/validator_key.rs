use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Model;
use crate::Datastore;

/// Mapping from a rotating signing key to the stable master key it
/// currently signs for. Written by the manifest pipeline; this crate
/// only reads it back.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ValidatorKey {
    pub signing_key: String,
    pub master_key: String,
    pub revoked: bool,
}

#[async_trait]
impl Model for ValidatorKey {
    const ID_PATH: &'static str = "/validator_keys/${signing_key}";
    const REQUIRED_FIELDS: &'static [&'static str] = &["signing_key", "master_key"];

    fn apply_defaults(obj: &mut serde_json::Value) {
        if obj.get("revoked").is_none() {
            obj["revoked"] = serde_json::json!(false);
        }
    }

    fn get_id_keys(&self) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        keys.insert("signing_key".to_string(), self.signing_key.clone());
        keys
    }
}

impl ValidatorKey {
    pub async fn find_by_signing_key(
        datastore: &Datastore,
        signing_key: &str,
    ) -> Result<Option<Self>> {
        let mut keys = HashMap::new();
        keys.insert("signing_key".to_string(), signing_key.to_string());
        Self::find_one(datastore, keys).await
    }
}

pub mod prelude {
    pub use super::ValidatorKey;
    pub use crate::Datastore;
    pub use crate::Model;
}
