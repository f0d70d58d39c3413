use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Model;

use super::AgreementScore;

/// One validator's agreement summed over a UTC calendar day.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DailyAgreement {
    pub master_key: String,
    pub day_start: DateTime<Utc>,
    pub score: AgreementScore,
}

#[async_trait]
impl Model for DailyAgreement {
    const ID_PATH: &'static str = "/agreement/daily/${master_key}/${day_start}";
    const REQUIRED_FIELDS: &'static [&'static str] = &["master_key", "day_start", "score"];

    fn get_id_keys(&self) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        keys.insert("master_key".to_string(), self.master_key.clone());
        keys.insert(
            "day_start".to_string(),
            self.day_start.timestamp().to_string(),
        );
        keys
    }
}

pub mod prelude {
    pub use super::DailyAgreement;
    pub use crate::Datastore;
    pub use crate::Model;
}
