use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Model;
use crate::Datastore;

use super::AgreementScore;

/// One validator's agreement with the winning chain over a single UTC
/// hour. Saving is an idempotent upsert keyed by
/// (master_key, bucket_start).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HourlyAgreement {
    pub master_key: String,
    pub bucket_start: DateTime<Utc>,
    pub score: AgreementScore,
}

#[async_trait]
impl Model for HourlyAgreement {
    const ID_PATH: &'static str = "/agreement/hourly/${master_key}/${bucket_start}";
    const REQUIRED_FIELDS: &'static [&'static str] = &["master_key", "bucket_start", "score"];

    fn get_id_keys(&self) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        keys.insert("master_key".to_string(), self.master_key.clone());
        keys.insert(
            "bucket_start".to_string(),
            self.bucket_start.timestamp().to_string(),
        );
        keys
    }
}

impl HourlyAgreement {
    pub async fn find_all_for_master(
        datastore: &Datastore,
        master_key: &str,
    ) -> Result<Vec<Self>> {
        let prefix = format!("/agreement/hourly/{}", master_key);
        let mut rows = Vec::new();
        for result in datastore.iterator(&prefix) {
            let (_, value) = result?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Hourly rows whose bucket starts at or after `since`.
    pub async fn find_since(
        datastore: &Datastore,
        master_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>> {
        let rows = Self::find_all_for_master(datastore, master_key).await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.bucket_start >= since)
            .collect())
    }
}

pub mod prelude {
    pub use super::HourlyAgreement;
    pub use crate::Datastore;
    pub use crate::Model;
}
