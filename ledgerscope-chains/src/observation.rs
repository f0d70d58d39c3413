use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One validation message, normalized at the boundary: a signed
/// assertion that `signing_key` considers `ledger_hash` fully agreed
/// at `ledger_index`. Everything downstream trusts this shape.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Validation {
    pub signing_key: String,
    pub ledger_hash: String,
    pub ledger_index: u64,
    pub network_id: Option<String>,
    pub full: bool,
    pub received_at: DateTime<Utc>,
}

impl Validation {
    /// Convert a loosely-typed payload from the connection layer.
    /// Fails closed: anything missing a required field is rejected
    /// whole, never partially interpreted.
    pub fn create_from_json(mut obj: serde_json::Value) -> Result<Self> {
        for field in ["signing_key", "ledger_hash", "ledger_index"] {
            if obj.get(field).is_none() {
                return Err(anyhow!("Missing required field: {}", field));
            }
        }
        if obj.get("full").is_none() {
            obj["full"] = serde_json::json!(true);
        }
        if obj.get("received_at").is_none() {
            obj["received_at"] = serde_json::json!(Utc::now());
        }
        serde_json::from_value(obj).context("Failed to deserialize validation")
    }

    pub fn partial(&self) -> bool {
        !self.full
    }
}
