use anyhow::Result;

/// Deterministic fixtures for driving the chain registry and agreement
/// calculator in tests: synthetic signing keys, ledger hashes, and
/// validation payloads shaped like the connection layer's JSON.
pub struct Devnet;

impl Devnet {
    pub fn new() -> Self {
        Self
    }

    /// Synthetic signing keys `dev.signing.0` .. `dev.signing.n-1`.
    pub fn signing_keys(&self, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("dev.signing.{}", i)).collect()
    }

    /// Master key paired with one of our synthetic signing keys.
    pub fn master_key_for(&self, signing_key: &str) -> String {
        format!("dev.master.{}", signing_key)
    }

    /// A stable fake ledger hash for an index. Distinct indices always
    /// produce distinct hashes.
    pub fn ledger_hash(&self, index: u64) -> String {
        format!("{:064X}", 0xD00D_u64.wrapping_mul(index + 1))
    }

    /// One validation payload, shaped like the connection layer's JSON.
    pub fn validation_json(
        &self,
        signing_key: &str,
        index: u64,
        network: Option<&str>,
    ) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "signing_key": signing_key,
            "ledger_hash": self.ledger_hash(index),
            "ledger_index": index,
            "full": true,
        });
        if let Some(network) = network {
            obj["network_id"] = serde_json::json!(network);
        }
        obj
    }

    /// A gap-free stream: every signing key validates every ledger in
    /// `start..start + count`, in index order.
    pub fn validation_stream(
        &self,
        signing_keys: &[String],
        start: u64,
        count: u64,
        network: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let mut stream = Vec::with_capacity((count as usize) * signing_keys.len());
        for index in start..start + count {
            for key in signing_keys {
                stream.push(self.validation_json(key, index, network));
            }
        }
        Ok(stream)
    }
}

impl Default for Devnet {
    fn default() -> Self {
        Self::new()
    }
}
