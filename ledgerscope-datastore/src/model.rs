use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::datastore::Datastore;

#[async_trait]
pub trait Model: Sized + Serialize + for<'de> Deserialize<'de> + Send + Sync {
    const ID_PATH: &'static str;
    const REQUIRED_FIELDS: &'static [&'static str];

    /// Fill in defaults for fields the wire representation may omit.
    fn apply_defaults(_obj: &mut serde_json::Value) {}

    fn create_from_json(mut obj: serde_json::Value) -> Result<Self> {
        for &field in Self::REQUIRED_FIELDS {
            if obj.get(field).is_none() {
                return Err(anyhow!("Missing required field: {}", field));
            }
        }
        Self::apply_defaults(&mut obj);
        serde_json::from_value(obj).context("Failed to deserialize model")
    }

    fn from_json_string(json: &str) -> Result<Self> {
        let obj: serde_json::Value = serde_json::from_str(json)?;
        Self::create_from_json(obj)
    }

    fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    fn to_json_object(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap()
    }

    fn get_id_for(keys: &HashMap<String, String>) -> String {
        let mut id = String::from(Self::ID_PATH);
        for (key, value) in keys {
            id = id.replace(&format!("${{{}}}", key), value);
        }
        id
    }

    fn get_key_names() -> Vec<String> {
        let re = regex::Regex::new(r"\$\{(\w+)\}").unwrap();
        re.captures_iter(Self::ID_PATH)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    fn get_id_keys(&self) -> HashMap<String, String>;

    fn get_id(&self) -> String {
        let keys = self.get_id_keys();
        Self::get_id_for(&keys)
    }

    async fn save(&self, datastore: &Datastore) -> Result<()> {
        let json = self.to_json_string();
        datastore.put(&self.get_id(), json.as_bytes()).await?;
        Ok(())
    }

    async fn find_one(
        datastore: &Datastore,
        keys: HashMap<String, String>,
    ) -> Result<Option<Self>> {
        let key = Self::get_id_for(&keys);
        match datastore.get_string(&key).await? {
            Some(value) => Ok(Some(Self::from_json_string(&value)?)),
            None => Ok(None),
        }
    }

    async fn reload(&mut self, datastore: &Datastore) -> Result<()> {
        let keys = self.get_id_keys();
        if let Some(obj) = Self::find_one(datastore, keys).await? {
            *self = obj;
            Ok(())
        } else {
            Err(crate::Error::KeyNotFound(self.get_id()).into())
        }
    }

    async fn delete(&self, datastore: &Datastore) -> Result<()> {
        datastore.delete(&self.get_id()).await?;
        Ok(())
    }
}
