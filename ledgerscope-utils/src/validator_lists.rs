use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::collections::HashSet;

/// Where to fetch one published validator list from.
#[derive(Clone, Debug)]
pub struct ListSource {
    pub name: String,
    pub url: String,
}

/// One published validator list: a human network label plus the
/// signing keys it endorses.
#[derive(Clone, Debug)]
pub struct PublishedList {
    pub name: String,
    pub keys: HashSet<String>,
}

/// The set of published validator lists known to this process, used to
/// put a human label on a reconstructed chain.
#[derive(Clone, Debug, Default)]
pub struct ValidatorLists {
    lists: Vec<PublishedList>,
}

#[derive(Deserialize)]
struct RawList {
    name: Option<String>,
    validators: Vec<serde_json::Value>,
}

impl ValidatorLists {
    pub fn empty() -> Self {
        ValidatorLists { lists: Vec::new() }
    }

    pub fn from_lists(lists: Vec<PublishedList>) -> Self {
        ValidatorLists { lists }
    }

    /// Fetch every source, skipping ones that fail. Resolution simply
    /// degrades when a publisher is unreachable.
    pub async fn fetch(sources: &[ListSource]) -> Self {
        let mut lists = Vec::new();
        for source in sources {
            match Self::fetch_one(source).await {
                Ok(list) => lists.push(list),
                Err(err) => warn!("failed to fetch validator list {}: {}", source.url, err),
            }
        }
        ValidatorLists { lists }
    }

    async fn fetch_one(source: &ListSource) -> Result<PublishedList> {
        let raw: RawList = reqwest::get(&source.url)
            .await
            .context("request failed")?
            .json()
            .await
            .context("invalid list body")?;
        let keys = raw
            .validators
            .iter()
            .filter_map(|entry| {
                entry.as_str().map(|s| s.to_string()).or_else(|| {
                    entry
                        .get("validation_public_key")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                })
            })
            .collect();
        Ok(PublishedList {
            name: raw.name.unwrap_or_else(|| source.name.clone()),
            keys,
        })
    }

    /// Label of the list covering a strict majority of `validator_set`.
    /// Ambiguous ties and sub-majority overlaps resolve to none.
    pub fn resolve_network(&self, validator_set: &HashSet<String>) -> Option<&str> {
        if validator_set.is_empty() {
            return None;
        }
        let mut best: Option<(&PublishedList, usize)> = None;
        let mut tied = false;
        for list in &self.lists {
            let overlap = validator_set.intersection(&list.keys).count();
            match best {
                Some((_, count)) if overlap == count => tied = true,
                Some((_, count)) if overlap > count => {
                    best = Some((list, overlap));
                    tied = false;
                }
                None => best = Some((list, overlap)),
                _ => {}
            }
        }
        match best {
            Some((list, overlap)) if !tied && overlap * 2 > validator_set.len() => {
                Some(list.name.as_str())
            }
            _ => None,
        }
    }
}
