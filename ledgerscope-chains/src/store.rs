use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;

use ledgerscope_datastore::models::{
    AgreementScore, DailyAgreement, HourlyAgreement, Validator, ValidatorKey,
};
use ledgerscope_datastore::{Datastore, Model};
use ledgerscope_utils::validator_lists::ValidatorLists;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgreementWindow {
    Hour1,
    Hour24,
    Day30,
}

/// The narrow persistence contract this core consumes. Everything is
/// an idempotent upsert or a read; callers treat failures as
/// per-unit-of-work and never abort a batch over one.
#[async_trait]
pub trait AgreementStore: Send + Sync {
    async fn upsert_validator_sighting(
        &self,
        signing_key: &str,
        current_index: u64,
        partial: bool,
        last_ledger_time: DateTime<Utc>,
    ) -> Result<()>;

    async fn save_hourly_agreement(
        &self,
        master_key: &str,
        bucket_start: DateTime<Utc>,
        score: &AgreementScore,
    ) -> Result<()>;

    async fn save_daily_agreement(
        &self,
        master_key: &str,
        day_start: DateTime<Utc>,
        score: &AgreementScore,
    ) -> Result<()>;

    async fn update_rolling_agreement(
        &self,
        master_key: &str,
        window: AgreementWindow,
        score: &AgreementScore,
    ) -> Result<()>;

    async fn resolve_master_key(&self, signing_key: &str) -> Result<Option<String>>;

    async fn resolve_chain_network_name(
        &self,
        validator_set: &HashSet<String>,
    ) -> Result<Option<String>>;

    async fn assign_validator_chain(&self, signing_key: &str, chain_name: &str) -> Result<()>;

    async fn hourly_agreements_since(
        &self,
        master_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAgreement>>;
}

/// Persistence gateway over the rocksdb datastore plus the published
/// validator lists used to label chains.
pub struct Gateway {
    datastore: Datastore,
    lists: ValidatorLists,
}

impl Gateway {
    pub fn new(datastore: Datastore, lists: ValidatorLists) -> Self {
        Gateway { datastore, lists }
    }

    pub fn datastore(&self) -> &Datastore {
        &self.datastore
    }

    /// Hook for the manifest pipeline to declare which master key a
    /// signing key currently signs for.
    pub async fn register_validator_key(&self, signing_key: &str, master_key: &str) -> Result<()> {
        let key = ValidatorKey {
            signing_key: signing_key.to_string(),
            master_key: master_key.to_string(),
            revoked: false,
        };
        key.save(&self.datastore).await
    }
}

#[async_trait]
impl AgreementStore for Gateway {
    async fn upsert_validator_sighting(
        &self,
        signing_key: &str,
        current_index: u64,
        partial: bool,
        last_ledger_time: DateTime<Utc>,
    ) -> Result<()> {
        let Some(master_key) = self.resolve_master_key(signing_key).await? else {
            debug!("sighting for unknown signing key {} skipped", signing_key);
            return Ok(());
        };
        let mut validator = Validator::find_or_empty(&self.datastore, &master_key).await?;
        validator.signing_key = Some(signing_key.to_string());
        validator.current_index = Some(current_index);
        validator.partial = partial;
        validator.last_ledger_time = Some(last_ledger_time);
        validator.save(&self.datastore).await
    }

    async fn save_hourly_agreement(
        &self,
        master_key: &str,
        bucket_start: DateTime<Utc>,
        score: &AgreementScore,
    ) -> Result<()> {
        let row = HourlyAgreement {
            master_key: master_key.to_string(),
            bucket_start,
            score: score.clone(),
        };
        row.save(&self.datastore).await
    }

    async fn save_daily_agreement(
        &self,
        master_key: &str,
        day_start: DateTime<Utc>,
        score: &AgreementScore,
    ) -> Result<()> {
        let row = DailyAgreement {
            master_key: master_key.to_string(),
            day_start,
            score: score.clone(),
        };
        row.save(&self.datastore).await
    }

    async fn update_rolling_agreement(
        &self,
        master_key: &str,
        window: AgreementWindow,
        score: &AgreementScore,
    ) -> Result<()> {
        let mut validator = Validator::find_or_empty(&self.datastore, master_key).await?;
        match window {
            AgreementWindow::Hour1 => validator.agreement_1hour = Some(score.clone()),
            AgreementWindow::Hour24 => validator.agreement_24hour = Some(score.clone()),
            AgreementWindow::Day30 => validator.agreement_30day = Some(score.clone()),
        }
        validator.save(&self.datastore).await
    }

    async fn resolve_master_key(&self, signing_key: &str) -> Result<Option<String>> {
        match ValidatorKey::find_by_signing_key(&self.datastore, signing_key).await? {
            Some(key) if !key.revoked => Ok(Some(key.master_key)),
            _ => Ok(None),
        }
    }

    async fn resolve_chain_network_name(
        &self,
        validator_set: &HashSet<String>,
    ) -> Result<Option<String>> {
        Ok(self
            .lists
            .resolve_network(validator_set)
            .map(|name| name.to_string()))
    }

    async fn assign_validator_chain(&self, signing_key: &str, chain_name: &str) -> Result<()> {
        let Some(master_key) = self.resolve_master_key(signing_key).await? else {
            debug!(
                "chain assignment for unknown signing key {} skipped",
                signing_key
            );
            return Ok(());
        };
        let mut validator = Validator::find_or_empty(&self.datastore, &master_key).await?;
        validator.signing_key = Some(signing_key.to_string());
        validator.chain = Some(chain_name.to_string());
        validator.save(&self.datastore).await
    }

    async fn hourly_agreements_since(
        &self,
        master_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAgreement>> {
        HourlyAgreement::find_since(&self.datastore, master_key, since).await
    }
}
