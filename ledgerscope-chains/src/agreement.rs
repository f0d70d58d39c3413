use anyhow::Result;
use chrono::{DateTime, Duration as WallDuration, Utc};
use futures::future::join_all;
use log::{debug, warn};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

use ledgerscope_datastore::models::{AgreementScore, HourlyAgreement};
use ledgerscope_utils::time_buckets::{day_bucket, hour_bucket};

use crate::registry::Chain;
use crate::store::{AgreementStore, AgreementWindow};

pub const DEFAULT_OBSERVATION_RETENTION: Duration = Duration::from_secs(2 * 60 * 60);

/// Converts "did validator V vote for what ended up on the winning
/// chain" into scores across time windows. Owns the per-validator
/// observation history; only ever reads chain snapshots.
pub struct AgreementCalculator {
    retention: Duration,
    observations: HashMap<String, HashMap<String, Instant>>,
}

impl AgreementCalculator {
    pub fn new(retention: Duration) -> Self {
        AgreementCalculator {
            retention,
            observations: HashMap::new(),
        }
    }

    /// Record that `signing_key` validated `ledger_hash`. Returns
    /// false for a replay of an already-recorded pair.
    pub fn record_observation(&mut self, signing_key: &str, ledger_hash: &str) -> bool {
        let by_hash = self.observations.entry(signing_key.to_string()).or_default();
        if by_hash.contains_key(ledger_hash) {
            return false;
        }
        by_hash.insert(ledger_hash.to_string(), Instant::now());
        true
    }

    /// Score every validator of every chain against the chain's ledger
    /// membership and persist the results. Each (chain, validator) is
    /// an independent unit of work; all of the cycle's writes are
    /// dispatched together and awaited as a group, and a failed unit
    /// is logged without touching its siblings.
    pub async fn calculate_agreement_at(
        &self,
        now: DateTime<Utc>,
        chains: &[Chain],
        store: &dyn AgreementStore,
    ) -> Result<()> {
        let bucket = hour_bucket(now);
        let hour_over = bucket + WallDuration::hours(1) <= now;

        let mut units = Vec::new();
        for chain in chains {
            for signing_key in &chain.signing_keys {
                let master_key = match store.resolve_master_key(signing_key).await {
                    Ok(Some(master_key)) => master_key,
                    Ok(None) => {
                        // Observations stay within the retention
                        // window, so this key retries next cycle.
                        debug!("no master key yet for {}", signing_key);
                        continue;
                    }
                    Err(err) => {
                        warn!("identity lookup failed for {}: {}", signing_key, err);
                        continue;
                    }
                };
                let seen = self.observations.get(signing_key);
                let validated = chain
                    .ledgers
                    .keys()
                    .filter(|hash| seen.map_or(false, |s| s.contains_key(*hash)))
                    .count() as u64;
                let missed = chain.ledgers.len() as u64 - validated;
                let score =
                    AgreementScore::new(validated, missed, chain.incomplete || !hour_over);
                units.push((master_key, score));
            }
        }

        let writes = units
            .iter()
            .map(|(master_key, score)| persist_unit(store, master_key, score, bucket, now));
        join_all(writes).await;
        Ok(())
    }

    /// Drop observations older than the retention window.
    pub fn purge_observations(&mut self) {
        let now = Instant::now();
        let retention = self.retention;
        self.observations.retain(|_, by_hash| {
            by_hash.retain(|_, first_seen| now.duration_since(*first_seen) <= retention);
            !by_hash.is_empty()
        });
    }

    pub fn observation_count(&self) -> usize {
        self.observations.values().map(|by_hash| by_hash.len()).sum()
    }

    /// Drop the whole observation history. First-class for test
    /// isolation and embedder restarts.
    pub fn reset(&mut self) {
        self.observations.clear();
    }
}

/// Persist one validator's hourly score and refresh its rolling
/// windows. Failures are logged here and never escalate.
async fn persist_unit(
    store: &dyn AgreementStore,
    master_key: &str,
    score: &AgreementScore,
    bucket: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    if let Err(err) = store.save_hourly_agreement(master_key, bucket, score).await {
        warn!("hourly agreement write failed for {}: {}", master_key, err);
    }
    if let Err(err) = store
        .update_rolling_agreement(master_key, AgreementWindow::Hour1, score)
        .await
    {
        warn!("1h summary write failed for {}: {}", master_key, err);
    }
    if let Err(err) = refresh_windows(store, master_key, now).await {
        warn!("window rollup failed for {}: {}", master_key, err);
    }
}

/// Recompute the trailing 24h/30d summaries and the current UTC day's
/// bucket from the persisted hourly rows.
async fn refresh_windows(
    store: &dyn AgreementStore,
    master_key: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = store
        .hourly_agreements_since(master_key, now - WallDuration::hours(24))
        .await?;
    store
        .update_rolling_agreement(master_key, AgreementWindow::Hour24, &sum_rows(&rows, false))
        .await?;

    let rows = store
        .hourly_agreements_since(master_key, now - WallDuration::days(30))
        .await?;
    store
        .update_rolling_agreement(master_key, AgreementWindow::Day30, &sum_rows(&rows, false))
        .await?;

    let day_start = day_bucket(now);
    let day_over = day_start + WallDuration::days(1) <= now;
    let rows = store.hourly_agreements_since(master_key, day_start).await?;
    store
        .save_daily_agreement(master_key, day_start, &sum_rows(&rows, !day_over))
        .await?;
    Ok(())
}

fn sum_rows(rows: &[HourlyAgreement], force_incomplete: bool) -> AgreementScore {
    let mut total = AgreementScore::new(0, 0, force_incomplete);
    for row in rows {
        total.accumulate(&row.score);
    }
    total
}
