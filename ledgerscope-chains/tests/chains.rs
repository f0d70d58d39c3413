use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::time::{advance, Duration};

use ledgerscope_chains::registry::{ChainRegistry, RegistryConfig};
use ledgerscope_chains::store::{AgreementStore, AgreementWindow};
use ledgerscope_chains::Validation;
use ledgerscope_datastore::models::{AgreementScore, HourlyAgreement};
use ledgerscope_devnet::Devnet;

struct MockStore {
    network_name: Option<String>,
    assignments: Mutex<Vec<(String, String)>>,
}

impl MockStore {
    fn new(network_name: Option<&str>) -> Self {
        Self {
            network_name: network_name.map(|n| n.to_string()),
            assignments: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgreementStore for MockStore {
    async fn upsert_validator_sighting(
        &self,
        _signing_key: &str,
        _current_index: u64,
        _partial: bool,
        _last_ledger_time: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    async fn save_hourly_agreement(
        &self,
        _master_key: &str,
        _bucket_start: DateTime<Utc>,
        _score: &AgreementScore,
    ) -> Result<()> {
        Ok(())
    }

    async fn save_daily_agreement(
        &self,
        _master_key: &str,
        _day_start: DateTime<Utc>,
        _score: &AgreementScore,
    ) -> Result<()> {
        Ok(())
    }

    async fn update_rolling_agreement(
        &self,
        _master_key: &str,
        _window: AgreementWindow,
        _score: &AgreementScore,
    ) -> Result<()> {
        Ok(())
    }

    async fn resolve_master_key(&self, signing_key: &str) -> Result<Option<String>> {
        Ok(Some(format!("master.{}", signing_key)))
    }

    async fn resolve_chain_network_name(
        &self,
        _validator_set: &HashSet<String>,
    ) -> Result<Option<String>> {
        Ok(self.network_name.clone())
    }

    async fn assign_validator_chain(&self, signing_key: &str, chain_name: &str) -> Result<()> {
        self.assignments
            .lock()
            .unwrap()
            .push((signing_key.to_string(), chain_name.to_string()));
        Ok(())
    }

    async fn hourly_agreements_since(
        &self,
        _master_key: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAgreement>> {
        Ok(Vec::new())
    }
}

fn validation(signing_key: &str, ledger_hash: &str, ledger_index: u64) -> Validation {
    Validation {
        signing_key: signing_key.to_string(),
        ledger_hash: ledger_hash.to_string(),
        ledger_index,
        network_id: None,
        full: true,
        received_at: Utc::now(),
    }
}

fn registry() -> ChainRegistry {
    ChainRegistry::new(RegistryConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_update_ledgers_is_idempotent() {
    let mut registry = registry();

    registry.update_ledgers(&validation("A", "H1", 1));
    registry.update_ledgers(&validation("A", "H1", 1));
    assert_eq!(registry.witness_count(None, "H1"), Some(1));

    registry.update_ledgers(&validation("B", "H1", 1));
    assert_eq!(registry.witness_count(None, "H1"), Some(2));
    assert_eq!(registry.pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gap_free_stream_builds_one_chain() {
    let devnet = Devnet::new();
    let keys = devnet.signing_keys(3);
    let mut registry = registry();

    for payload in devnet.validation_stream(&keys, 1, 3, None).unwrap() {
        registry.update_ledgers(&Validation::create_from_json(payload).unwrap());
    }

    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();

    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    assert_eq!(chain.ledgers.len(), 3);
    assert_eq!(chain.signing_keys.len(), 3);
    assert_eq!(chain.first, 1);
    assert_eq!(chain.current, 3);
    assert!(!chain.incomplete);
    assert!(chain.current >= chain.first);
    for index in chain.ledgers.values() {
        assert!((chain.first..=chain.current).contains(index));
    }
    assert_eq!(registry.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_skipped_index_marks_chain_incomplete() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
        registry.update_ledgers(&validation(key, "H3", 3));
    }

    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();

    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    assert!(chain.incomplete);
    assert_eq!(chain.first, 1);
    assert_eq!(chain.current, 3);
    assert_eq!(chain.ledgers.len(), 2);
    assert_eq!(chain.ledgers.get("H1"), Some(&1));
    assert_eq!(chain.ledgers.get("H3"), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn test_single_witness_is_discarded_for_good() {
    let mut registry = registry();
    registry.update_ledgers(&validation("A", "H1", 1));

    advance(Duration::from_secs(11)).await;
    assert!(registry.calculate_chains_from_ledgers().is_empty());
    assert_eq!(registry.pending_count(), 0);

    // A second witness arriving after the record was judged starts a
    // fresh single-witness record, which is discarded in turn.
    registry.update_ledgers(&validation("B", "H1", 1));
    advance(Duration::from_secs(11)).await;
    assert!(registry.calculate_chains_from_ledgers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unripe_records_wait_for_the_next_pass() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
    }

    advance(Duration::from_secs(5)).await;
    assert!(registry.calculate_chains_from_ledgers().is_empty());
    assert_eq!(registry.pending_count(), 1);

    advance(Duration::from_secs(6)).await;
    let chains = registry.calculate_chains_from_ledgers();
    assert_eq!(chains.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_at_current_is_a_noop() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
        registry.update_ledgers(&validation(key, "H2", 2));
    }
    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();
    assert_eq!(chains.len(), 1);

    // A competing hash for the position the chain already holds
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H2-PRIME", 2));
    }
    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();

    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    assert_eq!(chain.ledgers.len(), 2);
    assert!(!chain.ledgers.contains_key("H2-PRIME"));
    assert!(!chain.incomplete);
    assert_eq!(chain.current, 2);
}

#[tokio::test(start_paused = true)]
async fn test_overlap_absorbs_an_out_of_order_index() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H5", 5));
    }
    advance(Duration::from_secs(11)).await;
    assert_eq!(registry.calculate_chains_from_ledgers().len(), 1);

    // Overlaps through A only, at a lower, non-adjacent index
    for key in ["A", "C"] {
        registry.update_ledgers(&validation(key, "H2", 2));
    }
    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();

    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    assert!(chain.incomplete);
    assert_eq!(chain.first, 2);
    assert_eq!(chain.current, 5);
    assert_eq!(chain.signing_keys.len(), 3);
    for index in chain.ledgers.values() {
        assert!((chain.first..=chain.current).contains(index));
    }
}

#[tokio::test(start_paused = true)]
async fn test_adjacent_attach_prefers_the_longest_history() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
        registry.update_ledgers(&validation(key, "H2", 2));
        registry.update_ledgers(&validation(key, "H3", 3));
    }
    advance(Duration::from_secs(11)).await;
    registry.calculate_chains_from_ledgers();

    for key in ["C", "D"] {
        registry.update_ledgers(&validation(key, "X3", 3));
    }
    advance(Duration::from_secs(11)).await;
    assert_eq!(registry.calculate_chains_from_ledgers().len(), 2);

    // Both chains sit at index 3 and overlap the new witnesses; the
    // longer history wins the extension
    for key in ["B", "C"] {
        registry.update_ledgers(&validation(key, "H4", 4));
    }
    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();
    assert_eq!(chains.len(), 2);

    let winner = chains.iter().find(|chain| chain.current == 4).unwrap();
    assert_eq!(winner.first, 1);
    assert_eq!(winner.ledgers.len(), 4);
    assert!(winner.signing_keys.contains("A"));
    assert!(winner.signing_keys.contains("C"));

    let loser = chains.iter().find(|chain| chain.current == 3).unwrap();
    assert_eq!(loser.ledgers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disjoint_validator_sets_open_separate_chains() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
    }
    for key in ["C", "D"] {
        registry.update_ledgers(&validation(key, "X1", 1));
    }
    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();
    assert_eq!(chains.len(), 2);
    assert!(chains.iter().all(|chain| !chain.incomplete));
}

#[tokio::test(start_paused = true)]
async fn test_chains_are_scoped_by_network_id() {
    let mut registry = registry();
    for key in ["A", "B"] {
        let mut main = validation(key, "H1", 1);
        main.network_id = Some("main".to_string());
        registry.update_ledgers(&main);
        // Same witnesses, unscoped: must not merge with "main"
        registry.update_ledgers(&validation(key, "U1", 1));
    }
    advance(Duration::from_secs(11)).await;
    let chains = registry.calculate_chains_from_ledgers();
    assert_eq!(chains.len(), 2);
    let networks: Vec<_> = chains.iter().map(|chain| chain.network_id.clone()).collect();
    assert!(networks.contains(&Some("main".to_string())));
    assert!(networks.contains(&None));
}

#[tokio::test(start_paused = true)]
async fn test_purge_persists_assignments_then_evicts() {
    let store = MockStore::new(Some("testnet"));
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
        registry.update_ledgers(&validation(key, "H2", 2));
    }
    advance(Duration::from_secs(11)).await;
    assert_eq!(registry.calculate_chains_from_ledgers().len(), 1);

    // Recently observed: survives, membership cleared, assignment saved
    registry.purge_chains(&store).await;
    let chains = registry.calculate_chains_from_ledgers();
    assert_eq!(chains.len(), 1);
    assert!(chains[0].ledgers.is_empty());
    assert_eq!(chains[0].signing_keys.len(), 2);
    assert_eq!(chains[0].first, 1);
    assert_eq!(chains[0].current, 2);
    {
        let assignments = store.assignments.lock().unwrap();
        assert_eq!(assignments.len(), 2);
        assert!(assignments.iter().all(|(_, name)| name == "testnet"));
    }

    // An hour of silence: evicted, and no further assignment writes
    advance(Duration::from_secs(61 * 60)).await;
    registry.purge_chains(&store).await;
    assert!(registry.calculate_chains_from_ledgers().is_empty());
    assert_eq!(store.assignments.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_purge_falls_back_to_chain_label() {
    let store = MockStore::new(None);
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
    }
    advance(Duration::from_secs(11)).await;
    registry.calculate_chains_from_ledgers();
    registry.purge_chains(&store).await;

    let assignments = store.assignments.lock().unwrap();
    assert_eq!(assignments.len(), 2);
    assert!(assignments.iter().all(|(_, name)| name.starts_with("chain.")));
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_everything() {
    let mut registry = registry();
    for key in ["A", "B"] {
        registry.update_ledgers(&validation(key, "H1", 1));
    }
    advance(Duration::from_secs(11)).await;
    registry.calculate_chains_from_ledgers();

    registry.reset();
    assert_eq!(registry.pending_count(), 0);
    assert!(registry.calculate_chains_from_ledgers().is_empty());
}
