use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::observation::Validation;
use crate::store::AgreementStore;

pub const DEFAULT_RIPEN_AFTER: Duration = Duration::from_secs(10);
pub const DEFAULT_EVICT_AFTER: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Minimum age before a pending ledger is judged.
    pub ripen_after: Duration,
    /// Silence after which a chain is evicted.
    pub evict_after: Duration,
    /// Network id whose accepted indices are checked for continuity.
    pub primary_network: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            ripen_after: DEFAULT_RIPEN_AFTER,
            evict_after: DEFAULT_EVICT_AFTER,
            primary_network: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LedgerKey {
    network_id: Option<String>,
    ledger_hash: String,
}

/// A ledger hash waiting to be judged: witnesses accumulate until the
/// record ripens, then it is evaluated exactly once.
#[derive(Clone, Debug)]
struct PendingLedger {
    ledger_hash: String,
    ledger_index: u64,
    network_id: Option<String>,
    signing_keys: HashSet<String>,
    first_seen: Instant,
    arrival: u64,
}

/// One reconstructed consensus history. `ledgers` maps attached ledger
/// hashes to their indices and is cleared every purge cycle; the
/// validator set only grows while the chain is alive.
#[derive(Clone, Debug)]
pub struct Chain {
    pub id: String,
    pub network_id: Option<String>,
    pub first: u64,
    pub current: u64,
    pub signing_keys: HashSet<String>,
    pub ledgers: HashMap<String, u64>,
    pub updated_at: Instant,
    pub incomplete: bool,
}

impl Chain {
    fn open(ledger: &PendingLedger, now: Instant) -> Self {
        Chain {
            id: Uuid::new_v4().to_string(),
            network_id: ledger.network_id.clone(),
            first: ledger.ledger_index,
            current: ledger.ledger_index,
            signing_keys: ledger.signing_keys.clone(),
            ledgers: HashMap::from([(ledger.ledger_hash.clone(), ledger.ledger_index)]),
            updated_at: now,
            incomplete: false,
        }
    }

    pub fn length(&self) -> u64 {
        self.current - self.first
    }

    fn overlaps(&self, keys: &HashSet<String>) -> bool {
        !self.signing_keys.is_disjoint(keys)
    }
}

/// Groups observed ledgers into the minimum number of append-only
/// histories consistent with declared validator overlap. Owns every
/// pending ledger and chain; callers only ever see cloned snapshots.
pub struct ChainRegistry {
    config: RegistryConfig,
    pending: HashMap<LedgerKey, PendingLedger>,
    chains: BTreeMap<String, Chain>,
    arrivals: u64,
}

impl ChainRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        ChainRegistry {
            config,
            pending: HashMap::new(),
            chains: BTreeMap::new(),
            arrivals: 0,
        }
    }

    /// Fold one validation into the pending pool. Idempotent: replays
    /// of an already-counted (signing_key, ledger_hash) change nothing.
    pub fn update_ledgers(&mut self, validation: &Validation) {
        let key = LedgerKey {
            network_id: validation.network_id.clone(),
            ledger_hash: validation.ledger_hash.clone(),
        };
        let arrivals = &mut self.arrivals;
        let entry = self.pending.entry(key).or_insert_with(|| {
            let arrival = *arrivals;
            *arrivals += 1;
            PendingLedger {
                ledger_hash: validation.ledger_hash.clone(),
                ledger_index: validation.ledger_index,
                network_id: validation.network_id.clone(),
                signing_keys: HashSet::new(),
                first_seen: Instant::now(),
                arrival,
            }
        });
        entry.signing_keys.insert(validation.signing_key.clone());
    }

    /// Evaluate every pending ledger old enough to judge and return a
    /// snapshot of the chains. Safe to call at any time; records not
    /// yet ripe simply wait for the next pass.
    pub fn calculate_chains_from_ledgers(&mut self) -> Vec<Chain> {
        let now = Instant::now();
        let due: Vec<LedgerKey> = self
            .pending
            .iter()
            .filter(|(_, ledger)| now.duration_since(ledger.first_seen) > self.config.ripen_after)
            .map(|(key, _)| key.clone())
            .collect();

        let mut ripe = Vec::new();
        for key in due {
            if let Some(ledger) = self.pending.remove(&key) {
                if ledger.signing_keys.len() > 1 {
                    ripe.push(ledger);
                } else {
                    // A single witness cannot be told apart from a
                    // spurious report. Evaluated once, never revisited.
                    debug!(
                        "discarding single-witness ledger {} at index {}",
                        ledger.ledger_hash, ledger.ledger_index
                    );
                }
            }
        }
        ripe.sort_by_key(|ledger| (ledger.ledger_index, ledger.arrival));

        let mut accepted_primary = Vec::new();
        for ledger in ripe {
            let on_primary = self.config.primary_network.is_some()
                && ledger.network_id == self.config.primary_network;
            if let Some(index) = self.attach(ledger, now) {
                if on_primary {
                    accepted_primary.push(index);
                }
            }
        }
        self.check_continuity(&mut accepted_primary);

        self.chains.values().cloned().collect()
    }

    /// Attachment rules, in order: extend an adjacent chain, ignore an
    /// exact duplicate of a chain's current position, absorb into any
    /// overlapping chain as a skipped gap, or open a new chain.
    /// Returns the accepted index, or None for the duplicate no-op.
    fn attach(&mut self, ledger: PendingLedger, now: Instant) -> Option<u64> {
        let mut best: Option<(String, u64)> = None;
        for (id, chain) in &self.chains {
            if chain.network_id != ledger.network_id || !chain.overlaps(&ledger.signing_keys) {
                continue;
            }
            if chain.current + 1 == ledger.ledger_index {
                let longer = match &best {
                    None => true,
                    Some((_, length)) => chain.length() > *length,
                };
                if longer {
                    best = Some((id.clone(), chain.length()));
                }
            }
        }
        if let Some((id, _)) = best {
            if let Some(mut chain) = self.chains.remove(&id) {
                chain.current = ledger.ledger_index;
                chain.signing_keys.extend(ledger.signing_keys);
                chain.ledgers.insert(ledger.ledger_hash, ledger.ledger_index);
                chain.updated_at = now;
                self.chains.insert(id, chain);
            }
            return Some(ledger.ledger_index);
        }

        let duplicate = self.chains.values().any(|chain| {
            chain.network_id == ledger.network_id
                && chain.current == ledger.ledger_index
                && chain.overlaps(&ledger.signing_keys)
        });
        if duplicate {
            return None;
        }

        let absorber = self
            .chains
            .iter()
            .find(|(_, chain)| {
                chain.network_id == ledger.network_id && chain.overlaps(&ledger.signing_keys)
            })
            .map(|(id, _)| id.clone());
        if let Some(id) = absorber {
            if let Some(mut chain) = self.chains.remove(&id) {
                chain.incomplete = true;
                chain.first = chain.first.min(ledger.ledger_index);
                chain.current = chain.current.max(ledger.ledger_index);
                chain.signing_keys.extend(ledger.signing_keys);
                chain.ledgers.insert(ledger.ledger_hash, ledger.ledger_index);
                chain.updated_at = now;
                self.chains.insert(id, chain);
            }
            return Some(ledger.ledger_index);
        }

        let chain = Chain::open(&ledger, now);
        debug!(
            "opened chain {} at index {} with {} validators",
            chain.id,
            ledger.ledger_index,
            chain.signing_keys.len()
        );
        self.chains.insert(chain.id.clone(), chain);
        Some(ledger.ledger_index)
    }

    fn check_continuity(&self, accepted: &mut Vec<u64>) {
        if accepted.len() < 2 {
            return;
        }
        accepted.sort_unstable();
        accepted.dedup();
        for window in accepted.windows(2) {
            if window[1] != window[0] + 1 {
                warn!(
                    "non-consecutive ledger indices accepted on primary network: {} then {}",
                    window[0], window[1]
                );
            }
        }
    }

    /// Evict chains unobserved for too long, then persist a chain
    /// assignment for every surviving member validator and clear
    /// ledger membership. Persistence failures are logged; in-memory
    /// state stays authoritative.
    pub async fn purge_chains(&mut self, store: &dyn AgreementStore) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .chains
            .iter()
            .filter(|(_, chain)| now.duration_since(chain.updated_at) > self.config.evict_after)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(chain) = self.chains.remove(&id) {
                info!(
                    "evicting chain {} (last index {}, {} validators)",
                    chain.id,
                    chain.current,
                    chain.signing_keys.len()
                );
            }
        }

        let survivors: Vec<String> = self.chains.keys().cloned().collect();
        for id in survivors {
            let (signing_keys, fallback) = match self.chains.get(&id) {
                Some(chain) => (
                    chain.signing_keys.clone(),
                    format!("chain.{}", &chain.id[..8]),
                ),
                None => continue,
            };
            let label = match store.resolve_chain_network_name(&signing_keys).await {
                Ok(Some(name)) => name,
                Ok(None) => fallback,
                Err(err) => {
                    warn!("network name lookup failed for chain {}: {}", id, err);
                    fallback
                }
            };
            for signing_key in &signing_keys {
                if let Err(err) = store.assign_validator_chain(signing_key, &label).await {
                    warn!("chain assignment write failed for {}: {}", signing_key, err);
                }
            }
            if let Some(chain) = self.chains.get_mut(&id) {
                chain.ledgers.clear();
            }
        }
    }

    /// Witness count for a pending ledger, if it is still pending.
    pub fn witness_count(&self, network_id: Option<&str>, ledger_hash: &str) -> Option<usize> {
        let key = LedgerKey {
            network_id: network_id.map(|n| n.to_string()),
            ledger_hash: ledger_hash.to_string(),
        };
        self.pending.get(&key).map(|ledger| ledger.signing_keys.len())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop all pending ledgers and chains. First-class so embedders
    /// and tests can re-run from a clean slate.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.chains.clear();
        self.arrivals = 0;
    }
}
