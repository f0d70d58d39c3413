use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::agreement::{AgreementCalculator, DEFAULT_OBSERVATION_RETENTION};
use crate::observation::Validation;
use crate::registry::{ChainRegistry, RegistryConfig, DEFAULT_EVICT_AFTER, DEFAULT_RIPEN_AFTER};
use crate::store::AgreementStore;
use crate::writer::{WriteOp, WriteQueue, DEFAULT_QUEUE_CAPACITY};

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub ripen_after: Duration,
    pub evict_after: Duration,
    pub agreement_interval: Duration,
    pub observation_retention: Duration,
    pub primary_network: Option<String>,
    pub write_queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            ripen_after: DEFAULT_RIPEN_AFTER,
            evict_after: DEFAULT_EVICT_AFTER,
            agreement_interval: Duration::from_secs(60 * 60),
            observation_retention: DEFAULT_OBSERVATION_RETENTION,
            primary_network: None,
            write_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The single logical worker: owns the chain registry and agreement
/// calculator and runs every handler body to completion before the
/// next one starts. Construct one per process and share it by handle.
pub struct Monitor {
    pub registry: ChainRegistry,
    pub calculator: AgreementCalculator,
    store: Arc<dyn AgreementStore>,
    writer: WriteQueue,
}

impl Monitor {
    pub fn new(store: Arc<dyn AgreementStore>, writer: WriteQueue, config: &MonitorConfig) -> Self {
        let registry = ChainRegistry::new(RegistryConfig {
            ripen_after: config.ripen_after,
            evict_after: config.evict_after,
            primary_network: config.primary_network.clone(),
        });
        Monitor {
            registry,
            calculator: AgreementCalculator::new(config.observation_retention),
            store,
            writer,
        }
    }

    /// Entry point for the connection layer. Records the observation,
    /// forwards it to the registry, and queues the validator sighting.
    /// Never waits on storage.
    pub fn handle_validation(&mut self, validation: &Validation) {
        if !self
            .calculator
            .record_observation(&validation.signing_key, &validation.ledger_hash)
        {
            return;
        }
        self.registry.update_ledgers(validation);
        self.writer.submit(WriteOp::Sighting {
            signing_key: validation.signing_key.clone(),
            current_index: validation.ledger_index,
            partial: validation.partial(),
            last_ledger_time: validation.received_at,
        });
    }

    pub async fn run_agreement_cycle(&mut self) -> Result<()> {
        self.run_agreement_cycle_at(Utc::now()).await
    }

    /// One periodic pass: reconstruct chains, score and persist every
    /// validator's agreement, then purge stale chains and observations.
    pub async fn run_agreement_cycle_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        let chains = self.registry.calculate_chains_from_ledgers();
        self.calculator
            .calculate_agreement_at(now, &chains, self.store.as_ref())
            .await?;
        self.registry.purge_chains(self.store.as_ref()).await;
        self.calculator.purge_observations();
        Ok(())
    }

    /// First-class teardown: clears registry and calculator state.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.calculator.reset();
    }
}

/// Handle used by the surrounding service: wraps the monitor in the
/// process-wide mutex and runs its background tasks (write-queue
/// worker and the periodic agreement timer).
pub struct MonitorHandle {
    monitor: Arc<Mutex<Monitor>>,
    writer_task: JoinHandle<()>,
    timer_task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn start(store: Arc<dyn AgreementStore>, config: MonitorConfig) -> Self {
        let (writer, writer_task) = WriteQueue::start(store.clone(), config.write_queue_capacity);
        let monitor = Arc::new(Mutex::new(Monitor::new(store, writer, &config)));

        let timer_monitor = monitor.clone();
        let agreement_interval = config.agreement_interval;
        let timer_task = tokio::spawn(async move {
            let mut ticker = interval(agreement_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; wait a full period first
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut monitor = timer_monitor.lock().await;
                if let Err(err) = monitor.run_agreement_cycle().await {
                    warn!("agreement cycle failed: {}", err);
                }
            }
        });

        info!("ledger monitor started");
        MonitorHandle {
            monitor,
            writer_task,
            timer_task,
        }
    }

    pub async fn handle_validation(&self, validation: &Validation) {
        self.monitor.lock().await.handle_validation(validation);
    }

    /// Accept a raw payload from the connection layer. Malformed
    /// payloads are dropped and logged, never partially interpreted.
    pub async fn handle_validation_json(&self, payload: serde_json::Value) {
        match Validation::create_from_json(payload) {
            Ok(validation) => self.handle_validation(&validation).await,
            Err(err) => warn!("dropping malformed validation: {}", err),
        }
    }

    pub async fn run_agreement_cycle(&self) -> Result<()> {
        self.monitor.lock().await.run_agreement_cycle().await
    }

    pub async fn reset(&self) {
        self.monitor.lock().await.reset();
    }

    pub fn shutdown(self) {
        self.timer_task.abort();
        self.writer_task.abort();
    }
}
