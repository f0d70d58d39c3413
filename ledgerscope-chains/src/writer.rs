use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::AgreementStore;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
pub enum WriteOp {
    Sighting {
        signing_key: String,
        current_index: u64,
        partial: bool,
        last_ledger_time: DateTime<Utc>,
    },
}

/// Bounded fire-and-forget lane to the persistence gateway. Ingestion
/// enqueues and moves on; one worker drains the queue and logs
/// failures. A full queue drops the write rather than block.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::Sender<WriteOp>,
}

impl WriteQueue {
    pub fn start(store: Arc<dyn AgreementStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(capacity);
        let worker = tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Sighting {
                        signing_key,
                        current_index,
                        partial,
                        last_ledger_time,
                    } => {
                        if let Err(err) = store
                            .upsert_validator_sighting(
                                &signing_key,
                                current_index,
                                partial,
                                last_ledger_time,
                            )
                            .await
                        {
                            warn!("validator sighting write failed for {}: {}", signing_key, err);
                        }
                    }
                }
            }
        });
        (WriteQueue { tx }, worker)
    }

    pub fn submit(&self, op: WriteOp) {
        if let Err(err) = self.tx.try_send(op) {
            warn!("write queue rejected op: {}", err);
        }
    }
}
