// Background audit trail: stake decisions are queued on a bounded channel and
// persisted by a single writer task, so evaluation never waits on the store.

use std::sync::Arc;

use courtline_core::audit::{AuditSink, StakeAuditRecord};
use courtline_core::db::Database;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Queue depth before records start being dropped.
pub const AUDIT_QUEUE_DEPTH: usize = 256;

/// Audit sink that forwards records to a writer task.
///
/// `record` never blocks: when the queue is full or the writer has gone
/// away, the record is dropped with a warning.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<StakeAuditRecord>,
}

impl ChannelAuditSink {
    pub fn new(tx: mpsc::Sender<StakeAuditRecord>) -> Self {
        Self { tx }
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: StakeAuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            match e {
                mpsc::error::TrySendError::Full(r) => {
                    warn!("audit queue full; dropping record for {}", r.selection)
                }
                mpsc::error::TrySendError::Closed(r) => {
                    warn!("audit writer stopped; dropping record for {}", r.selection)
                }
            }
        }
    }
}

/// Spawn the writer task. It drains `rx` until every sender is dropped and
/// returns the number of records persisted.
pub fn spawn_audit_writer(
    db: Arc<Database>,
    mut rx: mpsc::Receiver<StakeAuditRecord>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut written = 0;
        while let Some(record) = rx.recv().await {
            let db = db.clone();
            let result = tokio::task::spawn_blocking(move || db.record_stake_audit(&record)).await;
            match result {
                Ok(Ok(())) => written += 1,
                Ok(Err(e)) => warn!("failed to persist stake audit: {e:#}"),
                Err(e) => warn!("stake audit write panicked: {e}"),
            }
        }
        info!("audit writer finished after {written} records");
        written
    })
}

/// Build a connected sink/writer pair.
pub fn audit_channel(db: Arc<Database>) -> (ChannelAuditSink, JoinHandle<usize>) {
    let (tx, rx) = mpsc::channel(AUDIT_QUEUE_DEPTH);
    (ChannelAuditSink::new(tx), spawn_audit_writer(db, rx))
}
