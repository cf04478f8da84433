//! Bounded hand-off of session snapshots to durable storage.
//!
//! The request path only ever calls [`SnapshotQueue::try_enqueue`], which never waits. A single
//! [`SnapshotWriter`] drains the queue and upserts each snapshot; write failures are logged and
//! the writer moves on.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storefront_core::domain::session::SessionSnapshot;
use storefront_db::repositories::SessionSnapshotRepository;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SnapshotQueueError {
    #[error("snapshot queue is full")]
    Full,
    #[error("snapshot writer has stopped")]
    Closed,
}

#[derive(Clone, Debug)]
pub struct SnapshotQueue {
    sender: mpsc::Sender<SessionSnapshot>,
}

impl SnapshotQueue {
    /// Creates a queue holding at most `capacity` pending snapshots and the writer that drains it.
    pub fn channel(
        capacity: usize,
        repository: Arc<dyn SessionSnapshotRepository>,
    ) -> (Self, SnapshotWriter) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, SnapshotWriter { receiver, repository })
    }

    pub fn try_enqueue(&self, snapshot: SessionSnapshot) -> Result<(), SnapshotQueueError> {
        self.sender.try_send(snapshot).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => SnapshotQueueError::Full,
            mpsc::error::TrySendError::Closed(_) => SnapshotQueueError::Closed,
        })
    }

    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

pub struct SnapshotWriter {
    receiver: mpsc::Receiver<SessionSnapshot>,
    repository: Arc<dyn SessionSnapshotRepository>,
}

impl SnapshotWriter {
    pub fn spawn(self) -> JoinHandle<WriterStats> {
        tokio::spawn(self.run())
    }

    /// Drains the queue until every [`SnapshotQueue`] handle has been dropped.
    pub async fn run(mut self) -> WriterStats {
        let mut stats = WriterStats::default();
        while let Some(snapshot) = self.receiver.recv().await {
            match self.repository.upsert(&snapshot).await {
                Ok(()) => {
                    stats.written += 1;
                    debug!(
                        event_name = "session.snapshot.written",
                        tenant_id = %snapshot.key.tenant_id,
                        identity = %snapshot.key.masked_identity(),
                        turns = snapshot.history.len(),
                        "session snapshot persisted"
                    );
                }
                Err(error) => {
                    stats.failed += 1;
                    warn!(
                        event_name = "session.snapshot.write_failed",
                        tenant_id = %snapshot.key.tenant_id,
                        identity = %snapshot.key.masked_identity(),
                        error = %error,
                        "session snapshot write failed; in-memory session stays authoritative"
                    );
                }
            }
        }
        stats
    }
}
