//! Offline mutation queue.
//!
//! Mutations attempted while the remote API is unreachable are queued here
//! (persisted through the same key-value store as the events themselves)
//! and replayed in FIFO order on the next connectivity event. Failure
//! handling is deliberately absorbing: a connectivity error aborts the
//! drain pass and keeps everything, an HTTP rejection counts against the
//! item and eventually drops it.

use std::sync::Arc;

use crate::api::{ApiClient, ApiError, HttpTransport};
use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::models::{PendingOp, PendingSyncItem};
use crate::util::unix_timestamp_ms;

const QUEUE_KEY: &str = "sync:queue";

/// Replays per item before it is dropped as poisoned
pub const MAX_REPLAY_ATTEMPTS: u32 = 8;

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items successfully replayed and dequeued
    pub replayed: usize,
    /// Items rejected by the server but kept for the next pass
    pub kept: usize,
    /// Items dropped after exceeding the attempt limit
    pub dropped: usize,
    /// The pass stopped early because the network went away
    pub aborted_offline: bool,
}

/// Persisted FIFO queue of mutations awaiting replay
pub struct SyncQueue {
    kv: Arc<dyn KeyValueStore>,
}

impl SyncQueue {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Append a mutation to the queue
    pub fn enqueue(&self, op: PendingOp) -> Result<PendingSyncItem> {
        let item = PendingSyncItem::new(op, unix_timestamp_ms());
        let mut items = self.items()?;
        items.push(item.clone());
        self.write(&items)?;
        Ok(item)
    }

    /// Every queued item, oldest first
    pub fn items(&self) -> Result<Vec<PendingSyncItem>> {
        match self.kv.get(QUEUE_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.items()?.is_empty())
    }

    /// Replay queued mutations against the remote API, oldest first.
    ///
    /// Stops at the first connectivity failure (still offline); HTTP
    /// rejections are counted per item and drop the item once it exceeds
    /// [`MAX_REPLAY_ATTEMPTS`].
    pub async fn drain<T: HttpTransport>(&self, api: &ApiClient<T>) -> Result<DrainReport> {
        let items = self.items()?;
        let mut report = DrainReport::default();
        let mut remaining: Vec<PendingSyncItem> = Vec::new();
        let mut iter = items.into_iter();

        while let Some(mut item) = iter.next() {
            match replay(api, &item.op).await {
                Ok(()) => {
                    report.replayed += 1;
                }
                Err(ApiError::Network(reason)) => {
                    tracing::debug!("Sync drain interrupted, still offline: {reason}");
                    report.aborted_offline = true;
                    remaining.push(item);
                    remaining.extend(iter);
                    break;
                }
                Err(error) => {
                    item.attempts += 1;
                    if item.attempts >= MAX_REPLAY_ATTEMPTS {
                        tracing::warn!(
                            "Dropping pending sync item {} after {} failed replays: {error}",
                            item.id,
                            item.attempts
                        );
                        report.dropped += 1;
                    } else {
                        tracing::debug!(
                            "Pending sync item {} rejected (attempt {}): {error}",
                            item.id,
                            item.attempts
                        );
                        report.kept += 1;
                        remaining.push(item);
                    }
                }
            }
        }

        self.write(&remaining)?;
        Ok(report)
    }

    fn write(&self, items: &[PendingSyncItem]) -> Result<()> {
        self.kv.set(QUEUE_KEY, &serde_json::to_string(items)?)
    }
}

async fn replay<T: HttpTransport>(
    api: &ApiClient<T>,
    op: &PendingOp,
) -> std::result::Result<(), ApiError> {
    match op {
        PendingOp::CreateEvent { event } => api.create_event(event).await.map(|_| ()),
        PendingOp::UpdateEvent { event } => api.update_event(event).await.map(|_| ()),
        PendingOp::DeleteEvent { id } => api.delete_event(id).await,
        PendingOp::JoinEvent { id } => api.join_event(id).await,
        PendingOp::LeaveEvent { id } => api.leave_event(id).await,
    }
}
