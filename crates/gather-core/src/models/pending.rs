//! Pending sync item model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Event, EventId};

/// A mutation queued while the remote API was unreachable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSyncItem {
    /// Queue entry identifier
    pub id: Uuid,
    /// The queued mutation
    pub op: PendingOp,
    /// When the mutation was queued (Unix ms)
    pub queued_at: i64,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
}

impl PendingSyncItem {
    /// Queue a new mutation at the given instant.
    #[must_use]
    pub fn new(op: PendingOp, queued_at: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            op,
            queued_at,
            attempts: 0,
        }
    }
}

/// The mutation payload awaiting replay against the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PendingOp {
    CreateEvent { event: Event },
    UpdateEvent { event: Event },
    DeleteEvent { id: EventId },
    JoinEvent { id: EventId },
    LeaveEvent { id: EventId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_item_roundtrips_through_json() {
        let item = PendingSyncItem::new(
            PendingOp::CreateEvent {
                event: Event::new("BBQ", 1_000),
            },
            42,
        );
        let raw = serde_json::to_string(&item).unwrap();
        let parsed: PendingSyncItem = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, item);
        assert_eq!(parsed.attempts, 0);
    }

    #[test]
    fn test_pending_op_tagged_encoding() {
        let op = PendingOp::DeleteEvent { id: EventId::new() };
        let raw = serde_json::to_string(&op).unwrap();
        assert!(raw.contains("\"kind\":\"delete_event\""));
    }
}
