//! Data models for Gather

mod event;
mod pending;

pub use event::{
    invitation_code_is_valid, Event, EventFilter, EventId, Location, INVITATION_CODE_LEN,
};
pub use pending::{PendingOp, PendingSyncItem};
