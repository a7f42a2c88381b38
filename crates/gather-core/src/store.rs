//! Event store - durable local persistence for events
//!
//! Acts as the offline source of truth. Persists through the
//! [`KeyValueStore`] abstraction, so the same code runs against SQLite or
//! the in-memory fallback.

use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::error::{Error, Result};
use crate::kv::KeyValueStore;
use crate::models::{invitation_code_is_valid, Event, EventFilter, EventId};
use crate::util::unix_timestamp_ms;

const EVENT_KEY_PREFIX: &str = "event:";
const INVITATION_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Side read of the current session, used to attribute ownership.
///
/// Best-effort: the store works without one, leaving organizer fields empty.
pub trait IdentitySource: Send + Sync {
    /// The logged-in user's id, when a session exists
    fn current_user_id(&self) -> Option<String>;
}

/// Notification emitted by the store for interested listeners
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// An event was created or updated
    Saved(Event),
    /// An event was removed
    Deleted(EventId),
}

type Listener = Box<dyn Fn(&StoreEvent) + Send + Sync>;

/// Durable local store for [`Event`] entities
pub struct EventStore {
    kv: Arc<dyn KeyValueStore>,
    identity: Option<Arc<dyn IdentitySource>>,
    listeners: Mutex<Vec<Listener>>,
}

impl EventStore {
    /// Create a store over the given storage backend
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            identity: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Attach a session side-read for organizer attribution
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Register a listener for saved/deleted notifications
    pub fn subscribe(&self, listener: impl Fn(&StoreEvent) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Create or update an event (upsert by id).
    ///
    /// Requires a title and a start time. Stamps `created_at` on first save
    /// and advances `updated_at` on every save; assigns a unique invitation
    /// code when the event has none.
    pub fn save(&self, mut event: Event) -> Result<Event> {
        if event.title.trim().is_empty() {
            return Err(Error::InvalidInput("Event title is required".into()));
        }
        if event.starts_at <= 0 {
            return Err(Error::InvalidInput("Event start time is required".into()));
        }

        if event.organizer.is_none() {
            if let Some(identity) = &self.identity {
                event.organizer = identity.current_user_id();
            }
        }

        let now = unix_timestamp_ms();
        if let Some(previous) = self.get(&event.id)? {
            event.created_at = previous.created_at;
            // Strictly monotonic so rapid re-saves remain distinguishable
            event.updated_at = now.max(previous.updated_at + 1);
            if event.invitation_code.is_empty() {
                event.invitation_code = previous.invitation_code;
            }
        } else {
            event.created_at = now;
            event.updated_at = now;
        }

        if !invitation_code_is_valid(&event.invitation_code)
            || self.code_taken(&event.invitation_code, &event.id)?
        {
            event.invitation_code = self.generate_invitation_code(&event.id)?;
        }

        let raw = serde_json::to_string(&event)?;
        self.kv.set(&event_key(&event.id), &raw)?;
        self.notify(&StoreEvent::Saved(event.clone()));
        Ok(event)
    }

    /// Get an event by id; missing ids are not an error
    pub fn get(&self, id: &EventId) -> Result<Option<Event>> {
        match self.kv.get(&event_key(id))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Get every stored event (order unspecified)
    pub fn get_all(&self) -> Result<Vec<Event>> {
        let keys = self.kv.keys_with_prefix(EVENT_KEY_PREFIX)?;
        let mut events = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.kv.get(&key)? {
                events.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(events)
    }

    /// Remove an event; deleting a nonexistent id is a hard failure
    pub fn delete(&self, id: &EventId) -> Result<()> {
        if self.get(id)?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        self.kv.remove(&event_key(id))?;
        self.notify(&StoreEvent::Deleted(*id));
        Ok(())
    }

    /// Derive a view over stored events against the current instant
    pub fn filtered(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let now = unix_timestamp_ms();
        let mut events = self.get_all()?;
        events.retain(|event| filter.matches(event, now));
        Ok(events)
    }

    /// Overwrite local copies with events fetched from the remote API.
    ///
    /// The remote copy wins wholesale, timestamps and invitation code
    /// included; no field-level merging. Returns how many events were
    /// written.
    pub fn merge_remote(&self, events: &[Event]) -> Result<usize> {
        for event in events {
            let raw = serde_json::to_string(event)?;
            self.kv.set(&event_key(&event.id), &raw)?;
            self.notify(&StoreEvent::Saved(event.clone()));
        }
        Ok(events.len())
    }

    /// Find an event by its invitation code
    pub fn find_by_code(&self, code: &str) -> Result<Option<Event>> {
        Ok(self
            .get_all()?
            .into_iter()
            .find(|event| event.invitation_code == code))
    }

    fn generate_invitation_code(&self, owner: &EventId) -> Result<String> {
        loop {
            let mut rng = rand::rng();
            let code: String = (0..crate::models::INVITATION_CODE_LEN)
                .map(|_| {
                    let index = rng.random_range(0..INVITATION_CODE_CHARSET.len());
                    INVITATION_CODE_CHARSET[index] as char
                })
                .collect();
            if !self.code_taken(&code, owner)? {
                return Ok(code);
            }
        }
    }

    fn code_taken(&self, code: &str, owner: &EventId) -> Result<bool> {
        Ok(self
            .get_all()?
            .iter()
            .any(|event| event.invitation_code == code && event.id != *owner))
    }

    fn notify(&self, store_event: &StoreEvent) {
        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(store_event);
            }
        }
    }
}

fn event_key(id: &EventId) -> String {
    format!("{EVENT_KEY_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use crate::kv::MemoryKeyValueStore;

    use super::*;

    fn setup() -> EventStore {
        EventStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn test_save_requires_title_and_start() {
        let store = setup();

        let no_title = Event::new("   ", 1_000);
        assert!(matches!(
            store.save(no_title),
            Err(Error::InvalidInput(_))
        ));

        let no_start = Event::new("BBQ", 0);
        assert!(matches!(
            store.save(no_start),
            Err(Error::InvalidInput(_))
        ));

        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_first_save_stamps_code_and_timestamps() {
        let store = setup();
        let saved = store.save(Event::new("BBQ", 1_767_290_400_000)).unwrap();

        assert!(invitation_code_is_valid(&saved.invitation_code));
        assert!(saved.created_at > 0);
        assert_eq!(saved.created_at, saved.updated_at);

        let fetched = store.get(&saved.id).unwrap().unwrap();
        assert_eq!(fetched, saved);
    }

    #[test]
    fn test_resave_is_upsert_with_advancing_updated_at() {
        let store = setup();
        let first = store.save(Event::new("BBQ", 1_767_290_400_000)).unwrap();

        let mut edited = first.clone();
        edited.description = "x".to_string();
        let second = store.save(edited).unwrap();

        assert_eq!(store.get_all().unwrap().len(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.invitation_code, first.invitation_code);
    }

    #[test]
    fn test_delete_then_get_and_double_delete() {
        let store = setup();
        let saved = store.save(Event::new("BBQ", 1_000)).unwrap();

        store.delete(&saved.id).unwrap();
        assert!(store.get(&saved.id).unwrap().is_none());
        assert!(matches!(
            store.delete(&saved.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_invitation_codes_unique_across_store() {
        let store = setup();
        let mut codes = HashSet::new();
        for i in 0..50 {
            let saved = store.save(Event::new(format!("Event {i}"), 1_000 + i)).unwrap();
            assert!(invitation_code_is_valid(&saved.invitation_code));
            assert!(codes.insert(saved.invitation_code));
        }
    }

    #[test]
    fn test_colliding_preset_code_is_regenerated() {
        let store = setup();
        let first = store.save(Event::new("A", 1_000)).unwrap();

        let mut second = Event::new("B", 2_000);
        second.invitation_code.clone_from(&first.invitation_code);
        let saved = store.save(second).unwrap();

        assert_ne!(saved.invitation_code, first.invitation_code);
        assert!(invitation_code_is_valid(&saved.invitation_code));
    }

    #[test]
    fn test_filtered_views() {
        let store = setup();
        let now = unix_timestamp_ms();

        let past = store.save(Event::new("Past", now - 86_400_000)).unwrap();
        let future = store.save(Event::new("Future", now + 86_400_000)).unwrap();

        let upcoming = store.filtered(EventFilter::Upcoming).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, future.id);

        let gone = store.filtered(EventFilter::Past).unwrap();
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].id, past.id);

        assert_eq!(store.filtered(EventFilter::All).unwrap().len(), 2);
    }

    #[test]
    fn test_listeners_see_saved_and_deleted() {
        let store = setup();
        let saved_count = Arc::new(AtomicUsize::new(0));
        let deleted_count = Arc::new(AtomicUsize::new(0));

        let saves = Arc::clone(&saved_count);
        let deletes = Arc::clone(&deleted_count);
        store.subscribe(move |store_event| match store_event {
            StoreEvent::Saved(_) => {
                saves.fetch_add(1, Ordering::SeqCst);
            }
            StoreEvent::Deleted(_) => {
                deletes.fetch_add(1, Ordering::SeqCst);
            }
        });

        let event = store.save(Event::new("BBQ", 1_000)).unwrap();
        store.delete(&event.id).unwrap();

        assert_eq!(saved_count.load(Ordering::SeqCst), 1);
        assert_eq!(deleted_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_organizer_attributed_from_session() {
        struct FixedIdentity(Option<String>);
        impl IdentitySource for FixedIdentity {
            fn current_user_id(&self) -> Option<String> {
                self.0.clone()
            }
        }

        let store = EventStore::new(Arc::new(MemoryKeyValueStore::new()))
            .with_identity(Arc::new(FixedIdentity(Some("user-1".to_string()))));
        let saved = store.save(Event::new("BBQ", 1_000)).unwrap();
        assert_eq!(saved.organizer.as_deref(), Some("user-1"));

        // A preset organizer is left alone
        let mut preset = Event::new("Other", 1_000);
        preset.organizer = Some("user-2".to_string());
        let saved = store.save(preset).unwrap();
        assert_eq!(saved.organizer.as_deref(), Some("user-2"));
    }

    #[test]
    fn test_save_without_session_leaves_organizer_empty() {
        let store = setup();
        let saved = store.save(Event::new("BBQ", 1_000)).unwrap();
        assert_eq!(saved.organizer, None);
    }

    #[test]
    fn test_merge_remote_overwrites_local_copy() {
        let store = setup();
        let local = store.save(Event::new("BBQ", 1_000)).unwrap();

        let mut remote = local.clone();
        remote.title = "BBQ (final)".to_string();
        remote.updated_at = local.updated_at + 5;
        assert_eq!(store.merge_remote(&[remote.clone()]).unwrap(), 1);

        let stored = store.get(&local.id).unwrap().unwrap();
        assert_eq!(stored, remote);
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_code() {
        let store = setup();
        let saved = store.save(Event::new("BBQ", 1_000)).unwrap();

        let found = store.find_by_code(&saved.invitation_code).unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert!(store.find_by_code("NOPENOPE").unwrap().is_none());
    }
}
