//! Event model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of the human-shareable invitation code.
pub const INVITATION_CODE_LEN: usize = 8;

/// A unique identifier for an event, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new unique event ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where an event takes place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Human-readable place name
    pub name: String,
    /// Optional latitude
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Optional longitude
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// An organized gathering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier
    pub id: EventId,
    /// Event title
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Start timestamp (Unix ms)
    pub starts_at: i64,
    /// Optional end timestamp (Unix ms)
    #[serde(default)]
    pub ends_at: Option<i64>,
    /// Where the event takes place
    #[serde(default)]
    pub location: Location,
    /// Maximum number of attendees (0 = unlimited)
    #[serde(default)]
    pub capacity: u32,
    /// User id of the organizer, when a session existed at save time
    #[serde(default)]
    pub organizer: Option<String>,
    /// Arbitrary theme tag
    #[serde(default)]
    pub theme: String,
    /// 8-character shareable code, unique across the store
    #[serde(default)]
    pub invitation_code: String,
    /// Creation timestamp (Unix ms), stamped on first save
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp (Unix ms), advanced on every save
    #[serde(default)]
    pub updated_at: i64,
    /// Marks demo seed data as opposed to user data
    #[serde(default)]
    pub is_sample: bool,
}

impl Event {
    /// Create a new event with the given title and start time (Unix ms).
    ///
    /// Identifier, invitation code, and timestamps are finalized by the
    /// store on save.
    #[must_use]
    pub fn new(title: impl Into<String>, starts_at: i64) -> Self {
        Self {
            id: EventId::new(),
            title: title.into(),
            description: String::new(),
            starts_at,
            ends_at: None,
            location: Location::default(),
            capacity: 0,
            organizer: None,
            theme: String::new(),
            invitation_code: String::new(),
            created_at: 0,
            updated_at: 0,
            is_sample: false,
        }
    }

    /// Check whether the event starts after the given instant (Unix ms).
    #[must_use]
    pub const fn is_upcoming_at(&self, now_ms: i64) -> bool {
        self.starts_at > now_ms
    }

    /// Check whether the event starts on the same calendar day (UTC) as the
    /// given instant.
    #[must_use]
    pub fn is_on_same_day(&self, now_ms: i64) -> bool {
        match (
            chrono::DateTime::from_timestamp_millis(self.starts_at),
            chrono::DateTime::from_timestamp_millis(now_ms),
        ) {
            (Some(start), Some(now)) => start.date_naive() == now.date_naive(),
            _ => false,
        }
    }
}

/// Read-side view over stored events, derived against the current instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every stored event
    All,
    /// Events starting after now
    Upcoming,
    /// Events that already started
    Past,
    /// Events starting on the current calendar day (UTC)
    Today,
}

impl EventFilter {
    /// Check whether an event matches this filter at the given instant.
    #[must_use]
    pub fn matches(self, event: &Event, now_ms: i64) -> bool {
        match self {
            Self::All => true,
            Self::Upcoming => event.is_upcoming_at(now_ms),
            Self::Past => !event.is_upcoming_at(now_ms),
            Self::Today => event.is_on_same_day(now_ms),
        }
    }
}

/// Check that a code is exactly 8 characters from `[A-Z0-9]`.
#[must_use]
pub fn invitation_code_is_valid(code: &str) -> bool {
    code.len() == INVITATION_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_unique() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_event_id_parse() {
        let id = EventId::new();
        let parsed: EventId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_event_new_defaults() {
        let event = Event::new("BBQ", 1_000);
        assert_eq!(event.title, "BBQ");
        assert_eq!(event.starts_at, 1_000);
        assert!(event.invitation_code.is_empty());
        assert_eq!(event.created_at, 0);
        assert!(!event.is_sample);
    }

    #[test]
    fn test_upcoming_is_strict() {
        let event = Event::new("BBQ", 1_000);
        assert!(event.is_upcoming_at(999));
        assert!(!event.is_upcoming_at(1_000));
        assert!(!event.is_upcoming_at(1_001));
    }

    #[test]
    fn test_same_day_matches_utc_date() {
        // 2026-01-01T18:00:00Z
        let event = Event::new("BBQ", 1_767_290_400_000);
        // 2026-01-01T02:00:00Z
        assert!(event.is_on_same_day(1_767_232_800_000));
        // 2026-01-02T02:00:00Z
        assert!(!event.is_on_same_day(1_767_319_200_000));
    }

    #[test]
    fn test_filter_matches() {
        let event = Event::new("BBQ", 2_000);
        assert!(EventFilter::All.matches(&event, 5_000));
        assert!(EventFilter::Upcoming.matches(&event, 1_000));
        assert!(!EventFilter::Upcoming.matches(&event, 5_000));
        assert!(EventFilter::Past.matches(&event, 5_000));
        assert!(!EventFilter::Past.matches(&event, 1_000));
    }

    #[test]
    fn test_invitation_code_validation() {
        assert!(invitation_code_is_valid("A1B2C3D4"));
        assert!(invitation_code_is_valid("ZZZZZZZZ"));
        assert!(!invitation_code_is_valid("a1b2c3d4"));
        assert!(!invitation_code_is_valid("A1B2C3D"));
        assert!(!invitation_code_is_valid("A1B2C3D45"));
        assert!(!invitation_code_is_valid("A1B2C3D!"));
    }

    #[test]
    fn test_event_roundtrips_through_json() {
        let mut event = Event::new("Picnic", 42);
        event.location = Location {
            name: "Riverside park".to_string(),
            latitude: Some(52.52),
            longitude: Some(13.405),
        };
        let raw = serde_json::to_string(&event).unwrap();
        assert!(raw.contains("\"startsAt\":42"));
        assert!(raw.contains("\"invitationCode\":\"\""));
        let parsed: Event = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, event);
    }
}
