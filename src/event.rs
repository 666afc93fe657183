//! Provider-neutral event and calendar types.
//!
//! These are the types a `CalendarBackend` speaks in; the Reconciler works
//! exclusively with them and never reaches into a backend's native
//! representation (ICS, a platform API, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar known to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub name: String,
}

/// A calendar event (provider-neutral).
///
/// `id` is `None` for an event constructed via `create_event` that has not
/// yet been saved; the backend assigns it on first `save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<String>,
    pub calendar_id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub attendees: Vec<Attendee>,
}

impl Event {
    /// Trimmed title, used for fuzzy matching (leading/trailing whitespace
    /// is never part of a meaningful title comparison).
    pub fn trimmed_title(&self) -> &str {
        self.title.trim()
    }
}

/// An event attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub participation_status: ParticipationStatus,
}

/// Attendee participation status, as surfaced by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipationStatus {
    Accepted,
    Declined,
    Tentative,
    Pending,
    Unknown,
}

impl ParticipationStatus {
    /// Human-readable label used in the "Participants" metadata block.
    pub fn label(&self) -> &'static str {
        match self {
            ParticipationStatus::Accepted => "Accepted",
            ParticipationStatus::Declined => "Declined",
            ParticipationStatus::Tentative => "Tentative",
            ParticipationStatus::Pending => "Pending",
            ParticipationStatus::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_event(title: &str) -> Event {
        Event {
            id: Some("evt-1".into()),
            calendar_id: "cal-a".into(),
            title: title.to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 1, 15, 13, 0, 0).unwrap(),
            is_all_day: false,
            location: None,
            url: None,
            notes: None,
            last_modified_date: None,
            attendees: vec![],
        }
    }

    #[test]
    fn trimmed_title_strips_whitespace() {
        let event = make_event("  Lunch  ");
        assert_eq!(event.trimmed_title(), "Lunch");
    }
}
