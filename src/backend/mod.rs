//! Calendar backend abstraction.
//!
//! The Reconciler never talks to a concrete calendar provider; it only ever
//! sees a `CalendarBackend`. Two implementations ship with this crate: an
//! in-memory fake (`memory`) used by every test in this crate, and a
//! filesystem-backed adapter (`ics_dir`) that stores each calendar as a
//! directory of `.ics` files, used by the CLI for real local runs.

pub mod ics_dir;
pub mod memory;

use chrono::{DateTime, Utc};

use crate::error::MeshResult;
use crate::event::{Calendar, Event};

/// Capability surface the Reconciler depends on.
///
/// Implementations own identity assignment: `save` on an event with `id ==
/// None` must assign one and return it via `event.id`.
pub trait CalendarBackend {
    /// All calendars this backend can read from and write to.
    fn list_calendars(&self) -> MeshResult<Vec<Calendar>>;

    /// Every event across `calendars` whose start falls in `[start, end)`.
    fn get_events(
        &self,
        calendars: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MeshResult<Vec<Event>>;

    /// The event if it still exists.
    fn get_event(&self, calendar_id: &str, event_id: &str) -> MeshResult<Option<Event>>;

    /// An uncommitted event bound to `calendar_id`, ready to have its fields
    /// filled in by the Event Field Copier before `save`.
    fn create_event(&self, calendar_id: &str) -> Event {
        Event {
            id: None,
            calendar_id: calendar_id.to_string(),
            title: String::new(),
            start_date: Utc::now(),
            end_date: Utc::now(),
            is_all_day: false,
            location: None,
            url: None,
            notes: None,
            last_modified_date: None,
            attendees: Vec::new(),
        }
    }

    /// Persist `event`. Assigns `event.id` on first save and refreshes
    /// `event.last_modified_date`.
    fn save(&mut self, event: &mut Event) -> MeshResult<()>;

    /// Delete the event. Fails loudly on backend error.
    fn remove(&mut self, calendar_id: &str, event_id: &str) -> MeshResult<()>;
}
