//! In-memory fake `CalendarBackend`, used throughout this crate's tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::backend::CalendarBackend;
use crate::clock::Clock;
use crate::error::{MeshError, MeshResult};
use crate::event::{Calendar, Event};
use crate::idgen::IdGenerator;

/// A calendar backend held entirely in memory.
///
/// Event identity is assigned by the injected `IdGenerator` on first save,
/// and `last_modified_date` is stamped from the injected `Clock` on every
/// save, mirroring what a real backend does on the caller's behalf.
pub struct InMemoryBackend<C: Clock, I: IdGenerator> {
    calendars: Vec<Calendar>,
    events: HashMap<String, HashMap<String, Event>>,
    clock: C,
    id_gen: I,
}

impl<C: Clock, I: IdGenerator> InMemoryBackend<C, I> {
    pub fn new(clock: C, id_gen: I) -> Self {
        InMemoryBackend {
            calendars: Vec::new(),
            events: HashMap::new(),
            clock,
            id_gen,
        }
    }

    /// Register a calendar. Test setup helper; a real backend would
    /// discover these from the platform instead.
    pub fn add_calendar(&mut self, id: impl Into<String>, name: impl Into<String>) -> &mut Self {
        let id = id.into();
        self.events.entry(id.clone()).or_default();
        self.calendars.push(Calendar {
            id,
            name: name.into(),
        });
        self
    }

    /// Insert an event directly, bypassing `save`'s identity assignment.
    /// Used to seed scenarios where an event already exists with a known id.
    pub fn seed_event(&mut self, event: Event) -> String {
        let id = event
            .id
            .clone()
            .unwrap_or_else(|| self.id_gen.new_id());
        let mut event = event;
        event.id = Some(id.clone());
        self.events
            .entry(event.calendar_id.clone())
            .or_default()
            .insert(id.clone(), event);
        id
    }

    /// Remove an event out from under the reconciler, simulating an
    /// external deletion made by the user in another application.
    pub fn delete_externally(&mut self, calendar_id: &str, event_id: &str) {
        if let Some(cal) = self.events.get_mut(calendar_id) {
            cal.remove(event_id);
        }
    }

    /// Directly mutate an event's fields and bump its `last_modified_date`,
    /// simulating an external edit made by the user in another application.
    pub fn edit_externally(&mut self, calendar_id: &str, event_id: &str, f: impl FnOnce(&mut Event)) {
        let now = self.clock.now();
        if let Some(event) = self
            .events
            .get_mut(calendar_id)
            .and_then(|cal| cal.get_mut(event_id))
        {
            f(event);
            event.last_modified_date = Some(now);
        }
    }
}

impl<C: Clock, I: IdGenerator> CalendarBackend for InMemoryBackend<C, I> {
    fn list_calendars(&self) -> MeshResult<Vec<Calendar>> {
        Ok(self.calendars.clone())
    }

    fn get_events(
        &self,
        calendars: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MeshResult<Vec<Event>> {
        let mut out = Vec::new();
        for cal_id in calendars {
            if let Some(cal_events) = self.events.get(cal_id) {
                for event in cal_events.values() {
                    if event.start_date >= start && event.start_date < end {
                        out.push(event.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    fn get_event(&self, calendar_id: &str, event_id: &str) -> MeshResult<Option<Event>> {
        Ok(self
            .events
            .get(calendar_id)
            .and_then(|cal| cal.get(event_id))
            .cloned())
    }

    fn save(&mut self, event: &mut Event) -> MeshResult<()> {
        if event.id.is_none() {
            event.id = Some(self.id_gen.new_id());
        }
        event.last_modified_date = Some(self.clock.now());

        self.events
            .entry(event.calendar_id.clone())
            .or_default()
            .insert(event.id.clone().unwrap(), event.clone());
        Ok(())
    }

    fn remove(&mut self, calendar_id: &str, event_id: &str) -> MeshResult<()> {
        let removed = self
            .events
            .get_mut(calendar_id)
            .and_then(|cal| cal.remove(event_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(MeshError::Backend(format!(
                "cannot remove unknown event {event_id} in calendar {calendar_id}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::idgen::SequentialIdGenerator;
    use chrono::TimeZone;

    fn backend() -> InMemoryBackend<FixedClock, SequentialIdGenerator> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap());
        InMemoryBackend::new(clock, SequentialIdGenerator::new("evt"))
    }

    #[test]
    fn save_assigns_id_on_first_save() {
        let mut backend = backend();
        backend.add_calendar("cal-a", "A");
        let mut event = backend.create_event("cal-a");
        event.title = "Lunch".into();
        backend.save(&mut event).unwrap();

        assert_eq!(event.id.as_deref(), Some("evt-0"));
        let fetched = backend.get_event("cal-a", "evt-0").unwrap().unwrap();
        assert_eq!(fetched.title, "Lunch");
    }

    #[test]
    fn remove_unknown_event_errors() {
        let mut backend = backend();
        backend.add_calendar("cal-a", "A");
        assert!(backend.remove("cal-a", "missing").is_err());
    }

    #[test]
    fn get_events_filters_by_window() {
        let mut backend = backend();
        backend.add_calendar("cal-a", "A");
        let in_window = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let out_of_window = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        backend.seed_event(Event {
            id: None,
            calendar_id: "cal-a".into(),
            title: "In".into(),
            start_date: in_window,
            end_date: in_window,
            is_all_day: false,
            location: None,
            url: None,
            notes: None,
            last_modified_date: None,
            attendees: vec![],
        });
        backend.seed_event(Event {
            id: None,
            calendar_id: "cal-a".into(),
            title: "Out".into(),
            start_date: out_of_window,
            end_date: out_of_window,
            is_all_day: false,
            location: None,
            url: None,
            notes: None,
            last_modified_date: None,
            attendees: vec![],
        });

        let window_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let events = backend
            .get_events(&["cal-a".to_string()], window_start, window_end)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "In");
    }
}
