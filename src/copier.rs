//! Event Field Copier: deterministic projection of a Source event's
//! observable fields, plus a "Sync Metadata" block, onto a target event.

use crate::event::Event;

const METADATA_HEADER: &str = "--- Sync Metadata ---";

/// Overwrite `target`'s copyable fields from `source`. Fields the backend
/// would silently drop (attendees, recurrence, ...) are never copied onto
/// the target event itself — they only ever appear, summarized, in the
/// generated "Participants" list inside `notes`.
///
/// Pure function of `source` and `source_calendar_name`: applying it twice
/// in a row produces byte-identical `notes`, since the metadata block is
/// always rebuilt from `source`, never appended to the target's current
/// notes.
pub fn copy_fields(source: &Event, source_calendar_name: &str, target: &mut Event) {
    target.title = source.title.clone();
    target.start_date = source.start_date;
    target.end_date = source.end_date;
    target.is_all_day = source.is_all_day;
    target.location = source.location.clone();
    target.url = source.url.clone();
    target.notes = Some(compose_notes(source, source_calendar_name));
}

fn compose_notes(source: &Event, source_calendar_name: &str) -> String {
    let source_notes = source.notes.as_deref().unwrap_or("");

    let mut metadata = format!("{METADATA_HEADER}\nSource: {source_calendar_name}");
    if !source.attendees.is_empty() {
        metadata.push_str("\nParticipants:\n");
        let lines: Vec<String> = source
            .attendees
            .iter()
            .map(|a| {
                let name = a.name.as_deref().unwrap_or("Unknown");
                format!("- {} ({})", name, a.participation_status.label())
            })
            .collect();
        metadata.push_str(&lines.join("\n"));
    }

    format!("{source_notes}\n\n\n{metadata}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attendee, ParticipationStatus};
    use chrono::{TimeZone, Utc};

    fn source_event(title: &str) -> Event {
        Event {
            id: Some("src-1".into()),
            calendar_id: "A".into(),
            title: title.to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 1, 15, 13, 0, 0).unwrap(),
            is_all_day: false,
            location: Some("Cafe".into()),
            url: None,
            notes: None,
            last_modified_date: None,
            attendees: vec![],
        }
    }

    fn target_event() -> Event {
        Event {
            id: Some("tgt-1".into()),
            calendar_id: "B".into(),
            title: String::new(),
            start_date: Utc::now(),
            end_date: Utc::now(),
            is_all_day: false,
            location: None,
            url: None,
            notes: None,
            last_modified_date: None,
            attendees: vec![],
        }
    }

    #[test]
    fn notes_end_with_metadata_header_and_source_when_no_attendees() {
        let source = source_event("Lunch");
        let mut target = target_event();
        copy_fields(&source, "A", &mut target);

        let notes = target.notes.unwrap();
        assert!(notes.ends_with("--- Sync Metadata ---\nSource: A"));
        assert_eq!(target.title, "Lunch");
        assert_eq!(target.location.as_deref(), Some("Cafe"));
    }

    #[test]
    fn notes_include_participants_when_attendees_present() {
        let mut source = source_event("Standup");
        source.attendees = vec![Attendee {
            name: Some("Ada".into()),
            participation_status: ParticipationStatus::Accepted,
        }];
        let mut target = target_event();
        copy_fields(&source, "A", &mut target);

        let notes = target.notes.unwrap();
        assert!(notes.contains("Participants:\n- Ada (Accepted)"));
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let source = source_event("Lunch");
        let mut target = target_event();
        copy_fields(&source, "A", &mut target);
        let first = target.notes.clone();
        copy_fields(&source, "A", &mut target);
        assert_eq!(target.notes, first);
    }

    #[test]
    fn attendees_are_never_copied_onto_target() {
        let mut source = source_event("Standup");
        source.attendees = vec![Attendee {
            name: Some("Ada".into()),
            participation_status: ParticipationStatus::Accepted,
        }];
        let mut target = target_event();
        copy_fields(&source, "A", &mut target);
        assert!(target.attendees.is_empty());
    }
}
