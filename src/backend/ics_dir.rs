//! Filesystem-backed `CalendarBackend`: one subdirectory per calendar,
//! one `.ics` file per event. This is what a real headless run uses by
//! default, since real platform calendar integration is out of scope.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use icalendar::parser::{read_calendar, unfold, Property};
use icalendar::{Component, DatePerhapsTime, EventLike, ValueType};

use crate::backend::CalendarBackend;
use crate::clock::Clock;
use crate::error::{MeshError, MeshResult};
use crate::event::{Attendee, Calendar, Event, ParticipationStatus};
use crate::idgen::IdGenerator;

pub struct IcsDirBackend<C: Clock, I: IdGenerator> {
    root: PathBuf,
    clock: C,
    id_gen: I,
}

impl<C: Clock, I: IdGenerator> IcsDirBackend<C, I> {
    pub fn new(root: impl Into<PathBuf>, clock: C, id_gen: I) -> Self {
        IcsDirBackend {
            root: root.into(),
            clock,
            id_gen,
        }
    }

    fn calendar_dir(&self, calendar_id: &str) -> PathBuf {
        self.root.join(calendar_id)
    }

    fn event_files(&self, calendar_id: &str) -> MeshResult<Vec<PathBuf>> {
        let dir = self.calendar_dir(calendar_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "ics") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn find_event_file(&self, calendar_id: &str, event_id: &str) -> MeshResult<Option<PathBuf>> {
        for path in self.event_files(calendar_id)? {
            let content = std::fs::read_to_string(&path)?;
            if let Some(event) = parse_event(&content, calendar_id) {
                if event.id.as_deref() == Some(event_id) {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }
}

impl<C: Clock, I: IdGenerator> CalendarBackend for IcsDirBackend<C, I> {
    fn list_calendars(&self) -> MeshResult<Vec<Calendar>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut calendars = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    calendars.push(Calendar {
                        id: name.to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }

    fn get_events(
        &self,
        calendars: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MeshResult<Vec<Event>> {
        let mut out = Vec::new();
        for calendar_id in calendars {
            for path in self.event_files(calendar_id)? {
                let content = std::fs::read_to_string(&path)?;
                if let Some(event) = parse_event(&content, calendar_id) {
                    if event.start_date >= start && event.start_date < end {
                        out.push(event);
                    }
                }
            }
        }
        Ok(out)
    }

    fn get_event(&self, calendar_id: &str, event_id: &str) -> MeshResult<Option<Event>> {
        match self.find_event_file(calendar_id, event_id)? {
            Some(path) => {
                let content = std::fs::read_to_string(&path)?;
                Ok(parse_event(&content, calendar_id))
            }
            None => Ok(None),
        }
    }

    fn save(&mut self, event: &mut Event) -> MeshResult<()> {
        let dir = self.calendar_dir(&event.calendar_id);
        std::fs::create_dir_all(&dir)?;

        let previous_path = match &event.id {
            Some(id) => self.find_event_file(&event.calendar_id, id)?,
            None => None,
        };
        if event.id.is_none() {
            event.id = Some(self.id_gen.new_id());
        }
        event.last_modified_date = Some(self.clock.now());

        let content = generate_event(event)?;
        let filename = filename_for(event, &dir)?;
        let new_path = dir.join(&filename);

        if let Some(old_path) = previous_path {
            if old_path != new_path {
                std::fs::remove_file(&old_path)?;
            }
        }
        std::fs::write(&new_path, content)?;
        Ok(())
    }

    fn remove(&mut self, calendar_id: &str, event_id: &str) -> MeshResult<()> {
        match self.find_event_file(calendar_id, event_id)? {
            Some(path) => {
                std::fs::remove_file(path)?;
                Ok(())
            }
            None => Err(MeshError::Backend(format!(
                "cannot remove unknown event {event_id} in calendar {calendar_id}"
            ))),
        }
    }
}

// =============================================================================
// Filename generation (collision-suffixed, deterministic from date + title)
// =============================================================================

fn filename_for(event: &Event, dir: &Path) -> MeshResult<String> {
    let base = base_filename(event);
    let stem = base.trim_end_matches(".ics");

    if !dir.join(&base).exists() {
        return Ok(base);
    }

    for n in 2..=100 {
        let suffixed = format!("{stem}-{n}.ics");
        if !dir.join(&suffixed).exists() {
            return Ok(suffixed);
        }
    }

    Err(MeshError::Backend(format!(
        "too many filename collisions for {base}"
    )))
}

fn base_filename(event: &Event) -> String {
    let date = event.start_date.format("%Y-%m-%dT%H%M").to_string();
    format!("{date}__{}.ics", slugify(&event.title))
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(50)
        .collect()
}

// =============================================================================
// ICS generation / parsing
// =============================================================================

fn generate_event(event: &Event) -> MeshResult<String> {
    let mut cal = icalendar::Calendar::new();
    let mut ics_event = icalendar::Event::new();

    ics_event.uid(event.id.as_deref().unwrap_or_default());
    ics_event.summary(&event.title);

    let dtstamp = event
        .last_modified_date
        .unwrap_or_else(Utc::now)
        .format("%Y%m%dT%H%M%SZ")
        .to_string();
    ics_event.add_property("DTSTAMP", &dtstamp);

    if let Some(modified) = event.last_modified_date {
        ics_event.add_property("LAST-MODIFIED", modified.format("%Y%m%dT%H%M%SZ").to_string());
    }

    add_datetime_property(&mut ics_event, "DTSTART", event.start_date, event.is_all_day);
    add_datetime_property(&mut ics_event, "DTEND", event.end_date, event.is_all_day);

    if let Some(ref location) = event.location {
        ics_event.location(location);
    }
    if let Some(ref url) = event.url {
        ics_event.add_property("URL", url);
    }
    if let Some(ref notes) = event.notes {
        ics_event.description(notes);
    }

    for attendee in &event.attendees {
        let mut prop = icalendar::Property::new("ATTENDEE", "mailto:unknown@calmesh.local");
        if let Some(ref name) = attendee.name {
            prop.add_parameter("CN", name);
        }
        prop.add_parameter("PARTSTAT", partstat_str(attendee.participation_status));
        ics_event.append_multi_property(prop);
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    Ok(cal.done().to_string())
}

fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, dt: DateTime<Utc>, is_date: bool) {
    if is_date {
        let mut prop = icalendar::Property::new(name, dt.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_property(prop);
    } else {
        ics_event.add_property(name, dt.format("%Y%m%dT%H%M%SZ").to_string());
    }
}

fn partstat_str(status: ParticipationStatus) -> &'static str {
    match status {
        ParticipationStatus::Accepted => "ACCEPTED",
        ParticipationStatus::Declined => "DECLINED",
        ParticipationStatus::Tentative => "TENTATIVE",
        ParticipationStatus::Pending => "NEEDS-ACTION",
        ParticipationStatus::Unknown => "NEEDS-ACTION",
    }
}

fn partstat_from_str(s: &str) -> ParticipationStatus {
    match s {
        "ACCEPTED" => ParticipationStatus::Accepted,
        "DECLINED" => ParticipationStatus::Declined,
        "TENTATIVE" => ParticipationStatus::Tentative,
        "NEEDS-ACTION" => ParticipationStatus::Pending,
        _ => ParticipationStatus::Unknown,
    }
}

fn parse_event(content: &str, calendar_id: &str) -> Option<Event> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let uid = vevent.find_prop("UID")?.val.to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_default();

    let (start_date, start_is_date) = to_datetime(vevent.find_prop("DTSTART")?)?;
    let (end_date, _) = to_datetime(vevent.find_prop("DTEND")?)?;

    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let url = vevent.find_prop("URL").map(|p| p.val.to_string());
    let notes = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());

    let last_modified_date = vevent
        .find_prop("LAST-MODIFIED")
        .and_then(|p| parse_utc_stamp(p.val.as_ref()));

    let attendees: Vec<Attendee> = vevent
        .properties
        .iter()
        .filter(|p| p.name.as_ref() == "ATTENDEE")
        .map(|p| {
            let name = p
                .params
                .iter()
                .find(|param| param.key == "CN")
                .and_then(|param| param.val.as_ref().map(|v| v.to_string()));
            let partstat = p
                .params
                .iter()
                .find(|param| param.key == "PARTSTAT")
                .and_then(|param| param.val.as_ref().map(|v| v.to_string()))
                .map(|v| partstat_from_str(&v))
                .unwrap_or(ParticipationStatus::Unknown);
            Attendee {
                name,
                participation_status: partstat,
            }
        })
        .collect();

    Some(Event {
        id: Some(uid),
        calendar_id: calendar_id.to_string(),
        title,
        start_date,
        end_date,
        is_all_day: start_is_date,
        location,
        url,
        notes,
        last_modified_date,
        attendees,
    })
}

fn to_datetime(prop: &Property) -> Option<(DateTime<Utc>, bool)> {
    let dpt = DatePerhapsTime::try_from(prop).ok()?;
    match dpt {
        DatePerhapsTime::Date(d) => Some((d.and_hms_opt(0, 0, 0)?.and_utc(), true)),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => Some((dt, false)),
            icalendar::CalendarDateTime::Floating(naive) => Some((naive.and_utc(), false)),
            icalendar::CalendarDateTime::WithTimezone { date_time, .. } => {
                Some((date_time.and_utc(), false))
            }
        },
    }
}

fn parse_utc_stamp(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim_end_matches('Z');
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::idgen::SequentialIdGenerator;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn backend(root: PathBuf) -> IcsDirBackend<FixedClock, SequentialIdGenerator> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap());
        IcsDirBackend::new(root, clock, SequentialIdGenerator::new("evt"))
    }

    fn sample_event() -> Event {
        Event {
            id: None,
            calendar_id: "a".into(),
            title: "Lunch".into(),
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
    fn save_then_read_back_round_trips_core_fields() {
        let dir = tempdir().unwrap();
        let mut backend = backend(dir.path().to_path_buf());

        let mut event = sample_event();
        backend.save(&mut event).unwrap();
        let id = event.id.clone().unwrap();

        let fetched = backend.get_event("a", &id).unwrap().unwrap();
        assert_eq!(fetched.title, "Lunch");
        assert_eq!(fetched.start_date, event.start_date);
        assert_eq!(fetched.end_date, event.end_date);
        assert!(!fetched.is_all_day);
    }

    #[test]
    fn get_events_returns_saved_event_within_window() {
        let dir = tempdir().unwrap();
        let mut backend = backend(dir.path().to_path_buf());
        let mut event = sample_event();
        backend.save(&mut event).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let events = backend.get_events(&["a".to_string()], start, end).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempdir().unwrap();
        let mut backend = backend(dir.path().to_path_buf());
        let mut event = sample_event();
        backend.save(&mut event).unwrap();
        let id = event.id.clone().unwrap();

        backend.remove("a", &id).unwrap();
        assert!(backend.get_event("a", &id).unwrap().is_none());
    }
}
