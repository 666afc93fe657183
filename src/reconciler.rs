//! Core reconciliation algorithm: collect live events, classify and
//! propagate changes from each group's Source, heal deletions, prune old
//! state, and persist.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Months, Utc};
use serde_json::json;

use crate::audit_log::AuditLog;
use crate::backend::CalendarBackend;
use crate::clock::Clock;
use crate::copier;
use crate::error::MeshResult;
use crate::event::Event;
use crate::idgen::IdGenerator;
use crate::state::{EventRef, MeshState};

const FUZZY_WINDOW_DAYS: i64 = 1;
const FUZZY_TOLERANCE_SECONDS: i64 = 300;

/// A `(calendarId, eventId)` pair, used throughout this module to track
/// what the current run actually saw alive.
type EventKey = (String, String);

pub struct Reconciler<B, C, I> {
    backend: B,
    clock: C,
    id_gen: I,
    audit: AuditLog,
}

impl<B: CalendarBackend, C: Clock, I: IdGenerator> Reconciler<B, C, I> {
    pub fn new(backend: B, clock: C, id_gen: I, audit: AuditLog) -> Self {
        Reconciler {
            backend,
            clock,
            id_gen,
            audit,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one reconciliation pass over `calendars`, starting from `state`,
    /// and return the updated state. Does not persist anything itself —
    /// callers own the `MeshStateStore`.
    pub fn run(&mut self, calendars: &[String], mut state: MeshState) -> MeshResult<MeshState> {
        let now = self.clock.now();
        let window_start = now
            .checked_sub_months(Months::new(1))
            .unwrap_or(now);
        let window_end = now
            .checked_add_months(Months::new(12))
            .unwrap_or(now);

        tracing::info!(?calendars, %window_start, %window_end, "reconciliation run starting");
        self.audit.append(now, "INFO", "run_start", json!({ "calendars": calendars }))?;

        let calendar_names: HashMap<String, String> = self
            .backend
            .list_calendars()?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let live = self.backend.get_events(calendars, window_start, window_end)?;
        let mut live_ids: HashSet<EventKey> = live
            .iter()
            .filter_map(|e| e.id.clone().map(|id| (e.calendar_id.clone(), id)))
            .collect();

        for event in &live {
            self.classify_and_propagate(calendars, &calendar_names, &mut state, event, &mut live_ids)?;
        }

        self.detect_and_handle_deletions(calendars, &calendar_names, &mut state, &live_ids)?;

        let horizon = window_start;
        state.prune(horizon);
        self.audit.prune(horizon)?;

        tracing::info!("reconciliation run finished");
        self.audit.append(self.clock.now(), "INFO", "run_end", json!({}))?;
        Ok(state)
    }

    fn last_modified_of(&self, event: &Event) -> DateTime<Utc> {
        event.last_modified_date.unwrap_or_else(|| self.clock.now())
    }

    fn classify_and_propagate(
        &mut self,
        calendars: &[String],
        calendar_names: &HashMap<String, String>,
        state: &mut MeshState,
        event: &Event,
        live_ids: &mut HashSet<EventKey>,
    ) -> MeshResult<()> {
        let event_id = event.id.clone().expect("live events always carry an id");
        let event_last_modified = self.last_modified_of(event);

        let existing = state
            .find_by_event_id(&event.calendar_id, &event_id)
            .map(|(group, reference)| (group.id.clone(), group.is_sourceless(), group.is_source(&event.calendar_id, &event_id), reference.last_modified));

        match existing {
            None => {
                let group_id = self.id_gen.new_id();
                state.upsert_reference(&event.calendar_id, &event_id, event_last_modified, Some(event.start_date), &group_id);
                state.set_source(&group_id, &event.calendar_id, &event_id);
                self.audit.append(
                    self.clock.now(),
                    "INFO",
                    "new_group",
                    json!({ "groupId": group_id, "calendarId": event.calendar_id, "eventId": event_id }),
                )?;
                self.propagate_new(calendars, calendar_names, state, event, &group_id, live_ids)?;
            }
            Some((group_id, sourceless, is_source, ref_last_modified)) => {
                if event_last_modified <= ref_last_modified {
                    return Ok(());
                }
                if is_source || sourceless {
                    if sourceless {
                        tracing::warn!(group_id = %group_id, "propagating from a sourceless group");
                        self.audit.append(
                            self.clock.now(),
                            "WARN",
                            "sourceless_propagate",
                            json!({ "groupId": group_id, "calendarId": event.calendar_id, "eventId": event_id }),
                        )?;
                    }
                    self.propagate_update(calendars, calendar_names, state, event, &group_id)?;
                }
                state.upsert_reference(&event.calendar_id, &event_id, event_last_modified, Some(event.start_date), &group_id);
            }
        }
        Ok(())
    }

    fn propagate_new(
        &mut self,
        calendars: &[String],
        calendar_names: &HashMap<String, String>,
        state: &mut MeshState,
        source: &Event,
        group_id: &str,
        live_ids: &mut HashSet<EventKey>,
    ) -> MeshResult<()> {
        let source_name = calendar_names
            .get(&source.calendar_id)
            .map(String::as_str)
            .unwrap_or(&source.calendar_id);

        for calendar_id in calendars.iter().filter(|c| **c != source.calendar_id) {
            if let Some(matched) = self.fuzzy_match(calendar_id, source.trimmed_title(), source.start_date)? {
                let matched_id = matched.id.clone().expect("backend events carry an id");
                state.upsert_reference(
                    calendar_id,
                    &matched_id,
                    self.last_modified_of(&matched),
                    Some(matched.start_date),
                    group_id,
                );
                live_ids.insert((calendar_id.clone(), matched_id.clone()));
                self.audit.append(
                    self.clock.now(),
                    "INFO",
                    "adopt",
                    json!({ "groupId": group_id, "calendarId": calendar_id, "eventId": matched_id }),
                )?;
                continue;
            }

            let mut target = self.backend.create_event(calendar_id);
            copier::copy_fields(source, source_name, &mut target);
            if let Err(err) = self.backend.save(&mut target) {
                tracing::error!(calendar_id = %calendar_id, error = %err, "failed to create copy, will retry next run");
                self.audit.append(
                    self.clock.now(),
                    "ERROR",
                    "create_failed",
                    json!({ "groupId": group_id, "calendarId": calendar_id, "error": err.to_string() }),
                )?;
                continue;
            }
            let new_id = target.id.clone().expect("save assigns an id");
            state.upsert_reference(calendar_id, &new_id, self.last_modified_of(&target), Some(target.start_date), group_id);
            live_ids.insert((calendar_id.clone(), new_id.clone()));
            self.audit.append(
                self.clock.now(),
                "INFO",
                "create",
                json!({ "groupId": group_id, "calendarId": calendar_id, "eventId": new_id }),
            )?;
        }
        Ok(())
    }

    fn propagate_update(
        &mut self,
        _calendars: &[String],
        calendar_names: &HashMap<String, String>,
        state: &mut MeshState,
        source: &Event,
        group_id: &str,
    ) -> MeshResult<()> {
        let source_name = calendar_names
            .get(&source.calendar_id)
            .map(String::as_str)
            .unwrap_or(&source.calendar_id);

        let group = state.group(group_id).expect("caller just located this group").clone();
        let targets: Vec<EventRef> = group
            .references
            .iter()
            .filter(|r| !r.is_deleted && !group.is_source(&r.calendar_id, &r.event_id))
            .cloned()
            .collect();

        for reference in targets {
            match self.backend.get_event(&reference.calendar_id, &reference.event_id)? {
                None => {
                    tracing::warn!(calendar_id = %reference.calendar_id, event_id = %reference.event_id, "copy missing during propagation, deferring to deletion pass");
                }
                Some(mut target) => {
                    copier::copy_fields(source, source_name, &mut target);
                    if let Err(err) = self.backend.save(&mut target) {
                        tracing::error!(calendar_id = %reference.calendar_id, event_id = %reference.event_id, error = %err, "failed to push update, will retry next run");
                        self.audit.append(
                            self.clock.now(),
                            "ERROR",
                            "update_failed",
                            json!({ "groupId": group_id, "calendarId": reference.calendar_id, "eventId": reference.event_id, "error": err.to_string() }),
                        )?;
                        continue;
                    }
                    state.upsert_reference(
                        &reference.calendar_id,
                        &reference.event_id,
                        self.last_modified_of(&target),
                        Some(target.start_date),
                        group_id,
                    );
                    self.audit.append(
                        self.clock.now(),
                        "INFO",
                        "update",
                        json!({ "groupId": group_id, "calendarId": reference.calendar_id, "eventId": reference.event_id }),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn detect_and_handle_deletions(
        &mut self,
        calendars: &[String],
        calendar_names: &HashMap<String, String>,
        state: &mut MeshState,
        live_ids: &HashSet<EventKey>,
    ) -> MeshResult<()> {
        let affected_group_ids: Vec<String> = state
            .groups
            .iter()
            .filter(|g| {
                g.references
                    .iter()
                    .any(|r| !r.is_deleted && !live_ids.contains(&(r.calendar_id.clone(), r.event_id.clone())))
            })
            .map(|g| g.id.clone())
            .collect();

        for group_id in affected_group_ids {
            if state.group(&group_id).is_some() {
                self.handle_missing(calendars, calendar_names, state, live_ids, &group_id)?;
            }
        }
        Ok(())
    }

    fn handle_missing(
        &mut self,
        calendars: &[String],
        calendar_names: &HashMap<String, String>,
        state: &mut MeshState,
        live_ids: &HashSet<EventKey>,
        group_id: &str,
    ) -> MeshResult<()> {
        let group = match state.group(group_id) {
            Some(g) => g.clone(),
            None => return Ok(()),
        };

        let mut valid_refs: Vec<EventRef> = Vec::new();
        let mut missing_refs: Vec<EventRef> = Vec::new();
        for reference in group.references.iter().filter(|r| !r.is_deleted) {
            if !calendars.contains(&reference.calendar_id) {
                state.tombstone(&reference.calendar_id, &reference.event_id);
                continue;
            }
            if live_ids.contains(&(reference.calendar_id.clone(), reference.event_id.clone())) {
                valid_refs.push(reference.clone());
            } else {
                missing_refs.push(reference.clone());
            }
        }
        if missing_refs.is_empty() {
            return Ok(());
        }

        if valid_refs.is_empty() {
            for reference in &missing_refs {
                state.tombstone(&reference.calendar_id, &reference.event_id);
            }
            self.audit.append(
                self.clock.now(),
                "INFO",
                "tombstone_group",
                json!({ "groupId": group_id }),
            )?;
            return Ok(());
        }

        let anchor = &valid_refs[0];
        let anchor_event = match self.backend.get_event(&anchor.calendar_id, &anchor.event_id)? {
            Some(e) => e,
            None => return Ok(()),
        };

        let source_missing = match (&group.source_calendar_id, &group.source_event_id) {
            (Some(cal), Some(id)) => {
                !group.references.iter().any(|r| &r.calendar_id == cal && &r.event_id == id)
                    || missing_refs.iter().any(|m| &m.calendar_id == cal && &m.event_id == id)
            }
            _ => true,
        };

        for reference in missing_refs {
            let is_source_slot = group.source_calendar_id.as_deref() == Some(&reference.calendar_id)
                && group.source_event_id.as_deref() == Some(&reference.event_id);

            let matched = self.fuzzy_match(&reference.calendar_id, anchor_event.trimmed_title(), anchor_event.start_date)?;
            match matched {
                Some(candidate) => {
                    let candidate_id = candidate.id.clone().expect("backend events carry an id");
                    match state.find_by_event_id(&reference.calendar_id, &candidate_id) {
                        Some((other_group, _)) if other_group.id != group_id => {
                            let other_group_id = other_group.id.clone();
                            state.merge_groups(&other_group_id, group_id);
                            state.tombstone(&reference.calendar_id, &reference.event_id);
                            self.audit.append(
                                self.clock.now(),
                                "INFO",
                                "merge",
                                json!({ "groupId": group_id, "mergedFrom": other_group_id }),
                            )?;
                        }
                        _ => {
                            state.upsert_reference(
                                &reference.calendar_id,
                                &candidate_id,
                                self.last_modified_of(&candidate),
                                Some(candidate.start_date),
                                group_id,
                            );
                            state.tombstone(&reference.calendar_id, &reference.event_id);
                            if is_source_slot {
                                state.set_source(group_id, &reference.calendar_id, &candidate_id);
                            }
                            self.audit.append(
                                self.clock.now(),
                                "INFO",
                                "adopt",
                                json!({ "groupId": group_id, "calendarId": reference.calendar_id, "eventId": candidate_id }),
                            )?;
                        }
                    }
                    continue;
                }
                None => {}
            }

            if !source_missing {
                let source_ref = group.source_ref().expect("source_missing is false only when the source reference exists");
                let Some(source_event) = self.backend.get_event(&source_ref.calendar_id, &source_ref.event_id)? else {
                    continue;
                };
                let source_name = calendar_names
                    .get(&source_ref.calendar_id)
                    .map(String::as_str)
                    .unwrap_or(&source_ref.calendar_id);

                let mut target = self.backend.create_event(&reference.calendar_id);
                copier::copy_fields(&source_event, source_name, &mut target);
                if let Err(err) = self.backend.save(&mut target) {
                    tracing::error!(calendar_id = %reference.calendar_id, event_id = %reference.event_id, error = %err, "failed to resurrect copy, will retry next run");
                    self.audit.append(
                        self.clock.now(),
                        "ERROR",
                        "resurrect_failed",
                        json!({ "groupId": group_id, "calendarId": reference.calendar_id, "eventId": reference.event_id, "error": err.to_string() }),
                    )?;
                    continue;
                }
                let new_id = target.id.clone().expect("save assigns an id");
                state.upsert_reference(
                    &reference.calendar_id,
                    &new_id,
                    self.last_modified_of(&target),
                    Some(target.start_date),
                    group_id,
                );
                state.tombstone(&reference.calendar_id, &reference.event_id);
                self.audit.append(
                    self.clock.now(),
                    "INFO",
                    "resurrect",
                    json!({ "groupId": group_id, "calendarId": reference.calendar_id, "eventId": new_id }),
                )?;
            } else {
                state.tombstone(&reference.calendar_id, &reference.event_id);
                for valid in &valid_refs {
                    if let Err(err) = self.backend.remove(&valid.calendar_id, &valid.event_id) {
                        tracing::error!(calendar_id = %valid.calendar_id, event_id = %valid.event_id, error = %err, "failed to remove event during group teardown");
                    }
                    state.tombstone(&valid.calendar_id, &valid.event_id);
                }
                self.audit.append(
                    self.clock.now(),
                    "INFO",
                    "teardown",
                    json!({ "groupId": group_id }),
                )?;
                return Ok(());
            }
        }
        Ok(())
    }

    fn fuzzy_match(&self, calendar_id: &str, title: &str, anchor_start: DateTime<Utc>) -> MeshResult<Option<Event>> {
        let window_start = anchor_start - Duration::days(FUZZY_WINDOW_DAYS);
        let window_end = anchor_start + Duration::days(FUZZY_WINDOW_DAYS) + Duration::seconds(1);
        let candidates = self.backend.get_events(&[calendar_id.to_string()], window_start, window_end)?;
        Ok(candidates.into_iter().find(|e| {
            e.trimmed_title() == title && (e.start_date - anchor_start).num_seconds().abs() <= FUZZY_TOLERANCE_SECONDS
        }))
    }
}
