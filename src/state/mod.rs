//! Mesh state: the durable record of which events across which calendars
//! belong together, and which one of each group is the Source.
//!
//! This module holds the pure, in-memory data model and its query/mutation
//! operations. Persistence (load/save, corruption recovery, atomic backup)
//! lives in [`crate::state::store`].

pub mod epoch_seconds;
pub mod store;

pub use store::MeshStateStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single calendar+event pointer tracked by the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    #[serde(rename = "calendarId")]
    pub calendar_id: String,
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "lastModified", with = "epoch_seconds::required")]
    pub last_modified: DateTime<Utc>,
    #[serde(rename = "startDate", with = "epoch_seconds::optional", default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
}

/// A maximal set of references representing one logical event across the
/// mesh, with at most one of them designated the Source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncGroup {
    pub id: String,
    #[serde(rename = "sourceCalendarId")]
    pub source_calendar_id: Option<String>,
    #[serde(rename = "sourceEventId")]
    pub source_event_id: Option<String>,
    #[serde(rename = "events")]
    pub references: Vec<EventRef>,
}

impl SyncGroup {
    fn empty(id: impl Into<String>) -> Self {
        SyncGroup {
            id: id.into(),
            source_calendar_id: None,
            source_event_id: None,
            references: Vec::new(),
        }
    }

    /// A group with no Source pointer set, either transiently during
    /// construction or because the state file was externally tampered
    /// with.
    pub fn is_sourceless(&self) -> bool {
        self.source_calendar_id.is_none()
    }

    pub fn is_source(&self, calendar_id: &str, event_id: &str) -> bool {
        self.source_calendar_id.as_deref() == Some(calendar_id)
            && self.source_event_id.as_deref() == Some(event_id)
    }

    pub fn source_ref(&self) -> Option<&EventRef> {
        let cal = self.source_calendar_id.as_deref()?;
        let evt = self.source_event_id.as_deref()?;
        self.references
            .iter()
            .find(|r| r.calendar_id == cal && r.event_id == evt)
    }

    /// True when the group's Source reference is present and not tombstoned.
    pub fn source_alive(&self) -> bool {
        self.source_ref().is_some_and(|r| !r.is_deleted)
    }

    pub fn reference(&self, calendar_id: &str, event_id: &str) -> Option<&EventRef> {
        self.references
            .iter()
            .find(|r| r.calendar_id == calendar_id && r.event_id == event_id)
    }

    fn reference_mut(&mut self, calendar_id: &str, event_id: &str) -> Option<&mut EventRef> {
        self.references
            .iter_mut()
            .find(|r| r.calendar_id == calendar_id && r.event_id == event_id)
    }
}

/// The full durable mesh: an ordered collection of Sync Groups.
///
/// Behavior never depends on the order of `groups` or of a group's
/// `references` (invariant 5 in the specification); order is preserved
/// only to keep diffs of the serialized file small between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshState {
    pub groups: Vec<SyncGroup>,
}

impl MeshState {
    pub fn empty() -> Self {
        MeshState { groups: Vec::new() }
    }

    /// Find the group and reference for a `(calendarId, eventId)` pair,
    /// regardless of tombstone status.
    pub fn find_by_event_id(&self, calendar_id: &str, event_id: &str) -> Option<(&SyncGroup, &EventRef)> {
        self.groups.iter().find_map(|g| {
            g.reference(calendar_id, event_id).map(|r| (g, r))
        })
    }

    fn group_index_containing(&self, calendar_id: &str, event_id: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.reference(calendar_id, event_id).is_some())
    }

    fn group_index_by_id(&self, group_id: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.id == group_id)
    }

    /// Insert a new, sourceless, empty group with the given id if one does
    /// not already exist. Returns its index.
    fn ensure_group(&mut self, group_id: &str) -> usize {
        match self.group_index_by_id(group_id) {
            Some(idx) => idx,
            None => {
                self.groups.push(SyncGroup::empty(group_id));
                self.groups.len() - 1
            }
        }
    }

    /// If `(calendarId, eventId)` exists anywhere, update its timestamps and
    /// clear any tombstone (resurrect it in place, in whichever group it was
    /// already in). Otherwise append a new reference, either to the named
    /// group (creating it if absent) or — since callers always pass a group
    /// id — to that freshly created group.
    pub fn upsert_reference(
        &mut self,
        calendar_id: &str,
        event_id: &str,
        last_modified: DateTime<Utc>,
        start_date: Option<DateTime<Utc>>,
        group_id: &str,
    ) {
        if let Some(idx) = self.group_index_containing(calendar_id, event_id) {
            let group = &mut self.groups[idx];
            let reference = group
                .reference_mut(calendar_id, event_id)
                .expect("index was just located by this same predicate");
            reference.last_modified = last_modified;
            reference.start_date = start_date;
            reference.is_deleted = false;
            return;
        }

        let idx = self.ensure_group(group_id);
        self.groups[idx].references.push(EventRef {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
            last_modified,
            start_date,
            is_deleted: false,
        });
    }

    pub fn tombstone(&mut self, calendar_id: &str, event_id: &str) {
        if let Some(idx) = self.group_index_containing(calendar_id, event_id) {
            if let Some(reference) = self.groups[idx].reference_mut(calendar_id, event_id) {
                reference.is_deleted = true;
            }
        }
    }

    pub fn set_source(&mut self, group_id: &str, calendar_id: &str, event_id: &str) {
        let idx = self.ensure_group(group_id);
        let group = &mut self.groups[idx];
        group.source_calendar_id = Some(calendar_id.to_string());
        group.source_event_id = Some(event_id.to_string());
    }

    /// Concatenate `loser_id`'s references into `winner_id`, then drop the
    /// loser. The winner's Source pointer is retained; the loser's is
    /// discarded. A no-op if either id is unknown or they're the same group.
    pub fn merge_groups(&mut self, loser_id: &str, winner_id: &str) {
        if loser_id == winner_id {
            return;
        }
        let Some(loser_idx) = self.group_index_by_id(loser_id) else {
            return;
        };
        let Some(winner_idx) = self.group_index_by_id(winner_id) else {
            return;
        };

        let loser = self.groups.remove(loser_idx);
        let winner_idx = if loser_idx < winner_idx {
            winner_idx - 1
        } else {
            winner_idx
        };
        self.groups[winner_idx].references.extend(loser.references);
    }

    /// Every non-deleted reference whose calendar is in `calendar_ids`.
    pub fn all_references(&self, calendar_ids: &[String]) -> Vec<&EventRef> {
        self.groups
            .iter()
            .flat_map(|g| &g.references)
            .filter(|r| !r.is_deleted && calendar_ids.iter().any(|c| c == &r.calendar_id))
            .collect()
    }

    pub fn group(&self, group_id: &str) -> Option<&SyncGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Drop references whose `start_date` is strictly before `horizon`
    /// (references with no recorded `start_date` are never pruned — there
    /// is nothing to measure their age against). Groups left with no
    /// references afterward are removed entirely.
    pub fn prune(&mut self, horizon: DateTime<Utc>) {
        for group in &mut self.groups {
            group
                .references
                .retain(|r| r.start_date.is_none_or(|sd| sd >= horizon));
        }
        self.groups.retain(|g| !g.references.is_empty());
    }
}
