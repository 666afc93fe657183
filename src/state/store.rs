//! Load and save the mesh state file.

use std::path::{Path, PathBuf};

use crate::clock::Clock;
use crate::error::MeshResult;
use crate::state::MeshState;

/// Reads and writes `calendar_state.json`, handling corruption and keeping
/// a rolling backup before every write.
pub struct MeshStateStore<C: Clock> {
    state_path: PathBuf,
    backups_dir: PathBuf,
    clock: C,
}

impl<C: Clock> MeshStateStore<C> {
    pub fn new(state_path: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>, clock: C) -> Self {
        MeshStateStore {
            state_path: state_path.into(),
            backups_dir: backups_dir.into(),
            clock,
        }
    }

    /// Load the state file. A missing file is treated as an empty mesh (first
    /// run). A file that fails to parse is renamed aside to
    /// `calendar_state.json.corrupt.<epoch>` and treated as empty, rather
    /// than aborting the run.
    pub fn load(&self) -> MeshResult<MeshState> {
        let raw = match std::fs::read_to_string(&self.state_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(MeshState::empty()),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_str::<MeshState>(&raw) {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(
                    path = %self.state_path.display(),
                    error = %err,
                    "mesh state file is corrupt, quarantining and starting fresh"
                );
                self.quarantine_corrupt_file()?;
                Ok(MeshState::empty())
            }
        }
    }

    fn quarantine_corrupt_file(&self) -> MeshResult<()> {
        let epoch = self.clock.now().timestamp();
        let mut quarantined = self.state_path.clone().into_os_string();
        quarantined.push(format!(".corrupt.{epoch}"));
        std::fs::rename(&self.state_path, Path::new(&quarantined))?;
        Ok(())
    }

    /// Back up the current file (if any) into `backups_dir`, then atomically
    /// replace it with `state` via a temp file plus rename.
    pub fn save(&self, state: &MeshState) -> MeshResult<()> {
        self.backup_existing()?;

        let json = serde_json::to_string_pretty(state)?;
        let mut temp = self.state_path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &self.state_path)?;
        Ok(())
    }

    fn backup_existing(&self) -> MeshResult<()> {
        if !self.state_path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.backups_dir)?;
        let epoch = self.clock.now().timestamp();
        let backup_path = self.backups_dir.join(format!("state_backup_{epoch}.json"));
        std::fs::copy(&self.state_path, &backup_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn store(dir: &Path) -> MeshStateStore<FixedClock> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap());
        MeshStateStore::new(dir.join("calendar_state.json"), dir.join("backups"), clock)
    }

    #[test]
    fn load_missing_file_returns_empty_state() {
        let dir = tempdir().unwrap();
        let state = store(dir.path()).load().unwrap();
        assert!(state.groups.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let mut state = MeshState::empty();
        state.upsert_reference(
            "A",
            "e1",
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()),
            "g1",
        );
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_writes_a_backup_of_the_previous_file() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store.save(&MeshState::empty()).unwrap();
        let mut second = MeshState::empty();
        second.set_source("g1", "A", "e1");
        store.save(&second).unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups")).unwrap().collect();
        assert_eq!(backups.len(), 1);
        let name = backups[0].as_ref().unwrap().file_name();
        assert_eq!(name, std::ffi::OsString::from("state_backup_1736942400.json"));
    }

    #[test]
    fn load_quarantines_corrupt_file_and_returns_empty() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("calendar_state.json");
        std::fs::write(&state_path, "{ this is not json").unwrap();

        let state = store(dir.path()).load().unwrap();
        assert!(state.groups.is_empty());

        let quarantined = dir.path().join("calendar_state.json.corrupt.1736942400");
        assert!(quarantined.exists());
    }
}
