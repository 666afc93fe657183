//! Resolves the `~/.calendarsync/` file layout.

use std::path::PathBuf;

use crate::error::{MeshError, MeshResult};

pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Resolve against the current user's home directory.
    pub fn discover() -> MeshResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| MeshError::Config("could not determine home directory".to_string()))?;
        Ok(Paths::rooted_at(home.join(".calendarsync")))
    }

    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Paths { root: root.into() }
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("calendar_state.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("sync.log")
    }

    /// Default root for the `.ics`-directory backend, when the CLI is not
    /// pointed at a different one.
    pub fn calendars_dir(&self) -> PathBuf {
        self.root.join("calendars")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_sibling_files_under_the_root() {
        let paths = Paths::rooted_at("/tmp/example-root");
        assert_eq!(paths.state_file(), PathBuf::from("/tmp/example-root/calendar_state.json"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/example-root/config.json"));
        assert_eq!(paths.backups_dir(), PathBuf::from("/tmp/example-root/backups"));
        assert_eq!(paths.log_file(), PathBuf::from("/tmp/example-root/sync.log"));
        assert_eq!(paths.calendars_dir(), PathBuf::from("/tmp/example-root/calendars"));
    }
}
