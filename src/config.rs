//! `~/.calendarsync/config.json`: the set of calendars the operator selected
//! to participate in the mesh.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MeshResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "selectedCalendarIds")]
    pub selected_calendar_ids: Vec<String>,
}

impl Config {
    pub fn new(selected_calendar_ids: Vec<String>) -> Self {
        Config { selected_calendar_ids }
    }

    pub fn load(path: &Path) -> MeshResult<Option<Config>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, path: &Path) -> MeshResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let loaded = Config::load(&dir.path().join("config.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load_preserves_order_and_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config::new(vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap().unwrap();
        assert_eq!(loaded.selected_calendar_ids, vec!["A", "B", "C"]);
    }
}
