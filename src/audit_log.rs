//! `~/.calendarsync/sync.log`: a JSON-lines record of notable reconciler
//! actions, independent of the human-readable `tracing` diagnostic stream.
//!
//! This has a contractual on-disk shape (callers rely on `timestamp` being
//! lexicographically sortable for pruning), so it is hand-written rather
//! than routed through a generic logging sink.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::MeshResult;

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLog { path: path.into() }
    }

    /// Append one line. `details` is merged into the record alongside
    /// `timestamp`, `level`, and `action`; pass `json!({})` for none.
    pub fn append(&self, timestamp: DateTime<Utc>, level: &str, action: &str, details: Value) -> MeshResult<()> {
        let mut record = json!({
            "timestamp": timestamp.to_rfc3339(),
            "level": level,
            "action": action,
        });
        if let (Value::Object(record), Value::Object(details)) = (&mut record, details) {
            record.extend(details);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{record}")?;
        Ok(())
    }

    /// Drop every line whose `timestamp` sorts lexicographically before
    /// `horizon`'s RFC 3339 representation. Malformed lines are dropped too.
    pub fn prune(&self, horizon: DateTime<Utc>) -> MeshResult<()> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let horizon = horizon.to_rfc3339();

        let kept: Vec<&str> = raw
            .lines()
            .filter(|line| {
                serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|v| v.get("timestamp").and_then(Value::as_str).map(str::to_string))
                    .is_some_and(|ts| ts.as_str() >= horizon.as_str())
            })
            .collect();

        let mut content = kept.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        write_atomic(&self.path, &content)
    }
}

fn write_atomic(path: &Path, content: &str) -> MeshResult<()> {
    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn append_writes_one_json_line_with_merged_details() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("sync.log"));
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        log.append(ts, "INFO", "create", json!({ "calendarId": "B", "eventId": "e1" }))
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("sync.log")).unwrap();
        let record: Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(record["action"], "create");
        assert_eq!(record["calendarId"], "B");
    }

    #[test]
    fn prune_drops_lines_before_horizon() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("sync.log"));
        let before = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        log.append(before, "INFO", "create", json!({})).unwrap();
        log.append(after, "INFO", "update", json!({})).unwrap();

        log.prune(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("sync.log")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"action\":\"update\""));
    }
}
