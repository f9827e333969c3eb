use std::fs;

use serde::{Deserialize, Serialize};

use crate::io::atomic::atomic_write;
use crate::io::project_io::{ProjectError, ProjectPaths};
use crate::ops::undo::HistorySnapshot;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct HistoryFile {
    version: u32,
    #[serde(flatten)]
    snapshot: HistorySnapshot,
}

/// Load the persisted undo/redo stacks. A missing file is an empty history;
/// a file from a newer format is ignored with a warning rather than
/// blocking every command.
pub fn load_history(paths: &ProjectPaths) -> Result<HistorySnapshot, ProjectError> {
    let path = paths.history();
    if !path.exists() {
        return Ok(HistorySnapshot::default());
    }
    let text = fs::read_to_string(&path).map_err(|e| ProjectError::ReadError {
        path: path.clone(),
        source: e,
    })?;
    let file: HistoryFile = serde_json::from_str(&text)?;
    if file.version > FORMAT_VERSION {
        tracing::warn!(version = file.version, "history written by a newer version, starting empty");
        return Ok(HistorySnapshot::default());
    }
    Ok(file.snapshot)
}

pub fn save_history(paths: &ProjectPaths, snapshot: HistorySnapshot) -> Result<(), ProjectError> {
    let file = HistoryFile {
        version: FORMAT_VERSION,
        snapshot,
    };
    let mut content = serde_json::to_string_pretty(&file)?;
    content.push('\n');
    atomic_write(&paths.history(), content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::Task;
    use crate::ops::undo::Operation;
    use chrono::Utc;
    use tempfile::TempDir;

    fn project() -> (TempDir, ProjectPaths) {
        let tmp = TempDir::new().unwrap();
        let paths = ProjectPaths::new(tmp.path());
        fs::create_dir_all(&paths.dir).unwrap();
        (tmp, paths)
    }

    #[test]
    fn missing_file_is_empty_history() {
        let (_tmp, paths) = project();
        assert_eq!(load_history(&paths).unwrap(), HistorySnapshot::default());
    }

    #[test]
    fn saved_history_loads_back() {
        let (_tmp, paths) = project();
        let snapshot = HistorySnapshot {
            undo: vec![Operation::Add {
                task: Task::new("a", "Write tests", Utc::now()),
            }],
            redo: vec![],
        };
        save_history(&paths, snapshot.clone()).unwrap();
        assert_eq!(load_history(&paths).unwrap(), snapshot);

        let raw = fs::read_to_string(paths.history()).unwrap();
        assert!(raw.contains("\"version\": 1"));
        assert!(raw.contains("\"kind\": \"add\""));
    }

    #[test]
    fn newer_format_is_ignored() {
        let (_tmp, paths) = project();
        fs::write(paths.history(), r#"{"version": 9, "undo": [], "redo": []}"#).unwrap();
        assert_eq!(load_history(&paths).unwrap(), HistorySnapshot::default());
    }
}
