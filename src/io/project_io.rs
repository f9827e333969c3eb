use std::fs;
use std::path::{Path, PathBuf};

use crate::store::StoreError;

/// Name of the per-project data directory
pub const CANOPY_DIR: &str = ".canopy";

/// Error type for project I/O operations
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not a canopy project: no .canopy/ directory found (run `canopy init`)")]
    NotAProject,
    #[error("canopy project already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    ConfigEditError(#[from] toml_edit::TomlError),
    #[error("unknown config key \"{0}\"")]
    UnknownConfigKey(String),
    #[error("invalid value \"{value}\" for {key}: {reason}")]
    InvalidConfigValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("could not parse history.json: {0}")]
    HistoryParseError(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Locations of the files inside a project's `.canopy/` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path) -> Self {
        ProjectPaths {
            root: root.to_path_buf(),
            dir: root.join(CANOPY_DIR),
        }
    }

    pub fn tasks(&self) -> PathBuf {
        self.dir.join("tasks.json")
    }

    pub fn history(&self) -> PathBuf {
        self.dir.join("history.json")
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    /// Advisory lock file held by write commands
    pub fn lock(&self) -> PathBuf {
        self.dir.join(".lock")
    }
}

/// Discover the project by walking up from `start`, looking for a
/// `.canopy/` directory.
pub fn discover_project(start: &Path) -> Result<ProjectPaths, ProjectError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CANOPY_DIR).is_dir() {
            return Ok(ProjectPaths::new(&current));
        }
        if !current.pop() {
            return Err(ProjectError::NotAProject);
        }
    }
}

/// Create `.canopy/` under `root` with an empty task file and the config
/// template. Fails if the directory already exists.
pub fn init_project(root: &Path) -> Result<ProjectPaths, ProjectError> {
    let paths = ProjectPaths::new(root);
    if paths.dir.exists() {
        return Err(ProjectError::AlreadyInitialized(paths.dir));
    }
    fs::create_dir_all(&paths.dir)?;
    crate::io::config_io::write_template(&paths)?;
    crate::store::JsonFileStore::create(&paths.tasks())?;
    tracing::info!(dir = %paths.dir.display(), "initialized project");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discover_walks_up_to_the_project_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        fs::create_dir_all(root.join(CANOPY_DIR)).unwrap();
        let nested = root.join("src/deep");
        fs::create_dir_all(&nested).unwrap();

        let paths = discover_project(&nested).unwrap();
        assert_eq!(paths.root, root);
        assert_eq!(paths.tasks(), root.join(".canopy/tasks.json"));
    }

    #[test]
    fn discover_fails_outside_a_project() {
        let tmp = TempDir::new().unwrap();
        let err = discover_project(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotAProject));
    }

    #[test]
    fn init_creates_files_and_refuses_twice() {
        let tmp = TempDir::new().unwrap();
        let paths = init_project(tmp.path()).unwrap();
        assert!(paths.tasks().exists());
        assert!(paths.config().exists());
        assert!(!paths.history().exists());

        let err = init_project(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyInitialized(_)));
    }
}
