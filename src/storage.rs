//! File-backed store for tw
//!
//! One YAML snapshot per project under the data directory:
//!
//! ```text
//! <dir>/
//!   config.toml                 # Optional configuration
//!   projects/
//!     <PREFIX>.yaml             # Full project snapshot
//! ```
//!
//! Snapshots are always written whole, items sorted by ID, through a temp
//! file in the same directory followed by a rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::id::is_valid_prefix;
use crate::model::Project;
use crate::store::Store;

/// Name of the directory holding project snapshots
pub const PROJECTS_DIR: &str = "projects";

const SNAPSHOT_EXT: &str = "yaml";

/// YAML snapshots in a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory (e.g. `~/.local/share/tw`)
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("", "", "tw")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| Error::OperationFailed("could not determine a home directory".to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.dir.join(PROJECTS_DIR)
    }

    pub fn project_file(&self, prefix: &str) -> PathBuf {
        self.projects_dir()
            .join(format!("{}.{SNAPSHOT_EXT}", prefix.trim().to_ascii_uppercase()))
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Write data atomically using temp file + rename
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(data)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| Error::Io(err.error))?;

        Ok(())
    }
}

impl Store for FileStore {
    fn load_project(&self, prefix: &str) -> Result<Project> {
        let path = self.project_file(prefix);
        if !path.exists() {
            return Err(Error::ProjectNotFound(prefix.trim().to_ascii_uppercase()));
        }

        let content = fs::read_to_string(&path)?;
        let mut project: Project = serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
            path: path.clone(),
            source,
        })?;

        let expected = prefix.trim().to_ascii_uppercase();
        if project.prefix.to_ascii_uppercase() != expected {
            warn!(
                file = %path.display(),
                stored = %project.prefix,
                "snapshot prefix does not match file name"
            );
        }
        project.prefix = project.prefix.trim().to_ascii_uppercase();
        debug!(project = %project.prefix, tasks = project.tasks.len(), waits = project.waits.len(), "loaded project");
        Ok(project)
    }

    fn save_project(&self, project: &Project) -> Result<()> {
        let mut snapshot = project.clone();
        snapshot.sort_items();

        let path = self.project_file(&snapshot.prefix);
        let yaml = serde_yaml::to_string(&snapshot).map_err(|source| Error::Yaml {
            path: path.clone(),
            source,
        })?;
        self.write_atomic(&path, yaml.as_bytes())?;
        debug!(project = %snapshot.prefix, file = %path.display(), "saved project");
        Ok(())
    }

    fn list_projects(&self) -> Result<Vec<String>> {
        let dir = self.projects_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut prefixes = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if is_valid_prefix(stem) {
                prefixes.push(stem.to_ascii_uppercase());
            }
        }
        prefixes.sort();
        prefixes.dedup();
        Ok(prefixes)
    }

    fn delete_project(&self, prefix: &str) -> Result<()> {
        let path = self.project_file(prefix);
        if !path.exists() {
            return Err(Error::ProjectNotFound(prefix.trim().to_ascii_uppercase()));
        }
        fs::remove_file(&path)?;
        debug!(project = %prefix, "deleted project");
        Ok(())
    }

    fn project_exists(&self, prefix: &str) -> Result<bool> {
        Ok(self.project_file(prefix).exists())
    }

    fn load_config(&self) -> Result<Config> {
        Config::load_from_dir(&self.dir)
    }
}
