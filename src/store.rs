//! Persistence boundary.
//!
//! The dependency engine only ever sees whole [`Project`] snapshots. Where
//! they live is up to the [`Store`] implementation: [`crate::storage::FileStore`]
//! keeps them as YAML files, [`MemoryStore`] keeps them in a map.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::id::ItemId;
use crate::model::Project;

pub trait Store {
    /// Load a full snapshot. Missing projects are [`Error::ProjectNotFound`].
    fn load_project(&self, prefix: &str) -> Result<Project>;

    /// Load the project that owns `id`.
    fn load_project_by_id(&self, id: &ItemId) -> Result<Project> {
        self.load_project(id.prefix())
    }

    /// Replace the stored snapshot for `project.prefix`.
    fn save_project(&self, project: &Project) -> Result<()>;

    /// Prefixes of every stored project, sorted.
    fn list_projects(&self) -> Result<Vec<String>>;

    fn delete_project(&self, prefix: &str) -> Result<()>;

    fn project_exists(&self, prefix: &str) -> Result<bool>;

    fn load_config(&self) -> Result<Config>;
}

/// Snapshots held in memory; for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RefCell<BTreeMap<String, Project>>,
    config: Config,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            projects: RefCell::default(),
            config,
        }
    }
}

fn key(prefix: &str) -> String {
    prefix.trim().to_ascii_uppercase()
}

impl Store for MemoryStore {
    fn load_project(&self, prefix: &str) -> Result<Project> {
        self.projects
            .borrow()
            .get(&key(prefix))
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(key(prefix)))
    }

    fn save_project(&self, project: &Project) -> Result<()> {
        let mut snapshot = project.clone();
        snapshot.sort_items();
        self.projects
            .borrow_mut()
            .insert(key(&project.prefix), snapshot);
        Ok(())
    }

    fn list_projects(&self) -> Result<Vec<String>> {
        Ok(self.projects.borrow().keys().cloned().collect())
    }

    fn delete_project(&self, prefix: &str) -> Result<()> {
        self.projects
            .borrow_mut()
            .remove(&key(prefix))
            .map(|_| ())
            .ok_or_else(|| Error::ProjectNotFound(key(prefix)))
    }

    fn project_exists(&self, prefix: &str) -> Result<bool> {
        Ok(self.projects.borrow().contains_key(&key(prefix)))
    }

    fn load_config(&self) -> Result<Config> {
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_project("AB"),
            Err(Error::ProjectNotFound(_))
        ));

        let project = Project::new("AB", "Alpha");
        store.save_project(&project).expect("save");
        assert!(store.project_exists("ab").expect("exists"));
        assert_eq!(store.load_project("ab").expect("load"), project);
        assert_eq!(
            store
                .load_project_by_id(&ItemId::task("AB", 3))
                .expect("by id")
                .name,
            "Alpha"
        );
        assert_eq!(store.list_projects().expect("list"), vec!["AB".to_string()]);

        store.delete_project("AB").expect("delete");
        assert!(!store.project_exists("AB").expect("exists"));
        assert!(store.delete_project("AB").is_err());
    }
}
