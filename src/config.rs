//! Configuration loading and management
//!
//! Handles parsing of `config.toml` in the data directory.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::id::{is_valid_prefix, normalize_prefix};
use crate::model::{MAX_PRIORITY, MIN_PRIORITY};

pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Run the periodic check before each command
    #[serde(default = "default_true")]
    pub auto_check: bool,

    /// Project prefix used when a command names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project: Option<String>,

    /// Priority given to new tasks
    #[serde(default = "default_priority")]
    pub default_priority: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_check: default_true(),
            default_project: None,
            default_priority: default_priority(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u8 {
    2
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.validate()?;
        if let Some(prefix) = config.default_project.take() {
            config.default_project = Some(normalize_prefix(&prefix)?);
        }
        Ok(config)
    }

    /// Load `config.toml` from the data directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.default_priority) {
            return Err(Error::InvalidConfig(format!(
                "default_priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}"
            )));
        }
        if let Some(prefix) = &self.default_project {
            if !is_valid_prefix(prefix.trim()) {
                return Err(Error::InvalidConfig(format!(
                    "default_project '{prefix}' is not a 2-3 letter prefix"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert!(cfg.auto_check);
        assert!(cfg.default_project.is_none());
        assert_eq!(cfg.default_priority, 2);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
auto_check = false
default_project = "ops"
default_priority = 1
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert!(!cfg.auto_check);
        assert_eq!(cfg.default_project.as_deref(), Some("OPS"));
        assert_eq!(cfg.default_priority, 1);
    }

    #[test]
    fn invalid_priority_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "default_priority = 7").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_default_project_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "default_project = \"toolong\"").expect("write config");

        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path()).expect("defaults");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let cfg = Config {
            default_project: Some("AB".to_string()),
            ..Config::default()
        };
        cfg.save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("auto_check = true"));
        assert!(written.contains("default_project = \"AB\""));
        assert_eq!(Config::load(&path).expect("reload"), cfg);
    }
}
