#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// A throwaway tw data directory.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn project_file(&self, prefix: &str) -> PathBuf {
        self.dir.path().join("projects").join(format!("{prefix}.yaml"))
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.dir.path().join("config.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    /// `tw` pointed at this directory, with tracing off.
    pub fn tw(&self) -> Command {
        let mut cmd = Command::cargo_bin("tw").expect("binary");
        cmd.env("TW_DIR", self.dir.path()).env_remove("RUST_LOG");
        cmd
    }

    /// Run a command with `--json` that must succeed; returns the envelope.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .tw()
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("json envelope")
    }

    /// Run a command with `--json` that must fail with `code`; returns the envelope.
    pub fn json_err(&self, args: &[&str], code: i32) -> Value {
        let output = self
            .tw()
            .args(args)
            .arg("--json")
            .assert()
            .code(code)
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("json error envelope")
    }

    /// Create a project and return nothing; panics on failure.
    pub fn project(&self, prefix: &str) {
        self.tw().args(["project", "new", prefix]).assert().success();
    }

    /// Add a task and return its ID.
    pub fn add(&self, args: &[&str]) -> String {
        let mut full = vec!["add"];
        full.extend_from_slice(args);
        let value = self.json(&full);
        value["data"]["id"].as_str().expect("task id").to_string()
    }
}

pub fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
