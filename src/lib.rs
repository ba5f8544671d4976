//! tw - Tasks and Waits Library
//!
//! This library provides the core of the tw CLI: projects of tasks and
//! waits, the dependency graph between them and the cascade that runs when
//! something is completed, dropped or resolved.
//!
//! # Core Concepts
//!
//! - **Tasks**: work items with a priority, optionally auto-completing
//! - **Waits**: external conditions, resolved by time or by hand
//! - **Blockers**: `blocked_by` edges between any two items, kept acyclic
//! - **Derived state**: ready/blocked/waiting for tasks, dormant/actionable/pending for waits
//!
//! # Module Organization
//!
//! - `id`: Item IDs (`AB-01`, `AB-02W`) and project prefixes
//! - `model`: Projects, tasks, waits and resolution criteria
//! - `graph`: Dependency graph, cycle checks and traversal
//! - `state`: Derived item state from a blocker status map
//! - `cascade`: Completion, drop, defer and resolve with their cascades
//! - `validate`: Structural audit and orphan repair
//! - `store` / `storage`: Persistence trait and the YAML file store
//! - `tracker`: Service layer tying storage to the engine
//! - `config`: Configuration loading from `config.toml`
//! - `when`: Parsing of dates, times and durations
//! - `cli` / `output`: Command-line interface and its output envelope
//! - `error`: Error types and result aliases

pub mod cascade;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod id;
pub mod model;
pub mod output;
pub mod state;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod validate;
pub mod when;

pub use error::{Error, Result};
