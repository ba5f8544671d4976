//! Command-line interface for tw
//!
//! This module defines the CLI structure using clap derive macros.
//! Each group of subcommands is implemented in its own submodule.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::id::{IdWidths, ItemId};
use crate::output::OutputOptions;
use crate::storage::FileStore;
use crate::store::Store;
use crate::tracker::{ItemView, Tracker};

mod check;
mod item;
mod project;
mod task;
mod wait;

/// tw - tasks and waits
///
/// Track tasks and the external conditions they wait on, with dependency
/// tracking, automatic unblocking and time-based resolution.
#[derive(Parser, Debug)]
#[command(name = "tw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "TW_DIR")]
    pub dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Project management
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Project prefix
        #[arg(short, long)]
        project: Option<String>,

        /// Priority 1 (highest) to 4
        #[arg(long)]
        priority: Option<u8>,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Due date (YYYY-MM-DD or relative like 3d)
        #[arg(long)]
        due: Option<String>,

        /// Complete automatically once every blocker is resolved
        #[arg(long)]
        auto_complete: bool,

        /// Blocking item ID (repeatable)
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,
    },

    /// Add a wait: an external condition tasks can be blocked on
    Wait {
        /// Wait title
        title: Option<String>,

        /// Project prefix
        #[arg(short, long)]
        project: Option<String>,

        /// Resolve automatically after this time
        #[arg(long, conflicts_with_all = ["question", "check_after"])]
        after: Option<String>,

        /// Question a human has to answer
        #[arg(long)]
        question: Option<String>,

        /// Do not surface the question before this time
        #[arg(long)]
        check_after: Option<String>,

        /// Blocking item ID (repeatable)
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,
    },

    /// List items with their derived state
    List {
        /// Project prefix (all projects when omitted and no default is set)
        #[arg(short, long)]
        project: Option<String>,

        /// Only items in this state (ready, blocked, waiting, dormant, actionable, pending, done, dropped)
        #[arg(long)]
        state: Option<String>,

        /// Include done and dropped items
        #[arg(long)]
        all: bool,
    },

    /// Show one item
    Show {
        /// Item ID
        id: String,
    },

    /// Edit a task
    Edit {
        /// Task ID
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New priority (1-4)
        #[arg(long)]
        priority: Option<u8>,

        /// Replace tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Replace notes (empty string clears)
        #[arg(long)]
        notes: Option<String>,

        /// New due date
        #[arg(long)]
        due: Option<String>,

        /// Turn auto-complete on or off
        #[arg(long, value_name = "BOOL")]
        auto_complete: Option<bool>,
    },

    /// Complete a task
    Done {
        /// Task ID
        id: String,

        /// Complete even with unresolved blockers (removes them)
        #[arg(long)]
        force: bool,
    },

    /// Drop a task or wait
    Drop {
        /// Item ID
        id: String,

        /// Why it was dropped
        #[arg(long)]
        reason: Option<String>,

        /// Also drop every open item that depends on it
        #[arg(long, conflicts_with = "remove_deps")]
        drop_deps: bool,

        /// Remove it from the blockers of every dependent instead
        #[arg(long)]
        remove_deps: bool,
    },

    /// Reopen a done or dropped task
    Reopen {
        /// Task ID
        id: String,
    },

    /// Defer a task (adds a time wait) or move a wait's date
    Defer {
        /// Task or wait ID
        id: String,

        /// Until when (YYYY-MM-DD, RFC 3339 or relative like 3d)
        when: String,
    },

    /// Resolve a wait
    Resolve {
        /// Wait ID
        id: String,

        /// Resolution text
        resolution: Option<String>,
    },

    /// Make an item wait on another
    Block {
        /// Item that gets blocked
        id: String,

        /// Item it waits on
        blocker: String,
    },

    /// Remove a blocker
    Unblock {
        /// Blocked item
        id: String,

        /// Blocker to remove
        blocker: String,
    },

    /// Move an item to another project
    Move {
        /// Item ID
        id: String,

        /// Destination project prefix
        project: String,
    },

    /// Resolve elapsed time waits and run auto-completion
    Check {
        /// Evaluate as of this time instead of now
        #[arg(long)]
        now: Option<String>,
    },

    /// Audit projects for structural problems
    Validate {
        /// Project prefix (all projects when omitted)
        #[arg(short, long)]
        project: Option<String>,

        /// Remove blockers that point at nothing
        #[arg(long)]
        fix: bool,
    },
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project
    New {
        /// Two or three letter prefix
        prefix: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// List projects
    List,

    /// Delete a project and all its items
    Delete {
        /// Project prefix
        prefix: String,
    },

    /// Change a project's prefix, rewriting every ID
    Rename {
        /// Current prefix
        old: String,

        /// New prefix
        new: String,
    },
}

impl Commands {
    /// Name reported in the JSON envelope.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Project(cmd) => match cmd {
                ProjectCommands::New { .. } => "project new",
                ProjectCommands::List => "project list",
                ProjectCommands::Delete { .. } => "project delete",
                ProjectCommands::Rename { .. } => "project rename",
            },
            Commands::Add { .. } => "add",
            Commands::Wait { .. } => "wait",
            Commands::List { .. } => "list",
            Commands::Show { .. } => "show",
            Commands::Edit { .. } => "edit",
            Commands::Done { .. } => "done",
            Commands::Drop { .. } => "drop",
            Commands::Reopen { .. } => "reopen",
            Commands::Defer { .. } => "defer",
            Commands::Resolve { .. } => "resolve",
            Commands::Block { .. } => "block",
            Commands::Unblock { .. } => "unblock",
            Commands::Move { .. } => "move",
            Commands::Check { .. } => "check",
            Commands::Validate { .. } => "validate",
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let dir = self.dir;
        let json = self.json;
        let quiet = self.quiet;

        match self.command {
            Commands::Project(cmd) => match cmd {
                ProjectCommands::New { prefix, name } => project::run_new(project::NewOptions {
                    prefix,
                    name,
                    dir,
                    json,
                    quiet,
                }),
                ProjectCommands::List => project::run_list(project::ListOptions { dir, json, quiet }),
                ProjectCommands::Delete { prefix } => {
                    project::run_delete(project::DeleteOptions {
                        prefix,
                        dir,
                        json,
                        quiet,
                    })
                }
                ProjectCommands::Rename { old, new } => {
                    project::run_rename(project::RenameOptions {
                        old,
                        new,
                        dir,
                        json,
                        quiet,
                    })
                }
            },
            Commands::Add {
                title,
                project,
                priority,
                tags,
                notes,
                due,
                auto_complete,
                blocked_by,
            } => task::run_add(task::AddOptions {
                title,
                project,
                priority,
                tags,
                notes,
                due,
                auto_complete,
                blocked_by,
                dir,
                json,
                quiet,
            }),
            Commands::Wait {
                title,
                project,
                after,
                question,
                check_after,
                blocked_by,
            } => wait::run_add(wait::AddOptions {
                title,
                project,
                after,
                question,
                check_after,
                blocked_by,
                dir,
                json,
                quiet,
            }),
            Commands::List {
                project,
                state,
                all,
            } => item::run_list(item::ListOptions {
                project,
                state,
                all,
                dir,
                json,
                quiet,
            }),
            Commands::Show { id } => item::run_show(item::ShowOptions {
                id,
                dir,
                json,
                quiet,
            }),
            Commands::Edit {
                id,
                title,
                priority,
                tags,
                notes,
                due,
                auto_complete,
            } => task::run_edit(task::EditOptions {
                id,
                title,
                priority,
                tags,
                notes,
                due,
                auto_complete,
                dir,
                json,
                quiet,
            }),
            Commands::Done { id, force } => task::run_done(task::DoneOptions {
                id,
                force,
                dir,
                json,
                quiet,
            }),
            Commands::Drop {
                id,
                reason,
                drop_deps,
                remove_deps,
            } => item::run_drop(item::DropOptions {
                id,
                reason,
                drop_deps,
                remove_deps,
                dir,
                json,
                quiet,
            }),
            Commands::Reopen { id } => task::run_reopen(task::ReopenOptions {
                id,
                dir,
                json,
                quiet,
            }),
            Commands::Defer { id, when } => item::run_defer(item::DeferOptions {
                id,
                when,
                dir,
                json,
                quiet,
            }),
            Commands::Resolve { id, resolution } => wait::run_resolve(wait::ResolveOptions {
                id,
                resolution,
                dir,
                json,
                quiet,
            }),
            Commands::Block { id, blocker } => item::run_block(item::BlockOptions {
                id,
                blocker,
                unblock: false,
                dir,
                json,
                quiet,
            }),
            Commands::Unblock { id, blocker } => item::run_block(item::BlockOptions {
                id,
                blocker,
                unblock: true,
                dir,
                json,
                quiet,
            }),
            Commands::Move { id, project } => item::run_move(item::MoveOptions {
                id,
                project,
                dir,
                json,
                quiet,
            }),
            Commands::Check { now } => check::run_check(check::CheckOptions {
                now,
                dir,
                json,
                quiet,
            }),
            Commands::Validate { project, fix } => check::run_validate(check::ValidateOptions {
                project,
                fix,
                dir,
                json,
                quiet,
            }),
        }
    }
}

struct Context {
    tracker: Tracker<FileStore>,
    config: Config,
}

impl Context {
    /// Display widths as of now. Call after mutating so new IDs count.
    fn widths(&self) -> Result<IdWidths> {
        self.tracker.id_widths()
    }
}

/// Open the data directory and, unless told otherwise, bring time waits up
/// to date before the command runs.
fn load_context(dir: Option<PathBuf>, auto_check: bool) -> Result<Context> {
    let dir = match dir {
        Some(dir) => dir,
        None => FileStore::default_dir()?,
    };
    let store = FileStore::new(dir);
    let config = store.load_config()?;
    let tracker = Tracker::new(store);
    if auto_check && config.auto_check {
        tracker.run_periodic_check(Utc::now())?;
    }
    Ok(Context { tracker, config })
}

fn output_options(json: bool, quiet: bool) -> OutputOptions {
    OutputOptions { json, quiet }
}

fn parse_ids(raw: &[String]) -> Result<Vec<ItemId>> {
    raw.iter().map(|id| ItemId::parse(id)).collect()
}

/// One-line rendering used by list and show.
fn item_line(view: &ItemView) -> String {
    let mut line = format!("{} [{}] {}", view.display_id, view.state, view.title);
    if let Some(priority) = view.priority {
        line.push_str(&format!(" (p{priority})"));
    }
    if let Some(due) = view.due {
        line.push_str(&format!(" due {due}"));
    }
    if !view.unresolved.is_empty() {
        line.push_str(&format!(" <- {}", view.unresolved.join(", ")));
    }
    line
}
