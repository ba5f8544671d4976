//! Commands that apply to tasks and waits alike.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cascade::DropMode;
use crate::cli::{item_line, load_context, output_options};
use crate::error::{Error, Result};
use crate::id::ItemId;
use crate::output::{emit, DropView, Report};
use crate::store::Store;
use crate::tracker::ItemView;
use crate::when::parse_when;

const STATES: &[&str] = &[
    "ready",
    "blocked",
    "waiting",
    "dormant",
    "actionable",
    "pending",
    "done",
    "dropped",
];

pub struct ListOptions {
    pub project: Option<String>,
    pub state: Option<String>,
    pub all: bool,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ShowOptions {
    pub id: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct DropOptions {
    pub id: String,
    pub reason: Option<String>,
    pub drop_deps: bool,
    pub remove_deps: bool,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct DeferOptions {
    pub id: String,
    pub when: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct BlockOptions {
    pub id: String,
    pub blocker: String,
    pub unblock: bool,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct MoveOptions {
    pub id: String,
    pub project: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct ItemListOutput {
    total: usize,
    items: Vec<ItemView>,
}

#[derive(Serialize)]
struct DropOutput {
    id: String,
    #[serde(flatten)]
    outcome: DropView,
}

#[derive(Serialize)]
struct DeferOutput {
    id: String,
    until: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait: Option<String>,
}

#[derive(Serialize)]
struct BlockOutput {
    id: String,
    blocker: String,
    blocked: bool,
}

#[derive(Serialize)]
struct MoveOutput {
    from: String,
    to: String,
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let state = match options.state.as_deref().map(str::trim) {
        Some(state) => {
            let state = state.to_ascii_lowercase();
            if !STATES.contains(&state.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "unknown state '{state}'. Expected one of: {}",
                    STATES.join(", ")
                )));
            }
            Some(state)
        }
        None => None,
    };

    let prefixes = match options.project.or(ctx.config.default_project.clone()) {
        Some(prefix) => vec![ctx.tracker.project(&prefix)?.prefix],
        None => ctx.tracker.store().list_projects()?,
    };

    let now = Utc::now();
    let mut items = Vec::new();
    for prefix in &prefixes {
        for view in ctx.tracker.views(prefix, now)? {
            let keep = match state.as_deref() {
                Some(state) => view.state.as_str() == state,
                None => options.all || !view.state.is_terminal(),
            };
            if keep {
                items.push(view);
            }
        }
    }

    let mut report = Report::new("Items");
    report
        .field("Projects", prefixes.join(", "))
        .field("Total", items.len().to_string());
    for view in &items {
        report.line(item_line(view));
    }

    let output = ItemListOutput {
        total: items.len(),
        items,
    };
    emit(output_options(options.json, options.quiet), "list", &output, &report)
}

pub fn run_show(options: ShowOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let detail = ctx.tracker.show(&id, Utc::now())?;
    let item = &detail.item;

    let mut report = Report::new(item_line(item));
    report
        .field("Status", item.status.to_string())
        .field("State", item.state.to_string());
    if let Some(criteria) = item.criteria.as_ref() {
        report.field("Resolves", criteria.label());
    }
    if let Some(resolution) = item.resolution.as_deref() {
        report.field("Resolution", resolution);
    }
    if !item.tags.is_empty() {
        report.field("Tags", item.tags.join(", "));
    }
    if item.auto_complete {
        report.field("Auto-complete", "yes");
    }
    report
        .ids("Blocked by", &item.blocked_by)
        .ids("Blocking", &detail.blocking);
    if let Some(notes) = item.notes.as_deref() {
        report.line(notes);
    }

    emit(output_options(options.json, options.quiet), "show", &detail, &report)
}

pub fn run_drop(options: DropOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let mode = if options.drop_deps {
        DropMode::DropDependents
    } else if options.remove_deps {
        DropMode::RemoveReferences
    } else {
        DropMode::Refuse
    };
    let outcome = ctx
        .tracker
        .drop_item(&id, options.reason.clone(), mode, Utc::now())?;
    let widths = ctx.widths()?;

    let output = DropOutput {
        id: widths.display(&id),
        outcome: DropView::new(&outcome, &widths),
    };
    let mut report = Report::new("Dropped");
    report.field("ID", output.id.clone());
    if let Some(reason) = options.reason.as_deref() {
        report.field("Reason", reason);
    }
    output.outcome.describe(&mut report);

    emit(output_options(options.json, options.quiet), "drop", &output, &report)
}

/// Tasks get a new time wait; waits have their date moved.
pub fn run_defer(options: DeferOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let now = Utc::now();
    let until = parse_when(&options.when, now)?;
    if until <= now {
        return Err(Error::InvalidArgument(format!(
            "'{}' is not in the future",
            options.when
        )));
    }

    let wait = if id.is_task() {
        Some(ctx.tracker.defer_task(&id, until, now)?)
    } else {
        ctx.tracker.defer_wait(&id, until)?;
        None
    };
    let widths = ctx.widths()?;

    let output = DeferOutput {
        id: widths.display(&id),
        until,
        wait: wait.as_ref().map(|wait| widths.display(wait)),
    };
    let mut report = Report::new("Deferred");
    report
        .field("ID", output.id.clone())
        .field("Until", until.format("%Y-%m-%d %H:%M UTC").to_string());
    if let Some(wait) = output.wait.as_ref() {
        report.field("Wait", wait.clone());
    }

    emit(output_options(options.json, options.quiet), "defer", &output, &report)
}

pub fn run_block(options: BlockOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let blocker = ItemId::parse(&options.blocker)?;

    let (command, headline) = if options.unblock {
        ctx.tracker.remove_blocker(&id, &blocker)?;
        ("unblock", "Blocker removed")
    } else {
        ctx.tracker.add_blocker(&id, &blocker)?;
        ("block", "Blocker added")
    };
    let state = ctx.tracker.show(&id, Utc::now())?.item.state;
    let widths = ctx.widths()?;

    let output = BlockOutput {
        id: widths.display(&id),
        blocker: widths.display(&blocker),
        blocked: !options.unblock,
    };
    let mut report = Report::new(headline);
    report
        .field("ID", output.id.clone())
        .field("Blocker", output.blocker.clone())
        .field("State", state.to_string());

    emit(output_options(options.json, options.quiet), command, &output, &report)
}

pub fn run_move(options: MoveOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let from = ItemId::parse(&options.id)?;
    let to = ctx.tracker.move_item(&from, &options.project)?;
    let widths = ctx.widths()?;

    let output = MoveOutput {
        from: widths.display(&from),
        to: widths.display(&to),
    };
    let mut report = Report::new("Moved");
    report
        .field("From", output.from.clone())
        .field("To", output.to.clone());

    emit(output_options(options.json, options.quiet), "move", &output, &report)
}
