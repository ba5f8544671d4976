//! tw task command implementations.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::cli::{load_context, output_options, parse_ids};
use crate::error::{Error, Result};
use crate::id::ItemId;
use crate::output::{emit, CascadeView, Report};
use crate::tracker::{NewTask, TaskEdit};
use crate::when::parse_date;

pub struct AddOptions {
    pub title: String,
    pub project: Option<String>,
    pub priority: Option<u8>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub due: Option<String>,
    pub auto_complete: bool,
    pub blocked_by: Vec<String>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub priority: Option<u8>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub due: Option<String>,
    pub auto_complete: Option<bool>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct DoneOptions {
    pub id: String,
    pub force: bool,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ReopenOptions {
    pub id: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct TaskAddOutput {
    id: String,
    title: String,
    blocked_by: Vec<String>,
}

#[derive(Serialize)]
struct TaskDoneOutput {
    id: String,
    #[serde(flatten)]
    cascade: CascadeView,
}

#[derive(Serialize)]
struct TaskReopenOutput {
    id: String,
    reopened: bool,
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let prefix = ctx.tracker.pick_project(options.project.as_deref())?;
    let blocked_by = parse_ids(&options.blocked_by)?;
    let due = options
        .due
        .as_deref()
        .map(|due| parse_date(due, Utc::now().date_naive()))
        .transpose()?;

    let title = options.title.trim().to_string();
    let id = ctx.tracker.add_task(
        &prefix,
        NewTask {
            title: title.clone(),
            priority: options.priority,
            tags: options.tags,
            notes: options.notes,
            due,
            auto_complete: options.auto_complete,
            blocked_by,
        },
    )?;
    let stored = ctx.tracker.show(&id, Utc::now())?.item;

    let mut report = Report::new("Task added");
    report
        .field("ID", stored.display_id.clone())
        .field("Title", title.clone())
        .field("State", stored.state.to_string())
        .ids("Blocked by", &stored.blocked_by);

    let output = TaskAddOutput {
        id: stored.display_id,
        title,
        blocked_by: stored.blocked_by,
    };
    emit(output_options(options.json, options.quiet), "add", &output, &report)
}

pub fn run_edit(options: EditOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let due = options
        .due
        .as_deref()
        .map(|due| parse_date(due, Utc::now().date_naive()))
        .transpose()?;
    let edit = TaskEdit {
        title: options.title,
        priority: options.priority,
        tags: (!options.tags.is_empty()).then_some(options.tags),
        notes: options.notes,
        due,
        auto_complete: options.auto_complete,
    };
    if edit.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to change; pass at least one of --title, --priority, --tag, --notes, --due, --auto-complete"
                .to_string(),
        ));
    }

    ctx.tracker.edit_task(&id, edit)?;
    let detail = ctx.tracker.show(&id, Utc::now())?;
    let task = &detail.item;

    let mut report = Report::new("Task updated");
    report.field("ID", task.display_id.clone()).field("Title", task.title.clone());
    if let Some(priority) = task.priority {
        report.field("Priority", priority.to_string());
    }
    if !task.tags.is_empty() {
        report.field("Tags", task.tags.join(", "));
    }
    if let Some(due) = task.due {
        report.field("Due", due.to_string());
    }
    if task.auto_complete {
        report.field("Auto-complete", "yes");
    }

    emit(output_options(options.json, options.quiet), "edit", &detail, &report)
}

pub fn run_done(options: DoneOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let cascade = ctx.tracker.complete_task(&id, options.force, Utc::now())?;
    let widths = ctx.widths()?;

    let output = TaskDoneOutput {
        id: widths.display(&id),
        cascade: CascadeView::new(&cascade, &widths),
    };
    let mut report = Report::new("Task done");
    report.field("ID", output.id.clone());
    output.cascade.describe(&mut report);

    emit(output_options(options.json, options.quiet), "done", &output, &report)
}

pub fn run_reopen(options: ReopenOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    ctx.tracker.reopen_task(&id)?;
    let id = ctx.widths()?.display(&id);

    let mut report = Report::new("Task reopened");
    report.field("ID", id.clone()).next(format!("tw show {id}"));

    let output = TaskReopenOutput { id, reopened: true };
    emit(output_options(options.json, options.quiet), "reopen", &output, &report)
}
