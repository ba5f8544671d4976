//! tw wait command implementations.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::cli::{load_context, output_options, parse_ids};
use crate::error::{Error, Result};
use crate::id::ItemId;
use crate::model::ResolutionCriteria;
use crate::output::{emit, CascadeView, Report};
use crate::tracker::NewWait;
use crate::when::parse_when;

pub struct AddOptions {
    pub title: Option<String>,
    pub project: Option<String>,
    pub after: Option<String>,
    pub question: Option<String>,
    pub check_after: Option<String>,
    pub blocked_by: Vec<String>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ResolveOptions {
    pub id: String,
    pub resolution: Option<String>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct WaitAddOutput {
    id: String,
    criteria: ResolutionCriteria,
    blocked_by: Vec<String>,
}

#[derive(Serialize)]
struct WaitResolveOutput {
    id: String,
    resolution: Option<String>,
    #[serde(flatten)]
    cascade: CascadeView,
}

/// `--after` makes a time wait; anything else is a manual wait.
fn criteria_from(options: &AddOptions) -> Result<ResolutionCriteria> {
    let now = Utc::now();
    if let Some(after) = options.after.as_deref() {
        return Ok(ResolutionCriteria::time(parse_when(after, now)?));
    }
    let check_after = options
        .check_after
        .as_deref()
        .map(|at| parse_when(at, now))
        .transpose()?;
    match options.question.as_deref().map(str::trim) {
        Some(question) if !question.is_empty() => {
            Ok(ResolutionCriteria::manual(question, check_after))
        }
        _ if options.title.is_some() => Ok(ResolutionCriteria::Manual {
            question: None,
            check_after,
        }),
        _ => Err(Error::InvalidArgument(
            "a wait needs --after, --question or a title".to_string(),
        )),
    }
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let ctx = load_context(options.dir.clone(), true)?;
    let prefix = ctx.tracker.pick_project(options.project.as_deref())?;
    let criteria = criteria_from(&options)?;
    let blocked_by = parse_ids(&options.blocked_by)?;

    let id = ctx.tracker.add_wait(
        &prefix,
        NewWait {
            title: options.title.clone(),
            criteria: criteria.clone(),
            blocked_by,
        },
    )?;
    let stored = ctx.tracker.show(&id, Utc::now())?.item;

    let mut report = Report::new("Wait added");
    report
        .field("ID", stored.display_id.clone())
        .field("Title", stored.title.clone())
        .field("Resolves", criteria.label())
        .field("State", stored.state.to_string())
        .ids("Blocked by", &stored.blocked_by)
        .next(format!("tw block <TASK> {}", stored.display_id));

    let output = WaitAddOutput {
        id: stored.display_id,
        criteria,
        blocked_by: stored.blocked_by,
    };
    emit(output_options(options.json, options.quiet), "wait", &output, &report)
}

pub fn run_resolve(options: ResolveOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let id = ItemId::parse(&options.id)?;
    let resolution = options
        .resolution
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    let cascade = ctx
        .tracker
        .resolve_wait(&id, resolution.clone(), Utc::now())?;
    let widths = ctx.widths()?;

    let output = WaitResolveOutput {
        id: widths.display(&id),
        resolution,
        cascade: CascadeView::new(&cascade, &widths),
    };
    let mut report = Report::new("Wait resolved");
    report.field("ID", output.id.clone());
    if let Some(resolution) = output.resolution.as_deref() {
        report.field("Resolution", resolution);
    }
    output.cascade.describe(&mut report);

    emit(output_options(options.json, options.quiet), "resolve", &output, &report)
}
