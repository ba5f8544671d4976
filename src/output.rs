//! What tw prints.
//!
//! Every command produces a [`Report`] for people and a serializable payload
//! for `--json`, which is wrapped in the `tw.v1` envelope. Engine results
//! ([`Cascade`], [`DropOutcome`], [`CheckOutcome`], [`ValidationReport`]) are
//! converted here into views whose IDs are rendered at their project's width,
//! so the text and the JSON name items the way `tw list` does.
//!
//! Errors go to stderr as `error:` plus an optional `hint:` line, or into the
//! same envelope with `status: "error"` when `--json` is set.

use std::fmt;

use serde::Serialize;

use crate::cascade::{Cascade, CheckOutcome, DropOutcome};
use crate::error::{exit_codes, Error, Result};
use crate::id::IdWidths;
use crate::validate::{IssueKind, ValidationReport};

pub const SCHEMA_VERSION: &str = "tw.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human rendering of one command's result.
#[derive(Debug, Clone, Default)]
pub struct Report {
    headline: String,
    fields: Vec<(&'static str, String)>,
    lines: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl Report {
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            ..Self::default()
        }
    }

    pub fn field(&mut self, label: &'static str, value: impl Into<String>) -> &mut Self {
        self.fields.push((label, value.into()));
        self
    }

    /// A field listing item IDs. Skipped when there are none.
    pub fn ids(&mut self, label: &'static str, ids: &[String]) -> &mut Self {
        if !ids.is_empty() {
            self.fields.push((label, ids.join(", ")));
        }
        self
    }

    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    pub fn warn(&mut self, warning: impl Into<String>) -> &mut Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn next(&mut self, step: impl Into<String>) -> &mut Self {
        self.next_steps.push(step.into());
        self
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn next_steps(&self) -> &[String] {
        &self.next_steps
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.headline)?;
        let pad = self.fields.iter().map(|(label, _)| label.len() + 1).max().unwrap_or(0);
        for (label, value) in &self.fields {
            let label = format!("{label}:");
            write!(f, "\n  {label:<pad$} {value}")?;
        }
        for line in &self.lines {
            write!(f, "\n  {line}")?;
        }
        for warning in &self.warnings {
            write!(f, "\nwarning: {warning}")?;
        }
        for step in &self.next_steps {
            write!(f, "\nnext: {step}")?;
        }
        Ok(())
    }
}

/// [`Cascade`] with rendered IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeView {
    pub unblocked: Vec<String>,
    pub activated: Vec<String>,
    pub auto_completed: Vec<String>,
    pub stripped: Vec<String>,
}

impl CascadeView {
    pub fn new(cascade: &Cascade, widths: &IdWidths) -> Self {
        Self {
            unblocked: widths.display_all(&cascade.unblocked),
            activated: widths.display_all(&cascade.activated),
            auto_completed: widths.display_all(&cascade.auto_completed),
            stripped: widths.display_all(&cascade.stripped),
        }
    }

    pub fn describe(&self, report: &mut Report) {
        report
            .ids("Unblocked", &self.unblocked)
            .ids("Activated", &self.activated)
            .ids("Auto-completed", &self.auto_completed);
        if !self.stripped.is_empty() {
            report.warn(format!(
                "removed unresolved blockers: {}",
                self.stripped.join(", ")
            ));
        }
    }
}

/// [`DropOutcome`] with rendered IDs. The dropped item comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropView {
    pub dropped: Vec<String>,
    pub unreferenced: Vec<String>,
    pub auto_completed: Vec<String>,
}

impl DropView {
    pub fn new(outcome: &DropOutcome, widths: &IdWidths) -> Self {
        Self {
            dropped: widths.display_all(&outcome.dropped),
            unreferenced: widths.display_all(&outcome.unreferenced),
            auto_completed: widths.display_all(&outcome.auto_completed),
        }
    }

    pub fn describe(&self, report: &mut Report) {
        let cascaded = self.dropped.get(1..).unwrap_or_default();
        report
            .ids("Also dropped", cascaded)
            .ids("Unreferenced", &self.unreferenced)
            .ids("Auto-completed", &self.auto_completed);
    }
}

/// [`CheckOutcome`] with rendered IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckView {
    pub resolved: Vec<String>,
    pub auto_completed: Vec<String>,
}

impl CheckView {
    pub fn new(outcome: &CheckOutcome, widths: &IdWidths) -> Self {
        Self {
            resolved: widths.display_all(&outcome.resolved),
            auto_completed: widths.display_all(&outcome.auto_completed),
        }
    }

    pub fn describe(&self, report: &mut Report) {
        report
            .field("Resolved waits", self.resolved.len().to_string())
            .field("Auto-completed", self.auto_completed.len().to_string());
        if !self.resolved.is_empty() {
            report.line(format!("resolved: {}", self.resolved.join(", ")));
        }
        if !self.auto_completed.is_empty() {
            report.line(format!("auto-completed: {}", self.auto_completed.join(", ")));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueView {
    pub kind: IssueKind,
    pub item: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
}

impl fmt::Display for IssueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.item, self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairView {
    pub item: String,
    pub removed: String,
}

/// One project's [`ValidationReport`] with rendered IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationView {
    pub prefix: String,
    pub issues: Vec<IssueView>,
    pub repairs: Vec<RepairView>,
}

impl ValidationView {
    pub fn new(prefix: impl Into<String>, report: &ValidationReport, widths: &IdWidths) -> Self {
        Self {
            prefix: prefix.into(),
            issues: report
                .issues
                .iter()
                .map(|issue| IssueView {
                    kind: issue.kind,
                    item: widths.display(&issue.item),
                    message: issue.message.clone(),
                    blocker: issue.blocker.as_ref().map(|id| widths.display(id)),
                })
                .collect(),
            repairs: report
                .repairs
                .iter()
                .map(|repair| RepairView {
                    item: widths.display(&repair.item),
                    removed: widths.display(&repair.removed),
                })
                .collect(),
        }
    }

    pub fn describe(&self, report: &mut Report) {
        for repair in &self.repairs {
            report.line(format!(
                "fixed: {} no longer blocked by {}",
                repair.item, repair.removed
            ));
        }
        for issue in &self.issues {
            report.line(issue.to_string());
        }
    }

    /// Whether `tw validate --fix` would clear at least one issue.
    pub fn fixable(&self) -> bool {
        self.issues.iter().any(|issue| issue.blocker.is_some())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

/// Print a successful result: the envelope under `--json`, the report
/// otherwise, nothing under `--quiet`.
pub fn emit<T: Serialize>(options: OutputOptions, command: &str, data: &T, report: &Report) -> Result<()> {
    if options.json {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data: Some(data),
            error: None,
            warnings: report.warnings(),
            next_steps: report.next_steps(),
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else if !options.quiet {
        println!("{report}");
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hints = hints(err);
    if json {
        let envelope: Envelope<'_, ()> = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            data: None,
            error: Some(ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            }),
            warnings: &[],
            next_steps: &hints,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = hints.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        exit_codes::USER_ERROR => "user_error",
        exit_codes::DEPENDENCY_BLOCKED => "dependency_blocked",
        _ => "operation_failed",
    }
}

/// Commands that would get the user past `err`, most useful first.
pub fn hints(err: &Error) -> Vec<String> {
    match err {
        Error::ProjectNotFound(prefix) => vec![format!("tw project new {prefix}")],
        Error::IncompleteBlockers { id, blockers } => {
            let mut steps: Vec<String> = blockers.iter().map(|b| format!("tw show {b}")).collect();
            steps.push(format!("tw done {id} --force"));
            steps
        }
        Error::Dependents { id, .. } => vec![
            format!("tw drop {id} --drop-deps"),
            format!("tw drop {id} --remove-deps"),
        ],
        Error::Cycle { path } => path.first().map(|id| format!("tw show {id}")).into_iter().collect(),
        Error::WaitDormant { blockers, .. } => blockers.iter().map(|b| format!("tw show {b}")).collect(),
        Error::AlreadyDeferred { wait, .. } => vec![format!("tw defer {wait} <WHEN>")],
        Error::ValidationFailed { .. } => vec!["tw validate --fix".to_string()],
        Error::InvalidConfig(_) => vec!["fix config.toml then retry".to_string()],
        _ => Vec::new(),
    }
}
