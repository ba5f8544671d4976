//! tw check and validate command implementations.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::cli::{load_context, output_options};
use crate::error::{Error, Result};
use crate::output::{emit, CheckView, Report, ValidationView};
use crate::validate::ValidationReport;
use crate::when::parse_when;

pub struct CheckOptions {
    pub now: Option<String>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ValidateOptions {
    pub project: Option<String>,
    pub fix: bool,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct ValidateOutput {
    projects: Vec<ValidationView>,
    issues: usize,
    repairs: usize,
}

pub fn run_check(options: CheckOptions) -> Result<()> {
    let ctx = load_context(options.dir, false)?;
    let now = match options.now.as_deref() {
        Some(at) => parse_when(at, Utc::now())?,
        None => Utc::now(),
    };
    let outcome = ctx.tracker.run_periodic_check(now)?;
    let output = CheckView::new(&outcome, &ctx.widths()?);

    let mut report = Report::new("Check complete");
    report.field("As of", now.format("%Y-%m-%d %H:%M UTC").to_string());
    output.describe(&mut report);

    emit(output_options(options.json, options.quiet), "check", &output, &report)
}

/// Fails with [`Error::ValidationFailed`] when problems remain after any
/// repair. The human report is printed before the error.
pub fn run_validate(options: ValidateOptions) -> Result<()> {
    let ctx = load_context(options.dir, false)?;
    let reports: Vec<(String, ValidationReport)> = match options.project.as_deref() {
        Some(prefix) => {
            let prefix = ctx.tracker.project(prefix)?.prefix;
            let report = ctx.tracker.validate_project(&prefix, options.fix)?;
            let report = if options.fix {
                with_remaining(&ctx.tracker.validate_project(&prefix, false)?, report)
            } else {
                report
            };
            vec![(prefix, report)]
        }
        None => {
            let fixed = ctx.tracker.validate_all(options.fix)?;
            if options.fix {
                let remaining = ctx.tracker.validate_all(false)?;
                fixed
                    .into_iter()
                    .zip(remaining)
                    .map(|((prefix, fixed), (_, after))| (prefix, with_remaining(&after, fixed)))
                    .collect()
            } else {
                fixed
            }
        }
    };

    let widths = ctx.widths()?;
    let projects: Vec<ValidationView> = reports
        .iter()
        .map(|(prefix, report)| ValidationView::new(prefix.as_str(), report, &widths))
        .collect();
    let output = ValidateOutput {
        issues: projects.iter().map(|project| project.issues.len()).sum(),
        repairs: projects.iter().map(|project| project.repairs.len()).sum(),
        projects,
    };

    let mut report = Report::new("Validation");
    report
        .field("Projects", output.projects.len().to_string())
        .field("Issues", output.issues.to_string());
    if options.fix {
        report.field("Repairs", output.repairs.to_string());
    }
    for project in &output.projects {
        project.describe(&mut report);
    }

    if output.issues == 0 {
        return emit(output_options(options.json, options.quiet), "validate", &output, &report);
    }

    if !options.fix && output.projects.iter().any(ValidationView::fixable) {
        report.next("tw validate --fix");
    }
    if !options.json && !options.quiet {
        emit(output_options(false, false), "validate", &output, &report)?;
    }
    let issues: Vec<String> = output
        .projects
        .iter()
        .flat_map(|project| &project.issues)
        .map(ToString::to_string)
        .collect();
    Err(Error::ValidationFailed {
        count: issues.len(),
        issues,
    })
}

/// Repairs from the fixing pass, issues from the pass after it.
fn with_remaining(after: &ValidationReport, fixed: ValidationReport) -> ValidationReport {
    ValidationReport {
        issues: after.issues.clone(),
        repairs: fixed.repairs,
    }
}
