//! tw project command implementations.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::{load_context, output_options};
use crate::error::Result;
use crate::output::{emit, Report};
use crate::tracker::ProjectSummary;

pub struct NewOptions {
    pub prefix: String,
    pub name: Option<String>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ListOptions {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct DeleteOptions {
    pub prefix: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct RenameOptions {
    pub old: String,
    pub new: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct ProjectCreateOutput {
    prefix: String,
    name: String,
}

#[derive(Serialize)]
struct ProjectListOutput {
    total: usize,
    projects: Vec<ProjectSummary>,
}

#[derive(Serialize)]
struct ProjectDeleteOutput {
    prefix: String,
    deleted: bool,
}

#[derive(Serialize)]
struct ProjectRenameOutput {
    from: String,
    to: String,
    items: usize,
}

pub fn run_new(options: NewOptions) -> Result<()> {
    let ctx = load_context(options.dir, false)?;
    let name = options.name.unwrap_or_default();
    let project = ctx.tracker.create_project(&options.prefix, &name)?;

    let output = ProjectCreateOutput {
        prefix: project.prefix.clone(),
        name: project.name.clone(),
    };
    let mut report = Report::new("Project created");
    report.field("Prefix", output.prefix.clone());
    if !output.name.is_empty() {
        report.field("Name", output.name.clone());
    }
    report.next(format!("tw add \"<title>\" -p {}", output.prefix));

    emit(output_options(options.json, options.quiet), "project new", &output, &report)
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ctx = load_context(options.dir, true)?;
    let projects = ctx.tracker.projects()?;
    let default = ctx.config.default_project.clone();

    let mut report = Report::new("Projects");
    report.field("Total", projects.len().to_string());
    for project in &projects {
        let marker = if default.as_deref() == Some(project.prefix.as_str()) {
            " (default)"
        } else {
            ""
        };
        let name = if project.name.is_empty() {
            String::new()
        } else {
            format!(" {}", project.name)
        };
        report.line(format!(
            "{}{name}{marker}: {} open tasks, {} open waits, {} closed",
            project.prefix, project.open_tasks, project.open_waits, project.closed
        ));
    }
    if projects.is_empty() {
        report.next("tw project new <PREFIX>");
    }

    let output = ProjectListOutput {
        total: projects.len(),
        projects,
    };
    emit(output_options(options.json, options.quiet), "project list", &output, &report)
}

pub fn run_delete(options: DeleteOptions) -> Result<()> {
    let ctx = load_context(options.dir, false)?;
    let prefix = ctx.tracker.project(&options.prefix)?.prefix;
    ctx.tracker.delete_project(&prefix)?;

    let mut report = Report::new("Project deleted");
    report.field("Prefix", prefix.clone()).next("tw validate --fix");

    let output = ProjectDeleteOutput {
        prefix,
        deleted: true,
    };
    emit(output_options(options.json, options.quiet), "project delete", &output, &report)
}

pub fn run_rename(options: RenameOptions) -> Result<()> {
    let ctx = load_context(options.dir, false)?;
    let from = ctx.tracker.project(&options.old)?.prefix;
    let project = ctx.tracker.rename_project(&from, &options.new)?;

    let output = ProjectRenameOutput {
        from,
        to: project.prefix.clone(),
        items: project.items().count(),
    };
    let mut report = Report::new("Project renamed");
    report
        .field("From", output.from.clone())
        .field("To", output.to.clone())
        .field("Items", output.items.to_string());
    if ctx.config.default_project.as_deref() == Some(output.from.as_str()) {
        report.warn(format!(
            "default_project in config.toml still names {}",
            output.from
        ));
    }

    emit(output_options(options.json, options.quiet), "project rename", &output, &report)
}
