//! Structural audit of a project snapshot.
//!
//! The validator never fails: it collects every issue it finds so a single
//! pass surfaces everything. Only blocker references are repaired
//! automatically, orphaned or unparseable ones; everything else needs a
//! human.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::graph::DependencyGraph;
use crate::id::{ItemId, ItemKind};
use crate::model::{ItemRef, Project, ResolutionCriteria, MAX_PRIORITY, UNSET_PRIORITY};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    OrphanBlocker,
    Cycle,
    DuplicateId,
    InvalidId,
    MissingRequired,
    InvalidPriority,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::OrphanBlocker => "orphan_blocker",
            IssueKind::Cycle => "cycle",
            IssueKind::DuplicateId => "duplicate_id",
            IssueKind::InvalidId => "invalid_id",
            IssueKind::MissingRequired => "missing_required",
            IssueKind::InvalidPriority => "invalid_priority",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub item: ItemId,
    pub message: String,
    /// The offending blocked_by entry, when the issue is about one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<ItemId>,
}

impl ValidationIssue {
    fn new(kind: IssueKind, item: &ItemId, message: impl Into<String>) -> Self {
        Self {
            kind,
            item: item.clone(),
            message: message.into(),
            blocker: None,
        }
    }
}

/// One orphan reference removed by [`validate_and_fix`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Repair {
    pub item: ItemId,
    pub removed: ItemId,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    /// Everything found before any repair.
    pub issues: Vec<ValidationIssue>,
    pub repairs: Vec<Repair>,
}

impl ValidationReport {
    /// Issues still present after the repairs.
    pub fn remaining(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| match &issue.blocker {
                Some(blocker) => !self
                    .repairs
                    .iter()
                    .any(|repair| repair.item == issue.item && &repair.removed == blocker),
                None => true,
            })
            .count()
    }
}

pub fn validate(project: &Project) -> Vec<ValidationIssue> {
    validate_with(project, None)
}

/// Audit `project`. References to other projects are checked against
/// `external` (IDs of every item in every other project) when given and
/// accepted as-is otherwise.
pub fn validate_with(project: &Project, external: Option<&HashSet<ItemId>>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    check_duplicates(project, &mut issues);
    check_ids(project, &mut issues);
    for (item, blocker) in orphan_references(project, external) {
        if blocker.is_malformed() {
            continue;
        }
        let message = format!("blocked by {}, which does not exist", project.display_id(&blocker));
        issues.push(ValidationIssue {
            blocker: Some(blocker),
            ..ValidationIssue::new(IssueKind::OrphanBlocker, &item, message)
        });
    }
    check_cycles(project, &mut issues);
    check_fields(project, &mut issues);
    issues
}

pub fn validate_and_fix(project: &mut Project, external: Option<&HashSet<ItemId>>) -> ValidationReport {
    let issues = validate_with(project, external);
    let mut repairs = Vec::new();

    for (item, blocker) in orphan_references(project, external) {
        if let Some(list) = project.blocked_by_mut(&item) {
            let before = list.len();
            list.retain(|id| id != &blocker);
            if list.len() != before {
                repairs.push(Repair {
                    item,
                    removed: blocker,
                });
            }
        }
    }

    if !repairs.is_empty() {
        info!(project = %project.prefix, repairs = repairs.len(), "removed dangling blockers");
    }
    ValidationReport { issues, repairs }
}

fn check_duplicates(project: &Project, issues: &mut Vec<ValidationIssue>) {
    let mut counts: BTreeMap<&ItemId, usize> = BTreeMap::new();
    for item in project.items() {
        *counts.entry(item.id()).or_default() += 1;
    }
    for (id, count) in counts {
        if count > 1 {
            issues.push(ValidationIssue::new(
                IssueKind::DuplicateId,
                id,
                format!("used by {count} items"),
            ));
        }
    }
}

fn check_ids(project: &Project, issues: &mut Vec<ValidationIssue>) {
    for item in project.items() {
        let id = item.id();
        let expected_kind = match item {
            ItemRef::Task(_) => ItemKind::Task,
            ItemRef::Wait(_) => ItemKind::Wait,
        };
        let problem = if !id.is_well_formed() {
            Some("malformed id".to_string())
        } else if !project.owns(id) {
            Some(format!("prefix does not match project {}", project.prefix))
        } else if id.seq() >= project.next_id {
            Some(format!("sequence is not below next id {}", project.next_id))
        } else if id.kind() != expected_kind {
            Some(format!("{} id stored as a {}", id.kind(), expected_kind))
        } else {
            None
        };
        if let Some(message) = problem {
            issues.push(ValidationIssue::new(IssueKind::InvalidId, id, message));
        }
        for blocker in item.blocked_by().iter().filter(|b| b.is_malformed()) {
            issues.push(ValidationIssue {
                blocker: Some(blocker.clone()),
                ..ValidationIssue::new(
                    IssueKind::InvalidId,
                    id,
                    format!("blocked by malformed id '{blocker}'"),
                )
            });
        }
    }
}

/// (item, missing blocker) pairs in snapshot order. Unparseable entries
/// can never resolve, so they are always missing.
fn orphan_references(project: &Project, external: Option<&HashSet<ItemId>>) -> Vec<(ItemId, ItemId)> {
    let mut orphans = Vec::new();
    for item in project.items() {
        for blocker in item.blocked_by() {
            let missing = if blocker.is_malformed() {
                true
            } else if project.owns(blocker) {
                !project.contains(blocker)
            } else {
                external.is_some_and(|known| !known.contains(blocker))
            };
            if missing {
                orphans.push((item.id().clone(), blocker.clone()));
            }
        }
    }
    orphans
}

fn check_cycles(project: &Project, issues: &mut Vec<ValidationIssue>) {
    for cycle in DependencyGraph::build(project).find_cycles() {
        let Some(first) = cycle.first() else {
            continue;
        };
        issues.push(ValidationIssue::new(
            IssueKind::Cycle,
            first,
            project.display_ids(&cycle).join(" -> "),
        ));
    }
}

fn check_fields(project: &Project, issues: &mut Vec<ValidationIssue>) {
    let mut missing = |item: &ItemId, message: &str| {
        issues.push(ValidationIssue::new(IssueKind::MissingRequired, item, message));
    };

    for task in &project.tasks {
        if task.title.trim().is_empty() {
            missing(&task.id, "empty title");
        }
        if task.priority == UNSET_PRIORITY {
            missing(&task.id, "priority not set");
        }
    }

    for wait in &project.waits {
        let has_title = wait.title.as_deref().is_some_and(|t| !t.trim().is_empty());
        match &wait.resolution_criteria {
            None => missing(&wait.id, "no resolution criteria"),
            Some(ResolutionCriteria::Unknown) => missing(&wait.id, "unrecognized resolution criteria"),
            Some(ResolutionCriteria::Time { after: None }) => missing(&wait.id, "time wait without 'after'"),
            Some(ResolutionCriteria::Manual { question, .. }) => {
                let has_question = question.as_deref().is_some_and(|q| !q.trim().is_empty());
                if !has_question && !has_title {
                    missing(&wait.id, "manual wait without question or title");
                }
            }
            Some(ResolutionCriteria::Time { .. }) => {}
        }
    }

    for task in &project.tasks {
        if task.priority > MAX_PRIORITY {
            issues.push(ValidationIssue::new(
                IssueKind::InvalidPriority,
                &task.id,
                format!("priority {} is outside 1-{MAX_PRIORITY}", task.priority),
            ));
        }
    }
}
