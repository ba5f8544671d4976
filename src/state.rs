//! Derived display state.
//!
//! Nothing here is persisted. A [`BlockerStatus`] map is built from the
//! current snapshot for every operation and the resolver functions turn an
//! item plus that map (plus the clock, for waits) into a state.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{IdWidths, ItemId, ItemKind};
use crate::model::{ItemRef, Project, ResolutionCriteria, Status, Task, Wait};

/// Item ID -> resolved (done or dropped), plus the display width of every
/// project pulled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockerStatus {
    resolved: HashMap<ItemId, bool>,
    widths: IdWidths,
}

impl BlockerStatus {
    pub fn compute(project: &Project) -> Self {
        let mut status = Self::default();
        status.extend(project);
        status
    }

    /// Add another project's items so cross-project blockers resolve.
    pub fn extend(&mut self, project: &Project) {
        self.widths.set(&project.prefix, project.id_width());
        for item in project.items() {
            self.resolved
                .insert(item.id().clone(), item.status().is_terminal());
        }
    }

    /// Unknown and malformed IDs count as unresolved.
    pub fn is_resolved(&self, id: &ItemId) -> bool {
        self.resolved.get(id).copied().unwrap_or(false)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.resolved.contains_key(id)
    }

    pub fn set(&mut self, id: &ItemId, resolved: bool) {
        self.resolved.insert(id.clone(), resolved);
    }

    pub fn mark_resolved(&mut self, id: &ItemId) {
        self.set(id, true);
    }

    pub fn widths(&self) -> &IdWidths {
        &self.widths
    }

    pub fn display_id(&self, id: &ItemId) -> String {
        self.widths.display(id)
    }

    pub fn display_ids(&self, ids: &[ItemId]) -> Vec<String> {
        self.widths.display_all(ids)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ready,
    Blocked,
    Waiting,
    Done,
    Dropped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    Dormant,
    Actionable,
    Pending,
    Done,
    Dropped,
}

/// State of either item kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ItemState {
    Task(TaskState),
    Wait(WaitState),
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Task(TaskState::Ready) => "ready",
            ItemState::Task(TaskState::Blocked) => "blocked",
            ItemState::Task(TaskState::Waiting) => "waiting",
            ItemState::Task(TaskState::Done) | ItemState::Wait(WaitState::Done) => "done",
            ItemState::Task(TaskState::Dropped) | ItemState::Wait(WaitState::Dropped) => "dropped",
            ItemState::Wait(WaitState::Dormant) => "dormant",
            ItemState::Wait(WaitState::Actionable) => "actionable",
            ItemState::Wait(WaitState::Pending) => "pending",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Task(TaskState::Done | TaskState::Dropped)
                | ItemState::Wait(WaitState::Done | WaitState::Dropped)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blockers of `blocked_by` not yet resolved, in list order.
pub fn unresolved_blockers(blocked_by: &[ItemId], status: &BlockerStatus) -> Vec<ItemId> {
    blocked_by
        .iter()
        .filter(|id| !status.is_resolved(id))
        .cloned()
        .collect()
}

pub fn resolve_task_state(task: &Task, status: &BlockerStatus) -> TaskState {
    match task.status {
        Status::Done => return TaskState::Done,
        Status::Dropped => return TaskState::Dropped,
        Status::Open => {}
    }

    let unresolved = unresolved_blockers(&task.blocked_by, status);
    if unresolved.iter().any(|id| id.kind() == ItemKind::Task) {
        TaskState::Blocked
    } else if unresolved.iter().any(|id| id.kind() == ItemKind::Wait) {
        TaskState::Waiting
    } else {
        TaskState::Ready
    }
}

pub fn resolve_wait_state(wait: &Wait, status: &BlockerStatus, now: DateTime<Utc>) -> WaitState {
    match wait.status {
        Status::Done => return WaitState::Done,
        Status::Dropped => return WaitState::Dropped,
        Status::Open => {}
    }

    if wait.blocked_by.iter().any(|id| !status.is_resolved(id)) {
        return WaitState::Dormant;
    }

    match &wait.resolution_criteria {
        // Time waits only turn done through the periodic check.
        Some(ResolutionCriteria::Time { .. }) => WaitState::Pending,
        Some(ResolutionCriteria::Manual { check_after, .. }) => match check_after {
            Some(at) if *at > now => WaitState::Pending,
            _ => WaitState::Actionable,
        },
        Some(ResolutionCriteria::Unknown) | None => WaitState::Pending,
    }
}

pub fn resolve_state(item: ItemRef<'_>, status: &BlockerStatus, now: DateTime<Utc>) -> ItemState {
    match item {
        ItemRef::Task(task) => ItemState::Task(resolve_task_state(task, status)),
        ItemRef::Wait(wait) => ItemState::Wait(resolve_wait_state(wait, status, now)),
    }
}
