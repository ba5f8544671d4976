//! State transitions and their knock-on effects.
//!
//! Every operation here works on one in-memory snapshot plus the blocker
//! status map built for the current operation. Preconditions are checked
//! before any field changes, so a returned error always means the snapshot
//! is untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::id::{ItemId, ItemKind};
use crate::model::{ItemRef, Project, ResolutionCriteria, Status, Task, Wait};
use crate::state::{unresolved_blockers, BlockerStatus};

/// Resolution text recorded when the periodic check closes a time wait.
pub const TIME_ELAPSED: &str = "time elapsed";

/// What completing a task or resolving a wait set in motion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cascade {
    /// Open tasks directly blocked by the item whose blockers are now all resolved.
    pub unblocked: Vec<ItemId>,
    /// Waits that left dormancy because of the item.
    pub activated: Vec<ItemId>,
    /// Auto-complete tasks closed by the fixpoint, in completion order.
    pub auto_completed: Vec<ItemId>,
    /// Unresolved references removed by a forced completion.
    pub stripped: Vec<ItemId>,
}

/// What to do with open dependents of an item being dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropMode {
    /// Fail with [`Error::Dependents`].
    #[default]
    Refuse,
    /// Drop every transitively reachable open dependent too.
    DropDependents,
    /// Remove the item from every other item's blocked_by.
    RemoveReferences,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropOutcome {
    /// The target first, then cascaded dependents.
    pub dropped: Vec<ItemId>,
    /// Items whose blocked_by lost the reference.
    pub unreferenced: Vec<ItemId>,
    pub auto_completed: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub resolved: Vec<ItemId>,
    pub auto_completed: Vec<ItemId>,
}

impl CheckOutcome {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.auto_completed.is_empty()
    }

    pub fn merge(&mut self, other: CheckOutcome) {
        self.resolved.extend(other.resolved);
        self.auto_completed.extend(other.auto_completed);
    }
}

fn expect_task<'a>(project: &'a Project, id: &ItemId) -> Result<&'a Task> {
    if let Some(task) = project.task(id) {
        return Ok(task);
    }
    let sibling = ItemId::wait(id.prefix(), id.seq());
    if project.wait(&sibling).is_some() {
        return Err(Error::InvalidArgument(format!(
            "{} is a wait, not a task",
            project.display_id(&sibling)
        )));
    }
    Err(Error::NotFound(project.display_id(id)))
}

fn expect_wait<'a>(project: &'a Project, id: &ItemId) -> Result<&'a Wait> {
    if let Some(wait) = project.wait(id) {
        return Ok(wait);
    }
    let sibling = ItemId::task(id.prefix(), id.seq());
    if project.task(&sibling).is_some() {
        return Err(Error::InvalidArgument(format!(
            "{} is a task, not a wait",
            project.display_id(&sibling)
        )));
    }
    Err(Error::NotFound(project.display_id(id)))
}

fn require_open(project: &Project, id: &ItemId, status: Status) -> Result<()> {
    if status.is_open() {
        Ok(())
    } else {
        Err(Error::NotOpen {
            id: project.display_id(id),
            status,
        })
    }
}

/// Direct dependents of a freshly resolved item that have nothing left
/// blocking them: tasks become unblocked, waits become active.
fn released_by(project: &Project, status: &BlockerStatus, id: &ItemId) -> (Vec<ItemId>, Vec<ItemId>) {
    let graph = DependencyGraph::build(project);
    let mut unblocked = Vec::new();
    let mut activated = Vec::new();

    for dependent in graph.blocking(id) {
        let Some(item) = project.item(&dependent) else {
            continue;
        };
        if !item.status().is_open() || !unresolved_blockers(item.blocked_by(), status).is_empty() {
            continue;
        }
        match item {
            ItemRef::Task(_) => unblocked.push(dependent),
            ItemRef::Wait(_) => activated.push(dependent),
        }
    }

    (unblocked, activated)
}

pub fn complete_task(
    project: &mut Project,
    status: &mut BlockerStatus,
    id: &ItemId,
    force: bool,
    now: DateTime<Utc>,
) -> Result<Cascade> {
    let task = expect_task(project, id)?;
    require_open(project, id, task.status)?;

    let unresolved = unresolved_blockers(&task.blocked_by, status);
    if !unresolved.is_empty() && !force {
        return Err(Error::IncompleteBlockers {
            id: project.display_id(id),
            blockers: status.display_ids(&unresolved),
        });
    }

    if let Some(task) = project.task_mut(id) {
        if !unresolved.is_empty() {
            task.blocked_by.retain(|blocker| !unresolved.contains(blocker));
            info!(task = %id, stripped = unresolved.len(), "forced completion stripped blockers");
        }
        task.mark_done(now);
    }
    status.mark_resolved(id);

    let (unblocked, activated) = released_by(project, status, id);
    let auto_completed = process_auto_complete(project, status, now);
    debug!(
        task = %id,
        unblocked = unblocked.len(),
        activated = activated.len(),
        auto_completed = auto_completed.len(),
        "completed task"
    );

    Ok(Cascade {
        unblocked,
        activated,
        auto_completed,
        stripped: unresolved,
    })
}

/// Close every open auto-complete task whose blockers are all resolved,
/// rescanning until a full pass changes nothing.
///
/// Tasks without blockers are never auto-completed. Tasks are visited in ID
/// order and the map is updated as each one closes, so a chain can finish in
/// a single pass. Returns IDs in completion order.
pub fn process_auto_complete(
    project: &mut Project,
    status: &mut BlockerStatus,
    now: DateTime<Utc>,
) -> Vec<ItemId> {
    let mut order: Vec<usize> = (0..project.tasks.len()).collect();
    order.sort_by(|a, b| project.tasks[*a].id.cmp(&project.tasks[*b].id));

    let mut completed = Vec::new();
    loop {
        let mut changed = false;
        for &index in &order {
            let ready = {
                let task = &project.tasks[index];
                task.status.is_open()
                    && task.auto_complete
                    && !task.blocked_by.is_empty()
                    && task.blocked_by.iter().all(|blocker| status.is_resolved(blocker))
            };
            if ready {
                let task = &mut project.tasks[index];
                task.mark_done(now);
                status.mark_resolved(&task.id);
                debug!(task = %task.id, "auto-completed");
                completed.push(task.id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    completed
}

pub fn drop_item(
    project: &mut Project,
    status: &mut BlockerStatus,
    id: &ItemId,
    reason: Option<String>,
    mode: DropMode,
    now: DateTime<Utc>,
) -> Result<DropOutcome> {
    let item = project
        .item(id)
        .ok_or_else(|| Error::NotFound(project.display_id(id)))?;
    require_open(project, id, item.status())?;

    let graph = DependencyGraph::build(project);
    let open_dependents: Vec<ItemId> = graph
        .blocking(id)
        .into_iter()
        .filter(|dependent| {
            project
                .item(dependent)
                .is_some_and(|item| item.status().is_open())
        })
        .collect();

    if !open_dependents.is_empty() && mode == DropMode::Refuse {
        return Err(Error::Dependents {
            id: project.display_id(id),
            dependents: status.display_ids(&open_dependents),
        });
    }

    let mut outcome = DropOutcome::default();
    match mode {
        DropMode::Refuse => {}
        DropMode::DropDependents => {
            let reachable = graph.transitive_blocking(id);
            for dependent in reachable {
                let open = project
                    .item(&dependent)
                    .is_some_and(|item| item.status().is_open());
                if open && project.mark_dropped(&dependent, now, reason.clone()) {
                    status.mark_resolved(&dependent);
                    outcome.dropped.push(dependent);
                }
            }
        }
        DropMode::RemoveReferences => {
            outcome.unreferenced = project.remove_references(id);
        }
    }

    project.mark_dropped(id, now, reason);
    status.mark_resolved(id);
    outcome.dropped.insert(0, id.clone());
    outcome.auto_completed = process_auto_complete(project, status, now);

    info!(
        item = %id,
        dropped = outcome.dropped.len(),
        unreferenced = outcome.unreferenced.len(),
        "dropped item"
    );
    Ok(outcome)
}

pub fn reopen_task(project: &mut Project, status: &mut BlockerStatus, id: &ItemId) -> Result<()> {
    let task = expect_task(project, id)?;
    if task.status.is_open() {
        return Err(Error::AlreadyOpen(project.display_id(id)));
    }

    if let Some(task) = project.task_mut(id) {
        task.reopen();
    }
    status.set(id, false);
    debug!(task = %id, "reopened task");
    Ok(())
}

/// Block a task on a new time wait. Returns the wait's ID.
pub fn defer_task(
    project: &mut Project,
    status: &mut BlockerStatus,
    id: &ItemId,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<ItemId> {
    let task = expect_task(project, id)?;
    require_open(project, id, task.status)?;

    let existing = task
        .blocked_by
        .iter()
        .find(|blocker| blocker.is_wait() && status.contains(blocker) && !status.is_resolved(blocker));
    if let Some(wait) = existing {
        return Err(Error::AlreadyDeferred {
            id: project.display_id(id),
            wait: status.display_id(wait),
        });
    }

    let wait_id = project.allocate_id(ItemKind::Wait);
    project
        .waits
        .push(Wait::new(wait_id.clone(), ResolutionCriteria::time(until), now));
    if let Some(task) = project.task_mut(id) {
        task.blocked_by.push(wait_id.clone());
    }
    status.set(&wait_id, false);

    info!(task = %id, wait = %wait_id, until = %until, "deferred task");
    Ok(wait_id)
}

pub fn resolve_wait(
    project: &mut Project,
    status: &mut BlockerStatus,
    id: &ItemId,
    resolution: Option<String>,
    now: DateTime<Utc>,
) -> Result<Cascade> {
    let wait = expect_wait(project, id)?;
    require_open(project, id, wait.status)?;

    let unresolved = unresolved_blockers(&wait.blocked_by, status);
    if !unresolved.is_empty() {
        return Err(Error::WaitDormant {
            id: project.display_id(id),
            blockers: status.display_ids(&unresolved),
        });
    }

    if let Some(wait) = project.wait_mut(id) {
        if let Some(ResolutionCriteria::Time { after: Some(after) }) = &mut wait.resolution_criteria {
            if *after > now {
                *after = now;
            }
        }
        wait.mark_done(now, resolution);
    }
    status.mark_resolved(id);

    let (unblocked, activated) = released_by(project, status, id);
    let auto_completed = process_auto_complete(project, status, now);
    debug!(wait = %id, unblocked = unblocked.len(), "resolved wait");

    Ok(Cascade {
        unblocked,
        activated,
        auto_completed,
        stripped: Vec::new(),
    })
}

/// Move a wait's date: `after` for time waits, `check_after` for manual ones.
pub fn defer_wait(project: &mut Project, id: &ItemId, until: DateTime<Utc>) -> Result<()> {
    let wait = expect_wait(project, id)?;
    require_open(project, id, wait.status)?;
    if !matches!(
        wait.resolution_criteria,
        Some(ResolutionCriteria::Time { .. } | ResolutionCriteria::Manual { .. })
    ) {
        return Err(Error::InvalidArgument(format!(
            "{} has no resolution criteria that can be deferred",
            project.display_id(id)
        )));
    }

    if let Some(wait) = project.wait_mut(id) {
        match &mut wait.resolution_criteria {
            Some(ResolutionCriteria::Time { after }) => *after = Some(until),
            Some(ResolutionCriteria::Manual { check_after, .. }) => *check_after = Some(until),
            _ => {}
        }
    }
    debug!(wait = %id, until = %until, "deferred wait");
    Ok(())
}

/// Resolve every due time wait in one snapshot, then run auto-complete,
/// repeating until nothing changes.
pub fn check_project(project: &mut Project, status: &mut BlockerStatus, now: DateTime<Utc>) -> CheckOutcome {
    let mut order: Vec<usize> = (0..project.waits.len()).collect();
    order.sort_by(|a, b| project.waits[*a].id.cmp(&project.waits[*b].id));

    let mut outcome = CheckOutcome::default();
    loop {
        let mut resolved_this_round = false;
        for &index in &order {
            let due = {
                let wait = &project.waits[index];
                let elapsed = matches!(
                    wait.resolution_criteria,
                    Some(ResolutionCriteria::Time { after: Some(after) }) if after <= now
                );
                wait.status.is_open()
                    && elapsed
                    && wait.blocked_by.iter().all(|blocker| status.is_resolved(blocker))
            };
            if due {
                let wait = &mut project.waits[index];
                wait.mark_done(now, Some(TIME_ELAPSED.to_string()));
                status.mark_resolved(&wait.id);
                debug!(wait = %wait.id, "time wait elapsed");
                outcome.resolved.push(wait.id.clone());
                resolved_this_round = true;
            }
        }

        let completed = process_auto_complete(project, status, now);
        let progressed = resolved_this_round || !completed.is_empty();
        outcome.auto_completed.extend(completed);
        if !progressed {
            break;
        }
    }

    outcome
}
