//! Service layer over a [`Store`].
//!
//! Each operation loads the snapshot(s) it needs, builds a fresh blocker
//! status map (pulling in any other project a blocked_by list points at),
//! runs the engine in memory and saves only after every check passed.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::cascade::{self, Cascade, CheckOutcome, DropMode, DropOutcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::id::{normalize_prefix, IdWidths, ItemId, ItemKind};
use crate::model::{
    ItemRef, Project, ResolutionCriteria, Status, Task, Wait, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::state::{resolve_state, unresolved_blockers, BlockerStatus, ItemState};
use crate::store::Store;
use crate::validate::{validate_and_fix, validate_with, ValidationReport};

/// Fields for a new task; unset priority falls back to the configured default.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub priority: Option<u8>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub due: Option<NaiveDate>,
    pub auto_complete: bool,
    pub blocked_by: Vec<ItemId>,
}

#[derive(Debug, Clone)]
pub struct NewWait {
    pub title: Option<String>,
    pub criteria: ResolutionCriteria,
    pub blocked_by: Vec<ItemId>,
}

/// Partial update of a task. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub priority: Option<u8>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub due: Option<NaiveDate>,
    pub auto_complete: Option<bool>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.notes.is_none()
            && self.due.is_none()
            && self.auto_complete.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub prefix: String,
    pub name: String,
    pub open_tasks: usize,
    pub open_waits: usize,
    pub closed: usize,
}

/// An item with its derived state, as shown to users. IDs are rendered at
/// their project's width.
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    #[serde(skip)]
    pub id: ItemId,
    #[serde(rename = "id")]
    pub display_id: String,
    pub kind: ItemKind,
    pub title: String,
    pub status: Status,
    pub state: ItemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<ResolutionCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub blocked_by: Vec<String>,
    pub unresolved: Vec<String>,
}

impl ItemView {
    fn new(project: &Project, item: ItemRef<'_>, status: &BlockerStatus, now: DateTime<Utc>) -> Self {
        let id = item.id().clone();
        let blocked_by = status.display_ids(item.blocked_by());
        let unresolved = status.display_ids(&unresolved_blockers(item.blocked_by(), status));
        let mut view = Self {
            display_id: project.display_id(&id),
            kind: id.kind(),
            title: item.title(),
            status: item.status(),
            state: resolve_state(item, status, now),
            priority: None,
            tags: Vec::new(),
            due: None,
            notes: None,
            auto_complete: false,
            criteria: None,
            resolution: None,
            blocked_by,
            unresolved,
            id,
        };
        match item {
            ItemRef::Task(task) => {
                view.priority = Some(task.priority);
                view.tags = task.tags.clone();
                view.due = task.due;
                view.notes = task.notes.clone();
                view.auto_complete = task.auto_complete;
            }
            ItemRef::Wait(wait) => {
                view.criteria = wait.resolution_criteria.clone();
                view.resolution = wait.resolution.clone();
            }
        }
        view
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: ItemView,
    /// Items directly blocked by this one.
    pub blocking: Vec<String>,
}

pub struct Tracker<S: Store> {
    store: S,
}

impl<S: Store> Tracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> Result<Config> {
        self.store.load_config()
    }

    /// Prefix to use when a command names no project: the explicit one, the
    /// configured default, or the only project there is.
    pub fn pick_project(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(prefix) = explicit {
            return normalize_prefix(prefix);
        }
        if let Some(prefix) = self.config()?.default_project {
            return normalize_prefix(&prefix);
        }
        let projects = self.store.list_projects()?;
        match projects.as_slice() {
            [only] => Ok(only.clone()),
            [] => Err(Error::InvalidArgument(
                "no projects yet; create one with `tw project new <PREFIX>`".to_string(),
            )),
            _ => Err(Error::InvalidArgument(
                "several projects exist; pass --project or set default_project".to_string(),
            )),
        }
    }

    // =========================================================================
    // Projects
    // =========================================================================

    pub fn create_project(&self, prefix: &str, name: &str) -> Result<Project> {
        let prefix = normalize_prefix(prefix)?;
        if self.store.project_exists(&prefix)? {
            return Err(Error::ProjectExists(prefix));
        }
        let project = Project::new(&prefix, name.trim());
        self.store.save_project(&project)?;
        info!(project = %prefix, "created project");
        Ok(project)
    }

    pub fn delete_project(&self, prefix: &str) -> Result<()> {
        let prefix = normalize_prefix(prefix)?;
        self.store.delete_project(&prefix)?;
        info!(project = %prefix, "deleted project");
        Ok(())
    }

    pub fn project(&self, prefix: &str) -> Result<Project> {
        self.store.load_project(&normalize_prefix(prefix)?)
    }

    /// Current display width of every project.
    pub fn id_widths(&self) -> Result<IdWidths> {
        let mut widths = IdWidths::default();
        for prefix in self.store.list_projects()? {
            let project = self.store.load_project(&prefix)?;
            widths.set(&project.prefix, project.id_width());
        }
        Ok(widths)
    }

    pub fn projects(&self) -> Result<Vec<ProjectSummary>> {
        let mut summaries = Vec::new();
        for prefix in self.store.list_projects()? {
            let project = self.store.load_project(&prefix)?;
            let open = |status: Status| status.is_open();
            summaries.push(ProjectSummary {
                open_tasks: project.tasks.iter().filter(|t| open(t.status)).count(),
                open_waits: project.waits.iter().filter(|w| open(w.status)).count(),
                closed: project.items().filter(|i| !open(i.status())).count(),
                name: project.name.clone(),
                prefix: project.prefix,
            });
        }
        Ok(summaries)
    }

    /// Rewrite every ID of `old` under `new`, including references held by
    /// other projects.
    pub fn rename_project(&self, old: &str, new: &str) -> Result<Project> {
        let old = normalize_prefix(old)?;
        let new = normalize_prefix(new)?;
        if old == new {
            return Err(Error::InvalidArgument(format!("project is already named {new}")));
        }
        if self.store.project_exists(&new)? {
            return Err(Error::ProjectExists(new));
        }

        let mut project = self.store.load_project(&old)?;
        project.prefix = new.clone();
        let retag = |id: &mut ItemId| {
            if id.prefix() == old {
                *id = id.with_prefix(&new);
            }
        };
        for task in &mut project.tasks {
            retag(&mut task.id);
            task.blocked_by.iter_mut().for_each(retag);
        }
        for wait in &mut project.waits {
            retag(&mut wait.id);
            wait.blocked_by.iter_mut().for_each(retag);
        }

        let mut others = Vec::new();
        for prefix in self.store.list_projects()? {
            if prefix == old {
                continue;
            }
            let mut other = self.store.load_project(&prefix)?;
            let mut touched = false;
            for list in other
                .tasks
                .iter_mut()
                .map(|t| &mut t.blocked_by)
                .chain(other.waits.iter_mut().map(|w| &mut w.blocked_by))
            {
                for id in list.iter_mut().filter(|id| id.prefix() == old) {
                    *id = id.with_prefix(&new);
                    touched = true;
                }
            }
            if touched {
                others.push(other);
            }
        }

        self.store.save_project(&project)?;
        for other in &others {
            self.store.save_project(other)?;
        }
        self.store.delete_project(&old)?;
        info!(from = %old, to = %new, rewritten = others.len(), "renamed project");
        Ok(project)
    }

    // =========================================================================
    // Creating and editing items
    // =========================================================================

    pub fn add_task(&self, prefix: &str, new: NewTask) -> Result<ItemId> {
        let mut project = self.project(prefix)?;
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
        }
        let priority = match new.priority {
            Some(priority) => check_priority(priority)?,
            None => self.config()?.default_priority,
        };
        let blocked_by = self.checked_blockers(&project, &new.blocked_by)?;

        let id = project.allocate_id(ItemKind::Task);
        let mut task = Task::new(id.clone(), title, priority, Utc::now());
        task.tags = new.tags;
        task.notes = new.notes;
        task.due = new.due;
        task.auto_complete = new.auto_complete;
        task.blocked_by = blocked_by;
        project.tasks.push(task);

        self.store.save_project(&project)?;
        info!(task = %id, "added task");
        Ok(id)
    }

    pub fn add_wait(&self, prefix: &str, new: NewWait) -> Result<ItemId> {
        let mut project = self.project(prefix)?;
        let title = new
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty());
        match &new.criteria {
            ResolutionCriteria::Time { after: None } => {
                return Err(Error::InvalidArgument("a time wait needs --after".to_string()));
            }
            ResolutionCriteria::Manual { question, .. } => {
                let has_question = question.as_deref().is_some_and(|q| !q.trim().is_empty());
                if !has_question && title.is_none() {
                    return Err(Error::InvalidArgument(
                        "a manual wait needs a question or a title".to_string(),
                    ));
                }
            }
            ResolutionCriteria::Unknown => {
                return Err(Error::InvalidArgument("unknown resolution criteria".to_string()));
            }
            ResolutionCriteria::Time { .. } => {}
        }
        let blocked_by = self.checked_blockers(&project, &new.blocked_by)?;

        let id = project.allocate_id(ItemKind::Wait);
        let mut wait = Wait::new(id.clone(), new.criteria, Utc::now());
        wait.title = title;
        wait.blocked_by = blocked_by;
        project.waits.push(wait);

        self.store.save_project(&project)?;
        info!(wait = %id, "added wait");
        Ok(id)
    }

    pub fn edit_task(&self, id: &ItemId, edit: TaskEdit) -> Result<Task> {
        let mut project = self.store.load_project_by_id(id)?;
        if project.task(id).is_none() {
            return Err(not_found(&project, id));
        }
        let title = match edit.title {
            Some(title) if title.trim().is_empty() => {
                return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
            }
            Some(title) => Some(title.trim().to_string()),
            None => None,
        };
        let priority = edit.priority.map(check_priority).transpose()?;

        let display = project.display_id(id);
        let Some(task) = project.task_mut(id) else {
            return Err(Error::NotFound(display));
        };
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(priority) = priority {
            task.priority = priority;
        }
        if let Some(tags) = edit.tags {
            task.tags = tags;
        }
        if let Some(notes) = edit.notes {
            task.notes = Some(notes).filter(|n| !n.trim().is_empty());
        }
        if let Some(due) = edit.due {
            task.due = Some(due);
        }
        if let Some(auto_complete) = edit.auto_complete {
            task.auto_complete = auto_complete;
        }
        let updated = task.clone();

        self.store.save_project(&project)?;
        debug!(task = %id, "edited task");
        Ok(updated)
    }

    /// Make `id` wait on `blocker`. Rejects self-edges, duplicates and any
    /// edge that would close a cycle, across projects too.
    pub fn add_blocker(&self, id: &ItemId, blocker: &ItemId) -> Result<()> {
        let mut project = self.store.load_project_by_id(id)?;
        let item = project.item(id).ok_or_else(|| not_found(&project, id))?;
        if !item.status().is_open() {
            return Err(Error::NotOpen {
                id: project.display_id(id),
                status: item.status(),
            });
        }
        if id == blocker {
            return Err(Error::Cycle {
                path: project.display_ids(&[id.clone(), blocker.clone()]),
            });
        }
        if item.blocked_by().contains(blocker) {
            return Err(Error::InvalidArgument(format!(
                "{} is already blocked by {}",
                project.display_id(id),
                project.display_id(blocker)
            )));
        }
        self.checked_blockers(&project, std::slice::from_ref(blocker))?;

        if project.owns(blocker) {
            if let Some(path) = DependencyGraph::build(&project).check_cycle(id, blocker) {
                return Err(Error::Cycle {
                    path: project.display_ids(&path),
                });
            }
        } else {
            let others = self.other_projects(&project.prefix)?;
            let graph = DependencyGraph::build_many(std::iter::once(&project).chain(others.values()));
            if let Some(path) = graph.check_cycle(id, blocker) {
                let mut status = BlockerStatus::compute(&project);
                others.values().for_each(|other| status.extend(other));
                return Err(Error::Cycle {
                    path: status.display_ids(&path),
                });
            }
        }

        if let Some(list) = project.blocked_by_mut(id) {
            list.push(blocker.clone());
        }
        self.store.save_project(&project)?;
        debug!(item = %id, blocker = %blocker, "added blocker");
        Ok(())
    }

    pub fn remove_blocker(&self, id: &ItemId, blocker: &ItemId) -> Result<()> {
        let mut project = self.store.load_project_by_id(id)?;
        let display = (project.display_id(id), project.display_id(blocker));
        let list = project
            .blocked_by_mut(id)
            .ok_or_else(|| Error::NotFound(display.0.clone()))?;
        if !list.contains(blocker) {
            return Err(Error::InvalidArgument(format!(
                "{} is not blocked by {}",
                display.0, display.1
            )));
        }
        list.retain(|entry| entry != blocker);

        self.store.save_project(&project)?;
        debug!(item = %id, blocker = %blocker, "removed blocker");
        Ok(())
    }

    /// Re-create an item in another project under a fresh ID and point every
    /// reference at the new ID. Returns the new ID.
    pub fn move_item(&self, id: &ItemId, dest: &str) -> Result<ItemId> {
        let dest = normalize_prefix(dest)?;
        let mut source = self.store.load_project_by_id(id)?;
        if source.prefix == dest {
            return Err(Error::InvalidArgument(format!(
                "{} is already in {dest}",
                source.display_id(id)
            )));
        }
        if !source.contains(id) {
            return Err(not_found(&source, id));
        }
        let mut target = self.store.load_project(&dest)?;

        let new_id = target.allocate_id(id.kind());
        if let Some(index) = source.tasks.iter().position(|t| &t.id == id) {
            let mut task = source.tasks.remove(index);
            task.id = new_id.clone();
            target.tasks.push(task);
        } else if let Some(index) = source.waits.iter().position(|w| &w.id == id) {
            let mut wait = source.waits.remove(index);
            wait.id = new_id.clone();
            target.waits.push(wait);
        }
        source.rewrite_references(id, &new_id);
        target.rewrite_references(id, &new_id);

        let mut others = Vec::new();
        for prefix in self.store.list_projects()? {
            if prefix == source.prefix || prefix == target.prefix {
                continue;
            }
            let mut other = self.store.load_project(&prefix)?;
            if other.rewrite_references(id, &new_id) > 0 {
                others.push(other);
            }
        }

        self.store.save_project(&target)?;
        self.store.save_project(&source)?;
        for other in &others {
            self.store.save_project(other)?;
        }
        info!(from = %id, to = %new_id, "moved item");
        Ok(new_id)
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    pub fn complete_task(&self, id: &ItemId, force: bool, now: DateTime<Utc>) -> Result<Cascade> {
        let mut project = self.store.load_project_by_id(id)?;
        let mut status = self.blocker_status(&project)?;
        let cascade = cascade::complete_task(&mut project, &mut status, id, force, now)?;
        self.store.save_project(&project)?;
        Ok(cascade)
    }

    /// Dependents are looked up in every project: one held elsewhere
    /// refuses the drop, is dropped with it or loses the reference, the same
    /// as a local one.
    pub fn drop_item(
        &self,
        id: &ItemId,
        reason: Option<String>,
        mode: DropMode,
        now: DateTime<Utc>,
    ) -> Result<DropOutcome> {
        let mut project = self.store.load_project_by_id(id)?;
        let mut others = self.other_projects(&project.prefix)?;
        let mut status = BlockerStatus::compute(&project);
        others.values().for_each(|other| status.extend(other));

        let graph = DependencyGraph::build_many(std::iter::once(&project).chain(others.values()));
        let is_open = |dependent: &ItemId| {
            let owner = if project.owns(dependent) {
                Some(&project)
            } else {
                others.get(dependent.prefix())
            };
            owner
                .and_then(|owner| owner.item(dependent))
                .is_some_and(|item| item.status().is_open())
        };
        let open_dependents: Vec<ItemId> = graph
            .blocking(id)
            .into_iter()
            .filter(|dependent| is_open(dependent))
            .collect();
        if mode == DropMode::Refuse && open_dependents.iter().any(|d| !project.owns(d)) {
            return Err(Error::Dependents {
                id: project.display_id(id),
                dependents: status.display_ids(&open_dependents),
            });
        }
        let reachable = graph.transitive_blocking(id);

        let mut outcome = cascade::drop_item(&mut project, &mut status, id, reason.clone(), mode, now)?;

        let mut touched = BTreeSet::new();
        match mode {
            DropMode::Refuse => {}
            DropMode::DropDependents => {
                for dependent in reachable {
                    let owner = if project.owns(&dependent) {
                        Some(&mut project)
                    } else {
                        others.get_mut(dependent.prefix())
                    };
                    let Some(owner) = owner else {
                        continue;
                    };
                    let open = owner
                        .item(&dependent)
                        .is_some_and(|item| item.status().is_open());
                    if open && owner.mark_dropped(&dependent, now, reason.clone()) {
                        touched.insert(owner.prefix.clone());
                        status.mark_resolved(&dependent);
                        outcome.dropped.push(dependent);
                    }
                }
            }
            DropMode::RemoveReferences => {
                for other in others.values_mut() {
                    let removed = other.remove_references(id);
                    if !removed.is_empty() {
                        touched.insert(other.prefix.clone());
                        outcome.unreferenced.extend(removed);
                    }
                }
            }
        }

        if !touched.is_empty() {
            loop {
                let mut changed = false;
                for owner in std::iter::once(&mut project).chain(others.values_mut()) {
                    let completed = cascade::process_auto_complete(owner, &mut status, now);
                    if !completed.is_empty() {
                        touched.insert(owner.prefix.clone());
                        outcome.auto_completed.extend(completed);
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }
        }

        self.store.save_project(&project)?;
        for prefix in &touched {
            if let Some(other) = others.get(prefix) {
                self.store.save_project(other)?;
            }
        }
        if !touched.is_empty() {
            info!(item = %id, projects = touched.len(), "drop reached other projects");
        }
        Ok(outcome)
    }

    pub fn reopen_task(&self, id: &ItemId) -> Result<()> {
        let mut project = self.store.load_project_by_id(id)?;
        let mut status = self.blocker_status(&project)?;
        cascade::reopen_task(&mut project, &mut status, id)?;
        self.store.save_project(&project)
    }

    pub fn defer_task(&self, id: &ItemId, until: DateTime<Utc>, now: DateTime<Utc>) -> Result<ItemId> {
        let mut project = self.store.load_project_by_id(id)?;
        let mut status = self.blocker_status(&project)?;
        let wait = cascade::defer_task(&mut project, &mut status, id, until, now)?;
        self.store.save_project(&project)?;
        Ok(wait)
    }

    pub fn resolve_wait(
        &self,
        id: &ItemId,
        resolution: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Cascade> {
        let mut project = self.store.load_project_by_id(id)?;
        let mut status = self.blocker_status(&project)?;
        let cascade = cascade::resolve_wait(&mut project, &mut status, id, resolution, now)?;
        self.store.save_project(&project)?;
        Ok(cascade)
    }

    pub fn defer_wait(&self, id: &ItemId, until: DateTime<Utc>) -> Result<()> {
        let mut project = self.store.load_project_by_id(id)?;
        cascade::defer_wait(&mut project, id, until)?;
        self.store.save_project(&project)
    }

    /// Resolve elapsed time waits and run auto-complete across every
    /// project until nothing changes. Only mutated projects are saved.
    pub fn run_periodic_check(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        let mut projects = BTreeMap::new();
        for prefix in self.store.list_projects()? {
            let project = self.store.load_project(&prefix)?;
            projects.insert(prefix, project);
        }

        let mut status = BlockerStatus::default();
        for project in projects.values() {
            status.extend(project);
        }

        let mut outcome = CheckOutcome::default();
        let mut mutated = BTreeSet::new();
        loop {
            let mut changed = false;
            for (prefix, project) in projects.iter_mut() {
                let round = cascade::check_project(project, &mut status, now);
                if !round.is_empty() {
                    mutated.insert(prefix.clone());
                    outcome.merge(round);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        for prefix in &mutated {
            if let Some(project) = projects.get(prefix) {
                self.store.save_project(project)?;
            }
        }
        if !outcome.is_empty() {
            info!(
                resolved = outcome.resolved.len(),
                auto_completed = outcome.auto_completed.len(),
                projects = mutated.len(),
                "periodic check"
            );
        }
        Ok(outcome)
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn views(&self, prefix: &str, now: DateTime<Utc>) -> Result<Vec<ItemView>> {
        let project = self.project(prefix)?;
        let status = self.blocker_status(&project)?;
        let mut views: Vec<ItemView> = project
            .items()
            .map(|item| ItemView::new(&project, item, &status, now))
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(views)
    }

    pub fn show(&self, id: &ItemId, now: DateTime<Utc>) -> Result<ItemDetail> {
        let project = self.store.load_project_by_id(id)?;
        let item = project.item(id).ok_or_else(|| not_found(&project, id))?;
        let status = self.blocker_status(&project)?;
        Ok(ItemDetail {
            item: ItemView::new(&project, item, &status, now),
            blocking: project.display_ids(&DependencyGraph::build(&project).blocking(id)),
        })
    }

    // =========================================================================
    // Validation
    // =========================================================================

    pub fn validate_project(&self, prefix: &str, fix: bool) -> Result<ValidationReport> {
        let mut project = self.project(prefix)?;
        let external = self.external_index(&project.prefix)?;
        if !fix {
            return Ok(ValidationReport {
                issues: validate_with(&project, Some(&external)),
                repairs: Vec::new(),
            });
        }

        let report = validate_and_fix(&mut project, Some(&external));
        if !report.repairs.is_empty() {
            self.store.save_project(&project)?;
        }
        Ok(report)
    }

    pub fn validate_all(&self, fix: bool) -> Result<Vec<(String, ValidationReport)>> {
        let mut reports = Vec::new();
        for prefix in self.store.list_projects()? {
            let report = self.validate_project(&prefix, fix)?;
            reports.push((prefix, report));
        }
        Ok(reports)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Every project except `prefix`, keyed by prefix.
    fn other_projects(&self, prefix: &str) -> Result<BTreeMap<String, Project>> {
        let mut others = BTreeMap::new();
        for other in self.store.list_projects()? {
            if other != prefix {
                let project = self.store.load_project(&other)?;
                others.insert(other, project);
            }
        }
        Ok(others)
    }

    /// Status map for `project` plus every project its items point into.
    fn blocker_status(&self, project: &Project) -> Result<BlockerStatus> {
        let mut status = BlockerStatus::compute(project);
        let foreign: BTreeSet<&str> = project
            .items()
            .flat_map(|item| item.blocked_by())
            .filter(|id| id.is_well_formed())
            .map(ItemId::prefix)
            .filter(|prefix| *prefix != project.prefix)
            .collect();
        for prefix in foreign {
            if self.store.project_exists(prefix)? {
                status.extend(&self.store.load_project(prefix)?);
            }
        }
        Ok(status)
    }

    /// Every blocker must name an existing item. Duplicates collapse.
    fn checked_blockers(&self, project: &Project, blockers: &[ItemId]) -> Result<Vec<ItemId>> {
        let mut checked: Vec<ItemId> = Vec::new();
        let mut loaded: BTreeMap<String, Project> = BTreeMap::new();
        for blocker in blockers {
            let exists = if project.owns(blocker) {
                project.contains(blocker)
            } else {
                let prefix = blocker.prefix().to_string();
                if !loaded.contains_key(&prefix) && self.store.project_exists(&prefix)? {
                    loaded.insert(prefix.clone(), self.store.load_project(&prefix)?);
                }
                loaded
                    .get(&prefix)
                    .is_some_and(|other| other.contains(blocker))
            };
            if !exists {
                return Err(Error::NotFound(project.display_id(blocker)));
            }
            if !checked.contains(blocker) {
                checked.push(blocker.clone());
            }
        }
        Ok(checked)
    }

    /// IDs of every item outside `prefix`.
    fn external_index(&self, prefix: &str) -> Result<HashSet<ItemId>> {
        let mut index = HashSet::new();
        for other in self.store.list_projects()? {
            if other == prefix {
                continue;
            }
            let project = self.store.load_project(&other)?;
            index.extend(project.items().map(|item| item.id().clone()));
        }
        Ok(index)
    }
}

fn check_priority(priority: u8) -> Result<u8> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(Error::InvalidArgument(format!(
            "priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}"
        )))
    }
}

fn not_found(project: &Project, id: &ItemId) -> Error {
    Error::NotFound(project.display_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{TaskState, WaitState};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::cell::RefCell;

    fn tracker() -> Tracker<MemoryStore> {
        let tracker = Tracker::new(MemoryStore::new());
        tracker.create_project("ab", "Alpha").expect("project");
        tracker
    }

    fn task(tracker: &Tracker<MemoryStore>, title: &str, blocked_by: &[ItemId], auto: bool) -> ItemId {
        tracker
            .add_task(
                "AB",
                NewTask {
                    title: title.to_string(),
                    blocked_by: blocked_by.to_vec(),
                    auto_complete: auto,
                    ..NewTask::default()
                },
            )
            .expect("add task")
    }

    fn time_wait(tracker: &Tracker<MemoryStore>, after: DateTime<Utc>) -> ItemId {
        tracker
            .add_wait(
                "AB",
                NewWait {
                    title: Some("cool-off".to_string()),
                    criteria: ResolutionCriteria::time(after),
                    blocked_by: Vec::new(),
                },
            )
            .expect("add wait")
    }

    fn status_of(tracker: &Tracker<MemoryStore>, id: &ItemId) -> Status {
        tracker.show(id, Utc::now()).expect("show").item.status
    }

    #[test]
    fn create_project_rejects_duplicates_and_bad_prefixes() {
        let tracker = tracker();
        assert!(matches!(
            tracker.create_project("AB", ""),
            Err(Error::ProjectExists(_))
        ));
        assert!(matches!(
            tracker.create_project("A", ""),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn add_task_uses_defaults_and_checks_blockers() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        assert_eq!(t1, ItemId::task("AB", 1));
        let project = tracker.project("AB").expect("project");
        assert_eq!(project.task(&t1).expect("t1").priority, 2);

        let err = tracker
            .add_task(
                "AB",
                NewTask {
                    title: "dangling".to_string(),
                    blocked_by: vec![ItemId::task("AB", 42)],
                    ..NewTask::default()
                },
            )
            .expect_err("orphan");
        assert!(matches!(err, Error::NotFound(_)));

        let err = tracker
            .add_task(
                "AB",
                NewTask {
                    title: "loud".to_string(),
                    priority: Some(5),
                    ..NewTask::default()
                },
            )
            .expect_err("priority");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(tracker.project("AB").expect("project").next_id, 2);
    }

    #[test]
    fn scenario_complete_without_blockers() {
        let tracker = tracker();
        let t1 = task(&tracker, "solo", &[], false);
        let cascade = tracker.complete_task(&t1, false, Utc::now()).expect("complete");
        assert!(cascade.unblocked.is_empty());
        assert_eq!(status_of(&tracker, &t1), Status::Done);
    }

    #[test]
    fn scenario_incomplete_blockers() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        let t2 = task(&tracker, "second", &[t1.clone()], false);

        match tracker.complete_task(&t2, false, Utc::now()) {
            Err(Error::IncompleteBlockers { blockers, .. }) => assert_eq!(blockers, vec![t1.to_string()]),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(status_of(&tracker, &t2), Status::Open);

        let cascade = tracker.complete_task(&t1, false, Utc::now()).expect("complete");
        assert_eq!(cascade.unblocked, vec![t2]);
    }

    #[test]
    fn scenario_auto_complete_chain() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        let t2 = task(&tracker, "second", &[t1.clone()], true);
        let t3 = task(&tracker, "third", &[t2.clone()], true);

        let cascade = tracker.complete_task(&t1, false, Utc::now()).expect("complete");
        assert_eq!(cascade.auto_completed, vec![t2.clone(), t3.clone()]);
        for id in [&t1, &t2, &t3] {
            assert_eq!(status_of(&tracker, id), Status::Done);
        }
    }

    #[test]
    fn scenario_cycle_rejected() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        let t2 = task(&tracker, "second", &[t1.clone()], false);
        let t3 = task(&tracker, "third", &[t2.clone()], false);
        let before = tracker.project("AB").expect("project");

        match tracker.add_blocker(&t1, &t3) {
            Err(Error::Cycle { path }) => {
                for id in [&t1, &t2, &t3] {
                    assert!(path.contains(&id.to_string()), "{id} missing from {path:?}");
                }
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(tracker.project("AB").expect("project"), before);
        assert!(matches!(tracker.add_blocker(&t1, &t1), Err(Error::Cycle { .. })));
    }

    #[test]
    fn scenario_periodic_check_resolves_and_completes() {
        let tracker = tracker();
        let after = Utc::now() - Duration::minutes(5);
        let w1 = time_wait(&tracker, after);
        let t = task(&tracker, "after wait", &[w1.clone()], true);

        let outcome = tracker.run_periodic_check(after).expect("check");
        assert_eq!(outcome.resolved, vec![w1.clone()]);
        assert_eq!(outcome.auto_completed, vec![t.clone()]);
        assert_eq!(status_of(&tracker, &w1), Status::Done);
        assert_eq!(status_of(&tracker, &t), Status::Done);

        let again = tracker.run_periodic_check(after).expect("check again");
        assert!(again.is_empty());
    }

    #[test]
    fn periodic_check_crosses_projects() {
        let tracker = tracker();
        tracker.create_project("CD", "").expect("project");
        let after = Utc::now() - Duration::hours(1);
        let w1 = time_wait(&tracker, after);
        let other = tracker
            .add_task(
                "CD",
                NewTask {
                    title: "downstream".to_string(),
                    blocked_by: vec![w1.clone()],
                    auto_complete: true,
                    ..NewTask::default()
                },
            )
            .expect("add");

        let outcome = tracker.run_periodic_check(Utc::now()).expect("check");
        assert_eq!(outcome.resolved, vec![w1]);
        assert_eq!(outcome.auto_completed, vec![other.clone()]);
        assert_eq!(status_of(&tracker, &other), Status::Done);
    }

    /// Records every save so tests can see which projects were written.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        saves: RefCell<Vec<String>>,
    }

    impl Store for CountingStore {
        fn load_project(&self, prefix: &str) -> Result<Project> {
            self.inner.load_project(prefix)
        }

        fn save_project(&self, project: &Project) -> Result<()> {
            self.saves.borrow_mut().push(project.prefix.clone());
            self.inner.save_project(project)
        }

        fn list_projects(&self) -> Result<Vec<String>> {
            self.inner.list_projects()
        }

        fn delete_project(&self, prefix: &str) -> Result<()> {
            self.inner.delete_project(prefix)
        }

        fn project_exists(&self, prefix: &str) -> Result<bool> {
            self.inner.project_exists(prefix)
        }

        fn load_config(&self) -> Result<Config> {
            self.inner.load_config()
        }
    }

    #[test]
    fn periodic_check_saves_only_mutated_projects() {
        let tracker = Tracker::new(CountingStore::default());
        tracker.create_project("AB", "").expect("project");
        tracker.create_project("CD", "").expect("project");
        let w1 = tracker
            .add_wait(
                "AB",
                NewWait {
                    title: Some("cool-off".to_string()),
                    criteria: ResolutionCriteria::time(Utc::now() - Duration::hours(1)),
                    blocked_by: Vec::new(),
                },
            )
            .expect("add wait");
        tracker
            .add_task(
                "CD",
                NewTask {
                    title: "idle".to_string(),
                    ..NewTask::default()
                },
            )
            .expect("add task");
        tracker.store().saves.borrow_mut().clear();

        let now = Utc::now();
        let outcome = tracker.run_periodic_check(now).expect("check");
        assert_eq!(outcome.resolved, vec![w1]);
        assert_eq!(*tracker.store().saves.borrow(), vec!["AB".to_string()]);

        tracker.store().saves.borrow_mut().clear();
        assert!(tracker.run_periodic_check(now).expect("again").is_empty());
        assert!(tracker.store().saves.borrow().is_empty());
    }

    #[test]
    fn drop_sees_dependents_in_other_projects() {
        let tracker = tracker();
        tracker.create_project("CD", "").expect("project");
        let t1 = task(&tracker, "shared", &[], false);
        let outside = tracker
            .add_task(
                "CD",
                NewTask {
                    title: "outside".to_string(),
                    blocked_by: vec![t1.clone()],
                    ..NewTask::default()
                },
            )
            .expect("add");
        let downstream = tracker
            .add_task(
                "CD",
                NewTask {
                    title: "downstream".to_string(),
                    blocked_by: vec![outside.clone()],
                    ..NewTask::default()
                },
            )
            .expect("add");

        match tracker.drop_item(&t1, None, DropMode::Refuse, Utc::now()) {
            Err(Error::Dependents { dependents, .. }) => assert_eq!(dependents, vec!["CD-01".to_string()]),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(status_of(&tracker, &t1), Status::Open);

        let outcome = tracker
            .drop_item(&t1, Some("scrapped".to_string()), DropMode::DropDependents, Utc::now())
            .expect("drop");
        assert_eq!(outcome.dropped, vec![t1.clone(), outside.clone(), downstream.clone()]);
        assert_eq!(status_of(&tracker, &downstream), Status::Dropped);
        let other = tracker.project("CD").expect("other");
        assert_eq!(
            other.task(&outside).expect("outside").drop_reason.as_deref(),
            Some("scrapped")
        );
    }

    #[test]
    fn drop_removes_references_held_elsewhere() {
        let tracker = tracker();
        tracker.create_project("CD", "").expect("project");
        let t1 = task(&tracker, "finished", &[], false);
        let t2 = task(&tracker, "abandoned", &[], false);
        tracker.complete_task(&t1, false, Utc::now()).expect("complete");
        let outside = tracker
            .add_task(
                "CD",
                NewTask {
                    title: "outside".to_string(),
                    blocked_by: vec![t1.clone(), t2.clone()],
                    auto_complete: true,
                    ..NewTask::default()
                },
            )
            .expect("add");

        let outcome = tracker
            .drop_item(&t2, None, DropMode::RemoveReferences, Utc::now())
            .expect("drop");
        assert_eq!(outcome.unreferenced, vec![outside.clone()]);
        assert_eq!(outcome.auto_completed, vec![outside.clone()]);
        let other = tracker.project("CD").expect("other");
        assert_eq!(other.task(&outside).expect("outside").blocked_by, vec![t1]);
        assert_eq!(status_of(&tracker, &outside), Status::Done);
    }

    #[test]
    fn views_report_derived_state() {
        let tracker = tracker();
        let now = Utc::now();
        let w1 = time_wait(&tracker, now + Duration::days(1));
        let t2 = task(&tracker, "waiting", &[w1.clone()], false);
        let t3 = task(&tracker, "blocked", &[t2.clone()], false);

        let views = tracker.views("AB", now).expect("views");
        let states: Vec<ItemState> = views.iter().map(|v| v.state).collect();
        assert_eq!(
            states,
            vec![
                ItemState::Wait(WaitState::Pending),
                ItemState::Task(TaskState::Waiting),
                ItemState::Task(TaskState::Blocked),
            ]
        );

        let detail = tracker.show(&t2, now).expect("show");
        assert_eq!(detail.blocking, vec![t3.to_string()]);
        assert_eq!(detail.item.unresolved, vec![w1.to_string()]);
    }

    #[test]
    fn ids_are_padded_to_project_width() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        let t2 = task(&tracker, "second", &[t1.clone()], false);
        let mut project = tracker.project("AB").expect("project");
        project.next_id = 150;
        tracker.store().save_project(&project).expect("save");

        let detail = tracker.show(&t2, Utc::now()).expect("show");
        assert_eq!(detail.item.display_id, "AB-002");
        assert_eq!(detail.item.unresolved, vec!["AB-001".to_string()]);
        match tracker.complete_task(&t2, false, Utc::now()) {
            Err(err) => assert_eq!(err.to_string(), "AB-002 has incomplete blockers: AB-001"),
            Ok(_) => panic!("second task is still blocked"),
        }
        assert_eq!(tracker.id_widths().expect("widths").display(&t1), "AB-001");
    }

    #[test]
    fn defer_and_resolve() {
        let tracker = tracker();
        let now = Utc::now();
        let t1 = task(&tracker, "later", &[], false);
        let wait = tracker.defer_task(&t1, now + Duration::days(2), now).expect("defer");
        assert_eq!(
            tracker.show(&t1, now).expect("show").item.state,
            ItemState::Task(TaskState::Waiting)
        );

        let cascade = tracker
            .resolve_wait(&wait, Some("done early".to_string()), now)
            .expect("resolve");
        assert_eq!(cascade.unblocked, vec![t1]);
    }

    #[test]
    fn edit_task_validates() {
        let tracker = tracker();
        let t1 = task(&tracker, "draft", &[], false);
        let edited = tracker
            .edit_task(
                &t1,
                TaskEdit {
                    title: Some("final".to_string()),
                    priority: Some(1),
                    tags: Some(vec!["docs".to_string()]),
                    ..TaskEdit::default()
                },
            )
            .expect("edit");
        assert_eq!(edited.title, "final");
        assert_eq!(edited.priority, 1);

        let err = tracker
            .edit_task(
                &t1,
                TaskEdit {
                    priority: Some(0),
                    ..TaskEdit::default()
                },
            )
            .expect_err("priority");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn remove_blocker_requires_reference() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        let t2 = task(&tracker, "second", &[t1.clone()], false);
        assert!(tracker.remove_blocker(&t1, &t2).is_err());
        tracker.remove_blocker(&t2, &t1).expect("remove");
        assert!(tracker.show(&t2, Utc::now()).expect("show").item.blocked_by.is_empty());
    }

    #[test]
    fn move_item_rewrites_references() {
        let tracker = tracker();
        tracker.create_project("CD", "").expect("project");
        let t1 = task(&tracker, "movable", &[], false);
        let t2 = task(&tracker, "stays", &[t1.clone()], false);

        let moved = tracker.move_item(&t1, "cd").expect("move");
        assert_eq!(moved, ItemId::task("CD", 1));
        let source = tracker.project("AB").expect("source");
        assert!(!source.contains(&t1));
        assert_eq!(source.task(&t2).expect("t2").blocked_by, vec![moved.clone()]);
        assert_eq!(status_of(&tracker, &moved), Status::Open);
        assert!(tracker.validate_all(false).expect("validate").iter().all(|(_, r)| r.issues.is_empty()));
    }

    #[test]
    fn rename_project_rewrites_everything() {
        let tracker = tracker();
        tracker.create_project("CD", "").expect("project");
        let t1 = task(&tracker, "first", &[], false);
        let _t2 = task(&tracker, "second", &[t1.clone()], false);
        let outside = tracker
            .add_task(
                "CD",
                NewTask {
                    title: "outside".to_string(),
                    blocked_by: vec![t1.clone()],
                    ..NewTask::default()
                },
            )
            .expect("add");

        let renamed = tracker.rename_project("AB", "XY").expect("rename");
        assert_eq!(renamed.prefix, "XY");
        assert!(!tracker.store().project_exists("AB").expect("exists"));
        let project = tracker.project("XY").expect("renamed");
        assert_eq!(
            project.task(&ItemId::task("XY", 2)).expect("t2").blocked_by,
            vec![ItemId::task("XY", 1)]
        );
        let other = tracker.project("CD").expect("other");
        assert_eq!(
            other.task(&outside).expect("outside").blocked_by,
            vec![ItemId::task("XY", 1)]
        );
    }

    #[test]
    fn validate_with_fix_saves_repairs() {
        let tracker = tracker();
        let t1 = task(&tracker, "first", &[], false);
        let mut project = tracker.project("AB").expect("project");
        project.tasks[0].blocked_by.push(ItemId::task("ZZ", 3));
        tracker.store().save_project(&project).expect("save");

        let report = tracker.validate_project("AB", false).expect("validate");
        assert_eq!(report.issues.len(), 1);
        assert!(report.repairs.is_empty());

        let report = tracker.validate_project("AB", true).expect("fix");
        assert_eq!(report.repairs.len(), 1);
        let project = tracker.project("AB").expect("project");
        assert!(project.task(&t1).expect("t1").blocked_by.is_empty());
    }

    #[test]
    fn pick_project_falls_back_to_single_project() {
        let tracker = tracker();
        assert_eq!(tracker.pick_project(None).expect("only"), "AB");
        assert_eq!(tracker.pick_project(Some("cd")).expect("explicit"), "CD");
        tracker.create_project("CD", "").expect("project");
        assert!(tracker.pick_project(None).is_err());
    }
}
