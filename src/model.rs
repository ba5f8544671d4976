//! Tasks, waits and the project snapshot that owns them.
//!
//! Items never point at each other directly: a `blocked_by` list holds
//! [`ItemId`]s that are resolved through the owning [`Project`] (or, for
//! cross-project references, through another project's snapshot).

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{id_width, ItemId, ItemKind};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 4;
/// Reserved for "not assigned yet"; new tasks always get a concrete value.
pub const UNSET_PRIORITY: u8 = 0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Done,
    Dropped,
}

impl Status {
    /// Done and dropped are absorbing: such an item always counts as resolved.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Dropped)
    }

    pub fn is_open(self) -> bool {
        self == Status::Open
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Open => write!(f, "open"),
            Status::Done => write!(f, "done"),
            Status::Dropped => write!(f, "dropped"),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<String>,
}

impl Task {
    pub fn new(id: ItemId, title: impl Into<String>, priority: u8, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            status: Status::Open,
            priority,
            tags: Vec::new(),
            notes: None,
            auto_complete: false,
            due: None,
            blocked_by: Vec::new(),
            created_at: Some(now),
            done_at: None,
            dropped_at: None,
            drop_reason: None,
        }
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = Status::Done;
        self.done_at = Some(now);
    }

    pub fn mark_dropped(&mut self, now: DateTime<Utc>, reason: Option<String>) {
        self.status = Status::Dropped;
        self.dropped_at = Some(now);
        self.drop_reason = reason;
    }

    pub fn reopen(&mut self) {
        self.status = Status::Open;
        self.done_at = None;
        self.dropped_at = None;
        self.drop_reason = None;
    }
}

/// How a wait gets resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionCriteria {
    /// Resolves once `after` has passed and the periodic check runs.
    Time {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<DateTime<Utc>>,
    },
    /// Needs a human answer; surfaced as actionable from `check_after` on.
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        check_after: Option<DateTime<Utc>>,
    },
    #[serde(other)]
    Unknown,
}

impl ResolutionCriteria {
    pub fn time(after: DateTime<Utc>) -> Self {
        ResolutionCriteria::Time { after: Some(after) }
    }

    pub fn manual(question: impl Into<String>, check_after: Option<DateTime<Utc>>) -> Self {
        ResolutionCriteria::Manual {
            question: Some(question.into()),
            check_after,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionCriteria::Time { .. } => "time",
            ResolutionCriteria::Manual { .. } => "manual",
            ResolutionCriteria::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wait {
    pub id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_criteria: Option<ResolutionCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<String>,
}

impl Wait {
    pub fn new(id: ItemId, criteria: ResolutionCriteria, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: None,
            status: Status::Open,
            resolution_criteria: Some(criteria),
            resolution: None,
            blocked_by: Vec::new(),
            created_at: Some(now),
            done_at: None,
            dropped_at: None,
            drop_reason: None,
        }
    }

    /// Title, falling back to the manual question.
    pub fn label(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        match &self.resolution_criteria {
            Some(ResolutionCriteria::Manual {
                question: Some(question),
                ..
            }) => question.clone(),
            Some(ResolutionCriteria::Time { after: Some(after) }) => {
                format!("until {}", after.format("%Y-%m-%d %H:%M"))
            }
            _ => String::new(),
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self.resolution_criteria, Some(ResolutionCriteria::Time { .. }))
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>, resolution: Option<String>) {
        self.status = Status::Done;
        self.done_at = Some(now);
        self.resolution = resolution;
    }

    pub fn mark_dropped(&mut self, now: DateTime<Utc>, reason: Option<String>) {
        self.status = Status::Dropped;
        self.dropped_at = Some(now);
        self.drop_reason = reason;
    }
}

/// Borrowed view over either item kind.
#[derive(Debug, Clone, Copy)]
pub enum ItemRef<'a> {
    Task(&'a Task),
    Wait(&'a Wait),
}

impl<'a> ItemRef<'a> {
    pub fn id(&self) -> &'a ItemId {
        match *self {
            ItemRef::Task(task) => &task.id,
            ItemRef::Wait(wait) => &wait.id,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ItemRef::Task(task) => task.status,
            ItemRef::Wait(wait) => wait.status,
        }
    }

    pub fn blocked_by(&self) -> &'a [ItemId] {
        match *self {
            ItemRef::Task(task) => &task.blocked_by,
            ItemRef::Wait(wait) => &wait.blocked_by,
        }
    }

    pub fn title(&self) -> String {
        match self {
            ItemRef::Task(task) => task.title.clone(),
            ItemRef::Wait(wait) => wait.label(),
        }
    }
}

/// Full state of one project, loaded and saved as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default = "first_id")]
    pub next_id: u32,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub waits: Vec<Wait>,
}

fn first_id() -> u32 {
    1
}

impl Project {
    pub fn new(prefix: &str, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.trim().to_ascii_uppercase(),
            name: name.into(),
            next_id: first_id(),
            tasks: Vec::new(),
            waits: Vec::new(),
        }
    }

    /// Hand out the next sequence number; tasks and waits share the counter.
    pub fn allocate_id(&mut self, kind: ItemKind) -> ItemId {
        let seq = self.next_id.max(first_id());
        self.next_id = seq + 1;
        ItemId::new(&self.prefix, seq, kind)
    }

    pub fn id_width(&self) -> usize {
        id_width(self.next_id.saturating_sub(1))
    }

    /// User-facing form of an ID, padded to this project's width.
    pub fn display_id(&self, id: &ItemId) -> String {
        if id.prefix() == self.prefix {
            id.format(self.id_width())
        } else {
            id.to_string()
        }
    }

    pub fn display_ids(&self, ids: &[ItemId]) -> Vec<String> {
        ids.iter().map(|id| self.display_id(id)).collect()
    }

    pub fn owns(&self, id: &ItemId) -> bool {
        id.prefix() == self.prefix
    }

    pub fn task(&self, id: &ItemId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn task_mut(&mut self, id: &ItemId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| &task.id == id)
    }

    pub fn wait(&self, id: &ItemId) -> Option<&Wait> {
        self.waits.iter().find(|wait| &wait.id == id)
    }

    pub fn wait_mut(&mut self, id: &ItemId) -> Option<&mut Wait> {
        self.waits.iter_mut().find(|wait| &wait.id == id)
    }

    pub fn item(&self, id: &ItemId) -> Option<ItemRef<'_>> {
        self.task(id)
            .map(ItemRef::Task)
            .or_else(|| self.wait(id).map(ItemRef::Wait))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.item(id).is_some()
    }

    /// All items, tasks first, each group in stored order.
    pub fn items(&self) -> impl Iterator<Item = ItemRef<'_>> {
        self.tasks
            .iter()
            .map(ItemRef::Task)
            .chain(self.waits.iter().map(ItemRef::Wait))
    }

    pub fn blocked_by_mut(&mut self, id: &ItemId) -> Option<&mut Vec<ItemId>> {
        if let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) {
            return Some(&mut task.blocked_by);
        }
        self.waits
            .iter_mut()
            .find(|wait| &wait.id == id)
            .map(|wait| &mut wait.blocked_by)
    }

    /// Mark any item dropped. Returns false when the ID is unknown.
    pub fn mark_dropped(&mut self, id: &ItemId, now: DateTime<Utc>, reason: Option<String>) -> bool {
        if let Some(task) = self.task_mut(id) {
            task.mark_dropped(now, reason);
            return true;
        }
        if let Some(wait) = self.wait_mut(id) {
            wait.mark_dropped(now, reason);
            return true;
        }
        false
    }

    /// Strip `target` from every item's blocked_by. Returns the IDs touched.
    pub fn remove_references(&mut self, target: &ItemId) -> Vec<ItemId> {
        let mut touched = Vec::new();
        for task in &mut self.tasks {
            if task.blocked_by.contains(target) {
                task.blocked_by.retain(|id| id != target);
                touched.push(task.id.clone());
            }
        }
        for wait in &mut self.waits {
            if wait.blocked_by.contains(target) {
                wait.blocked_by.retain(|id| id != target);
                touched.push(wait.id.clone());
            }
        }
        touched.sort();
        touched
    }

    /// Replace every reference to `from` with `to`.
    pub fn rewrite_references(&mut self, from: &ItemId, to: &ItemId) -> usize {
        let mut count = 0;
        let lists = self
            .tasks
            .iter_mut()
            .map(|task| &mut task.blocked_by)
            .chain(self.waits.iter_mut().map(|wait| &mut wait.blocked_by));
        for list in lists {
            for entry in list.iter_mut() {
                if entry == from {
                    *entry = to.clone();
                    count += 1;
                }
            }
        }
        count
    }

    /// Deterministic order used when a snapshot is written.
    pub fn sort_items(&mut self) {
        self.tasks.sort_by(|a, b| a.id.cmp(&b.id));
        self.waits.sort_by(|a, b| a.id.cmp(&b.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_shared_across_kinds() {
        let mut project = Project::new("ab", "Alpha");
        assert_eq!(project.prefix, "AB");
        assert_eq!(project.allocate_id(ItemKind::Task), ItemId::task("AB", 1));
        assert_eq!(project.allocate_id(ItemKind::Wait), ItemId::wait("AB", 2));
        assert_eq!(project.allocate_id(ItemKind::Task), ItemId::task("AB", 3));
        assert_eq!(project.next_id, 4);
    }

    #[test]
    fn display_width_grows_with_counter() {
        let mut project = Project::new("AB", "");
        let id = ItemId::task("AB", 7);
        assert_eq!(project.display_id(&id), "AB-07");
        project.next_id = 101;
        assert_eq!(project.display_id(&id), "AB-007");
        assert_eq!(project.display_id(&ItemId::task("CD", 7)), "CD-07");
    }

    #[test]
    fn reopen_clears_terminal_fields() {
        let now = Utc::now();
        let mut task = Task::new(ItemId::task("AB", 1), "Write", 2, now);
        task.mark_dropped(now, Some("no longer needed".to_string()));
        assert!(task.status.is_terminal());
        task.reopen();
        assert_eq!(task.status, Status::Open);
        assert!(task.dropped_at.is_none());
        assert!(task.drop_reason.is_none());
    }

    #[test]
    fn unknown_criteria_type_is_tolerated() {
        let yaml = "id: AB-02W\nresolution_criteria:\n  type: webhook\n";
        let wait: Wait = serde_yaml::from_str(yaml).expect("wait");
        assert_eq!(wait.resolution_criteria, Some(ResolutionCriteria::Unknown));
        assert_eq!(wait.status, Status::Open);
    }

    #[test]
    fn remove_references_reports_touched_items() {
        let now = Utc::now();
        let mut project = Project::new("AB", "");
        let blocker = ItemId::task("AB", 1);
        let mut task = Task::new(ItemId::task("AB", 2), "Two", 2, now);
        task.blocked_by.push(blocker.clone());
        let mut wait = Wait::new(ItemId::wait("AB", 3), ResolutionCriteria::time(now), now);
        wait.blocked_by.push(blocker.clone());
        project.tasks.push(task);
        project.waits.push(wait);

        let touched = project.remove_references(&blocker);
        assert_eq!(touched, vec![ItemId::task("AB", 2), ItemId::wait("AB", 3)]);
        assert!(project.items().all(|item| item.blocked_by().is_empty()));
    }
}
