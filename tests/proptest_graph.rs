//! Property-based tests for the dependency engine

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tw::cascade::process_auto_complete;
use tw::graph::DependencyGraph;
use tw::id::ItemId;
use tw::model::{Project, Status, Task};
use tw::state::{resolve_task_state, BlockerStatus, TaskState};

// Tasks AB-01..AB-n; task i may only be blocked by tasks with a lower index,
// which keeps the generated graph acyclic.
fn build_project(size: usize, edges: &[bool], auto: &[bool], done: &[bool]) -> Project {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("time");
    let mut project = Project::new("AB", "");
    project.next_id = size as u32 + 1;
    let mut edge = edges.iter().cycle();
    for i in 0..size {
        let mut task = Task::new(ItemId::task("AB", i as u32 + 1), format!("task {i}"), 2, now);
        for j in 0..i {
            if *edge.next().unwrap_or(&false) {
                task.blocked_by.push(ItemId::task("AB", j as u32 + 1));
            }
        }
        task.auto_complete = auto[i % auto.len()];
        if done[i % done.len()] && !task.auto_complete {
            task.mark_done(now);
        }
        project.tasks.push(task);
    }
    project
}

fn reaches(project: &Project, from: &ItemId, target: &ItemId) -> bool {
    let mut stack = vec![from.clone()];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if &id == target {
            return true;
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(task) = project.task(&id) {
            stack.extend(task.blocked_by.iter().cloned());
        }
    }
    false
}

proptest! {
    #[test]
    fn generated_graphs_have_no_cycles(
        size in 1..12usize,
        edges in prop::collection::vec(any::<bool>(), 1..80),
    ) {
        let project = build_project(size, &edges, &[false], &[false]);
        let graph = DependencyGraph::build(&project);
        prop_assert!(graph.find_cycles().is_empty());
    }

    #[test]
    fn check_cycle_matches_reachability(
        size in 2..12usize,
        edges in prop::collection::vec(any::<bool>(), 1..80),
        pick in (0usize..100, 0usize..100),
    ) {
        let project = build_project(size, &edges, &[false], &[false]);
        let graph = DependencyGraph::build(&project);
        let low = ItemId::task("AB", (pick.0 % size) as u32 + 1);
        let high = ItemId::task("AB", (pick.1 % size) as u32 + 1);

        let cycle = graph.check_cycle(&low, &high);
        prop_assert_eq!(cycle.is_some(), low == high || reaches(&project, &high, &low));

        if let Some(path) = cycle {
            prop_assert_eq!(path.first(), Some(&low));
            prop_assert_eq!(path.last(), Some(&low));
            for pair in path.windows(2).skip(1) {
                let blockers = graph.blockers_of(&pair[0]);
                prop_assert!(blockers.contains(&pair[1]));
            }
        }
    }

    #[test]
    fn auto_complete_reaches_a_fixpoint(
        size in 1..12usize,
        edges in prop::collection::vec(any::<bool>(), 1..80),
        auto in prop::collection::vec(any::<bool>(), 1..12),
        done in prop::collection::vec(any::<bool>(), 1..12),
    ) {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("time");
        let mut project = build_project(size, &edges, &auto, &done);
        let mut status = BlockerStatus::compute(&project);

        let completed = process_auto_complete(&mut project, &mut status, now);
        for id in &completed {
            let task = project.task(id).expect("completed task");
            prop_assert_eq!(task.status, Status::Done);
            prop_assert!(task.auto_complete);
            prop_assert!(!task.blocked_by.is_empty());
        }

        let again = process_auto_complete(&mut project, &mut status, now);
        prop_assert!(again.is_empty());

        for task in &project.tasks {
            let state = resolve_task_state(task, &status);
            if task.auto_complete && !task.blocked_by.is_empty() {
                prop_assert_ne!(state, TaskState::Ready);
            }
            prop_assert_eq!(state, resolve_task_state(task, &status));
        }
    }
}
