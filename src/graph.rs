//! Dependency graph over blocked-by edges.
//!
//! Nodes are item IDs; an edge runs from a dependent to each of its blockers.
//! The graph is rebuilt from a snapshot for every operation and only ever
//! refers to items by ID, so it can describe a cyclic relation without any
//! ownership cycle. Keeping the relation acyclic is enforced here logically:
//! callers ask [`DependencyGraph::check_cycle`] before adding an edge.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::id::ItemId;
use crate::model::Project;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<ItemId>,
    /// dependent -> blockers, in blocked_by order
    blockers: HashMap<ItemId, Vec<ItemId>>,
    /// blocker -> dependents, sorted
    dependents: HashMap<ItemId, Vec<ItemId>>,
}

impl DependencyGraph {
    pub fn build(project: &Project) -> Self {
        Self::build_many([project])
    }

    /// One graph over several snapshots, for edges that cross projects.
    pub fn build_many<'a>(projects: impl IntoIterator<Item = &'a Project>) -> Self {
        let mut graph = Self::default();
        for project in projects {
            graph.add_project(project);
        }
        for list in graph.dependents.values_mut() {
            list.sort();
            list.dedup();
        }
        graph
    }

    fn add_project(&mut self, project: &Project) {
        for item in project.items() {
            let id = item.id().clone();
            self.nodes.insert(id.clone());
            for blocker in item.blocked_by() {
                self.blockers
                    .entry(id.clone())
                    .or_default()
                    .push(blocker.clone());
                self.dependents
                    .entry(blocker.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.nodes.contains(id)
    }

    pub fn blockers_of(&self, id: &ItemId) -> &[ItemId] {
        self.blockers.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Would adding `dependent -> candidate` close a cycle?
    ///
    /// Returns the cycle as `[dependent, candidate, .., dependent]` when
    /// `candidate` already depends on `dependent` through existing edges.
    pub fn check_cycle(&self, dependent: &ItemId, candidate: &ItemId) -> Option<Vec<ItemId>> {
        if dependent == candidate {
            return Some(vec![dependent.clone(), candidate.clone()]);
        }
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.path_to(candidate, dependent, &mut visited, &mut path) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(dependent.clone());
            cycle.extend(path);
            Some(cycle)
        } else {
            None
        }
    }

    fn path_to(
        &self,
        from: &ItemId,
        target: &ItemId,
        visited: &mut HashSet<ItemId>,
        path: &mut Vec<ItemId>,
    ) -> bool {
        path.push(from.clone());
        if from == target {
            return true;
        }
        if visited.insert(from.clone()) {
            for next in self.blockers_of(from) {
                if self.path_to(next, target, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    /// Direct dependents: every item whose blocked_by contains `id`.
    pub fn blocking(&self, id: &ItemId) -> Vec<ItemId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }

    /// Every dependent reachable through `blocking`, breadth first.
    pub fn transitive_blocking(&self, id: &ItemId) -> Vec<ItemId> {
        let mut seen: HashSet<ItemId> = HashSet::new();
        seen.insert(id.clone());
        let mut queue: VecDeque<ItemId> = self.blocking(id).into();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for next in self.blocking(&current) {
                if !seen.contains(&next) {
                    queue.push_back(next);
                }
            }
            result.push(current);
        }

        result
    }

    /// Cycles made of edges that exist in the snapshot, each reported once.
    ///
    /// Edges pointing at IDs absent from the snapshot are ignored; those are
    /// orphans, not cycles.
    pub fn find_cycles(&self) -> Vec<Vec<ItemId>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();
        let mut reported: HashSet<BTreeSet<ItemId>> = HashSet::new();
        let mut cycles = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.collect_cycles(
                    node,
                    &mut visited,
                    &mut on_stack,
                    &mut path,
                    &mut reported,
                    &mut cycles,
                );
            }
        }

        cycles
    }

    fn collect_cycles(
        &self,
        node: &ItemId,
        visited: &mut HashSet<ItemId>,
        on_stack: &mut HashSet<ItemId>,
        path: &mut Vec<ItemId>,
        reported: &mut HashSet<BTreeSet<ItemId>>,
        cycles: &mut Vec<Vec<ItemId>>,
    ) {
        visited.insert(node.clone());
        on_stack.insert(node.clone());
        path.push(node.clone());

        for next in self.blockers_of(node) {
            if !self.nodes.contains(next) {
                continue;
            }
            if on_stack.contains(next) {
                let Some(start) = path.iter().position(|id| id == next) else {
                    continue;
                };
                let mut cycle: Vec<ItemId> = path[start..].to_vec();
                cycle.push(next.clone());
                let members: BTreeSet<ItemId> = cycle.iter().cloned().collect();
                if reported.insert(members) {
                    cycles.push(cycle);
                }
            } else if !visited.contains(next) {
                self.collect_cycles(next, visited, on_stack, path, reported, cycles);
            }
        }

        path.pop();
        on_stack.remove(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolutionCriteria, Task, Wait};
    use chrono::Utc;

    fn task(seq: u32, blocked_by: &[u32]) -> Task {
        let mut task = Task::new(ItemId::task("AB", seq), format!("task {seq}"), 2, Utc::now());
        task.blocked_by = blocked_by.iter().map(|s| ItemId::task("AB", *s)).collect();
        task
    }

    fn chain() -> Project {
        let mut project = Project::new("AB", "");
        project.tasks = vec![task(1, &[]), task(2, &[1]), task(3, &[2])];
        project.next_id = 4;
        project
    }

    #[test]
    fn check_cycle_reports_full_path() {
        let graph = DependencyGraph::build(&chain());
        let t1 = ItemId::task("AB", 1);
        let t3 = ItemId::task("AB", 3);
        let path = graph.check_cycle(&t1, &t3).expect("cycle");
        assert_eq!(
            path,
            vec![
                t1.clone(),
                t3.clone(),
                ItemId::task("AB", 2),
                t1.clone()
            ]
        );
    }

    #[test]
    fn check_cycle_allows_safe_edges() {
        let graph = DependencyGraph::build(&chain());
        assert!(graph
            .check_cycle(&ItemId::task("AB", 3), &ItemId::task("AB", 1))
            .is_none());
        assert!(graph
            .check_cycle(&ItemId::task("AB", 1), &ItemId::task("AB", 9))
            .is_none());
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let graph = DependencyGraph::build(&chain());
        let id = ItemId::task("AB", 2);
        assert_eq!(graph.check_cycle(&id, &id), Some(vec![id.clone(), id]));
    }

    #[test]
    fn blocking_and_transitive_blocking() {
        let mut project = chain();
        let mut wait = Wait::new(ItemId::wait("AB", 4), ResolutionCriteria::time(Utc::now()), Utc::now());
        wait.blocked_by.push(ItemId::task("AB", 1));
        project.waits.push(wait);
        let graph = DependencyGraph::build(&project);

        assert_eq!(
            graph.blocking(&ItemId::task("AB", 1)),
            vec![ItemId::task("AB", 2), ItemId::wait("AB", 4)]
        );
        assert_eq!(
            graph.transitive_blocking(&ItemId::task("AB", 1)),
            vec![ItemId::task("AB", 2), ItemId::wait("AB", 4), ItemId::task("AB", 3)]
        );
        assert!(graph.blocking(&ItemId::task("AB", 3)).is_empty());
    }

    #[test]
    fn find_cycles_reports_each_cycle_once() {
        let mut project = Project::new("AB", "");
        project.tasks = vec![
            task(1, &[3]),
            task(2, &[1]),
            task(3, &[2]),
            task(4, &[5]),
            task(5, &[4, 99]),
            task(6, &[1]),
        ];
        let graph = DependencyGraph::build(&project);
        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 2);
        assert_eq!(
            cycles[0],
            vec![
                ItemId::task("AB", 1),
                ItemId::task("AB", 3),
                ItemId::task("AB", 2),
                ItemId::task("AB", 1)
            ]
        );
        assert_eq!(
            cycles[1],
            vec![ItemId::task("AB", 4), ItemId::task("AB", 5), ItemId::task("AB", 4)]
        );
    }

    #[test]
    fn cross_project_cycle_needs_both_snapshots() {
        let mut alpha = Project::new("AB", "");
        alpha.tasks = vec![task(1, &[])];
        alpha.tasks[0].blocked_by = vec![ItemId::task("CD", 1)];
        let mut gamma = Project::new("CD", "");
        gamma.tasks = vec![Task::new(ItemId::task("CD", 1), "c", 2, Utc::now())];

        let gamma_id = ItemId::task("CD", 1);
        let alpha_id = ItemId::task("AB", 1);
        assert!(DependencyGraph::build(&gamma)
            .check_cycle(&gamma_id, &alpha_id)
            .is_none());
        let path = DependencyGraph::build_many([&alpha, &gamma])
            .check_cycle(&gamma_id, &alpha_id)
            .expect("cycle");
        assert_eq!(path, vec![gamma_id.clone(), alpha_id, gamma_id]);
    }

    #[test]
    fn acyclic_snapshot_has_no_cycles() {
        let graph = DependencyGraph::build(&chain());
        assert!(graph.find_cycles().is_empty());
    }
}
