// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Forward adjacency (`id -> dependents`) shared by the capability graph of a
//! rule set and the node graph of a subject DAG.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::config::rule::{InputSource, RuleConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph(pub HashMap<String, Vec<String>>);

impl DependencyGraph {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Capability graph of a rule set: producer capability -> consumer capabilities.
    ///
    /// An edge exists when a rule of the consumer reads an output declared by a
    /// rule of the producer.
    pub fn from_rules(rules: &[RuleConfig]) -> Self {
        let mut producers: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for rule in rules {
            for output in &rule.outputs {
                producers
                    .entry(output.name.as_str())
                    .or_default()
                    .insert(rule.capability.as_str());
            }
        }

        let mut graph = Self::new();
        for rule in rules {
            graph.add_node(&rule.capability);
            for input in &rule.inputs {
                if let InputSource::Named(name) = input.source() {
                    if let Some(capabilities) = producers.get(name) {
                        for producer in capabilities {
                            graph.add_edge(producer, &rule.capability);
                        }
                    }
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, id: &str) {
        self.0.entry(id.to_string()).or_default();
    }

    /// Adds `from -> to`; duplicate edges are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        let dependents = self.0.entry(from.to_string()).or_default();
        if !dependents.iter().any(|d| d == to) {
            dependents.push(to.to_string());
        }
    }

    pub fn get_dependents(&self, id: &str) -> Option<&Vec<String>> {
        self.0.get(id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inverts the graph: id -> the ids it depends on.
    pub fn build_reverse_dependencies(&self) -> HashMap<String, Vec<String>> {
        let mut reverse: HashMap<String, Vec<String>> =
            self.0.keys().map(|k| (k.clone(), Vec::new())).collect();
        for (id, dependents) in &self.0 {
            for dependent in dependents {
                reverse.entry(dependent.clone()).or_default().push(id.clone());
            }
        }
        for dependencies in reverse.values_mut() {
            dependencies.sort();
        }
        reverse
    }

    /// Every id reachable from `id`, excluding `id` itself, sorted.
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.0.get(current) {
                for dependent in dependents {
                    if seen.insert(dependent.clone()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        seen.remove(id);
        seen.into_iter().collect()
    }

    /// Kahn's algorithm. Returns in-degree per id and the topological rank
    /// (longest path from any root), or `None` when the graph has a cycle.
    pub fn dependency_counts_and_ranks(
        &self,
    ) -> Option<(HashMap<String, usize>, HashMap<String, usize>)> {
        let mut in_degree: HashMap<String, usize> =
            self.0.keys().map(|k| (k.clone(), 0)).collect();
        for dependents in self.0.values() {
            for dependent in dependents {
                *in_degree.entry(dependent.clone()).or_insert(0) += 1;
            }
        }

        let dependency_counts = in_degree.clone();
        let mut ranks: HashMap<String, usize> = HashMap::new();
        let mut queue: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &queue {
            ranks.insert(id.clone(), 0);
        }

        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            let rank = ranks.get(&id).copied().unwrap_or(0);
            if let Some(dependents) = self.0.get(&id) {
                for dependent in dependents {
                    let next = ranks.entry(dependent.clone()).or_insert(0);
                    *next = (*next).max(rank + 1);
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        if visited == in_degree.len() {
            Some((dependency_counts, ranks))
        } else {
            None
        }
    }

    /// Deterministic topological order: by rank, then id.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let (_, ranks) = self.dependency_counts_and_ranks()?;
        let mut order: Vec<String> = ranks.keys().cloned().collect();
        order.sort_by(|a, b| ranks[a].cmp(&ranks[b]).then_with(|| a.cmp(b)));
        Some(order)
    }

    /// Three-color DFS. Returns the first cycle found as a closed path
    /// (`a -> b -> a`). Ids are visited in sorted order so the reported
    /// cycle is stable between runs.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut ids: Vec<&String> = self.0.keys().collect();
        ids.sort();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for id in ids {
            if !visited.contains(id.as_str()) {
                if let Some(cycle) =
                    self.dfs_cycle_detection(id, &mut visited, &mut rec_stack, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle_detection(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(neighbors) = self.0.get(node) {
            let mut neighbors: Vec<&String> = neighbors.iter().collect();
            neighbors.sort();
            for neighbor in neighbors {
                if !visited.contains(neighbor.as_str()) {
                    if let Some(cycle) = self.dfs_cycle_detection(neighbor, visited, rec_stack, path)
                    {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(neighbor.as_str()) {
                    let cycle_start = path.iter().position(|x| x == neighbor).unwrap_or(0);
                    let mut cycle = path[cycle_start..].to_vec();
                    cycle.push(neighbor.clone());
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(node);
        path.pop();
        None
    }
}

impl From<HashMap<String, Vec<String>>> for DependencyGraph {
    fn from(graph: HashMap<String, Vec<String>>) -> Self {
        Self(graph)
    }
}

impl From<DependencyGraph> for HashMap<String, Vec<String>> {
    fn from(graph: DependencyGraph) -> Self {
        graph.0
    }
}
