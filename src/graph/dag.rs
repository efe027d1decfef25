// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, HashMap};

use crate::config::DependencyGraph;
use crate::errors::{BuildError, ValidationError};
use crate::graph::node::NodeSpec;

/// One subject's instantiated graph. Immutable once built.
#[derive(Debug, Clone)]
pub struct SubjectDag {
    subject: String,
    nodes: BTreeMap<String, NodeSpec>,
    graph: DependencyGraph,
    reverse: HashMap<String, Vec<String>>,
    ranks: HashMap<String, usize>,
}

impl SubjectDag {
    /// Edges come from node inputs. Fails on duplicate ids, dangling
    /// references or cycles.
    pub fn new(subject: &str, nodes: Vec<NodeSpec>) -> Result<Self, BuildError> {
        let cycle_error = |cycle: Vec<String>| BuildError::Cycle {
            subject: subject.to_string(),
            source: ValidationError::CyclicDependency { cycle },
        };

        let mut by_id = BTreeMap::new();
        for node in nodes {
            if by_id.contains_key(&node.id) {
                return Err(BuildError::Builder {
                    builder: "graph".to_string(),
                    rule_id: node.rule_id.clone(),
                    message: format!("duplicate node id '{}'", node.id),
                });
            }
            by_id.insert(node.id.clone(), node);
        }

        let mut graph = DependencyGraph::new();
        for node in by_id.values() {
            graph.add_node(&node.id);
            for dependency in node.dependencies() {
                if !by_id.contains_key(dependency) {
                    return Err(BuildError::Builder {
                        builder: "graph".to_string(),
                        rule_id: node.rule_id.clone(),
                        message: format!(
                            "node '{}' reads from unknown node '{}'",
                            node.id, dependency
                        ),
                    });
                }
                graph.add_edge(dependency, &node.id);
            }
        }

        let (_, ranks) = graph
            .dependency_counts_and_ranks()
            .ok_or_else(|| cycle_error(graph.find_cycle().unwrap_or_default()))?;
        let reverse = graph.build_reverse_dependencies();

        Ok(Self {
            subject: subject.to_string(),
            nodes: by_id,
            graph,
            reverse,
            ranks,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.0.values().map(Vec::len).sum()
    }

    /// Direct upstream node ids.
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.reverse.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct downstream node ids.
    pub fn dependents(&self, id: &str) -> &[String] {
        self.graph.get_dependents(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node reachable downstream of `id`.
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        self.graph.transitive_dependents(id)
    }

    /// Longest path from a root; roots are rank 0.
    pub fn rank(&self, id: &str) -> Option<usize> {
        self.ranks.get(id).copied()
    }

    /// By rank, then id.
    pub fn topological_order(&self) -> Vec<&NodeSpec> {
        let mut order: Vec<&NodeSpec> = self.nodes.values().collect();
        order.sort_by(|a, b| {
            self.ranks
                .get(&a.id)
                .cmp(&self.ranks.get(&b.id))
                .then_with(|| a.id.cmp(&b.id))
        });
        order
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{NodeInput, OutputRef};
    use std::collections::BTreeMap;

    fn node(id: &str, deps: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.into(),
            capability: id.into(),
            stage: id.into(),
            rule_id: id.into(),
            tool: "touch".into(),
            params: BTreeMap::new(),
            inputs: deps
                .iter()
                .map(|d| {
                    (
                        format!("in_{}", d),
                        NodeInput::Upstream(OutputRef {
                            node_id: d.to_string(),
                            output: "out".into(),
                        }),
                    )
                })
                .collect(),
            outputs: [("out".to_string(), "out.txt".to_string())].into(),
            resources: Default::default(),
            item: None,
        }
    }

    #[test]
    fn test_diamond_ranks_and_order() {
        let dag = SubjectDag::new(
            "01",
            vec![
                node("d", &["b", "c"]),
                node("c", &["a"]),
                node("b", &["a"]),
                node("a", &[]),
            ],
        )
        .unwrap();

        assert_eq!(dag.len(), 4);
        assert_eq!(dag.edge_count(), 4);
        assert_eq!(dag.rank("a"), Some(0));
        assert_eq!(dag.rank("d"), Some(2));
        let order: Vec<&str> = dag.topological_order().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);

        let mut dependents = dag.dependents("a").to_vec();
        dependents.sort();
        assert_eq!(dependents, vec!["b", "c"]);
        let mut dependencies = dag.dependencies("d").to_vec();
        dependencies.sort();
        assert_eq!(dependencies, vec!["b", "c"]);

        let mut downstream = dag.transitive_dependents("b");
        downstream.sort();
        assert_eq!(downstream, vec!["d"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let error = SubjectDag::new("01", vec![node("a", &["b"]), node("b", &["a"])]).unwrap_err();
        assert!(matches!(error, BuildError::Cycle { .. }));
        assert!(error.is_fatal_for_run());
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let error = SubjectDag::new("01", vec![node("a", &["ghost"])]).unwrap_err();
        assert!(error.to_string().contains("unknown node 'ghost'"));
    }

    #[test]
    fn test_empty_dag() {
        let dag = SubjectDag::new("01", vec![]).unwrap();
        assert!(dag.is_empty());
        assert!(dag.topological_order().is_empty());
    }
}
