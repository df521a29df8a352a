//! Dominant-router selection over the resource graph.

use crate::model::{ComplexityStat, ResourceNode};
use crate::routes::ResourceGraph;
use std::collections::HashSet;

/// Computes per-node complexity over a [`ResourceGraph`].
///
/// A node's total is its own entry count plus the entry count of every node reachable
/// through references, each counted once. A node reached a second time within the same
/// top-level resolution contributes nothing, which bounds traversal on cyclic graphs and
/// undercounts the nodes taking part in a cycle.
pub struct ComplexityAnalyzer<'g> {
    graph: &'g ResourceGraph,
}

impl<'g> ComplexityAnalyzer<'g> {
    pub fn new(graph: &'g ResourceGraph) -> Self {
        Self { graph }
    }

    pub fn stat(&self, node: &ResourceNode) -> ComplexityStat {
        let mut visited = HashSet::new();
        ComplexityStat {
            base_count: node.entries.len(),
            total_count: self.total(&node.id, &mut visited),
            references: node.references().map(str::to_string).collect(),
        }
    }

    /// Stats for every node, in insertion order.
    pub fn stats(&self) -> Vec<(&'g ResourceNode, ComplexityStat)> {
        self.graph
            .iter()
            .map(|node| (node, self.stat(node)))
            .collect()
    }

    /// The node with the strictly greatest total; the first inserted wins ties.
    pub fn dominant(&self) -> Option<&'g ResourceNode> {
        let mut best: Option<(&'g ResourceNode, usize)> = None;
        for node in self.graph.iter() {
            let total = self.stat(node).total_count;
            if best.is_none_or(|(_, current)| total > current) {
                best = Some((node, total));
            }
        }
        best.map(|(node, _)| node)
    }

    fn total(&self, id: &str, visited: &mut HashSet<String>) -> usize {
        if !visited.insert(id.to_string()) {
            return 0;
        }
        let Some(node) = self.graph.get(id) else {
            return 0;
        };
        let nested: usize = node
            .references()
            .map(|target| self.total(target, visited))
            .sum();
        node.entries.len() + nested
    }
}

/// The most complex router in `graph`, or `None` when the graph is empty.
pub fn analyze(graph: &ResourceGraph) -> Option<&ResourceNode> {
    ComplexityAnalyzer::new(graph).dominant()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, HttpMethod};

    fn router(id: &str, routes: usize, mounts: &[&str]) -> ResourceNode {
        let mut entries: Vec<Entry> = (0..routes)
            .map(|i| Entry::Route {
                id: format!("{id}#r{i}"),
                method: HttpMethod::Get,
                path: format!("/{i}"),
            })
            .collect();
        entries.extend(mounts.iter().map(|target| Entry::Reference {
            id: format!("{id}->{target}"),
            target_id: target.to_string(),
            path: format!("/{target}"),
            name: target.to_string(),
        }));
        ResourceNode {
            id: id.to_string(),
            name: id.to_string(),
            file: "src/app.ts".to_string(),
            position: 0,
            base_path: String::new(),
            entries,
        }
    }

    #[test]
    fn empty_graph_has_no_dominant_node() {
        assert!(analyze(&ResourceGraph::new()).is_none());
    }

    #[test]
    fn shared_subrouters_are_counted_once() {
        let graph: ResourceGraph = [
            router("app", 1, &["a", "b"]),
            router("a", 1, &["shared"]),
            router("b", 1, &["shared"]),
            router("shared", 5, &[]),
        ]
        .into_iter()
        .collect();
        let analyzer = ComplexityAnalyzer::new(&graph);
        let app = analyzer.stat(graph.get("app").unwrap());
        assert_eq!(app.base_count, 3);
        // app 3 + a 2 + b 2 + shared 5
        assert_eq!(app.total_count, 12);
        assert_eq!(analyze(&graph).unwrap().id, "app");
    }

    #[test]
    fn missing_targets_contribute_nothing() {
        let graph: ResourceGraph = [router("app", 2, &["gone"])].into_iter().collect();
        let stat = ComplexityAnalyzer::new(&graph).stat(graph.get("app").unwrap());
        assert_eq!(stat.total_count, 3);
        assert_eq!(stat.references, vec!["gone".to_string()]);
    }
}
