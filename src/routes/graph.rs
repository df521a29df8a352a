use crate::model::ResourceNode;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Router nodes keyed by id, iterated in insertion order.
///
/// References between nodes may form cycles; nothing here prevents that.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing any node with the same id in place.
    pub fn insert(&mut self, node: ResourceNode) {
        match self.index.get(&node.id) {
            Some(&slot) => self.nodes[slot] = node,
            None => {
                self.index.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        self.index.get(id).map(|&slot| &mut self.nodes[slot])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes no other node references.
    pub fn roots(&self) -> Vec<&ResourceNode> {
        let referenced: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|node| node.references().filter(move |target| *target != node.id))
            .collect();
        self.nodes
            .iter()
            .filter(|node| !referenced.contains(node.id.as_str()))
            .collect()
    }
}

impl FromIterator<ResourceNode> for ResourceGraph {
    fn from_iter<I: IntoIterator<Item = ResourceNode>>(iter: I) -> Self {
        let mut graph = ResourceGraph::new();
        for node in iter {
            graph.insert(node);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;

    fn node(id: &str, targets: &[&str]) -> ResourceNode {
        ResourceNode {
            id: id.to_string(),
            name: id.to_string(),
            file: "src/app.ts".to_string(),
            position: 0,
            base_path: String::new(),
            entries: targets
                .iter()
                .enumerate()
                .map(|(i, target)| Entry::Reference {
                    id: format!("{id}#{i}"),
                    target_id: target.to_string(),
                    path: "/".to_string(),
                    name: target.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut graph: ResourceGraph = [node("a", &[]), node("b", &[])].into_iter().collect();
        graph.insert(node("a", &["b"]));
        let ids: Vec<&str> = graph.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(graph.get("a").unwrap().entries.len(), 1);
    }

    #[test]
    fn roots_exclude_referenced_nodes() {
        let graph: ResourceGraph = [node("app", &["users"]), node("users", &[]), node("lone", &[])]
            .into_iter()
            .collect();
        let roots: Vec<&str> = graph.roots().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["app", "lone"]);
    }

    #[test]
    fn serializes_as_node_list() {
        let graph: ResourceGraph = [node("a", &[])].into_iter().collect();
        let value = serde_json::to_value(&graph).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["id"], "a");
    }
}
