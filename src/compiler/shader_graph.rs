//! Named shader-node graph.
//!
//! Nodes get monotonically increasing IDs in insertion order; code generation
//! visits them in a topological order that is deterministic for identical
//! graphs.

use std::collections::{HashMap, VecDeque};

use anyhow::{Result, bail};

use super::node_compiler::NodeKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Clone, Debug)]
pub struct ShaderNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Upstream nodes whose values this node consumes.
    pub deps: Vec<NodeId>,
}

#[derive(Default)]
pub struct ShaderGraph {
    nodes: Vec<ShaderNode>,
    ids_by_name: HashMap<String, NodeId>,
    next_id: u32,
}

impl ShaderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named node, assigning the next monotonically increasing ID.
    pub fn add_node(&mut self, name: &str, kind: NodeKind) -> Result<NodeId> {
        if self.ids_by_name.contains_key(name) {
            bail!("shader graph already contains node '{name}'");
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(ShaderNode { id, name: name.to_string(), kind, deps: Vec::new() });
        self.ids_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&ShaderNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&ShaderNode> {
        self.ids_by_name.get(name).and_then(|id| self.node(*id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declare that `node` consumes the value produced by `upstream`.
    pub fn depends_on(&mut self, node: NodeId, upstream: NodeId) -> Result<()> {
        if node == upstream {
            let name = self.node(node).map(|n| n.name.clone()).unwrap_or_default();
            bail!("shader node '{name}' cannot depend on itself");
        }
        if self.node(upstream).is_none() {
            bail!("unknown upstream node id {:?}", upstream);
        }
        let Some(entry) = self.nodes.iter_mut().find(|n| n.id == node) else {
            bail!("unknown node id {:?}", node);
        };
        if !entry.deps.contains(&upstream) {
            entry.deps.push(upstream);
        }
        Ok(())
    }

    /// Topological code-generation order. Ready nodes are released in
    /// insertion order, so the result is deterministic for identical graphs.
    pub fn codegen_order(&self) -> Result<Vec<NodeId>> {
        let mut indegree: HashMap<NodeId, usize> =
            self.nodes.iter().map(|n| (n.id, n.deps.len())).collect();
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in &self.nodes {
            for dep in &node.deps {
                outgoing.entry(*dep).or_default().push(node.id);
            }
        }

        let mut queue: VecDeque<NodeId> = self
            .nodes
            .iter()
            .filter(|n| indegree[&n.id] == 0)
            .map(|n| n.id)
            .collect();
        let mut order: Vec<NodeId> = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(nexts) = outgoing.get(&id) {
                for next in nexts {
                    let entry = indegree.get_mut(next).expect("known node");
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            bail!("cycle detected in shader graph (cannot topologically sort)");
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let mut graph = ShaderGraph::new();
        let a = graph.add_node("a", NodeKind::FloatInput).unwrap();
        let b = graph.add_node("b", NodeKind::Add).unwrap();
        let c = graph.add_node("c", NodeKind::OutputColor).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn order_respects_dependencies() {
        let mut graph = ShaderGraph::new();
        let out = graph.add_node("out", NodeKind::OutputColor).unwrap();
        let base = graph.add_node("base", NodeKind::ColorInput).unwrap();
        let tonemap = graph.add_node("tonemap", NodeKind::ToneMap).unwrap();
        graph.depends_on(tonemap, base).unwrap();
        graph.depends_on(out, tonemap).unwrap();

        let order = graph.codegen_order().unwrap();
        let pos = |id| order.iter().position(|o| *o == id).unwrap();
        assert!(pos(base) < pos(tonemap));
        assert!(pos(tonemap) < pos(out));
    }

    #[test]
    fn cycle_is_a_construction_time_error() {
        let mut graph = ShaderGraph::new();
        let a = graph.add_node("a", NodeKind::Add).unwrap();
        let b = graph.add_node("b", NodeKind::Multiply).unwrap();
        graph.depends_on(a, b).unwrap();
        graph.depends_on(b, a).unwrap();
        let err = graph.codegen_order().unwrap_err();
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut graph = ShaderGraph::new();
        graph.add_node("a", NodeKind::Add).unwrap();
        assert!(graph.add_node("a", NodeKind::Add).is_err());
    }
}
