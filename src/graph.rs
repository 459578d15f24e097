//! Topological utilities over graph documents.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{Result, bail};

use crate::dsl::GraphDoc;

/// Topological order of a document's nodes. Nodes become ready in declaration
/// order, so the result is deterministic for identical documents.
pub fn topo_sort(doc: &GraphDoc) -> Result<Vec<String>> {
    let mut indeg: HashMap<&str, usize> = doc
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0usize))
        .collect();

    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in &doc.connections {
        if !indeg.contains_key(c.from.node_id.as_str()) || !indeg.contains_key(c.to.node_id.as_str()) {
            bail!(
                "connection references missing node: {} -> {}",
                c.from.node_id,
                c.to.node_id
            );
        }
        *indeg.get_mut(c.to.node_id.as_str()).unwrap() += 1;
        outgoing
            .entry(c.from.node_id.as_str())
            .or_default()
            .push(c.to.node_id.as_str());
    }

    let mut q: VecDeque<&str> = doc
        .nodes
        .iter()
        .filter(|n| indeg[n.id.as_str()] == 0)
        .map(|n| n.id.as_str())
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(doc.nodes.len());

    while let Some(n) = q.pop_front() {
        order.push(n.to_string());
        if let Some(nexts) = outgoing.get(n) {
            for m in nexts {
                let entry = indeg.get_mut(m).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    q.push_back(m);
                }
            }
        }
    }

    if order.len() != doc.nodes.len() {
        bail!("cycle detected in graph (cannot topologically sort)");
    }
    Ok(order)
}

/// All nodes the given node (transitively) consumes, including itself.
pub fn upstream_reachable(doc: &GraphDoc, start: &str) -> HashSet<String> {
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in &doc.connections {
        incoming
            .entry(c.to.node_id.as_str())
            .or_default()
            .push(c.from.node_id.as_str());
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<&str> = vec![start];
    while let Some(n) = stack.pop() {
        if !visited.insert(n.to_string()) {
            continue;
        }
        if let Some(prevs) = incoming.get(n) {
            for p in prevs {
                stack.push(p);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::load_graph_from_str;

    fn chain_doc() -> GraphDoc {
        load_graph_from_str(
            r#"{
                "version": "1.0",
                "metadata": { "name": "chain" },
                "nodes": [
                    { "id": "c", "type": "OutputColor" },
                    { "id": "a", "type": "ColorInput" },
                    { "id": "b", "type": "ToneMap" }
                ],
                "connections": [
                    { "id": "ab", "from": { "nodeId": "a", "portId": "value" }, "to": { "nodeId": "b", "portId": "color" } },
                    { "id": "bc", "from": { "nodeId": "b", "portId": "value" }, "to": { "nodeId": "c", "portId": "color" } }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn order_follows_edges_deterministically() {
        let doc = chain_doc();
        let order = topo_sort(&doc).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(order, topo_sort(&doc).unwrap());
    }

    #[test]
    fn cycle_is_reported() {
        let mut doc = chain_doc();
        doc.connections.push(crate::dsl::Connection {
            id: "ca".to_string(),
            from: crate::dsl::Endpoint { node_id: "c".to_string(), port_id: "value".to_string() },
            to: crate::dsl::Endpoint { node_id: "a".to_string(), port_id: "color".to_string() },
        });
        let err = topo_sort(&doc).unwrap_err();
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn upstream_includes_start_and_ancestors() {
        let doc = chain_doc();
        let reachable = upstream_reachable(&doc, "b");
        assert!(reachable.contains("a"));
        assert!(reachable.contains("b"));
        assert!(!reachable.contains("c"));
    }
}
