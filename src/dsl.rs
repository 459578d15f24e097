//! Graph documents: the JSON front-end describing shader graphs and
//! offscreen pass declarations.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphDoc {
    pub version: String,
    pub metadata: Metadata,
    pub nodes: Vec<NodeDesc>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub passes: Vec<PassDesc>,
    /// Node id producing the final image; defaults to the single
    /// `OutputColor` node.
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Metadata {
    pub name: String,
    pub created: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDesc {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Connection {
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Endpoint {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "portId")]
    pub port_id: String,
}

/// Declaration of an offscreen render pass and its upstream dependencies.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PassDesc {
    pub id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

pub fn load_graph_from_path(path: impl AsRef<std::path::Path>) -> Result<GraphDoc> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph json at {}", path.display()))?;
    load_graph_from_str(&text)
}

pub fn load_graph_from_str(text: &str) -> Result<GraphDoc> {
    let mut doc: GraphDoc = serde_json::from_str(text).context("failed to parse graph json")?;

    // Normalize params with per-kind defaults. This keeps older/hand-written
    // documents compatible when nodes omit parameters.
    normalize_graph_defaults(&mut doc);

    Ok(doc)
}

pub fn normalize_graph_defaults(doc: &mut GraphDoc) {
    for node in &mut doc.nodes {
        let defaults = default_params(node.node_type.as_str());
        if defaults.is_empty() {
            continue;
        }

        let mut merged: HashMap<String, serde_json::Value> = defaults
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        for (k, v) in std::mem::take(&mut node.params) {
            merged.insert(k, v);
        }
        node.params = merged;
    }
}

fn default_params(node_type: &str) -> Vec<(&'static str, serde_json::Value)> {
    use serde_json::json;
    match node_type {
        "ColorInput" => vec![("value", json!([1.0, 1.0, 1.0, 1.0]))],
        "FloatInput" => vec![("value", json!(0.0))],
        "ToneMap" => vec![("operator", json!("aces"))],
        "SampleTexture" | "SampleTextureGrad" => vec![("dim", json!("2d"))],
        "SampleDepthTexture" | "SampleDepthTextureArray" => {
            vec![("dim", json!("2d")), ("reference", json!(0.5))]
        }
        _ => Vec::new(),
    }
}

/// Node id producing the final image: the explicit `output` field if present,
/// otherwise the document's single `OutputColor` node.
pub fn output_node_id(doc: &GraphDoc) -> Result<String> {
    if let Some(id) = &doc.output {
        if !doc.nodes.iter().any(|n| &n.id == id) {
            bail!("output references missing node: {id}");
        }
        return Ok(id.clone());
    }

    let outputs: Vec<&NodeDesc> = doc
        .nodes
        .iter()
        .filter(|n| n.node_type == "OutputColor")
        .collect();
    match outputs.len() {
        1 => Ok(outputs[0].id.clone()),
        0 => bail!("graph has no OutputColor node and no explicit output"),
        n => bail!("expected exactly 1 OutputColor node, got {n}"),
    }
}

/// Drops nodes that cannot feed the output, to avoid later stages
/// (validation / compilation) tripping over editor leftovers.
pub fn treeshake_unreachable_nodes(doc: &GraphDoc) -> Result<GraphDoc> {
    let output = output_node_id(doc)?;
    let keep = crate::graph::upstream_reachable(doc, &output);

    let nodes: Vec<NodeDesc> = doc
        .nodes
        .iter()
        .cloned()
        .filter(|n| keep.contains(n.id.as_str()))
        .collect();
    let connections: Vec<Connection> = doc
        .connections
        .iter()
        .cloned()
        .filter(|c| keep.contains(c.from.node_id.as_str()) && keep.contains(c.to.node_id.as_str()))
        .collect();

    Ok(GraphDoc {
        version: doc.version.clone(),
        metadata: doc.metadata.clone(),
        nodes,
        connections,
        passes: doc.passes.clone(),
        output: doc.output.clone(),
    })
}

pub fn find_node<'a>(
    nodes_by_id: &'a HashMap<String, NodeDesc>,
    node_id: &str,
) -> Result<&'a NodeDesc> {
    nodes_by_id
        .get(node_id)
        .ok_or_else(|| anyhow!("node not found: {node_id}"))
}

pub fn incoming_connection<'a>(
    doc: &'a GraphDoc,
    to_node_id: &str,
    to_port_id: &str,
) -> Option<&'a Connection> {
    doc.connections
        .iter()
        .find(|c| c.to.node_id == to_node_id && c.to.port_id == to_port_id)
}

pub fn parse_f32(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<f32> {
    match params.get(key) {
        Some(v) => v
            .as_f64()
            .map(|x| x as f32)
            .or_else(|| v.as_u64().map(|x| x as f32))
            .or_else(|| v.as_i64().map(|x| x as f32)),
        None => None,
    }
}

pub fn parse_str<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn parse_bool(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

pub fn parse_f32_array(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<Vec<f32>> {
    let values = params.get(key)?.as_array()?;
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        out.push(v.as_f64()? as f32);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "version": "1.0",
        "metadata": { "name": "test" },
        "nodes": [
            { "id": "base", "type": "ColorInput", "params": { "value": [0.5, 0.5, 0.5, 1.0] } },
            { "id": "tm", "type": "ToneMap" },
            { "id": "orphan", "type": "FloatInput" },
            { "id": "out", "type": "OutputColor" }
        ],
        "connections": [
            { "id": "c1", "from": { "nodeId": "base", "portId": "value" }, "to": { "nodeId": "tm", "portId": "color" } },
            { "id": "c2", "from": { "nodeId": "tm", "portId": "value" }, "to": { "nodeId": "out", "portId": "color" } }
        ]
    }"#;

    #[test]
    fn loads_and_normalizes_defaults() {
        let doc = load_graph_from_str(DOC).unwrap();
        let tm = doc.nodes.iter().find(|n| n.id == "tm").unwrap();
        assert_eq!(parse_str(&tm.params, "operator"), Some("aces"));
        // Explicit params win over defaults.
        let base = doc.nodes.iter().find(|n| n.id == "base").unwrap();
        assert_eq!(parse_f32_array(&base.params, "value").unwrap()[0], 0.5);
    }

    #[test]
    fn treeshake_drops_unreachable_nodes() {
        let doc = load_graph_from_str(DOC).unwrap();
        let shaken = treeshake_unreachable_nodes(&doc).unwrap();
        assert_eq!(shaken.nodes.len(), 3);
        assert!(!shaken.nodes.iter().any(|n| n.id == "orphan"));
    }

    #[test]
    fn output_node_must_be_unambiguous() {
        let mut doc = load_graph_from_str(DOC).unwrap();
        doc.nodes.push(NodeDesc {
            id: "out2".to_string(),
            node_type: "OutputColor".to_string(),
            params: HashMap::new(),
        });
        let err = output_node_id(&doc).unwrap_err();
        assert!(err.to_string().contains("exactly 1 OutputColor"));

        doc.output = Some("out".to_string());
        assert_eq!(output_node_id(&doc).unwrap(), "out");
    }
}
