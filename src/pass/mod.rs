//! Render-pass scheduling: the offscreen pass dependency graph and the
//! deferred-pipeline pass group.

pub mod deferred;
pub mod pass_graph;

pub use deferred::DeferredPasses;
pub use pass_graph::{OffscreenRenderPass, PassGraph, PassId, PassState};

use std::collections::HashMap;

use anyhow::{Result, anyhow};

use crate::dsl::GraphDoc;

/// Build a `PassGraph` from a document's pass declarations. Passes are added
/// in declaration order; a `dependsOn` entry that closes a cycle fails here,
/// before any execution attempt.
pub fn build_pass_graph(doc: &GraphDoc) -> Result<PassGraph> {
    let mut graph = PassGraph::new();
    let mut ids: HashMap<&str, PassId> = HashMap::new();
    for desc in &doc.passes {
        let id = graph.add_pass(OffscreenRenderPass::new(
            desc.id.clone(),
            desc.width,
            desc.height,
        ));
        ids.insert(desc.id.as_str(), id);
    }
    for desc in &doc.passes {
        let pass = ids[desc.id.as_str()];
        for dep in &desc.depends_on {
            let dep = *ids
                .get(dep.as_str())
                .ok_or_else(|| anyhow!("pass '{}' depends on unknown pass '{}'", desc.id, dep))?;
            graph.depends_on(pass, dep)?;
        }
    }
    Ok(graph)
}
