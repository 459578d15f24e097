//! The shader compiler.
//!
//! This module is organized into several submodules:
//! - `types`: value and sampler type definitions
//! - `state`: mutable-variable identity and write generations
//! - `expr`: the immutable typed expression graph
//! - `scope`: scope builder and frozen statement blocks
//! - `shader_graph`: named node graph with topological ordering
//! - `node_compiler`: lowering of graph documents into expression blocks
//! - `codegen`: the backend capability surface and the GLSL backend
//! - `validation`: GLSL validation using naga
//!
//! The main entry point is `compile_fragment_bundle`: document in, generated
//! GLSL modules out.

pub mod codegen;
pub mod expr;
pub mod node_compiler;
pub mod scope;
pub mod shader_graph;
pub mod state;
pub mod types;
pub mod validation;

pub use codegen::{
    Capability, ClipSpace, CodeGenerator, GlslGenerator, GlslProfile, GlslShaderBundle,
};
pub use expr::{BinaryOp, BuiltinFn, Expr, ExprRef};
pub use node_compiler::{GraphCompiler, NodeKind};
pub use scope::{Block, ScopeBuilder};
pub use shader_graph::{NodeId, ShaderGraph, ShaderNode};
pub use state::{GenerationTracker, StateDependency, StateDependencySet};
pub use types::{SamplerDim, SamplerType, ScalarKind, Type};
pub use validation::{GlslShaderStage, validate_glsl, validate_glsl_with_context};

use anyhow::Result;

use crate::dsl::GraphDoc;

/// Compile a graph document end to end: treeshake, validate the document
/// graph, lower the nodes into a typed block, and generate the GLSL modules.
pub fn compile_fragment_bundle(doc: &GraphDoc, profile: GlslProfile) -> Result<GlslShaderBundle> {
    let doc = crate::dsl::treeshake_unreachable_nodes(doc)?;
    // Validate connectivity up front so malformed documents fail with a
    // document-level error before any node compilation work.
    crate::graph::topo_sort(&doc)?;

    let block = GraphCompiler::new(&doc).compile()?;

    let mut generator = GlslGenerator::new(profile);
    let fragment = generator.generate_fragment(&block)?;
    let vertex = generator.generate_vertex(&block)?;

    Ok(GlslShaderBundle {
        vertex,
        fragment,
        pseudo: block.to_pseudo_code(),
        samplers: block.samplers.iter().map(|s| s.name.clone()).collect(),
    })
}
