//! shader-forge: a typed shader-graph compiler and render-pass scheduler.
//!
//! Shader stages are described either programmatically (a `ScopeBuilder`
//! assembling a typed expression graph) or as JSON graph documents, lowered
//! to GLSL through a pluggable code generator. Offscreen render passes are
//! declared with explicit dependencies and scheduled in topological order.
//!
//! The crate is organized into:
//! - `dsl`: JSON graph documents and parameter helpers
//! - `graph`: topological utilities over documents
//! - `compiler`: the typed expression graph, scopes, and code generation
//! - `pass`: the render-pass dependency graph and deferred-pass grouping
//!
//! The main entry points are:
//! - `compile_fragment_bundle`: compile a document to GLSL modules
//! - `build_pass_graph`: build the pass schedule from a document
//! - `ScopeBuilder` / `Expr`: build shader stages directly

pub mod compiler;
pub mod dsl;
pub mod graph;
pub mod pass;

pub use compiler::{
    Expr, GlslGenerator, GlslProfile, GlslShaderBundle, ScopeBuilder, compile_fragment_bundle,
};
pub use dsl::{GraphDoc, load_graph_from_path, load_graph_from_str};
pub use pass::{
    DeferredPasses, OffscreenRenderPass, PassGraph, PassId, PassState, build_pass_graph,
};
