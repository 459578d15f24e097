//! Code generation: the backend capability surface and the GLSL backend.

pub mod glsl;

pub use glsl::{GlslGenerator, GlslProfile};

use anyhow::Result;

use super::types::SamplerType;

/// Clip-space Y orientation, consulted by any code emitting projection-space
/// positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipSpace {
    YUp,
    YDown,
}

/// Sampling capabilities a backend may or may not provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Sample1d,
    Sample2d,
    Sample3d,
    SampleCube,
    SampleLod,
    SampleGrad,
    DepthCompare,
    DepthArray,
}

impl Capability {
    pub fn describe(self) -> &'static str {
        match self {
            Capability::Sample1d => "1d texture sampling",
            Capability::Sample2d => "2d texture sampling",
            Capability::Sample3d => "3d texture sampling",
            Capability::SampleCube => "cube texture sampling",
            Capability::SampleLod => "explicit-lod sampling",
            Capability::SampleGrad => "gradient sampling",
            Capability::DepthCompare => "depth-comparison sampling",
            Capability::DepthArray => "depth array sampling",
        }
    }
}

/// The capability surface a target-language backend must implement.
///
/// `append_function` must be idempotent for an identical `name`; registering
/// the same helper twice emits a single definition. `append_main` appends in
/// call order, so emitted statements follow the topological visit order of
/// the graph. Sampling methods return the call expression for the requested
/// variant, or an error naming the missing capability.
pub trait CodeGenerator {
    fn clip_space(&self) -> ClipSpace;

    fn supports(&self, capability: Capability) -> bool;

    fn append_function(&mut self, name: &str, code: &str);

    fn append_main(&mut self, code: &str);

    fn sample_texture(
        &mut self,
        sampler: &str,
        ty: SamplerType,
        coord: &str,
        layer: Option<&str>,
        lod: Option<&str>,
    ) -> Result<String>;

    fn sample_texture_grad(
        &mut self,
        sampler: &str,
        ty: SamplerType,
        coord: &str,
        layer: Option<&str>,
        ddx: &str,
        ddy: &str,
    ) -> Result<String>;

    fn sample_depth_texture(
        &mut self,
        sampler: &str,
        ty: SamplerType,
        coord: &str,
        layer: Option<&str>,
        depth_ref: &str,
    ) -> Result<String>;
}

/// Complete generated source for one shader pipeline.
#[derive(Clone, Debug)]
pub struct GlslShaderBundle {
    /// Fullscreen vertex module feeding the fragment stage.
    pub vertex: String,
    /// Fragment module generated from the shader graph.
    pub fragment: String,
    /// Deterministic pseudo-code of the compiled block, for debugging.
    pub pseudo: String,
    /// Sampler names referenced by the fragment stage, in binding order.
    pub samplers: Vec<String>,
}
