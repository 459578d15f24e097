//! Compilers for texture sampling nodes.

use anyhow::{Result, anyhow, bail};

use crate::dsl::{self, NodeDesc};

use super::GraphCompiler;
use crate::compiler::expr::{Expr, ExprRef};
use crate::compiler::types::{SamplerDim, SamplerType};

fn sampler_name(node: &NodeDesc) -> Result<String> {
    dsl::parse_str(&node.params, "sampler")
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} '{}' missing sampler name", node.node_type, node.id))
}

fn sampler_dim(node: &NodeDesc) -> Result<SamplerDim> {
    Ok(match dsl::parse_str(&node.params, "dim").unwrap_or("2d") {
        "1d" => SamplerDim::D1,
        "2d" => SamplerDim::D2,
        "3d" => SamplerDim::D3,
        "cube" => SamplerDim::Cube,
        other => bail!("{} '{}': unsupported texture dim '{}'", node.node_type, node.id, other),
    })
}

fn sampler_arrayed(node: &NodeDesc) -> bool {
    dsl::parse_bool(&node.params, "arrayed").unwrap_or(false)
}

/// Sampling coordinates: an explicit `coord` connection, or the fullscreen
/// `uv` varying for plain 2D samplers.
fn coord_expr(cc: &mut GraphCompiler, node: &NodeDesc, dim: SamplerDim) -> Result<ExprRef> {
    if let Some(coord) = cc.input_expr(&node.id, "coord")? {
        return Ok(coord);
    }
    if dim == SamplerDim::D2 {
        return cc.uv();
    }
    Err(anyhow!("{} '{}' missing input coord", node.node_type, node.id))
}

pub fn compile_sample_texture(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let name = sampler_name(node)?;
    let ty = SamplerType {
        dim: sampler_dim(node)?,
        arrayed: sampler_arrayed(node),
        depth: false,
    };
    cc.scope.register_sampler(&name, ty)?;
    let coord = coord_expr(cc, node, ty.dim)?;

    let lod = cc.input_expr(&node.id, "lod")?;
    let layer = cc.input_expr(&node.id, "layer")?;
    match (lod, layer) {
        (Some(_), Some(_)) => bail!(
            "{} '{}': explicit lod cannot be combined with an explicit layer",
            node.node_type,
            node.id
        ),
        (Some(lod), None) => Expr::sample_texture_lod(&name, ty, coord, lod),
        (None, Some(layer)) => Expr::sample_texture_array(&name, ty, coord, layer),
        (None, None) => Expr::sample_texture(&name, ty, coord),
    }
}

pub fn compile_sample_texture_grad(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let name = sampler_name(node)?;
    let ty = SamplerType {
        dim: sampler_dim(node)?,
        arrayed: sampler_arrayed(node),
        depth: false,
    };
    cc.scope.register_sampler(&name, ty)?;
    let coord = coord_expr(cc, node, ty.dim)?;
    let ddx = cc.require_input(node, "ddx")?;
    let ddy = cc.require_input(node, "ddy")?;
    Expr::sample_texture_grad(&name, ty, coord, ddx, ddy)
}

pub fn compile_sample_depth_texture(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let name = sampler_name(node)?;
    let ty = SamplerType {
        dim: sampler_dim(node)?,
        arrayed: sampler_arrayed(node),
        depth: true,
    };
    cc.scope.register_sampler(&name, ty)?;
    let coord = coord_expr(cc, node, ty.dim)?;
    let depth_ref = cc.require_input(node, "reference")?;
    Expr::sample_depth_texture(&name, ty, coord, depth_ref)
}

pub fn compile_sample_depth_texture_array(
    cc: &mut GraphCompiler,
    node: &NodeDesc,
) -> Result<ExprRef> {
    let name = sampler_name(node)?;
    let ty = SamplerType {
        dim: sampler_dim(node)?,
        arrayed: true,
        depth: true,
    };
    cc.scope.register_sampler(&name, ty)?;
    let coord = coord_expr(cc, node, ty.dim)?;
    let layer = cc.require_input(node, "layer")?;
    let depth_ref = cc.require_input(node, "reference")?;
    Expr::sample_depth_texture_array(&name, ty, coord, layer, depth_ref)
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::super::GraphCompiler;
    use serde_json::json;

    #[test]
    fn samplers_register_in_first_use_order() {
        let doc = test_doc(
            vec![
                test_node("albedo", "SampleTexture", &[("sampler", json!("albedo_tex"))]),
                test_node("detail", "SampleTexture", &[("sampler", json!("detail_tex"))]),
                test_node("blend", "Mix", &[("t", json!(0.25))]),
                test_node("out", "OutputColor", &[]),
            ],
            vec![
                test_connection("albedo", "blend", "a"),
                test_connection("detail", "blend", "b"),
                test_connection("blend", "out", "color"),
            ],
        );
        let block = GraphCompiler::new(&doc).compile().unwrap();
        let names: Vec<&str> = block.samplers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["albedo_tex", "detail_tex"]);
    }

    #[test]
    fn conflicting_sampler_dims_are_rejected() {
        let doc = test_doc(
            vec![
                test_node("a", "SampleTexture", &[("sampler", json!("tex"))]),
                test_node(
                    "b",
                    "SampleTexture",
                    &[("sampler", json!("tex")), ("arrayed", json!(true))],
                ),
                test_node("blend", "Mix", &[]),
                test_node("out", "OutputColor", &[]),
            ],
            vec![
                test_connection("a", "blend", "a"),
                test_connection("b", "blend", "b"),
                test_connection("blend", "out", "color"),
            ],
        );
        let err = GraphCompiler::new(&doc).compile().unwrap_err();
        assert!(err.to_string().contains("conflicting declarations"));
    }

    #[test]
    fn depth_array_reference_defaults_from_params() {
        let doc = test_doc(
            vec![
                test_node(
                    "shadow",
                    "SampleDepthTextureArray",
                    &[("sampler", json!("cascades")), ("layer", json!(1.0))],
                ),
                test_node("out", "OutputColor", &[]),
            ],
            vec![test_connection("shadow", "out", "color")],
        );
        let block = GraphCompiler::new(&doc).compile().unwrap();
        let pseudo = block.to_pseudo_code();
        assert!(
            pseudo.contains("sampleDepthArray(cascades, uv, 1.0, 0.5)"),
            "{pseudo}"
        );
    }
}
