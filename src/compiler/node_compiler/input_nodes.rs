//! Compilers for input nodes (constants and builtin varyings).

use anyhow::{Result, anyhow, bail};

use crate::dsl::{self, NodeDesc};

use super::GraphCompiler;
use crate::compiler::expr::{Expr, ExprRef};

pub fn compile_color_input(_cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let values = dsl::parse_f32_array(&node.params, "value")
        .ok_or_else(|| anyhow!("ColorInput '{}' missing value", node.id))?;
    if values.len() != 4 {
        bail!(
            "ColorInput '{}' value must have 4 components, got {}",
            node.id,
            values.len()
        );
    }
    Expr::const_vec(&values)
}

pub fn compile_float_input(_cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    Ok(Expr::const_float(dsl::parse_f32(&node.params, "value").unwrap_or(0.0)))
}

pub fn compile_vec2_input(_cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    fixed_vec_input(node, 2)
}

pub fn compile_vec3_input(_cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    fixed_vec_input(node, 3)
}

fn fixed_vec_input(node: &NodeDesc, arity: usize) -> Result<ExprRef> {
    let values = dsl::parse_f32_array(&node.params, "value")
        .ok_or_else(|| anyhow!("{} '{}' missing value", node.node_type, node.id))?;
    if values.len() != arity {
        bail!(
            "{} '{}' value must have {} components, got {}",
            node.node_type,
            node.id,
            arity,
            values.len()
        );
    }
    Expr::const_vec(&values)
}

pub fn compile_uv_coord(cc: &mut GraphCompiler, _node: &NodeDesc) -> Result<ExprRef> {
    cc.uv()
}
