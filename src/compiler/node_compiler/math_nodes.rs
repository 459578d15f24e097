//! Compilers for math operation nodes.

use anyhow::{Result, anyhow, bail};

use crate::dsl::{self, NodeDesc};

use super::GraphCompiler;
use crate::compiler::expr::{BinaryOp, Expr, ExprRef};
use crate::compiler::types::{ScalarKind, Type};

/// Resolve a binary operand, accepting the legacy `x`/`y` port aliases some
/// older documents use for `a`/`b`.
fn binary_operand(
    cc: &mut GraphCompiler,
    node: &NodeDesc,
    port: &str,
    alias: &str,
) -> Result<ExprRef> {
    if let Some(expr) = cc.input_expr(&node.id, port)? {
        return Ok(expr);
    }
    if let Some(expr) = cc.input_expr(&node.id, alias)? {
        return Ok(expr);
    }
    Err(anyhow!("{} '{}' missing input {}", node.node_type, node.id, port))
}

pub fn compile_add(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let a = binary_operand(cc, node, "a", "x")?;
    let b = binary_operand(cc, node, "b", "y")?;
    Expr::binary(BinaryOp::Add, a, b)
}

pub fn compile_multiply(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let a = binary_operand(cc, node, "a", "x")?;
    let b = binary_operand(cc, node, "b", "y")?;
    Expr::binary(BinaryOp::Mul, a, b)
}

pub fn compile_mix(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let a = cc
        .input_expr(&node.id, "a")?
        .ok_or_else(|| anyhow!("{} '{}' missing input a", node.node_type, node.id))?;
    let b = cc.require_input(node, "b")?;
    let t = cc
        .input_expr(&node.id, "t")?
        .unwrap_or_else(|| Expr::const_float(0.5));
    Expr::mix(a, b, t)
}

pub fn compile_clamp(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let value = cc.require_input(node, "value")?;
    let min = cc
        .input_expr(&node.id, "min")?
        .unwrap_or_else(|| Expr::const_float(0.0));
    let max = cc
        .input_expr(&node.id, "max")?
        .unwrap_or_else(|| Expr::const_float(1.0));
    Expr::clamp(value, min, max)
}

pub fn compile_power(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let base = cc.require_input(node, "base")?;
    let exponent = cc
        .input_expr(&node.id, "exponent")?
        .unwrap_or_else(|| Expr::const_float(2.0));
    Expr::pow(base, exponent)
}

pub fn compile_normalize(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let value = cc.require_input(node, "value")?;
    Expr::normalize(value)
}

pub fn compile_dot(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let a = cc.require_input(node, "a")?;
    let b = cc.require_input(node, "b")?;
    Expr::dot(a, b)
}

pub fn compile_cross(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let a = cc.require_input(node, "a")?;
    let b = cc.require_input(node, "b")?;
    Expr::cross(a, b)
}

pub fn compile_cast(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let value = cc.require_input(node, "value")?;
    let target = dsl::parse_str(&node.params, "target")
        .ok_or_else(|| anyhow!("Cast '{}' missing target type", node.id))?;
    let target = parse_target_type(target)
        .ok_or_else(|| anyhow!("Cast '{}': unsupported target type '{}'", node.id, target))?;
    Expr::cast(value, target)
}

fn parse_target_type(name: &str) -> Option<Type> {
    Some(match name {
        "float" => Type::FLOAT1,
        "vec2" => Type::FLOAT2,
        "vec3" => Type::FLOAT3,
        "vec4" => Type::FLOAT4,
        "int" => Type::INT1,
        "ivec2" => Type::Vector { kind: ScalarKind::I32, size: 2 },
        "ivec3" => Type::Vector { kind: ScalarKind::I32, size: 3 },
        "ivec4" => Type::Vector { kind: ScalarKind::I32, size: 4 },
        "uint" => Type::Scalar(ScalarKind::U32),
        "uvec2" => Type::Vector { kind: ScalarKind::U32, size: 2 },
        "uvec3" => Type::Vector { kind: ScalarKind::U32, size: 3 },
        "uvec4" => Type::Vector { kind: ScalarKind::U32, size: 4 },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::super::GraphCompiler;
    use serde_json::json;

    #[test]
    fn cast_between_families_is_a_construction_error() {
        let doc = test_doc(
            vec![
                test_node("half", "FloatInput", &[("value", json!(0.5))]),
                test_node("bad", "Cast", &[("target", json!("vec3"))]),
                test_node("out", "OutputColor", &[]),
            ],
            vec![
                test_connection("half", "bad", "value"),
                test_connection("bad", "out", "color"),
            ],
        );
        let err = GraphCompiler::new(&doc).compile().unwrap_err();
        assert!(err.to_string().contains("scalar and vector families"));
    }

    #[test]
    fn legacy_xy_aliases_still_resolve() {
        let doc = test_doc(
            vec![
                test_node("lhs", "FloatInput", &[("value", json!(2.0))]),
                test_node("rhs", "FloatInput", &[("value", json!(3.0))]),
                test_node("sum", "Add", &[]),
                test_node("out", "OutputColor", &[]),
            ],
            vec![
                test_connection("lhs", "sum", "x"),
                test_connection("rhs", "sum", "y"),
                test_connection("sum", "out", "color"),
            ],
        );
        let block = GraphCompiler::new(&doc).compile().unwrap();
        assert!(block.to_pseudo_code().contains("(2.0 + 3.0)"));
    }
}
