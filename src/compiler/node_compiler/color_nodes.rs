//! Compilers for color-space conversion and tone-mapping nodes.
//!
//! These register GLSL helper functions on the scope; registration is
//! idempotent, so many nodes can share one emitted definition.

use anyhow::{Result, anyhow, bail};

use crate::dsl::{self, NodeDesc};

use super::GraphCompiler;
use crate::compiler::expr::{Expr, ExprRef};
use crate::compiler::types::Type;

const SRGB_TO_LINEAR: (&str, &str) = (
    "srgb_to_linear",
    "vec3 srgb_to_linear(vec3 c) {\n    return pow(c, vec3(2.2));\n}",
);

const LINEAR_TO_SRGB: (&str, &str) = (
    "linear_to_srgb",
    "vec3 linear_to_srgb(vec3 c) {\n    return pow(c, vec3(1.0 / 2.2));\n}",
);

const TONE_MAP_ACES: (&str, &str) = (
    "tone_map_aces",
    "vec3 tone_map_aces(vec3 color) {\n    return clamp((color * (2.51 * color + 0.03)) / (color * (2.43 * color + 0.59) + 0.14), 0.0, 1.0);\n}",
);

const TONE_MAP_REINHARD: (&str, &str) = (
    "tone_map_reinhard",
    "vec3 tone_map_reinhard(vec3 color) {\n    return color / (color + vec3(1.0));\n}",
);

const TONE_MAP_UNCHARTED2_PARTIAL: (&str, &str) = (
    "tone_map_uncharted2_partial",
    "vec3 tone_map_uncharted2_partial(vec3 x) {\n    float a = 0.15;\n    float b = 0.5;\n    float c = 0.1;\n    float d = 0.2;\n    float e = 0.02;\n    float f = 0.3;\n    return ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f;\n}",
);

const TONE_MAP_UNCHARTED2: (&str, &str) = (
    "tone_map_uncharted2",
    "vec3 tone_map_uncharted2(vec3 color) {\n    vec3 curr = tone_map_uncharted2_partial(color * 2.0);\n    vec3 white_scale = vec3(1.0) / tone_map_uncharted2_partial(vec3(11.2));\n    return curr * white_scale;\n}",
);

pub fn compile_srgb_to_linear(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let color = cc.require_input(node, "color")?;
    cc.scope.register_helper(SRGB_TO_LINEAR.0, SRGB_TO_LINEAR.1);
    map_rgb(node, color, SRGB_TO_LINEAR.0)
}

pub fn compile_linear_to_srgb(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let color = cc.require_input(node, "color")?;
    cc.scope.register_helper(LINEAR_TO_SRGB.0, LINEAR_TO_SRGB.1);
    map_rgb(node, color, LINEAR_TO_SRGB.0)
}

pub fn compile_tone_map(cc: &mut GraphCompiler, node: &NodeDesc) -> Result<ExprRef> {
    let color = cc.require_input(node, "color")?;
    let operator = dsl::parse_str(&node.params, "operator")
        .ok_or_else(|| anyhow!("ToneMap '{}' missing operator", node.id))?;
    let helper = match operator {
        "aces" => {
            cc.scope.register_helper(TONE_MAP_ACES.0, TONE_MAP_ACES.1);
            TONE_MAP_ACES.0
        }
        "reinhard" => {
            cc.scope.register_helper(TONE_MAP_REINHARD.0, TONE_MAP_REINHARD.1);
            TONE_MAP_REINHARD.0
        }
        "uncharted2" => {
            // The curve helper must be registered before its caller so the
            // emitted definitions appear in dependency order.
            cc.scope
                .register_helper(TONE_MAP_UNCHARTED2_PARTIAL.0, TONE_MAP_UNCHARTED2_PARTIAL.1);
            cc.scope.register_helper(TONE_MAP_UNCHARTED2.0, TONE_MAP_UNCHARTED2.1);
            TONE_MAP_UNCHARTED2.0
        }
        other => bail!("ToneMap '{}': unsupported operator '{}'", node.id, other),
    };
    map_rgb(node, color, helper)
}

/// Apply a vec3-to-vec3 helper to a color, passing a vec4 alpha through
/// unchanged.
fn map_rgb(node: &NodeDesc, color: ExprRef, helper: &str) -> Result<ExprRef> {
    match color.ty() {
        Type::FLOAT3 => Ok(Expr::helper_call(helper, vec![color], Type::FLOAT3)),
        Type::FLOAT4 => {
            let rgb = Expr::swizzle(color.clone(), "xyz")?;
            let alpha = Expr::swizzle(color, "w")?;
            let mapped = Expr::helper_call(helper, vec![rgb], Type::FLOAT3);
            Expr::vector(vec![mapped, alpha])
        }
        other => bail!(
            "{} '{}' expects a vec3 or vec4 color, got {}",
            node.node_type,
            node.id,
            other
        ),
    }
}
