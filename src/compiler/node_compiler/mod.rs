//! Node compiler infrastructure: lowers graph documents into typed
//! expression blocks.

pub mod color_nodes;
pub mod input_nodes;
pub mod math_nodes;
pub mod texture_nodes;

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};

use crate::dsl::{self, GraphDoc, NodeDesc};

use super::expr::{Expr, ExprRef};
use super::scope::{OutputHandle, ScopeBuilder};
use super::shader_graph::{NodeId, ShaderGraph};
use super::types::Type;

/// Every shader node kind the compiler understands. Documents spell these as
/// strings; parsing them up front lets the dispatch below match exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    ColorInput,
    FloatInput,
    Vec2Input,
    Vec3Input,
    UvCoord,
    Add,
    Multiply,
    Mix,
    Clamp,
    Power,
    Normalize,
    Dot,
    Cross,
    Cast,
    SrgbToLinear,
    LinearToSrgb,
    ToneMap,
    SampleTexture,
    SampleTextureGrad,
    SampleDepthTexture,
    SampleDepthTextureArray,
    OutputColor,
}

impl NodeKind {
    pub fn parse(node_type: &str) -> Result<NodeKind> {
        Ok(match node_type {
            "ColorInput" => NodeKind::ColorInput,
            "FloatInput" => NodeKind::FloatInput,
            "Vec2Input" => NodeKind::Vec2Input,
            "Vec3Input" => NodeKind::Vec3Input,
            "UvCoord" => NodeKind::UvCoord,
            "Add" => NodeKind::Add,
            "Multiply" => NodeKind::Multiply,
            "Mix" => NodeKind::Mix,
            "Clamp" => NodeKind::Clamp,
            "Power" => NodeKind::Power,
            "Normalize" => NodeKind::Normalize,
            "Dot" => NodeKind::Dot,
            "Cross" => NodeKind::Cross,
            "Cast" => NodeKind::Cast,
            "SrgbToLinear" => NodeKind::SrgbToLinear,
            "LinearToSrgb" => NodeKind::LinearToSrgb,
            "ToneMap" => NodeKind::ToneMap,
            "SampleTexture" => NodeKind::SampleTexture,
            "SampleTextureGrad" => NodeKind::SampleTextureGrad,
            "SampleDepthTexture" => NodeKind::SampleDepthTexture,
            "SampleDepthTextureArray" => NodeKind::SampleDepthTextureArray,
            "OutputColor" => NodeKind::OutputColor,
            other => bail!("unsupported shader node type: {other}"),
        })
    }

    /// Input kinds stay inline constants; everything else is hoisted into a
    /// named local so the graph structure stays visible in generated code.
    fn is_inline(self) -> bool {
        matches!(
            self,
            NodeKind::ColorInput
                | NodeKind::FloatInput
                | NodeKind::Vec2Input
                | NodeKind::Vec3Input
                | NodeKind::UvCoord
        )
    }
}

/// Sanitize a string to a valid shader identifier.
pub(crate) fn sanitize_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Promote a value to a vec4 color.
pub(crate) fn to_vec4_color(value: ExprRef) -> Result<ExprRef> {
    match value.ty() {
        Type::FLOAT1 => Expr::vector(vec![
            value.clone(),
            value.clone(),
            value,
            Expr::const_float(1.0),
        ]),
        Type::FLOAT2 => Expr::vector(vec![value, Expr::const_float(0.0), Expr::const_float(1.0)]),
        Type::FLOAT3 => Expr::vector(vec![value, Expr::const_float(1.0)]),
        Type::FLOAT4 => Ok(value),
        other => bail!("cannot interpret {other} as a color"),
    }
}

/// Compiles one document into a fragment-stage block, visiting nodes in the
/// shader graph's topological order.
pub struct GraphCompiler {
    pub(crate) doc: GraphDoc,
    pub(crate) nodes_by_id: HashMap<String, NodeDesc>,
    pub(crate) cache: HashMap<(String, String), ExprRef>,
    pub(crate) scope: ScopeBuilder,
    uv: Option<ExprRef>,
}

impl GraphCompiler {
    pub fn new(doc: &GraphDoc) -> Self {
        let nodes_by_id = doc
            .nodes
            .iter()
            .cloned()
            .map(|n| (n.id.clone(), n))
            .collect();
        Self {
            doc: doc.clone(),
            nodes_by_id,
            cache: HashMap::new(),
            scope: ScopeBuilder::new(doc.metadata.name.clone()),
            uv: None,
        }
    }

    /// The builtin fullscreen `uv` varying, declared on first use.
    pub(crate) fn uv(&mut self) -> Result<ExprRef> {
        if let Some(uv) = &self.uv {
            return Ok(uv.clone());
        }
        let uv = self.scope.in_float2("uv", None)?;
        self.uv = Some(uv.clone());
        Ok(uv)
    }

    pub(crate) fn node(&self, node_id: &str) -> Result<NodeDesc> {
        dsl::find_node(&self.nodes_by_id, node_id).cloned()
    }

    /// Value feeding `node_id.port`: an incoming connection wins, otherwise an
    /// inline float param of the same name.
    pub(crate) fn input_expr(&mut self, node_id: &str, port: &str) -> Result<Option<ExprRef>> {
        let from = dsl::incoming_connection(&self.doc, node_id, port).map(|c| c.from.clone());
        if let Some(from) = from {
            let key = (from.node_id.clone(), from.port_id.clone());
            let Some(expr) = self.cache.get(&key) else {
                bail!("node '{}' has no compiled output '{}'", from.node_id, from.port_id);
            };
            return Ok(Some(expr.clone()));
        }

        let node = dsl::find_node(&self.nodes_by_id, node_id)?;
        Ok(dsl::parse_f32(&node.params, port).map(Expr::const_float))
    }

    pub(crate) fn require_input(&mut self, node: &NodeDesc, port: &str) -> Result<ExprRef> {
        self.input_expr(&node.id, port)?
            .ok_or_else(|| anyhow!("{} '{}' missing input {}", node.node_type, node.id, port))
    }

    /// Compile the whole document into a frozen block.
    pub fn compile(mut self) -> Result<crate::compiler::scope::Block> {
        let output_id = dsl::output_node_id(&self.doc)?;

        let mut graph = ShaderGraph::new();
        let mut ids: HashMap<String, NodeId> = HashMap::new();
        for n in &self.doc.nodes {
            // Parse early so unknown kinds fail before any codegen work.
            let kind = NodeKind::parse(&n.node_type)?;
            ids.insert(n.id.clone(), graph.add_node(&n.id, kind)?);
        }
        for c in &self.doc.connections {
            let (Some(&to), Some(&from)) = (ids.get(&c.to.node_id), ids.get(&c.from.node_id)) else {
                bail!(
                    "connection references missing node: {} -> {}",
                    c.from.node_id,
                    c.to.node_id
                );
            };
            if c.from.port_id != "value" {
                bail!("unsupported output port: {}.{}", c.from.node_id, c.from.port_id);
            }
            graph.depends_on(to, from)?;
        }
        let order = graph.codegen_order()?;

        let out_handle = self.scope.out_float4("frag_color")?;
        for id in order {
            let name = graph.node(id).expect("ordered node exists").name.clone();
            let node = self.node(&name)?;
            let kind = NodeKind::parse(&node.node_type)?;
            self.compile_node(&node, kind, &out_handle)?;
        }

        // An explicit output can point at any node; route it to the stage
        // output unless an OutputColor node already did.
        let output_node = self.node(&output_id)?;
        if NodeKind::parse(&output_node.node_type)? != NodeKind::OutputColor {
            let value = self
                .cache
                .get(&(output_id.clone(), "value".to_string()))
                .cloned()
                .ok_or_else(|| anyhow!("output node '{}' produced no value", output_id))?;
            let color = to_vec4_color(value)?;
            self.scope.assign_output(&out_handle, color)?;
        }

        self.scope.finish()
    }

    fn compile_node(&mut self, node: &NodeDesc, kind: NodeKind, out: &OutputHandle) -> Result<()> {
        let value = match kind {
            NodeKind::ColorInput => input_nodes::compile_color_input(self, node)?,
            NodeKind::FloatInput => input_nodes::compile_float_input(self, node)?,
            NodeKind::Vec2Input => input_nodes::compile_vec2_input(self, node)?,
            NodeKind::Vec3Input => input_nodes::compile_vec3_input(self, node)?,
            NodeKind::UvCoord => input_nodes::compile_uv_coord(self, node)?,
            NodeKind::Add => math_nodes::compile_add(self, node)?,
            NodeKind::Multiply => math_nodes::compile_multiply(self, node)?,
            NodeKind::Mix => math_nodes::compile_mix(self, node)?,
            NodeKind::Clamp => math_nodes::compile_clamp(self, node)?,
            NodeKind::Power => math_nodes::compile_power(self, node)?,
            NodeKind::Normalize => math_nodes::compile_normalize(self, node)?,
            NodeKind::Dot => math_nodes::compile_dot(self, node)?,
            NodeKind::Cross => math_nodes::compile_cross(self, node)?,
            NodeKind::Cast => math_nodes::compile_cast(self, node)?,
            NodeKind::SrgbToLinear => color_nodes::compile_srgb_to_linear(self, node)?,
            NodeKind::LinearToSrgb => color_nodes::compile_linear_to_srgb(self, node)?,
            NodeKind::ToneMap => color_nodes::compile_tone_map(self, node)?,
            NodeKind::SampleTexture => texture_nodes::compile_sample_texture(self, node)?,
            NodeKind::SampleTextureGrad => texture_nodes::compile_sample_texture_grad(self, node)?,
            NodeKind::SampleDepthTexture => {
                texture_nodes::compile_sample_depth_texture(self, node)?
            }
            NodeKind::SampleDepthTextureArray => {
                texture_nodes::compile_sample_depth_texture_array(self, node)?
            }
            NodeKind::OutputColor => {
                let color = self.require_input(node, "color")?;
                let color = to_vec4_color(color)?;
                self.scope.assign_output(out, color)?;
                return Ok(());
            }
        };

        let value = if kind.is_inline() {
            value
        } else {
            let name = format!("n_{}", sanitize_ident(&node.id));
            let handle = self.scope.declare_var(&name, value)?;
            self.scope.read(&handle)?
        };
        self.cache.insert((node.id.clone(), "value".to_string()), value);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_a_small_graph_in_topological_order() {
        let doc = test_doc(
            vec![
                test_node("out", "OutputColor", &[]),
                test_node("base", "ColorInput", &[("value", json!([0.8, 0.2, 0.1, 1.0]))]),
                test_node("tm", "ToneMap", &[("operator", json!("reinhard"))]),
            ],
            vec![
                test_connection("base", "tm", "color"),
                test_connection("tm", "out", "color"),
            ],
        );

        let block = GraphCompiler::new(&doc).compile().unwrap();
        let pseudo = block.to_pseudo_code();
        let tm_pos = pseudo.find("n_tm").unwrap();
        let out_pos = pseudo.find("out frag_color").unwrap();
        assert!(tm_pos < out_pos, "{pseudo}");
    }

    #[test]
    fn missing_input_names_node_and_port() {
        let doc = test_doc(
            vec![
                test_node("mixer", "Mix", &[]),
                test_node("out", "OutputColor", &[]),
            ],
            vec![test_connection("mixer", "out", "color")],
        );
        let err = GraphCompiler::new(&doc).compile().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Mix 'mixer' missing input a"), "{message}");
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let doc = test_doc(vec![test_node("x", "Sparkles", &[])], Vec::new());
        let err = GraphCompiler::new(&doc).compile().unwrap_err();
        assert!(err.to_string().contains("unsupported shader node type: Sparkles"));
    }

    #[test]
    fn float_output_is_promoted_to_color() {
        let doc = test_doc(
            vec![
                test_node("half", "FloatInput", &[("value", json!(0.5))]),
                test_node("out", "OutputColor", &[]),
            ],
            vec![test_connection("half", "out", "color")],
        );
        let block = GraphCompiler::new(&doc).compile().unwrap();
        let pseudo = block.to_pseudo_code();
        assert!(pseudo.contains("vec4(0.5, 0.5, 0.5, 1.0)"), "{pseudo}");
    }
}
