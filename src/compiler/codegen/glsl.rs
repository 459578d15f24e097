//! GLSL backend.
//!
//! Lowers frozen blocks to GLSL modules. While walking a block's operations
//! the generator keeps a cache of already-emitted expressions keyed by their
//! pseudo-code; a write to a mutable variable bumps its generation and evicts
//! every cached entry that depends on an earlier generation, so stale
//! snapshots are re-evaluated instead of reused.

use std::collections::HashMap;

use anyhow::{Result, bail};

use super::{Capability, ClipSpace, CodeGenerator};
use crate::compiler::expr::{ExprKind, ExprRef, SampleExpr};
use crate::compiler::scope::{Block, Op};
use crate::compiler::state::{GenerationTracker, StateDependency, StateDependencySet};
use crate::compiler::types::{SamplerDim, SamplerType, Type};

/// Capability profile of a GLSL dialect.
#[derive(Clone, Copy, Debug)]
pub struct GlslProfile {
    pub name: &'static str,
    pub version_directive: &'static str,
    pub precision_directive: Option<&'static str>,
    pub clip_space: ClipSpace,
    pub sample_1d: bool,
    pub sample_2d: bool,
    pub sample_3d: bool,
    pub sample_cube: bool,
    pub sample_lod: bool,
    pub sample_grad: bool,
    pub depth_compare: bool,
    pub depth_array: bool,
}

impl GlslProfile {
    /// Desktop GLSL with the full sampling surface.
    pub fn desktop() -> Self {
        Self {
            name: "glsl-450",
            version_directive: "#version 450",
            precision_directive: None,
            clip_space: ClipSpace::YUp,
            sample_1d: true,
            sample_2d: true,
            sample_3d: true,
            sample_cube: true,
            sample_lod: true,
            sample_grad: true,
            depth_compare: true,
            depth_array: true,
        }
    }

    /// GLSL ES 3.00: no 1D texture family.
    pub fn gles() -> Self {
        Self {
            name: "glsl-300-es",
            version_directive: "#version 300 es",
            precision_directive: Some("precision highp float;"),
            sample_1d: false,
            ..Self::desktop()
        }
    }

    pub fn with_clip_space(mut self, clip_space: ClipSpace) -> Self {
        self.clip_space = clip_space;
        self
    }
}

struct CachedExpr {
    text: String,
    deps: StateDependencySet,
}

pub struct GlslGenerator {
    profile: GlslProfile,
    functions: Vec<(String, String)>,
    function_index: HashMap<String, usize>,
    main_lines: Vec<String>,
    temp_counter: u32,
    indent: usize,
    cache: HashMap<String, CachedExpr>,
    generations: GenerationTracker,
}

impl GlslGenerator {
    pub fn new(profile: GlslProfile) -> Self {
        Self {
            profile,
            functions: Vec::new(),
            function_index: HashMap::new(),
            main_lines: Vec::new(),
            temp_counter: 0,
            indent: 1,
            cache: HashMap::new(),
            generations: GenerationTracker::new(),
        }
    }

    pub fn profile(&self) -> &GlslProfile {
        &self.profile
    }

    fn reset(&mut self) {
        self.functions.clear();
        self.function_index.clear();
        self.main_lines.clear();
        self.temp_counter = 0;
        self.indent = 1;
        self.cache.clear();
        self.generations = GenerationTracker::new();
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if !self.supports(capability) {
            bail!(
                "generator '{}' does not support {}",
                self.profile.name,
                capability.describe()
            );
        }
        Ok(())
    }

    /// Generate the fragment module for a frozen block.
    pub fn generate_fragment(&mut self, block: &Block) -> Result<String> {
        self.reset();
        for helper in &block.helpers {
            self.append_function(&helper.name, &helper.code);
        }

        // Inputs with constant defaults become locals; the rest are varyings.
        for input in &block.inputs {
            if let Some(default) = &input.default {
                let text = self.emit_expr(default)?;
                self.append_main(&format!("{} {} = {};", input.ty.glsl(), input.name, text));
            }
        }
        self.emit_ops(&block.ops)?;

        let mut sections: Vec<String> = Vec::new();
        let mut header = String::new();
        let mut location = 0usize;
        for input in &block.inputs {
            if input.default.is_none() {
                header.push_str(&format!(
                    "layout(location = {location}) in {} {};\n",
                    input.ty.glsl(),
                    input.name
                ));
                location += 1;
            }
        }
        for (i, output) in block.outputs.iter().enumerate() {
            header.push_str(&format!(
                "layout(location = {i}) out {} {};\n",
                output.ty.glsl(),
                output.name
            ));
        }
        for sampler in &block.samplers {
            header.push_str(&format!("uniform {} {};\n", sampler.ty.glsl(), sampler.name));
        }
        if !header.is_empty() {
            sections.push(header.trim_end().to_string());
        }
        for (_, code) in &self.functions {
            sections.push(code.trim_end().to_string());
        }
        sections.push(format!("void main() {{\n{}\n}}", self.main_lines.join("\n")));

        Ok(self.assemble_module(&sections))
    }

    /// Generate the fullscreen-triangle vertex module matching a fragment
    /// block's varyings.
    pub fn generate_vertex(&mut self, block: &Block) -> Result<String> {
        self.reset();
        let mut has_uv = false;
        for input in &block.inputs {
            if input.default.is_some() {
                continue;
            }
            if input.name == "uv" && input.ty == Type::FLOAT2 {
                has_uv = true;
            } else {
                bail!(
                    "fullscreen vertex stage cannot provide varying '{}' ({})",
                    input.name,
                    input.ty
                );
            }
        }

        let mut sections: Vec<String> = Vec::new();
        if has_uv {
            sections.push("layout(location = 0) out vec2 uv;".to_string());
        }
        let mut main = String::new();
        main.push_str(
            "    vec2 xy = vec2(float((gl_VertexIndex << 1) & 2), float(gl_VertexIndex & 2));\n",
        );
        if has_uv {
            main.push_str("    uv = xy;\n");
        }
        main.push_str("    gl_Position = vec4(xy * 2.0 - 1.0, 0.0, 1.0);\n");
        if self.clip_space() == ClipSpace::YDown {
            main.push_str("    gl_Position.y = -gl_Position.y;\n");
        }
        sections.push(format!("void main() {{\n{}}}", main));

        Ok(self.assemble_module(&sections))
    }

    fn assemble_module(&self, sections: &[String]) -> String {
        let mut out = String::new();
        out.push_str(self.profile.version_directive);
        out.push('\n');
        if let Some(precision) = self.profile.precision_directive {
            out.push('\n');
            out.push_str(precision);
            out.push('\n');
        }
        for section in sections {
            out.push('\n');
            out.push_str(section);
            out.push('\n');
        }
        out
    }

    fn emit_ops(&mut self, ops: &[Op]) -> Result<()> {
        for op in ops {
            match op {
                Op::DeclareVar { name, ty, init } => {
                    let text = self.emit_root(init)?;
                    self.append_main(&format!("{} {} = {};", ty.glsl(), name, text));
                    self.generations.set(name, 0);
                    self.remember_value(init, name, 0);
                }
                Op::Assign { name, generation, value } => {
                    let text = self.emit_root(value)?;
                    self.append_main(&format!("{name} = {text};"));
                    self.generations.set(name, *generation);
                    self.evict_dependents(name);
                    self.remember_value(value, name, *generation);
                }
                Op::AssignOutput { name, value } => {
                    let text = self.emit_root(value)?;
                    self.append_main(&format!("{name} = {text};"));
                }
                Op::If { cond, then_ops, else_ops } => {
                    let cond_text = self.emit_expr(cond)?;
                    self.append_main(&format!("if ({cond_text}) {{"));
                    let saved: Vec<(String, String, StateDependencySet)> = self.snapshot_cache();
                    self.indent += 1;
                    self.emit_ops(then_ops)?;
                    self.indent -= 1;
                    self.restore_cache(&saved);
                    if !else_ops.is_empty() {
                        self.append_main("} else {");
                        self.indent += 1;
                        self.emit_ops(else_ops)?;
                        self.indent -= 1;
                        self.restore_cache(&saved);
                    }
                    self.append_main("}");
                }
                Op::Scope { label, ops } => {
                    if label.is_empty() {
                        self.append_main("{");
                    } else {
                        self.append_main(&format!("{{ // {label}"));
                    }
                    let saved = self.snapshot_cache();
                    self.indent += 1;
                    self.emit_ops(ops)?;
                    self.indent -= 1;
                    self.restore_cache(&saved);
                    self.append_main("}");
                }
            }
        }
        Ok(())
    }

    // Locals emitted inside a nested block are scoped to it; the cache must
    // not leak them into the surrounding scope.
    fn snapshot_cache(&self) -> Vec<(String, String, StateDependencySet)> {
        self.cache
            .iter()
            .map(|(k, v)| (k.clone(), v.text.clone(), v.deps.clone()))
            .collect()
    }

    fn restore_cache(&mut self, saved: &[(String, String, StateDependencySet)]) {
        self.cache.clear();
        for (key, text, deps) in saved {
            self.cache.insert(
                key.clone(),
                CachedExpr { text: text.clone(), deps: deps.clone() },
            );
        }
    }

    fn evict_dependents(&mut self, var: &str) {
        self.cache.retain(|_, cached| cached.deps.iter().all(|d| d.var != var));
    }

    /// Record that a named variable now holds the value of `expr`, so later
    /// structurally identical expressions can reuse it. The entry depends on
    /// the variable's own generation in addition to the expression's reads,
    /// which invalidates it when the variable is overwritten.
    fn remember_value(&mut self, expr: &ExprRef, var: &str, generation: u64) {
        if matches!(expr.kind, ExprKind::VarRef { .. } | ExprKind::InputRef { .. }) {
            return;
        }
        let mut deps = expr.collect_state_dependencies();
        deps.insert(StateDependency::new(var, generation));
        self.cache.insert(
            expr.to_pseudo_code(),
            CachedExpr { text: var.to_string(), deps },
        );
    }

    fn cache_lookup(&self, key: &str) -> Option<String> {
        let cached = self.cache.get(key)?;
        if cached.deps.iter().all(|d| self.generations.is_current(d)) {
            Some(cached.text.clone())
        } else {
            None
        }
    }

    /// Emit an expression used as the right-hand side of a statement. The
    /// statement itself holds the value, so the root is never hoisted into a
    /// temporary.
    fn emit_root(&mut self, expr: &ExprRef) -> Result<String> {
        if is_hoistable(expr) {
            if let Some(text) = self.cache_lookup(&expr.to_pseudo_code()) {
                return Ok(text);
            }
            return self.build_text(expr);
        }
        self.emit_expr(expr)
    }

    fn emit_expr(&mut self, expr: &ExprRef) -> Result<String> {
        if is_hoistable(expr) {
            let key = expr.to_pseudo_code();
            if let Some(text) = self.cache_lookup(&key) {
                return Ok(text);
            }
            let text = self.build_text(expr)?;
            let var = format!("_e{}", self.temp_counter);
            self.temp_counter += 1;
            self.append_main(&format!("{} {} = {};", expr.ty().glsl(), var, text));
            let deps = expr.collect_state_dependencies();
            self.cache.insert(key, CachedExpr { text: var.clone(), deps });
            Ok(var)
        } else {
            self.build_text(expr)
        }
    }

    fn build_text(&mut self, expr: &ExprRef) -> Result<String> {
        Ok(match &expr.kind {
            ExprKind::ConstBool(v) => v.to_string(),
            ExprKind::ConstInt(v) => v.to_string(),
            ExprKind::ConstFloat(v) => crate::compiler::expr::fmt_f32(*v),
            ExprKind::VectorCtor { components } => {
                let mut parts = Vec::with_capacity(components.len());
                for c in components {
                    parts.push(self.emit_expr(c)?);
                }
                format!("{}({})", expr.ty().glsl(), parts.join(", "))
            }
            ExprKind::InputRef { name } => name.clone(),
            ExprKind::VarRef { name, .. } => name.clone(),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.emit_expr(lhs)?;
                let r = self.emit_expr(rhs)?;
                format!("({l} {} {r})", op.symbol())
            }
            ExprKind::Call { func, args } => {
                let mut parts = Vec::with_capacity(args.len());
                for a in args {
                    parts.push(self.emit_expr(a)?);
                }
                format!("{}({})", func.name(), parts.join(", "))
            }
            ExprKind::HelperCall { name, args } => {
                let mut parts = Vec::with_capacity(args.len());
                for a in args {
                    parts.push(self.emit_expr(a)?);
                }
                format!("{}({})", name, parts.join(", "))
            }
            ExprKind::Cast { value } => {
                let inner = self.emit_expr(value)?;
                format!("{}({inner})", expr.ty().glsl())
            }
            ExprKind::Swizzle { value, components } => {
                let inner = self.emit_expr(value)?;
                format!("{inner}.{components}")
            }
            ExprKind::Sample(sample) => self.build_sample(sample)?,
        })
    }

    fn build_sample(&mut self, sample: &SampleExpr) -> Result<String> {
        let coord = self.emit_expr(&sample.coord)?;
        let layer = match &sample.array_index {
            Some(layer) => Some(self.emit_expr(layer)?),
            None => None,
        };
        if let Some(depth_ref) = &sample.depth_ref {
            let depth_ref = self.emit_expr(depth_ref)?;
            return self.sample_depth_texture(
                &sample.sampler,
                sample.sampler_ty,
                &coord,
                layer.as_deref(),
                &depth_ref,
            );
        }
        if let Some((ddx, ddy)) = &sample.grad {
            let ddx = self.emit_expr(ddx)?;
            let ddy = self.emit_expr(ddy)?;
            return self.sample_texture_grad(
                &sample.sampler,
                sample.sampler_ty,
                &coord,
                layer.as_deref(),
                &ddx,
                &ddy,
            );
        }
        let lod = match &sample.lod {
            Some(lod) => Some(self.emit_expr(lod)?),
            None => None,
        };
        self.sample_texture(
            &sample.sampler,
            sample.sampler_ty,
            &coord,
            layer.as_deref(),
            lod.as_deref(),
        )
    }

    fn require_dim(&self, dim: SamplerDim) -> Result<()> {
        self.require(match dim {
            SamplerDim::D1 => Capability::Sample1d,
            SamplerDim::D2 => Capability::Sample2d,
            SamplerDim::D3 => Capability::Sample3d,
            SamplerDim::Cube => Capability::SampleCube,
        })
    }

    fn combine_coord(&self, ty: SamplerType, coord: &str, layer: Option<&str>) -> Result<String> {
        let Some(layer) = layer else {
            return Ok(coord.to_string());
        };
        match ty.dim {
            SamplerDim::D1 => Ok(format!("vec2({coord}, {layer})")),
            SamplerDim::D2 => Ok(format!("vec3({coord}, {layer})")),
            SamplerDim::Cube => Ok(format!("vec4({coord}, {layer})")),
            SamplerDim::D3 => bail!("3d array textures are not supported"),
        }
    }
}

fn is_hoistable(expr: &ExprRef) -> bool {
    matches!(expr.kind, ExprKind::Sample(_) | ExprKind::HelperCall { .. })
}

impl CodeGenerator for GlslGenerator {
    fn clip_space(&self) -> ClipSpace {
        self.profile.clip_space
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Sample1d => self.profile.sample_1d,
            Capability::Sample2d => self.profile.sample_2d,
            Capability::Sample3d => self.profile.sample_3d,
            Capability::SampleCube => self.profile.sample_cube,
            Capability::SampleLod => self.profile.sample_lod,
            Capability::SampleGrad => self.profile.sample_grad,
            Capability::DepthCompare => self.profile.depth_compare,
            Capability::DepthArray => self.profile.depth_array,
        }
    }

    fn append_function(&mut self, name: &str, code: &str) {
        if let Some(&idx) = self.function_index.get(name) {
            if self.functions[idx].1 != code {
                log::warn!(
                    "function '{name}' re-registered with different code; keeping the first registration"
                );
            }
            return;
        }
        self.function_index.insert(name.to_string(), self.functions.len());
        self.functions.push((name.to_string(), code.to_string()));
    }

    fn append_main(&mut self, code: &str) {
        let pad = "    ".repeat(self.indent);
        self.main_lines.push(format!("{pad}{code}"));
    }

    fn sample_texture(
        &mut self,
        sampler: &str,
        ty: SamplerType,
        coord: &str,
        layer: Option<&str>,
        lod: Option<&str>,
    ) -> Result<String> {
        self.require_dim(ty.dim)?;
        if lod.is_some() {
            self.require(Capability::SampleLod)?;
        }
        let coord = self.combine_coord(ty, coord, layer)?;
        Ok(match lod {
            Some(lod) => format!("textureLod({sampler}, {coord}, {lod})"),
            None => format!("texture({sampler}, {coord})"),
        })
    }

    fn sample_texture_grad(
        &mut self,
        sampler: &str,
        ty: SamplerType,
        coord: &str,
        layer: Option<&str>,
        ddx: &str,
        ddy: &str,
    ) -> Result<String> {
        self.require_dim(ty.dim)?;
        self.require(Capability::SampleGrad)?;
        let coord = self.combine_coord(ty, coord, layer)?;
        Ok(format!("textureGrad({sampler}, {coord}, {ddx}, {ddy})"))
    }

    fn sample_depth_texture(
        &mut self,
        sampler: &str,
        ty: SamplerType,
        coord: &str,
        layer: Option<&str>,
        depth_ref: &str,
    ) -> Result<String> {
        self.require(Capability::DepthCompare)?;
        if layer.is_some() {
            self.require(Capability::DepthArray)?;
        }
        match (ty.dim, layer) {
            (SamplerDim::D2, None) => Ok(format!("texture({sampler}, vec3({coord}, {depth_ref}))")),
            (SamplerDim::D2, Some(layer)) => {
                Ok(format!("texture({sampler}, vec4({coord}, {layer}, {depth_ref}))"))
            }
            (SamplerDim::Cube, None) => {
                Ok(format!("texture({sampler}, vec4({coord}, {depth_ref}))"))
            }
            (SamplerDim::Cube, Some(_)) => bail!(
                "generator '{}' does not support cube array depth sampling",
                self.profile.name
            ),
            (SamplerDim::D1 | SamplerDim::D3, _) => bail!(
                "generator '{}' does not support depth sampling for {} textures",
                self.profile.name,
                ty.glsl()
            ),
        }
    }
}
