//! Lexical scopes and statement blocks.
//!
//! A `ScopeBuilder` assembles one shader stage: typed block inputs/outputs,
//! sampler bindings, helper functions, and an ordered operation list. Nesting
//! is an explicit frame stack (`push_scope` / `begin_if`), not closure
//! capture. The operation list is append-only while building and frozen into
//! an immutable `Block` by `finish`.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use super::expr::{Expr, ExprRef};
use super::state::GenerationTracker;
use super::types::{SamplerType, Type};

#[derive(Clone, Debug)]
pub struct BlockInput {
    pub name: String,
    pub ty: Type,
    /// Constant fallback used when the input is not fed by a varying.
    pub default: Option<ExprRef>,
}

#[derive(Clone, Debug)]
pub struct BlockOutput {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub struct SamplerBinding {
    pub name: String,
    pub ty: SamplerType,
}

#[derive(Clone, Debug)]
pub struct HelperFn {
    pub name: String,
    pub code: String,
}

/// Handle to a declared mutable variable.
#[derive(Clone, Debug)]
pub struct VarHandle {
    name: String,
    ty: Type,
}

impl VarHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// Handle to a declared block output.
#[derive(Clone, Debug)]
pub struct OutputHandle {
    name: String,
    ty: Type,
}

impl OutputHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// One recorded operation. `Assign` carries the generation the write
/// produced, so code generation can replay the write history exactly.
#[derive(Clone, Debug)]
pub enum Op {
    DeclareVar { name: String, ty: Type, init: ExprRef },
    Assign { name: String, generation: u64, value: ExprRef },
    AssignOutput { name: String, value: ExprRef },
    If { cond: ExprRef, then_ops: Vec<Op>, else_ops: Vec<Op> },
    Scope { label: String, ops: Vec<Op> },
}

/// A frozen shader-stage block.
#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    pub inputs: Vec<BlockInput>,
    pub outputs: Vec<BlockOutput>,
    pub samplers: Vec<SamplerBinding>,
    pub helpers: Vec<HelperFn>,
    pub ops: Vec<Op>,
}

impl Block {
    pub fn input(&self, name: &str) -> Option<&BlockInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Deterministic textual form of the whole block, for debugging and
    /// golden tests.
    pub fn to_pseudo_code(&self) -> String {
        let mut out = format!("block {}\n", self.name);
        for input in &self.inputs {
            match &input.default {
                Some(default) => out.push_str(&format!(
                    "  in {}: {} = {}\n",
                    input.name,
                    input.ty,
                    default.to_pseudo_code()
                )),
                None => out.push_str(&format!("  in {}: {}\n", input.name, input.ty)),
            }
        }
        for output in &self.outputs {
            out.push_str(&format!("  out {}: {}\n", output.name, output.ty));
        }
        for sampler in &self.samplers {
            out.push_str(&format!("  sampler {}: {}\n", sampler.name, sampler.ty.glsl()));
        }
        out.push_str("{\n");
        pseudo_ops(&mut out, &self.ops, 1);
        out.push_str("}\n");
        out
    }
}

fn pseudo_ops(out: &mut String, ops: &[Op], depth: usize) {
    let pad = "    ".repeat(depth);
    for op in ops {
        match op {
            Op::DeclareVar { name, ty, init } => {
                out.push_str(&format!("{pad}{name}: {ty} := {}\n", init.to_pseudo_code()));
            }
            Op::Assign { name, generation, value } => {
                out.push_str(&format!("{pad}{name}@{generation} = {}\n", value.to_pseudo_code()));
            }
            Op::AssignOutput { name, value } => {
                out.push_str(&format!("{pad}out {name} = {}\n", value.to_pseudo_code()));
            }
            Op::If { cond, then_ops, else_ops } => {
                out.push_str(&format!("{pad}if {} {{\n", cond.to_pseudo_code()));
                pseudo_ops(out, then_ops, depth + 1);
                if else_ops.is_empty() {
                    out.push_str(&format!("{pad}}}\n"));
                } else {
                    out.push_str(&format!("{pad}}} else {{\n"));
                    pseudo_ops(out, else_ops, depth + 1);
                    out.push_str(&format!("{pad}}}\n"));
                }
            }
            Op::Scope { label, ops } => {
                out.push_str(&format!("{pad}scope {label} {{\n"));
                pseudo_ops(out, ops, depth + 1);
                out.push_str(&format!("{pad}}}\n"));
            }
        }
    }
}

enum Frame {
    Plain { label: String, ops: Vec<Op> },
    If { cond: ExprRef, then_ops: Vec<Op>, in_else: bool, else_ops: Vec<Op> },
}

pub struct ScopeBuilder {
    name: String,
    inputs: Vec<BlockInput>,
    outputs: Vec<BlockOutput>,
    samplers: Vec<SamplerBinding>,
    sampler_index: HashMap<String, usize>,
    helpers: Vec<HelperFn>,
    helper_index: HashMap<String, usize>,
    declared: HashSet<String>,
    var_types: HashMap<String, Type>,
    tracker: GenerationTracker,
    frames: Vec<Frame>,
}

impl ScopeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            samplers: Vec::new(),
            sampler_index: HashMap::new(),
            helpers: Vec::new(),
            helper_index: HashMap::new(),
            declared: HashSet::new(),
            var_types: HashMap::new(),
            tracker: GenerationTracker::new(),
            frames: vec![Frame::Plain { label: String::new(), ops: Vec::new() }],
        }
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if !self.declared.insert(name.to_string()) {
            bail!("block '{}' already declares '{}'", self.name, name);
        }
        Ok(())
    }

    fn ops_mut(&mut self) -> &mut Vec<Op> {
        match self.frames.last_mut().expect("root frame always present") {
            Frame::Plain { ops, .. } => ops,
            Frame::If { then_ops, in_else, else_ops, .. } => {
                if *in_else {
                    else_ops
                } else {
                    then_ops
                }
            }
        }
    }

    /// Declare a typed block input. Returns the expression that reads it.
    pub fn declare_input(
        &mut self,
        name: &str,
        ty: Type,
        default: Option<ExprRef>,
    ) -> Result<ExprRef> {
        self.claim_name(name)?;
        if let Some(default) = &default {
            if default.ty() != ty {
                bail!(
                    "default for input '{}' must be {}, got {}",
                    name,
                    ty,
                    default.ty()
                );
            }
        }
        self.inputs.push(BlockInput { name: name.to_string(), ty, default });
        Ok(Expr::input(name, ty))
    }

    pub fn in_float1(&mut self, name: &str, default: Option<f32>) -> Result<ExprRef> {
        self.declare_input(name, Type::FLOAT1, default.map(Expr::const_float))
    }

    pub fn in_float2(&mut self, name: &str, default: Option<[f32; 2]>) -> Result<ExprRef> {
        let default = default.map(|v| Expr::const_vec(&v)).transpose()?;
        self.declare_input(name, Type::FLOAT2, default)
    }

    pub fn in_float3(&mut self, name: &str, default: Option<[f32; 3]>) -> Result<ExprRef> {
        let default = default.map(|v| Expr::const_vec(&v)).transpose()?;
        self.declare_input(name, Type::FLOAT3, default)
    }

    pub fn in_float4(&mut self, name: &str, default: Option<[f32; 4]>) -> Result<ExprRef> {
        let default = default.map(|v| Expr::const_vec(&v)).transpose()?;
        self.declare_input(name, Type::FLOAT4, default)
    }

    /// Declare a typed block output.
    pub fn declare_output(&mut self, name: &str, ty: Type) -> Result<OutputHandle> {
        self.claim_name(name)?;
        self.outputs.push(BlockOutput { name: name.to_string(), ty });
        Ok(OutputHandle { name: name.to_string(), ty })
    }

    pub fn out_float1(&mut self, name: &str) -> Result<OutputHandle> {
        self.declare_output(name, Type::FLOAT1)
    }

    pub fn out_float2(&mut self, name: &str) -> Result<OutputHandle> {
        self.declare_output(name, Type::FLOAT2)
    }

    pub fn out_float3(&mut self, name: &str) -> Result<OutputHandle> {
        self.declare_output(name, Type::FLOAT3)
    }

    pub fn out_float4(&mut self, name: &str) -> Result<OutputHandle> {
        self.declare_output(name, Type::FLOAT4)
    }

    /// Register a sampler binding and return its binding index. Registering
    /// the same name again returns the existing index; a conflicting type is
    /// an error.
    pub fn register_sampler(&mut self, name: &str, ty: SamplerType) -> Result<usize> {
        if let Some(&idx) = self.sampler_index.get(name) {
            let existing = self.samplers[idx].ty;
            if existing != ty {
                bail!(
                    "sampler '{}' has conflicting declarations: first {}, later {}",
                    name,
                    existing.glsl(),
                    ty.glsl()
                );
            }
            return Ok(idx);
        }
        self.claim_name(name)?;
        let idx = self.samplers.len();
        self.samplers.push(SamplerBinding { name: name.to_string(), ty });
        self.sampler_index.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Register a helper function body. Registration is idempotent for an
    /// identical name; re-registering with different code keeps the first
    /// body.
    pub fn register_helper(&mut self, name: &str, code: &str) {
        if let Some(&idx) = self.helper_index.get(name) {
            if self.helpers[idx].code != code {
                log::warn!(
                    "helper function '{name}' re-registered with different code; keeping the first registration"
                );
            }
            return;
        }
        let idx = self.helpers.len();
        self.helpers.push(HelperFn { name: name.to_string(), code: code.to_string() });
        self.helper_index.insert(name.to_string(), idx);
    }

    /// Declare a mutable variable initialized with `init`.
    pub fn declare_var(&mut self, name: &str, init: ExprRef) -> Result<VarHandle> {
        if init.ty().is_sampler() {
            bail!("variable '{}' cannot hold a sampler value", name);
        }
        self.claim_name(name)?;
        let ty = init.ty();
        self.var_types.insert(name.to_string(), ty);
        self.tracker.declare(name);
        self.ops_mut().push(Op::DeclareVar { name: name.to_string(), ty, init });
        Ok(VarHandle { name: name.to_string(), ty })
    }

    /// Read a variable at its current write generation.
    pub fn read(&self, var: &VarHandle) -> Result<ExprRef> {
        let Some(generation) = self.tracker.current(var.name()) else {
            bail!("unknown variable '{}' in block '{}'", var.name(), self.name);
        };
        Ok(Expr::var_ref(var.name(), var.ty(), generation))
    }

    /// Write a variable, bumping its generation. Expressions built from
    /// earlier reads keep referring to the earlier generation.
    pub fn assign(&mut self, var: &VarHandle, value: ExprRef) -> Result<()> {
        if self.tracker.current(var.name()).is_none() {
            bail!("unknown variable '{}' in block '{}'", var.name(), self.name);
        }
        if value.ty() != var.ty() {
            bail!(
                "assignment to '{}' expects {}, got {}",
                var.name(),
                var.ty(),
                value.ty()
            );
        }
        let generation = self.tracker.bump(var.name());
        self.ops_mut().push(Op::Assign { name: var.name().to_string(), generation, value });
        Ok(())
    }

    pub fn assign_output(&mut self, output: &OutputHandle, value: ExprRef) -> Result<()> {
        if value.ty() != output.ty() {
            bail!(
                "output '{}' expects {}, got {}",
                output.name(),
                output.ty(),
                value.ty()
            );
        }
        self.ops_mut().push(Op::AssignOutput { name: output.name().to_string(), value });
        Ok(())
    }

    /// Open a nested lexical scope.
    pub fn push_scope(&mut self, label: &str) {
        self.frames.push(Frame::Plain { label: label.to_string(), ops: Vec::new() });
    }

    /// Close the innermost nested scope, appending it to the parent's
    /// operation list.
    pub fn pop_scope(&mut self) -> Result<()> {
        if self.frames.len() == 1 {
            bail!("pop_scope on the root scope of block '{}'", self.name);
        }
        if !matches!(self.frames.last(), Some(Frame::Plain { .. })) {
            bail!("pop_scope inside an unfinished if in block '{}'", self.name);
        }
        match self.frames.pop() {
            Some(Frame::Plain { label, ops }) => {
                self.ops_mut().push(Op::Scope { label, ops });
                Ok(())
            }
            _ => unreachable!("checked above"),
        }
    }

    pub fn begin_if(&mut self, cond: ExprRef) -> Result<()> {
        if cond.ty() != Type::BOOL1 {
            bail!("if condition must be bool, got {}", cond.ty());
        }
        self.frames.push(Frame::If {
            cond,
            then_ops: Vec::new(),
            in_else: false,
            else_ops: Vec::new(),
        });
        Ok(())
    }

    pub fn begin_else(&mut self) -> Result<()> {
        match self.frames.last_mut() {
            Some(Frame::If { in_else, .. }) if !*in_else => {
                *in_else = true;
                Ok(())
            }
            _ => bail!("begin_else without a matching begin_if in block '{}'", self.name),
        }
    }

    pub fn end_if(&mut self) -> Result<()> {
        match self.frames.pop() {
            Some(Frame::If { cond, then_ops, else_ops, .. }) => {
                self.ops_mut().push(Op::If { cond, then_ops, else_ops });
                Ok(())
            }
            other => {
                if let Some(frame) = other {
                    self.frames.push(frame);
                }
                bail!("end_if without a matching begin_if in block '{}'", self.name)
            }
        }
    }

    /// Freeze the builder into an immutable block. All nested scopes must be
    /// closed.
    pub fn finish(mut self) -> Result<Block> {
        if self.frames.len() != 1 {
            bail!("block '{}' has unclosed scopes", self.name);
        }
        let ops = match self.frames.pop().expect("root frame") {
            Frame::Plain { ops, .. } => ops,
            Frame::If { .. } => unreachable!("root frame is always plain"),
        };
        Ok(Block {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            samplers: self.samplers,
            helpers: self.helpers,
            ops,
        })
    }
}
