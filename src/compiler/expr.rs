//! The immutable typed expression graph.
//!
//! Expressions are built through the constructors below, which check type
//! constraints at construction time. A node's type is fixed when it is built
//! and never changes; nodes own their operand sub-expressions via `Rc`, so
//! identical sub-graphs can be shared freely.

use std::rc::Rc;

use anyhow::{Result, bail};

use super::state::{StateDependency, StateDependencySet};
use super::types::{SamplerDim, SamplerType, ScalarKind, Type};

pub type ExprRef = Rc<Expr>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Built-in functions with fixed signatures, spelled the same in pseudo-code
/// and GLSL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinFn {
    Normalize,
    Dot,
    Cross,
    Mix,
    Clamp,
    Pow,
}

impl BuiltinFn {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinFn::Normalize => "normalize",
            BuiltinFn::Dot => "dot",
            BuiltinFn::Cross => "cross",
            BuiltinFn::Mix => "mix",
            BuiltinFn::Clamp => "clamp",
            BuiltinFn::Pow => "pow",
        }
    }
}

/// A texture sampling expression. Which fields are populated decides the
/// sampling variant the code generator must support.
#[derive(Clone, Debug)]
pub struct SampleExpr {
    pub sampler: String,
    pub sampler_ty: SamplerType,
    pub coord: ExprRef,
    pub array_index: Option<ExprRef>,
    pub lod: Option<ExprRef>,
    pub grad: Option<(ExprRef, ExprRef)>,
    pub depth_ref: Option<ExprRef>,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    ConstBool(bool),
    ConstInt(i32),
    ConstFloat(f32),
    /// Vector constructor; component counts sum to the vector size.
    VectorCtor { components: Vec<ExprRef> },
    /// Read of a typed block input.
    InputRef { name: String },
    /// Read of a mutable variable at a specific write generation.
    VarRef { name: String, generation: u64 },
    Binary { op: BinaryOp, lhs: ExprRef, rhs: ExprRef },
    Call { func: BuiltinFn, args: Vec<ExprRef> },
    /// Call of a registered helper function (see `ScopeBuilder::register_helper`).
    HelperCall { name: String, args: Vec<ExprRef> },
    Cast { value: ExprRef },
    Swizzle { value: ExprRef, components: String },
    Sample(SampleExpr),
}

#[derive(Clone, Debug)]
pub struct Expr {
    ty: Type,
    pub kind: ExprKind,
}

/// Format a float the way generated code spells it: shortest round-trip
/// form, always keeping a decimal point so the literal stays a float.
pub(crate) fn fmt_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let mut s = format!("{v}");
    if !s.contains('.') {
        s.push_str(".0");
    }
    s
}

fn rc(ty: Type, kind: ExprKind) -> ExprRef {
    Rc::new(Expr { ty, kind })
}

impl Expr {
    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn const_bool(v: bool) -> ExprRef {
        rc(Type::BOOL1, ExprKind::ConstBool(v))
    }

    pub fn const_int(v: i32) -> ExprRef {
        rc(Type::INT1, ExprKind::ConstInt(v))
    }

    pub fn const_float(v: f32) -> ExprRef {
        rc(Type::FLOAT1, ExprKind::ConstFloat(v))
    }

    /// Float vector constant from raw components.
    pub fn const_vec(values: &[f32]) -> Result<ExprRef> {
        let components = values.iter().map(|v| Self::const_float(*v)).collect();
        Self::vector(components)
    }

    /// Vector constructor. Components may be scalars or smaller vectors of the
    /// same kind; their component counts must sum to 2..=4.
    pub fn vector(components: Vec<ExprRef>) -> Result<ExprRef> {
        if components.is_empty() {
            bail!("vector constructor needs at least one component");
        }
        let kind = match components[0].ty().component_kind() {
            Some(kind) => kind,
            None => bail!(
                "vector constructor component must be scalar or vector, got {}",
                components[0].ty()
            ),
        };
        let mut size: u8 = 0;
        for c in &components {
            match (c.ty().component_kind(), c.ty().component_count()) {
                (Some(k), Some(n)) if k == kind => size += n,
                _ => bail!(
                    "vector constructor expects {} components, got {}",
                    kind.glsl(),
                    c.ty()
                ),
            }
        }
        let ty = Type::vector(kind, size)?;
        Ok(rc(ty, ExprKind::VectorCtor { components }))
    }

    pub(crate) fn input(name: &str, ty: Type) -> ExprRef {
        rc(ty, ExprKind::InputRef { name: name.to_string() })
    }

    pub(crate) fn var_ref(name: &str, ty: Type, generation: u64) -> ExprRef {
        rc(ty, ExprKind::VarRef { name: name.to_string(), generation })
    }

    /// Binary arithmetic with scalar-to-vector promotion; matrix
    /// multiplication is supported for `Mul` only.
    pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> Result<ExprRef> {
        if op == BinaryOp::Mul {
            if let Some(ty) = matrix_mul_type(lhs.ty(), rhs.ty()) {
                return Ok(rc(ty, ExprKind::Binary { op, lhs, rhs }));
            }
        }
        let (lhs_ty, rhs_ty) = (lhs.ty(), rhs.ty());
        if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
            bail!("incompatible types for {}: {lhs_ty} and {rhs_ty}", op.symbol());
        }
        let (lhs, rhs, ty) = coerce_for_binary(lhs, rhs).map_err(|_| {
            anyhow::anyhow!("incompatible types for {}: {lhs_ty} and {rhs_ty}", op.symbol())
        })?;
        Ok(rc(ty, ExprKind::Binary { op, lhs, rhs }))
    }

    pub fn add(lhs: ExprRef, rhs: ExprRef) -> Result<ExprRef> {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn mul(lhs: ExprRef, rhs: ExprRef) -> Result<ExprRef> {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn normalize(value: ExprRef) -> Result<ExprRef> {
        if !value.ty().is_float_vector() {
            bail!("normalize expects a float vector, got {}", value.ty());
        }
        let ty = value.ty();
        Ok(rc(ty, ExprKind::Call { func: BuiltinFn::Normalize, args: vec![value] }))
    }

    pub fn dot(a: ExprRef, b: ExprRef) -> Result<ExprRef> {
        if !a.ty().is_float_vector() || a.ty() != b.ty() {
            bail!(
                "dot expects two float vectors of the same size, got {} and {}",
                a.ty(),
                b.ty()
            );
        }
        Ok(rc(Type::FLOAT1, ExprKind::Call { func: BuiltinFn::Dot, args: vec![a, b] }))
    }

    pub fn cross(a: ExprRef, b: ExprRef) -> Result<ExprRef> {
        if a.ty() != Type::FLOAT3 || b.ty() != Type::FLOAT3 {
            bail!("cross expects two vec3 operands, got {} and {}", a.ty(), b.ty());
        }
        Ok(rc(Type::FLOAT3, ExprKind::Call { func: BuiltinFn::Cross, args: vec![a, b] }))
    }

    pub fn pow(base: ExprRef, exponent: ExprRef) -> Result<ExprRef> {
        let (base, exponent, ty) = coerce_float_pair("pow", base, exponent)?;
        Ok(rc(ty, ExprKind::Call { func: BuiltinFn::Pow, args: vec![base, exponent] }))
    }

    pub fn clamp(value: ExprRef, min: ExprRef, max: ExprRef) -> Result<ExprRef> {
        let ty = value.ty();
        if !ty.is_float_scalar() && !ty.is_float_vector() {
            bail!("clamp expects a float value, got {ty}");
        }
        let min = splat_to(min, ty, "clamp")?;
        let max = splat_to(max, ty, "clamp")?;
        Ok(rc(ty, ExprKind::Call { func: BuiltinFn::Clamp, args: vec![value, min, max] }))
    }

    pub fn mix(a: ExprRef, b: ExprRef, t: ExprRef) -> Result<ExprRef> {
        let (a, b, ty) = coerce_float_pair("mix", a, b)?;
        if t.ty() != Type::FLOAT1 && t.ty() != ty {
            bail!("mix factor must be float or {}, got {}", ty, t.ty());
        }
        Ok(rc(ty, ExprKind::Call { func: BuiltinFn::Mix, args: vec![a, b, t] }))
    }

    /// Component-kind cast. Casting between scalar and vector families (or
    /// to/from matrices and samplers) is a type-mismatch error.
    pub fn cast(value: ExprRef, target: Type) -> Result<ExprRef> {
        if value.ty() == target {
            return Ok(value);
        }
        let (from_count, to_count) = match (value.ty().component_count(), target.component_count()) {
            (Some(a), Some(b)) => (a, b),
            _ => bail!("cannot cast {} to {}: only scalar and vector casts are supported", value.ty(), target),
        };
        if from_count != to_count {
            bail!(
                "cannot cast {} to {}: scalar and vector families do not mix (expected {} components, got {})",
                value.ty(),
                target,
                to_count,
                from_count
            );
        }
        Ok(rc(target, ExprKind::Cast { value }))
    }

    /// Swizzle a vector with components drawn from `xyzw`.
    pub fn swizzle(value: ExprRef, components: &str) -> Result<ExprRef> {
        let size = match value.ty() {
            Type::Vector { size, .. } => size,
            other => bail!("swizzle expects a vector, got {other}"),
        };
        if components.is_empty() || components.len() > 4 {
            bail!("swizzle must select 1..=4 components, got '{components}'");
        }
        for ch in components.chars() {
            let index = match ch {
                'x' => 0,
                'y' => 1,
                'z' => 2,
                'w' => 3,
                other => bail!("invalid swizzle component '{other}' in '{components}'"),
            };
            if index >= size {
                bail!("swizzle component '{ch}' out of range for {}", value.ty());
            }
        }
        let kind = value
            .ty()
            .component_kind()
            .expect("vector type has a component kind");
        let ty = if components.len() == 1 {
            Type::Scalar(kind)
        } else {
            Type::vector(kind, components.len() as u8)?
        };
        Ok(rc(ty, ExprKind::Swizzle { value, components: components.to_string() }))
    }

    /// Call of a helper function previously registered on the scope. The
    /// return type is declared by the caller; argument types were checked when
    /// the arguments were built.
    pub fn helper_call(name: &str, args: Vec<ExprRef>, return_ty: Type) -> ExprRef {
        rc(return_ty, ExprKind::HelperCall { name: name.to_string(), args })
    }

    /// Sample a color texture. Using this scalar variant on an array-typed
    /// sampler logs a usage warning and samples layer 0.
    pub fn sample_texture(sampler: &str, sampler_ty: SamplerType, coord: ExprRef) -> Result<ExprRef> {
        Self::sample_color(sampler, sampler_ty, coord, None, None, None)
    }

    /// Sample a color texture at an explicit level of detail.
    pub fn sample_texture_lod(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        lod: ExprRef,
    ) -> Result<ExprRef> {
        if lod.ty() != Type::FLOAT1 {
            bail!("sample lod for '{sampler}' must be float, got {}", lod.ty());
        }
        Self::sample_color(sampler, sampler_ty, coord, None, Some(lod), None)
    }

    /// Sample one layer of an array texture.
    pub fn sample_texture_array(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        layer: ExprRef,
    ) -> Result<ExprRef> {
        if !sampler_ty.arrayed {
            bail!("sampler '{sampler}' is not an array texture");
        }
        if layer.ty() != Type::FLOAT1 {
            bail!("array layer for '{sampler}' must be float, got {}", layer.ty());
        }
        Self::sample_color(sampler, sampler_ty, coord, Some(layer), None, None)
    }

    /// Sample a color texture with explicit gradients.
    pub fn sample_texture_grad(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        ddx: ExprRef,
        ddy: ExprRef,
    ) -> Result<ExprRef> {
        let grad_ty = sampler_ty.coord_type();
        if ddx.ty() != grad_ty || ddy.ty() != grad_ty {
            bail!(
                "gradient for '{sampler}' must be {}, got {} and {}",
                grad_ty,
                ddx.ty(),
                ddy.ty()
            );
        }
        Self::sample_color(sampler, sampler_ty, coord, None, None, Some((ddx, ddy)))
    }

    fn sample_color(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        array_index: Option<ExprRef>,
        lod: Option<ExprRef>,
        grad: Option<(ExprRef, ExprRef)>,
    ) -> Result<ExprRef> {
        if sampler_ty.depth {
            bail!("sampler '{sampler}' is a depth sampler; use sample_depth_texture");
        }
        check_sample_coord(sampler, sampler_ty, &coord)?;
        let array_index = match (sampler_ty.arrayed, array_index) {
            (true, Some(layer)) => Some(layer),
            (true, None) => {
                log::warn!(
                    "sampling array texture '{sampler}' with the scalar variant; defaulting to layer 0"
                );
                Some(Self::const_float(0.0))
            }
            (false, layer) => {
                debug_assert!(layer.is_none());
                None
            }
        };
        Ok(rc(
            Type::FLOAT4,
            ExprKind::Sample(SampleExpr {
                sampler: sampler.to_string(),
                sampler_ty,
                coord,
                array_index,
                lod,
                grad,
                depth_ref: None,
            }),
        ))
    }

    /// Depth-comparison sample. Using this scalar variant on an array-typed
    /// depth sampler logs a usage warning and samples layer 0; use
    /// `sample_depth_texture_array` instead.
    pub fn sample_depth_texture(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        depth_ref: ExprRef,
    ) -> Result<ExprRef> {
        let layer = if sampler_ty.arrayed {
            log::warn!(
                "sampling depth array texture '{sampler}' with the scalar variant; defaulting to layer 0"
            );
            Some(Self::const_float(0.0))
        } else {
            None
        };
        Self::sample_depth(sampler, sampler_ty, coord, layer, depth_ref)
    }

    /// Depth-comparison sample of one layer of an array texture.
    pub fn sample_depth_texture_array(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        layer: ExprRef,
        depth_ref: ExprRef,
    ) -> Result<ExprRef> {
        if !sampler_ty.arrayed {
            bail!("sampler '{sampler}' is not an array texture");
        }
        if layer.ty() != Type::FLOAT1 {
            bail!("array layer for '{sampler}' must be float, got {}", layer.ty());
        }
        Self::sample_depth(sampler, sampler_ty, coord, Some(layer), depth_ref)
    }

    fn sample_depth(
        sampler: &str,
        sampler_ty: SamplerType,
        coord: ExprRef,
        array_index: Option<ExprRef>,
        depth_ref: ExprRef,
    ) -> Result<ExprRef> {
        if !sampler_ty.depth {
            bail!("sampler '{sampler}' is not a depth sampler; use sample_texture");
        }
        check_sample_coord(sampler, sampler_ty, &coord)?;
        if depth_ref.ty() != Type::FLOAT1 {
            bail!(
                "depth reference for '{sampler}' must be float, got {}",
                depth_ref.ty()
            );
        }
        Ok(rc(
            Type::FLOAT1,
            ExprKind::Sample(SampleExpr {
                sampler: sampler.to_string(),
                sampler_ty,
                coord,
                array_index,
                lod: None,
                grad: None,
                depth_ref: Some(depth_ref),
            }),
        ))
    }

    /// Direct operand sub-expressions, in a fixed order.
    pub fn children(&self) -> Vec<&ExprRef> {
        match &self.kind {
            ExprKind::ConstBool(_)
            | ExprKind::ConstInt(_)
            | ExprKind::ConstFloat(_)
            | ExprKind::InputRef { .. }
            | ExprKind::VarRef { .. } => Vec::new(),
            ExprKind::VectorCtor { components } => components.iter().collect(),
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Call { args, .. } | ExprKind::HelperCall { args, .. } => args.iter().collect(),
            ExprKind::Cast { value } => vec![value],
            ExprKind::Swizzle { value, .. } => vec![value],
            ExprKind::Sample(sample) => {
                let mut out = vec![&sample.coord];
                if let Some(layer) = &sample.array_index {
                    out.push(layer);
                }
                if let Some(lod) = &sample.lod {
                    out.push(lod);
                }
                if let Some((ddx, ddy)) = &sample.grad {
                    out.push(ddx);
                    out.push(ddy);
                }
                if let Some(depth_ref) = &sample.depth_ref {
                    out.push(depth_ref);
                }
                out
            }
        }
    }

    /// The complete transitive set of (variable, write-generation) pairs this
    /// expression's evaluation depends on: the union of the node's own direct
    /// reads and every child's set.
    pub fn collect_state_dependencies(&self) -> StateDependencySet {
        let mut out = StateDependencySet::new();
        self.collect_state_dependencies_into(&mut out);
        out
    }

    fn collect_state_dependencies_into(&self, out: &mut StateDependencySet) {
        for child in self.children() {
            child.collect_state_dependencies_into(out);
        }
        if let ExprKind::VarRef { name, generation } = &self.kind {
            out.insert(StateDependency::new(name.clone(), *generation));
        }
    }

    /// Deterministic, human-readable textual form, recursively composed from
    /// child expressions. Stable for identical graph structure.
    pub fn to_pseudo_code(&self) -> String {
        match &self.kind {
            ExprKind::ConstBool(v) => v.to_string(),
            ExprKind::ConstInt(v) => v.to_string(),
            ExprKind::ConstFloat(v) => fmt_f32(*v),
            ExprKind::VectorCtor { components } => {
                let parts: Vec<String> = components.iter().map(|c| c.to_pseudo_code()).collect();
                format!("{}({})", self.ty.glsl(), parts.join(", "))
            }
            ExprKind::InputRef { name } => name.clone(),
            ExprKind::VarRef { name, generation } => format!("{name}@{generation}"),
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", lhs.to_pseudo_code(), op.symbol(), rhs.to_pseudo_code())
            }
            ExprKind::Call { func, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_pseudo_code()).collect();
                format!("{}({})", func.name(), parts.join(", "))
            }
            ExprKind::HelperCall { name, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_pseudo_code()).collect();
                format!("{}({})", name, parts.join(", "))
            }
            ExprKind::Cast { value } => format!("{}({})", self.ty.glsl(), value.to_pseudo_code()),
            ExprKind::Swizzle { value, components } => {
                format!("{}.{}", value.to_pseudo_code(), components)
            }
            ExprKind::Sample(sample) => {
                let mut name = String::from("sample");
                if sample.depth_ref.is_some() {
                    name.push_str("Depth");
                }
                if sample.array_index.is_some() {
                    name.push_str("Array");
                }
                if sample.lod.is_some() {
                    name.push_str("Lod");
                }
                if sample.grad.is_some() {
                    name.push_str("Grad");
                }
                let mut parts = vec![sample.sampler.clone(), sample.coord.to_pseudo_code()];
                if let Some(layer) = &sample.array_index {
                    parts.push(layer.to_pseudo_code());
                }
                if let Some(lod) = &sample.lod {
                    parts.push(lod.to_pseudo_code());
                }
                if let Some((ddx, ddy)) = &sample.grad {
                    parts.push(ddx.to_pseudo_code());
                    parts.push(ddy.to_pseudo_code());
                }
                if let Some(depth_ref) = &sample.depth_ref {
                    parts.push(depth_ref.to_pseudo_code());
                }
                format!("{}({})", name, parts.join(", "))
            }
        }
    }
}

fn check_sample_coord(sampler: &str, sampler_ty: SamplerType, coord: &ExprRef) -> Result<()> {
    let expected = sampler_ty.coord_type();
    if coord.ty() != expected {
        bail!(
            "sampling '{sampler}' ({}) expects {} coordinates, got {}",
            sampler_ty.glsl(),
            expected,
            coord.ty()
        );
    }
    Ok(())
}

fn matrix_mul_type(lhs: Type, rhs: Type) -> Option<Type> {
    match (lhs, rhs) {
        (Type::Matrix { cols, rows }, Type::Vector { kind: ScalarKind::F32, size }) if size == cols => {
            Some(Type::Vector { kind: ScalarKind::F32, size: rows })
        }
        (Type::Matrix { cols: a_cols, rows: a_rows }, Type::Matrix { cols: b_cols, rows: b_rows })
            if a_cols == b_rows =>
        {
            Some(Type::Matrix { cols: b_cols, rows: a_rows })
        }
        _ => None,
    }
}

/// Splat an f32 scalar to a target float vector type.
pub fn splat_scalar(x: &ExprRef, target: Type) -> Result<ExprRef> {
    if x.ty() != Type::FLOAT1 {
        bail!("expected float for splat, got {}", x.ty());
    }
    match target {
        Type::Scalar(ScalarKind::F32) => Ok(x.clone()),
        Type::Vector { kind: ScalarKind::F32, size } => {
            Expr::vector(vec![x.clone(); size as usize])
        }
        other => bail!("cannot splat float to {other}"),
    }
}

fn splat_to(value: ExprRef, target: Type, op: &str) -> Result<ExprRef> {
    if value.ty() == target {
        return Ok(value);
    }
    if value.ty() == Type::FLOAT1 {
        return splat_scalar(&value, target);
    }
    bail!("{op} expects {} operands, got {}", target, value.ty());
}

/// Coerce two expressions for a binary operation, promoting a float scalar to
/// the other operand's vector type.
pub fn coerce_for_binary(a: ExprRef, b: ExprRef) -> Result<(ExprRef, ExprRef, Type)> {
    if a.ty() == b.ty() {
        let ty = a.ty();
        return Ok((a, b, ty));
    }
    if a.ty() == Type::FLOAT1 && b.ty().is_float_vector() {
        let ty = b.ty();
        let aa = splat_scalar(&a, ty)?;
        return Ok((aa, b, ty));
    }
    if b.ty() == Type::FLOAT1 && a.ty().is_float_vector() {
        let ty = a.ty();
        let bb = splat_scalar(&b, ty)?;
        return Ok((a, bb, ty));
    }
    bail!("incompatible types for binary op: {} and {}", a.ty(), b.ty());
}

fn coerce_float_pair(op: &str, a: ExprRef, b: ExprRef) -> Result<(ExprRef, ExprRef, Type)> {
    let (a, b, ty) = coerce_for_binary(a, b)
        .map_err(|e| anyhow::anyhow!("{op}: {e}"))?;
    if !ty.is_float_scalar() && !ty.is_float_vector() {
        bail!("{op} expects float operands, got {ty}");
    }
    Ok((a, b, ty))
}
