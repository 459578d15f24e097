//! Core type definitions for the shader compiler.

use anyhow::{Result, bail};

/// Scalar component kind for shader values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I32,
    U32,
    F32,
}

impl ScalarKind {
    /// Returns the GLSL type name for this scalar kind.
    pub fn glsl(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I32 => "int",
            ScalarKind::U32 => "uint",
            ScalarKind::F32 => "float",
        }
    }

    /// Vector spelling prefix (`vec3` / `ivec3` / `uvec3` / `bvec3`).
    fn vec_prefix(self) -> &'static str {
        match self {
            ScalarKind::Bool => "b",
            ScalarKind::I32 => "i",
            ScalarKind::U32 => "u",
            ScalarKind::F32 => "",
        }
    }
}

/// Dimensionality of a sampled texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerDim {
    D1,
    D2,
    D3,
    Cube,
}

impl SamplerDim {
    fn glsl_suffix(self) -> &'static str {
        match self {
            SamplerDim::D1 => "1D",
            SamplerDim::D2 => "2D",
            SamplerDim::D3 => "3D",
            SamplerDim::Cube => "Cube",
        }
    }
}

/// Full sampler type: dimensionality plus array / depth-comparison flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerType {
    pub dim: SamplerDim,
    pub arrayed: bool,
    pub depth: bool,
}

impl SamplerType {
    pub const fn new(dim: SamplerDim) -> Self {
        Self { dim, arrayed: false, depth: false }
    }

    pub const fn array(dim: SamplerDim) -> Self {
        Self { dim, arrayed: true, depth: false }
    }

    pub const fn depth(dim: SamplerDim) -> Self {
        Self { dim, arrayed: false, depth: true }
    }

    pub const fn depth_array(dim: SamplerDim) -> Self {
        Self { dim, arrayed: true, depth: true }
    }

    /// GLSL spelling, e.g. `sampler2DArrayShadow`.
    pub fn glsl(&self) -> String {
        let mut out = format!("sampler{}", self.dim.glsl_suffix());
        if self.arrayed {
            out.push_str("Array");
        }
        if self.depth {
            out.push_str("Shadow");
        }
        out
    }

    /// The coordinate type expected by the non-array sampling variants.
    pub fn coord_type(&self) -> Type {
        match self.dim {
            SamplerDim::D1 => Type::FLOAT1,
            SamplerDim::D2 => Type::FLOAT2,
            SamplerDim::D3 | SamplerDim::Cube => Type::FLOAT3,
        }
    }
}

/// Shader value type. Fixed at expression construction and never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarKind),
    /// `size` is 2, 3 or 4.
    Vector { kind: ScalarKind, size: u8 },
    /// Column-major float matrix; `cols` and `rows` are 2, 3 or 4.
    Matrix { cols: u8, rows: u8 },
    Sampler(SamplerType),
}

impl Type {
    pub const BOOL1: Type = Type::Scalar(ScalarKind::Bool);
    pub const INT1: Type = Type::Scalar(ScalarKind::I32);
    pub const FLOAT1: Type = Type::Scalar(ScalarKind::F32);
    pub const FLOAT2: Type = Type::Vector { kind: ScalarKind::F32, size: 2 };
    pub const FLOAT3: Type = Type::Vector { kind: ScalarKind::F32, size: 3 };
    pub const FLOAT4: Type = Type::Vector { kind: ScalarKind::F32, size: 4 };
    pub const MAT3: Type = Type::Matrix { cols: 3, rows: 3 };
    pub const MAT4: Type = Type::Matrix { cols: 4, rows: 4 };

    pub fn vector(kind: ScalarKind, size: u8) -> Result<Type> {
        if !(2..=4).contains(&size) {
            bail!("invalid vector size: {size} (expected 2..=4)");
        }
        Ok(Type::Vector { kind, size })
    }

    pub fn float_vector(size: u8) -> Result<Type> {
        Self::vector(ScalarKind::F32, size)
    }

    /// Returns the GLSL type name for this value type.
    pub fn glsl(&self) -> String {
        match *self {
            Type::Scalar(kind) => kind.glsl().to_string(),
            Type::Vector { kind, size } => format!("{}vec{}", kind.vec_prefix(), size),
            Type::Matrix { cols, rows } => {
                if cols == rows {
                    format!("mat{cols}")
                } else {
                    format!("mat{cols}x{rows}")
                }
            }
            Type::Sampler(sampler) => sampler.glsl(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector { .. })
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, Type::Sampler(_))
    }

    /// True for scalar and vector types with a numeric component kind.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.component_kind(),
            Some(ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32)
        )
    }

    pub fn is_float_scalar(&self) -> bool {
        *self == Type::FLOAT1
    }

    pub fn is_float_vector(&self) -> bool {
        matches!(self, Type::Vector { kind: ScalarKind::F32, .. })
    }

    /// Component kind for scalars and vectors; `None` for matrices and samplers.
    pub fn component_kind(&self) -> Option<ScalarKind> {
        match *self {
            Type::Scalar(kind) => Some(kind),
            Type::Vector { kind, .. } => Some(kind),
            Type::Matrix { .. } | Type::Sampler(_) => None,
        }
    }

    /// Component count: 1 for scalars, N for vectors, `None` otherwise.
    pub fn component_count(&self) -> Option<u8> {
        match *self {
            Type::Scalar(_) => Some(1),
            Type::Vector { size, .. } => Some(size),
            Type::Matrix { .. } | Type::Sampler(_) => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.glsl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_spellings() {
        assert_eq!(Type::FLOAT1.glsl(), "float");
        assert_eq!(Type::FLOAT3.glsl(), "vec3");
        assert_eq!(Type::vector(ScalarKind::I32, 2).unwrap().glsl(), "ivec2");
        assert_eq!(Type::MAT4.glsl(), "mat4");
        assert_eq!(Type::Matrix { cols: 3, rows: 4 }.glsl(), "mat3x4");
        assert_eq!(
            Type::Sampler(SamplerType::depth_array(SamplerDim::D2)).glsl(),
            "sampler2DArrayShadow"
        );
    }

    #[test]
    fn vector_size_is_validated() {
        assert!(Type::vector(ScalarKind::F32, 5).is_err());
        assert!(Type::vector(ScalarKind::F32, 1).is_err());
    }

    #[test]
    fn sampler_coord_types() {
        assert_eq!(SamplerType::new(SamplerDim::D1).coord_type(), Type::FLOAT1);
        assert_eq!(SamplerType::new(SamplerDim::D2).coord_type(), Type::FLOAT2);
        assert_eq!(SamplerType::new(SamplerDim::Cube).coord_type(), Type::FLOAT3);
    }
}
