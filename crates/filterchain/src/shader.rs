//! Shader manifests.
//!
//! Every shader the pipeline compiles is described by a [`ShaderSource`]: the
//! GLSL body plus an explicit list of the attributes and uniforms it uses.
//! Backends resolve handles from this list instead of scanning the text, and
//! the CPU reference backend runs the attached [`ReferenceKernel`].
use std::fmt;

/// Floats per vertex in the shared quad buffer (`x, y, u, v`).
pub const QUAD_STRIDE: u32 = 4;

/// Name of the vertex-stage uniform that mirrors the quad vertically.
pub const FLIP_Y_UNIFORM: &str = "flipY";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A vertex input read from the interleaved quad buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: &'static str,
    pub location: u32,
    pub components: u32,
    /// Offset into a vertex, in floats.
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    FloatArray(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: UniformKind::Float,
        }
    }

    pub const fn vec2(name: &'static str) -> Self {
        Self {
            name,
            kind: UniformKind::Vec2,
        }
    }

    pub const fn array(name: &'static str, len: usize) -> Self {
        Self {
            name,
            kind: UniformKind::FloatArray(len),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue<'a> {
    Float(f32),
    Vec2([f32; 2]),
    FloatArray(&'a [f32]),
}

impl UniformValue<'_> {
    pub fn matches(&self, kind: UniformKind) -> bool {
        match (self, kind) {
            (UniformValue::Float(_), UniformKind::Float) => true,
            (UniformValue::Vec2(_), UniformKind::Vec2) => true,
            (UniformValue::FloatArray(values), UniformKind::FloatArray(len)) => {
                values.len() <= len
            }
            _ => false,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        match self {
            UniformValue::Float(value) => std::slice::from_ref(value),
            UniformValue::Vec2(values) => values,
            UniformValue::FloatArray(values) => values,
        }
    }
}

/// Bilinear or nearest texture lookups for reference kernels.
pub trait Sampler {
    fn sample(&self, uv: [f32; 2]) -> [f32; 4];
}

/// Inputs visible to a fragment while a reference kernel runs.
pub struct Fragment<'a> {
    pub uv: [f32; 2],
    sampler: &'a dyn Sampler,
    decls: &'a [UniformDecl],
    values: &'a [Vec<f32>],
}

impl<'a> Fragment<'a> {
    pub fn new(
        uv: [f32; 2],
        sampler: &'a dyn Sampler,
        decls: &'a [UniformDecl],
        values: &'a [Vec<f32>],
    ) -> Self {
        Self {
            uv,
            sampler,
            decls,
            values,
        }
    }

    pub fn texture(&self, uv: [f32; 2]) -> [f32; 4] {
        self.sampler.sample(uv)
    }

    /// Unset uniforms read as zero, as they do on the GPU.
    pub fn array(&self, name: &str) -> &[f32] {
        self.decls
            .iter()
            .position(|decl| decl.name == name)
            .and_then(|index| self.values.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn float(&self, name: &str) -> f32 {
        self.array(name).first().copied().unwrap_or(0.0)
    }

    pub fn vec2(&self, name: &str) -> [f32; 2] {
        let values = self.array(name);
        [
            values.first().copied().unwrap_or(0.0),
            values.get(1).copied().unwrap_or(0.0),
        ]
    }

    /// `m[index]`, zero past the end.
    pub fn element(&self, name: &str, index: usize) -> f32 {
        self.array(name).get(index).copied().unwrap_or(0.0)
    }
}

/// CPU evaluation of a fragment shader, used by [`crate::SoftwareContext`].
pub type ReferenceKernel = fn(&Fragment<'_>) -> [f32; 4];

/// A shader body together with its declaration manifest.
///
/// `glsl` is the body only; the wgpu backend prepends the input, output and
/// uniform block declarations generated from the manifest. The program cache
/// keys on `glsl`, so two sources with identical bodies share one program.
#[derive(Clone, Copy)]
pub struct ShaderSource {
    pub label: &'static str,
    pub stage: ShaderStage,
    pub attributes: &'static [AttributeDecl],
    pub uniforms: &'static [UniformDecl],
    pub glsl: &'static str,
    pub reference: Option<ReferenceKernel>,
}

impl ShaderSource {
    pub const fn fragment(
        label: &'static str,
        uniforms: &'static [UniformDecl],
        glsl: &'static str,
        reference: ReferenceKernel,
    ) -> Self {
        Self {
            label,
            stage: ShaderStage::Fragment,
            attributes: &[],
            uniforms,
            glsl,
            reference: Some(reference),
        }
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.iter().find(|decl| decl.name == name)
    }
}

impl fmt::Debug for ShaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderSource")
            .field("label", &self.label)
            .field("stage", &self.stage)
            .field("attributes", &self.attributes)
            .field("uniforms", &self.uniforms)
            .field("reference", &self.reference.is_some())
            .finish()
    }
}

/// Full-screen quad vertex shader shared by every program.
///
/// Render targets are stored bottom row first. wgpu puts NDC `+1` at row 0,
/// so the Y mirror here keeps that storage order on every backend.
pub const VERTEX_SHADER: ShaderSource = ShaderSource {
    label: "fullscreen quad",
    stage: ShaderStage::Vertex,
    attributes: &[
        AttributeDecl {
            name: "pos",
            location: 0,
            components: 2,
            offset: 0,
        },
        AttributeDecl {
            name: "uv",
            location: 1,
            components: 2,
            offset: 2,
        },
    ],
    uniforms: &[UniformDecl::float(FLIP_Y_UNIFORM)],
    glsl: r"void main() {
    vUv = uv;
    gl_Position = vec4(pos.x, -pos.y * flipY, 0.0, 1.0);
}
",
    reference: None,
};

/// Pass-through shader used when the chain is empty.
pub const IDENTITY_SHADER: ShaderSource = ShaderSource::fragment(
    "identity",
    &[],
    r"void main() {
    fragColor = texture(source_image, vUv);
}
",
    identity_reference,
);

fn identity_reference(fragment: &Fragment<'_>) -> [f32; 4] {
    fragment.texture(fragment.uv)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Solid([f32; 4]);

    impl Sampler for Solid {
        fn sample(&self, _uv: [f32; 2]) -> [f32; 4] {
            self.0
        }
    }

    #[test]
    fn fragment_reads_declared_uniforms() {
        let decls = [UniformDecl::vec2("px"), UniformDecl::array("m", 9)];
        let values = vec![vec![0.5, 0.25], vec![1.0, 2.0]];
        let sampler = Solid([0.0; 4]);
        let fragment = Fragment::new([0.0, 0.0], &sampler, &decls, &values);

        assert_eq!(fragment.vec2("px"), [0.5, 0.25]);
        assert_eq!(fragment.element("m", 1), 2.0);
        assert_eq!(fragment.element("m", 8), 0.0);
        assert_eq!(fragment.float("missing"), 0.0);
    }

    #[test]
    fn uniform_values_check_their_kind() {
        assert!(UniformValue::Float(1.0).matches(UniformKind::Float));
        assert!(!UniformValue::Vec2([1.0, 2.0]).matches(UniformKind::Float));
        assert!(UniformValue::FloatArray(&[1.0; 9]).matches(UniformKind::FloatArray(9)));
        assert!(!UniformValue::FloatArray(&[1.0; 10]).matches(UniformKind::FloatArray(9)));
    }

    #[test]
    fn vertex_shader_declares_quad_layout() {
        let offsets: Vec<_> = VERTEX_SHADER
            .attributes
            .iter()
            .map(|attr| (attr.name, attr.offset))
            .collect();
        assert_eq!(offsets, vec![("pos", 0), ("uv", 2)]);
        assert!(VERTEX_SHADER.uniform(FLIP_Y_UNIFORM).is_some());
    }
}
