//! GLSL 450 generation and naga diagnostics.
//!
//! Shader bodies are stage-agnostic GLSL written against the names in their
//! manifest. Here they get a prologue declaring those names: attributes and
//! varyings by location, uniforms as members of a std140 block aliased back
//! to their bare names, and `source_image` as a combined sampler.
use std::fmt::Write as _;

use crate::shader::{ShaderSource, ShaderStage, UniformDecl, UniformKind};

use super::{FRAGMENT_UNIFORM_BINDING, SAMPLER_BINDING, TEXTURE_BINDING, VERTEX_UNIFORM_BINDING};

pub(crate) fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

fn glsl_vector(components: u32) -> &'static str {
    match components {
        1 => "float",
        2 => "vec2",
        3 => "vec3",
        _ => "vec4",
    }
}

fn uniform_block(out: &mut String, block: &str, instance: &str, binding: u32, decls: &[UniformDecl]) {
    if decls.is_empty() {
        return;
    }
    let _ = writeln!(out, "layout(std140, set = 0, binding = {binding}) uniform {block} {{");
    for decl in decls {
        let _ = match decl.kind {
            UniformKind::Float => writeln!(out, "    float _{};", decl.name),
            UniformKind::Vec2 => writeln!(out, "    vec2 _{};", decl.name),
            UniformKind::FloatArray(len) => writeln!(out, "    float _{}[{len}];", decl.name),
        };
    }
    let _ = writeln!(out, "}} {instance};");
    for decl in decls {
        let _ = writeln!(out, "#define {name} {instance}._{name}", name = decl.name);
    }
}

/// Produces a complete GLSL 450 module for `source`.
pub(crate) fn wrap_source(source: &ShaderSource) -> String {
    let mut out = String::from("#version 450\n");
    match source.stage {
        ShaderStage::Vertex => {
            for attribute in source.attributes {
                let _ = writeln!(
                    out,
                    "layout(location = {}) in {} {};",
                    attribute.location,
                    glsl_vector(attribute.components),
                    attribute.name
                );
            }
            out.push_str("layout(location = 0) out vec2 vUv;\n");
            uniform_block(
                &mut out,
                "VertexParams",
                "vertex_params",
                VERTEX_UNIFORM_BINDING,
                source.uniforms,
            );
        }
        ShaderStage::Fragment => {
            out.push_str("layout(location = 0) in vec2 vUv;\n");
            out.push_str("layout(location = 0) out vec4 fragColor;\n");
            uniform_block(
                &mut out,
                "FragmentParams",
                "fragment_params",
                FRAGMENT_UNIFORM_BINDING,
                source.uniforms,
            );
            let _ = writeln!(
                out,
                "layout(set = 0, binding = {TEXTURE_BINDING}) uniform texture2D filter_texture;"
            );
            let _ = writeln!(
                out,
                "layout(set = 0, binding = {SAMPLER_BINDING}) uniform sampler filter_sampler;"
            );
            out.push_str("#define source_image sampler2D(filter_texture, filter_sampler)\n");
        }
    }
    out.push_str("#line 1\n");
    out.push_str(source.glsl);
    out
}

/// Parses and validates `wrapped` with naga, returning the rendered log.
pub(crate) fn diagnose(wrapped: &str, stage: ShaderStage) -> Result<naga::Module, String> {
    let options = naga::front::glsl::Options::from(naga_stage(stage));
    let module = naga::front::glsl::Frontend::default()
        .parse(&options, wrapped)
        .map_err(|errors| errors.emit_to_string(wrapped))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|error| error.emit_to_string(wrapped))?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{blur, convolution, pixelate, standard};
    use crate::shader::{IDENTITY_SHADER, VERTEX_SHADER};

    #[test]
    fn builtin_shaders_pass_naga_validation() {
        let sources = [
            &VERTEX_SHADER,
            &IDENTITY_SHADER,
            &standard::COLOR_MATRIX_SHADER,
            &standard::COLOR_MATRIX_OPAQUE_SHADER,
            &convolution::CONVOLUTION_SHADER,
            &blur::BLUR_SHADER,
            &pixelate::PIXELATE_SHADER,
        ];
        for source in sources {
            let wrapped = wrap_source(source);
            if let Err(log) = diagnose(&wrapped, source.stage) {
                panic!("{} failed to validate:\n{log}\n{wrapped}", source.label);
            }
        }
    }

    #[test]
    fn uniforms_are_aliased_to_block_members() {
        let wrapped = wrap_source(&convolution::CONVOLUTION_SHADER);
        assert!(wrapped.contains("vec2 _px;"));
        assert!(wrapped.contains("float _m[9];"));
        assert!(wrapped.contains("#define m fragment_params._m"));
        assert!(wrapped.contains("binding = 2) uniform texture2D"));
    }

    #[test]
    fn broken_body_reports_a_log() {
        let broken = ShaderSource {
            glsl: "void main() { fragColor = undeclared; }\n",
            ..IDENTITY_SHADER
        };
        let log = diagnose(&wrap_source(&broken), ShaderStage::Fragment).unwrap_err();
        assert!(log.contains("undeclared"), "{log}");
    }
}
