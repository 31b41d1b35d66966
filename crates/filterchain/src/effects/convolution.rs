use crate::context::RenderContext;
use crate::effects::{Effect, EffectCatalog, EffectSpec, PassCount};
use crate::error::Result;
use crate::pass::{DrawMode, PassContext};
use crate::shader::{Fragment, ShaderSource, UniformDecl};

const GROUP: &str = "convolution";

/// Row-major 3x3 kernel. Row 0 samples `vUv.y - px.y`.
pub type Kernel = [f32; 9];

pub static CONVOLUTION_SHADER: ShaderSource = ShaderSource::fragment(
    "convolution",
    &[UniformDecl::vec2("px"), UniformDecl::array("m", 9)],
    r"void main() {
    vec4 c11 = texture(source_image, vUv - px);
    vec4 c12 = texture(source_image, vec2(vUv.x, vUv.y - px.y));
    vec4 c13 = texture(source_image, vec2(vUv.x + px.x, vUv.y - px.y));

    vec4 c21 = texture(source_image, vec2(vUv.x - px.x, vUv.y));
    vec4 c22 = texture(source_image, vUv);
    vec4 c23 = texture(source_image, vec2(vUv.x + px.x, vUv.y));

    vec4 c31 = texture(source_image, vec2(vUv.x - px.x, vUv.y + px.y));
    vec4 c32 = texture(source_image, vec2(vUv.x, vUv.y + px.y));
    vec4 c33 = texture(source_image, vUv + px);

    fragColor = c11 * m[0] + c12 * m[1] + c13 * m[2]
        + c21 * m[3] + c22 * m[4] + c23 * m[5]
        + c31 * m[6] + c32 * m[7] + c33 * m[8];
    fragColor.a = c22.a;
}
",
    convolution_reference,
);

fn convolution_reference(fragment: &Fragment<'_>) -> [f32; 4] {
    let [u, v] = fragment.uv;
    let [px, py] = fragment.vec2("px");
    let mut out = [0.0f32; 4];
    for (row, dy) in [-py, 0.0, py].into_iter().enumerate() {
        for (col, dx) in [-px, 0.0, px].into_iter().enumerate() {
            let weight = fragment.element("m", row * 3 + col);
            let sample = fragment.texture([u + dx, v + dy]);
            for (channel, value) in out.iter_mut().zip(sample) {
                *channel += value * weight;
            }
        }
    }
    out[3] = fragment.texture(fragment.uv)[3];
    out
}

pub fn convolve<C: RenderContext>(
    pass: &mut PassContext<'_, C>,
    kernel: &Kernel,
    width: u32,
    height: u32,
) -> Result<PassCount> {
    pass.select(&CONVOLUTION_SHADER)?;
    pass.set_floats("m", kernel)?;
    pass.set_vec2("px", [1.0 / width as f32, 1.0 / height as f32])?;
    pass.draw_pass(DrawMode::Default)?;
    Ok(1)
}

#[rustfmt::skip]
pub const DETECT_EDGES: Kernel = [
    0.0, 1.0, 0.0,
    1.0, -4.0, 1.0,
    0.0, 1.0, 0.0,
];

#[rustfmt::skip]
pub const SOBEL_X: Kernel = [
    -1.0, 0.0, 1.0,
    -2.0, 0.0, 2.0,
    -1.0, 0.0, 1.0,
];

#[rustfmt::skip]
pub const SOBEL_Y: Kernel = [
    -1.0, -2.0, -1.0,
    0.0, 0.0, 0.0,
    1.0, 2.0, 1.0,
];

#[rustfmt::skip]
pub fn emboss(s: f32) -> Kernel {
    [
        -2.0 * s, -s, 0.0,
        -s, 1.0, s,
        0.0, s, 2.0 * s,
    ]
}

#[rustfmt::skip]
pub fn sharpen(a: f32) -> Kernel {
    [
        0.0, -a, 0.0,
        -a, 1.0 + 4.0 * a, -a,
        0.0, -a, 0.0,
    ]
}

pub(crate) fn register(catalog: &mut EffectCatalog) -> Result<()> {
    let specs: [(&'static str, &'static str, super::ParseFn); 6] = [
        ("convolution", "m0..m8", |p| Ok(Effect::Convolution(p.exact::<9>()?))),
        ("detectEdges", "", |_| Ok(Effect::DetectEdges)),
        ("sobelX", "", |_| Ok(Effect::SobelX)),
        ("sobelY", "", |_| Ok(Effect::SobelY)),
        ("emboss", "size=1", |p| Ok(Effect::Emboss { size: p.optional(1.0)? })),
        ("sharpen", "amount=1", |p| {
            Ok(Effect::Sharpen { amount: p.optional(1.0)? })
        }),
    ];
    for (name, params, parse) in specs {
        catalog.register(EffectSpec {
            name,
            group: GROUP,
            params,
            parse,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Recipe;

    #[test]
    fn sharpen_kernel_sums_to_one() {
        for amount in [0.5, 1.0, 3.0] {
            let kernel = sharpen(amount);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "{kernel:?}");
        }
    }

    #[test]
    fn emboss_scales_off_center_weights() {
        assert_eq!(
            Effect::Emboss { size: 2.0 }.recipe(),
            Recipe::Convolution([-4.0, -2.0, 0.0, -2.0, 1.0, 2.0, 0.0, 2.0, 4.0])
        );
    }

    #[test]
    fn kernel_effects_resolve_to_convolutions() {
        assert_eq!(Effect::SobelX.recipe(), Recipe::Convolution(SOBEL_X));
        assert_eq!(Effect::SobelY.recipe(), Recipe::Convolution(SOBEL_Y));
        assert_eq!(Effect::DetectEdges.recipe(), Recipe::Convolution(DETECT_EDGES));
        assert!(matches!(Effect::Sepia.recipe(), Recipe::ColorMatrix(_)));
    }
}
