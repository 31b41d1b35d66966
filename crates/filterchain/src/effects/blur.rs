//! Separable 15-tap gaussian blur: a vertical pass into the pool, then a
//! horizontal pass that reaches the surface when blur ends the chain.
use crate::context::RenderContext;
use crate::effects::{Effect, EffectCatalog, EffectSpec, PassCount};
use crate::error::Result;
use crate::pass::{DrawMode, PassContext};
use crate::shader::{Fragment, ShaderSource, UniformDecl};

const GROUP: &str = "blur";

/// Tap weights for offsets -7..=7.
#[allow(clippy::excessive_precision)]
pub const WEIGHTS: [f32; 15] = [
    0.0044299121055113265,
    0.00895781211794,
    0.0215963866053,
    0.0443683338718,
    0.0776744219933,
    0.115876621105,
    0.147308056121,
    0.159576912161,
    0.147308056121,
    0.115876621105,
    0.0776744219933,
    0.0443683338718,
    0.0215963866053,
    0.00895781211794,
    0.0044299121055113265,
];

pub static BLUR_SHADER: ShaderSource = ShaderSource::fragment(
    "blur",
    &[UniformDecl::vec2("px")],
    r"void main() {
    fragColor = vec4(0.0);
    fragColor += texture(source_image, vUv + vec2(-7.0 * px.x, -7.0 * px.y)) * 0.0044299121055113265;
    fragColor += texture(source_image, vUv + vec2(-6.0 * px.x, -6.0 * px.y)) * 0.00895781211794;
    fragColor += texture(source_image, vUv + vec2(-5.0 * px.x, -5.0 * px.y)) * 0.0215963866053;
    fragColor += texture(source_image, vUv + vec2(-4.0 * px.x, -4.0 * px.y)) * 0.0443683338718;
    fragColor += texture(source_image, vUv + vec2(-3.0 * px.x, -3.0 * px.y)) * 0.0776744219933;
    fragColor += texture(source_image, vUv + vec2(-2.0 * px.x, -2.0 * px.y)) * 0.115876621105;
    fragColor += texture(source_image, vUv + vec2(-1.0 * px.x, -1.0 * px.y)) * 0.147308056121;
    fragColor += texture(source_image, vUv) * 0.159576912161;
    fragColor += texture(source_image, vUv + vec2(1.0 * px.x, 1.0 * px.y)) * 0.147308056121;
    fragColor += texture(source_image, vUv + vec2(2.0 * px.x, 2.0 * px.y)) * 0.115876621105;
    fragColor += texture(source_image, vUv + vec2(3.0 * px.x, 3.0 * px.y)) * 0.0776744219933;
    fragColor += texture(source_image, vUv + vec2(4.0 * px.x, 4.0 * px.y)) * 0.0443683338718;
    fragColor += texture(source_image, vUv + vec2(5.0 * px.x, 5.0 * px.y)) * 0.0215963866053;
    fragColor += texture(source_image, vUv + vec2(6.0 * px.x, 6.0 * px.y)) * 0.00895781211794;
    fragColor += texture(source_image, vUv + vec2(7.0 * px.x, 7.0 * px.y)) * 0.0044299121055113265;
}
",
    blur_reference,
);

fn blur_reference(fragment: &Fragment<'_>) -> [f32; 4] {
    let [u, v] = fragment.uv;
    let [px, py] = fragment.vec2("px");
    let mut out = [0.0f32; 4];
    for (tap, weight) in WEIGHTS.iter().enumerate() {
        let offset = tap as f32 - 7.0;
        let sample = fragment.texture([u + offset * px, v + offset * py]);
        for (channel, value) in out.iter_mut().zip(sample) {
            *channel += value * weight;
        }
    }
    out
}

pub fn blur<C: RenderContext>(
    pass: &mut PassContext<'_, C>,
    radius: f32,
    width: u32,
    height: u32,
) -> Result<PassCount> {
    let step = radius / 7.0;
    pass.select(&BLUR_SHADER)?;

    pass.set_vec2("px", [0.0, step / height as f32])?;
    pass.draw_pass(DrawMode::Intermediate)?;

    pass.set_vec2("px", [step / width as f32, 0.0])?;
    pass.draw_pass(DrawMode::Default)?;
    Ok(2)
}

pub(crate) fn register(catalog: &mut EffectCatalog) -> Result<()> {
    catalog.register(EffectSpec {
        name: "blur",
        group: GROUP,
        params: "radius=0",
        parse: |p| Ok(Effect::Blur { radius: p.optional(0.0)? }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_symmetric_and_normalised() {
        for tap in 0..7 {
            assert_eq!(WEIGHTS[tap], WEIGHTS[14 - tap]);
        }
        let sum: f32 = WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 0.01, "{sum}");
    }
}
