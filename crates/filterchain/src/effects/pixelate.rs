use crate::context::RenderContext;
use crate::effects::{Effect, EffectCatalog, EffectSpec, PassCount};
use crate::error::Result;
use crate::pass::{DrawMode, PassContext};
use crate::shader::{Fragment, ShaderSource, UniformDecl};

const GROUP: &str = "pixelate";

pub static PIXELATE_SHADER: ShaderSource = ShaderSource::fragment(
    "pixelate",
    &[UniformDecl::vec2("size")],
    r"void main() {
    vec2 coord = floor(vUv / size) * size;
    fragColor = texture(source_image, coord);
}
",
    pixelate_reference,
);

fn pixelate_reference(fragment: &Fragment<'_>) -> [f32; 4] {
    let [u, v] = fragment.uv;
    let [sx, sy] = fragment.vec2("size");
    fragment.texture([(u / sx).floor() * sx, (v / sy).floor() * sy])
}

/// Cells smaller than one pixel are widened to one pixel.
pub fn pixelate<C: RenderContext>(
    pass: &mut PassContext<'_, C>,
    size: f32,
    width: u32,
    height: u32,
) -> Result<PassCount> {
    let size = size.max(1.0);
    pass.select(&PIXELATE_SHADER)?;
    pass.set_vec2("size", [size / width as f32, size / height as f32])?;
    pass.draw_pass(DrawMode::Default)?;
    Ok(1)
}

pub(crate) fn register(catalog: &mut EffectCatalog) -> Result<()> {
    catalog.register(EffectSpec {
        name: "pixelate",
        group: GROUP,
        params: "size=0",
        parse: |p| Ok(Effect::Pixelate { size: p.optional(0.0)? }),
    })
}
