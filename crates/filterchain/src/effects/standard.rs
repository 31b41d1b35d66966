//! Color-matrix effects.
//!
//! Every effect here reduces to one 4x5 row-major matrix applied per pixel.
//! The fifth column is an offset in 0-255 units.
use std::f32::consts::PI;

use crate::context::RenderContext;
use crate::effects::{Effect, EffectCatalog, EffectSpec, PassCount};
use crate::error::Result;
use crate::pass::{DrawMode, PassContext};
use crate::shader::{Fragment, ShaderSource, UniformDecl};

const GROUP: &str = "standard";

const LUM_R: f32 = 0.213;
const LUM_G: f32 = 0.715;
const LUM_B: f32 = 0.072;

pub type ColorMatrix = [f32; 20];

#[rustfmt::skip]
pub const IDENTITY_MATRIX: ColorMatrix = [
    1.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

pub static COLOR_MATRIX_SHADER: ShaderSource = ShaderSource::fragment(
    "color matrix",
    &[UniformDecl::array("m", 20)],
    r"void main() {
    vec4 c = texture(source_image, vUv);
    fragColor.r = m[0] * c.r + m[1] * c.g + m[2] * c.b + m[3] * c.a + m[4];
    fragColor.g = m[5] * c.r + m[6] * c.g + m[7] * c.b + m[8] * c.a + m[9];
    fragColor.b = m[10] * c.r + m[11] * c.g + m[12] * c.b + m[13] * c.a + m[14];
    fragColor.a = m[15] * c.r + m[16] * c.g + m[17] * c.b + m[18] * c.a + m[19];
}
",
    color_matrix_reference,
);

/// Leaves alpha untouched; used when the matrix's alpha row is identity.
pub static COLOR_MATRIX_OPAQUE_SHADER: ShaderSource = ShaderSource::fragment(
    "color matrix (alpha preserving)",
    &[UniformDecl::array("m", 20)],
    r"void main() {
    vec4 c = texture(source_image, vUv);
    fragColor.r = m[0] * c.r + m[1] * c.g + m[2] * c.b + m[4];
    fragColor.g = m[5] * c.r + m[6] * c.g + m[7] * c.b + m[9];
    fragColor.b = m[10] * c.r + m[11] * c.g + m[12] * c.b + m[14];
    fragColor.a = c.a;
}
",
    color_matrix_opaque_reference,
);

fn color_matrix_reference(fragment: &Fragment<'_>) -> [f32; 4] {
    let c = fragment.texture(fragment.uv);
    let m = |index| fragment.element("m", index);
    let row = |base: usize| {
        m(base) * c[0] + m(base + 1) * c[1] + m(base + 2) * c[2] + m(base + 3) * c[3] + m(base + 4)
    };
    [row(0), row(5), row(10), row(15)]
}

fn color_matrix_opaque_reference(fragment: &Fragment<'_>) -> [f32; 4] {
    let c = fragment.texture(fragment.uv);
    let m = |index| fragment.element("m", index);
    let row = |base: usize| m(base) * c[0] + m(base + 1) * c[1] + m(base + 2) * c[2] + m(base + 4);
    [row(0), row(5), row(10), c[3]]
}

/// True when alpha passes through: the alpha row is `0 0 0 1 0` and no
/// color row reads alpha.
pub fn preserves_alpha(matrix: &ColorMatrix) -> bool {
    matrix[18] == 1.0
        && [3, 8, 13, 15, 16, 17, 19]
            .iter()
            .all(|&index| matrix[index] == 0.0)
}

/// Draws one color-matrix pass.
pub fn color_matrix<C: RenderContext>(
    pass: &mut PassContext<'_, C>,
    matrix: &ColorMatrix,
) -> Result<PassCount> {
    let mut uniform = *matrix;
    for index in [4, 9, 14, 19] {
        uniform[index] /= 255.0;
    }

    let shader = if preserves_alpha(matrix) {
        &COLOR_MATRIX_OPAQUE_SHADER
    } else {
        &COLOR_MATRIX_SHADER
    };
    pass.select(shader)?;
    pass.set_floats("m", &uniform)?;
    pass.draw_pass(DrawMode::Default)?;
    Ok(1)
}

#[rustfmt::skip]
pub fn brightness(amount: f32) -> ColorMatrix {
    let b = amount + 1.0;
    [
        b, 0.0, 0.0, 0.0, 0.0,
        0.0, b, 0.0, 0.0, 0.0,
        0.0, 0.0, b, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

#[rustfmt::skip]
pub fn contrast(amount: f32) -> ColorMatrix {
    let v = amount + 1.0;
    let o = -128.0 * (v - 1.0);
    [
        v, 0.0, 0.0, 0.0, o,
        0.0, v, 0.0, 0.0, o,
        0.0, 0.0, v, 0.0, o,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

#[rustfmt::skip]
pub fn saturation(amount: f32) -> ColorMatrix {
    let x = amount * 2.0 / 3.0 + 1.0;
    let y = (x - 1.0) * -0.5;
    [
        x, y, y, 0.0, 0.0,
        y, x, y, 0.0, 0.0,
        y, y, x, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

#[rustfmt::skip]
pub fn hue(degrees: f32) -> ColorMatrix {
    let rotation = degrees / 180.0 * PI;
    let (sin, cos) = rotation.sin_cos();
    [
        LUM_R + cos * (1.0 - LUM_R) + sin * -LUM_R,
        LUM_G + cos * -LUM_G + sin * -LUM_G,
        LUM_B + cos * -LUM_B + sin * (1.0 - LUM_B),
        0.0, 0.0,
        LUM_R + cos * -LUM_R + sin * 0.143,
        LUM_G + cos * (1.0 - LUM_G) + sin * 0.140,
        LUM_B + cos * -LUM_B + sin * -0.283,
        0.0, 0.0,
        LUM_R + cos * -LUM_R + sin * -(1.0 - LUM_R),
        LUM_G + cos * -LUM_G + sin * LUM_G,
        LUM_B + cos * (1.0 - LUM_B) + sin * LUM_B,
        0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub(super) const DESATURATE_LUMINANCE: ColorMatrix = [
    0.2764723, 0.9297080, 0.0938197, 0.0, -37.1,
    0.2764723, 0.9297080, 0.0938197, 0.0, -37.1,
    0.2764723, 0.9297080, 0.0938197, 0.0, -37.1,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub(super) const SEPIA: ColorMatrix = [
    0.393, 0.7689999, 0.18899999, 0.0, 0.0,
    0.349, 0.6859999, 0.16799999, 0.0, 0.0,
    0.272, 0.5339999, 0.13099999, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub(super) const BROWNIE: ColorMatrix = [
    0.5997023498159715, 0.34553243048391263, -0.2708298674538042, 0.0, 47.43192855600873,
    -0.037703249837783157, 0.8609577587992641, 0.15059552388459913, 0.0, -36.96841498319127,
    0.24113635128153335, -0.07441037908422492, 0.44972182064877153, 0.0, -7.562075277591283,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub(super) const VINTAGE_PINHOLE: ColorMatrix = [
    0.6279345635605994, 0.3202183420819367, -0.03965408211312453, 0.0, 9.651285835294123,
    0.02578397704808868, 0.6441188644374771, 0.03259127616149294, 0.0, 7.462829176470591,
    0.0466055556782719, -0.0851232987247891, 0.5241648018700465, 0.0, 5.159190588235296,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub(super) const KODACHROME: ColorMatrix = [
    1.1285582396593525, -0.3967382283601348, -0.03992559172921793, 0.0, 63.72958762196502,
    -0.16404339962244616, 1.0835251566291304, -0.05498805115633132, 0.0, 24.732407896706203,
    -0.16786010706155763, -0.5603416277695248, 1.6014850761964943, 0.0, 35.62982807460946,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
pub(super) const TECHNICOLOR: ColorMatrix = [
    1.9125277891456083, -0.8545344976951645, -0.09155508482755585, 0.0, 11.793603434377337,
    -0.3087833385928097, 1.7658908555458428, -0.10601743074722245, 0.0, -70.35205161461398,
    -0.231103377548616, -0.7501899197440212, 1.847597816108189, 0.0, 30.950940869491138,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
pub(super) const POLAROID: ColorMatrix = [
    1.438, -0.062, -0.062, 0.0, 0.0,
    -0.122, 1.378, -0.122, 0.0, 0.0,
    -0.016, -0.016, 1.483, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

#[rustfmt::skip]
pub(super) const SHIFT_TO_BGR: ColorMatrix = [
    0.0, 0.0, 1.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0, 0.0,
    1.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

pub(crate) fn register(catalog: &mut EffectCatalog) -> Result<()> {
    let specs: [(&'static str, &'static str, super::ParseFn); 15] = [
        ("colorMatrix", "m0..m19", |p| {
            Ok(Effect::ColorMatrix(Box::new(p.exact::<20>()?)))
        }),
        ("brightness", "amount=0", |p| {
            Ok(Effect::Brightness { amount: p.optional(0.0)? })
        }),
        ("contrast", "amount=0", |p| {
            Ok(Effect::Contrast { amount: p.optional(0.0)? })
        }),
        ("saturation", "amount=0", |p| {
            Ok(Effect::Saturation { amount: p.optional(0.0)? })
        }),
        ("desaturate", "", |_| Ok(Effect::Desaturate)),
        ("desaturateLuminance", "", |_| Ok(Effect::DesaturateLuminance)),
        ("hue", "degrees=0", |p| {
            Ok(Effect::Hue { degrees: p.optional(0.0)? })
        }),
        ("negative", "", |_| Ok(Effect::Negative)),
        ("sepia", "", |_| Ok(Effect::Sepia)),
        ("brownie", "", |_| Ok(Effect::Brownie)),
        ("vintagePinhole", "", |_| Ok(Effect::VintagePinhole)),
        ("kodachrome", "", |_| Ok(Effect::Kodachrome)),
        ("technicolor", "", |_| Ok(Effect::Technicolor)),
        ("polaroid", "", |_| Ok(Effect::Polaroid)),
        ("shiftToBGR", "", |_| Ok(Effect::ShiftToBgr)),
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

    fn matrix_of(effect: Effect) -> ColorMatrix {
        match effect.recipe() {
            Recipe::ColorMatrix(matrix) => matrix,
            other => panic!("{effect:?} resolved to {other:?}"),
        }
    }

    #[test]
    fn negative_is_contrast_minus_two() {
        let matrix = matrix_of(Effect::Negative);
        assert_eq!(matrix[0], -1.0);
        assert_eq!(matrix[4], 256.0);
        assert!(preserves_alpha(&matrix));
    }

    #[test]
    fn desaturate_averages_channels() {
        let matrix = matrix_of(Effect::Desaturate);
        let expected = 1.0 / 3.0;
        for value in [matrix[0], matrix[1], matrix[2]] {
            assert!((value - expected).abs() < 1e-6, "{value}");
        }
    }

    #[test]
    fn zero_hue_rotation_is_identity() {
        let matrix = hue(0.0);
        for (got, want) in matrix.iter().zip(IDENTITY_MATRIX.iter()) {
            assert!((got - want).abs() < 1e-6, "{matrix:?}");
        }
    }

    #[test]
    fn alpha_reading_matrix_uses_full_shader() {
        let mut matrix = IDENTITY_MATRIX;
        assert!(preserves_alpha(&matrix));
        matrix[3] = 0.5;
        assert!(!preserves_alpha(&matrix));
        matrix[3] = 0.0;
        matrix[18] = 0.5;
        assert!(!preserves_alpha(&matrix));
    }
}
