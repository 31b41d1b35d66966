//! The effect catalog.
//!
//! Effects are a closed, typed enum. The catalog maps the camelCase names
//! used by presets and the command line to parsers that build an [`Effect`]
//! from a flat argument list. Each group registers its own names.
use std::collections::BTreeMap;

use crate::context::RenderContext;
use crate::error::{FilterError, Result};
use crate::pass::PassContext;

pub mod blur;
pub mod convolution;
pub mod pixelate;
pub mod standard;

/// Number of draw calls an effect issued.
pub type PassCount = u32;

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    ColorMatrix(Box<[f32; 20]>),
    Brightness { amount: f32 },
    Contrast { amount: f32 },
    Saturation { amount: f32 },
    Desaturate,
    DesaturateLuminance,
    Hue { degrees: f32 },
    Negative,
    Sepia,
    Brownie,
    VintagePinhole,
    Kodachrome,
    Technicolor,
    Polaroid,
    ShiftToBgr,
    Convolution([f32; 9]),
    DetectEdges,
    SobelX,
    SobelY,
    Emboss { size: f32 },
    Sharpen { amount: f32 },
    Blur { radius: f32 },
    Pixelate { size: f32 },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::ColorMatrix(_) => "colorMatrix",
            Effect::Brightness { .. } => "brightness",
            Effect::Contrast { .. } => "contrast",
            Effect::Saturation { .. } => "saturation",
            Effect::Desaturate => "desaturate",
            Effect::DesaturateLuminance => "desaturateLuminance",
            Effect::Hue { .. } => "hue",
            Effect::Negative => "negative",
            Effect::Sepia => "sepia",
            Effect::Brownie => "brownie",
            Effect::VintagePinhole => "vintagePinhole",
            Effect::Kodachrome => "kodachrome",
            Effect::Technicolor => "technicolor",
            Effect::Polaroid => "polaroid",
            Effect::ShiftToBgr => "shiftToBGR",
            Effect::Convolution(_) => "convolution",
            Effect::DetectEdges => "detectEdges",
            Effect::SobelX => "sobelX",
            Effect::SobelY => "sobelY",
            Effect::Emboss { .. } => "emboss",
            Effect::Sharpen { .. } => "sharpen",
            Effect::Blur { .. } => "blur",
            Effect::Pixelate { .. } => "pixelate",
        }
    }

    /// The draw parameters this effect resolves to.
    pub fn recipe(&self) -> Recipe {
        match *self {
            Effect::ColorMatrix(ref matrix) => Recipe::ColorMatrix(**matrix),
            Effect::Brightness { amount } => Recipe::ColorMatrix(standard::brightness(amount)),
            Effect::Contrast { amount } => Recipe::ColorMatrix(standard::contrast(amount)),
            Effect::Saturation { amount } => Recipe::ColorMatrix(standard::saturation(amount)),
            Effect::Desaturate => Recipe::ColorMatrix(standard::saturation(-1.0)),
            Effect::DesaturateLuminance => Recipe::ColorMatrix(standard::DESATURATE_LUMINANCE),
            Effect::Hue { degrees } => Recipe::ColorMatrix(standard::hue(degrees)),
            Effect::Negative => Recipe::ColorMatrix(standard::contrast(-2.0)),
            Effect::Sepia => Recipe::ColorMatrix(standard::SEPIA),
            Effect::Brownie => Recipe::ColorMatrix(standard::BROWNIE),
            Effect::VintagePinhole => Recipe::ColorMatrix(standard::VINTAGE_PINHOLE),
            Effect::Kodachrome => Recipe::ColorMatrix(standard::KODACHROME),
            Effect::Technicolor => Recipe::ColorMatrix(standard::TECHNICOLOR),
            Effect::Polaroid => Recipe::ColorMatrix(standard::POLAROID),
            Effect::ShiftToBgr => Recipe::ColorMatrix(standard::SHIFT_TO_BGR),
            Effect::Convolution(kernel) => Recipe::Convolution(kernel),
            Effect::DetectEdges => Recipe::Convolution(convolution::DETECT_EDGES),
            Effect::SobelX => Recipe::Convolution(convolution::SOBEL_X),
            Effect::SobelY => Recipe::Convolution(convolution::SOBEL_Y),
            Effect::Emboss { size } => Recipe::Convolution(convolution::emboss(size)),
            Effect::Sharpen { amount } => Recipe::Convolution(convolution::sharpen(amount)),
            Effect::Blur { radius } => Recipe::Blur { radius },
            Effect::Pixelate { size } => Recipe::Pixelate { size },
        }
    }

    /// Runs the effect against the current pass state.
    pub fn run<C: RenderContext>(
        &self,
        pass: &mut PassContext<'_, C>,
        width: u32,
        height: u32,
    ) -> Result<PassCount> {
        match self.recipe() {
            Recipe::ColorMatrix(matrix) => standard::color_matrix(pass, &matrix),
            Recipe::Convolution(kernel) => convolution::convolve(pass, &kernel, width, height),
            Recipe::Blur { radius } => blur::blur(pass, radius, width, height),
            Recipe::Pixelate { size } => pixelate::pixelate(pass, size, width, height),
        }
    }
}

/// What an [`Effect`] draws with once its arguments are resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Recipe {
    ColorMatrix(standard::ColorMatrix),
    Convolution(convolution::Kernel),
    Blur { radius: f32 },
    Pixelate { size: f32 },
}

/// Positional arguments for one catalog lookup.
pub struct Params<'a> {
    effect: &'a str,
    args: &'a [f32],
    consumed: usize,
}

impl<'a> Params<'a> {
    pub fn new(effect: &'a str, args: &'a [f32]) -> Self {
        Self {
            effect,
            args,
            consumed: 0,
        }
    }

    /// Next argument, or `default` when the list is exhausted.
    pub fn optional(&mut self, default: f32) -> Result<f32> {
        let value = self.args.get(self.consumed).copied().unwrap_or(default);
        self.consumed += 1;
        self.finite(value)
    }

    /// Exactly `N` arguments.
    pub fn exact<const N: usize>(&mut self) -> Result<[f32; N]> {
        let rest = &self.args[self.consumed.min(self.args.len())..];
        let values: [f32; N] = rest.try_into().map_err(|_| self.invalid(format!(
            "expects {N} arguments, got {}",
            self.args.len()
        )))?;
        self.consumed += N;
        for value in values {
            self.finite(value)?;
        }
        Ok(values)
    }

    pub fn finish(&self) -> Result<()> {
        if self.args.len() > self.consumed {
            return Err(self.invalid(format!(
                "expects at most {} arguments, got {}",
                self.consumed,
                self.args.len()
            )));
        }
        Ok(())
    }

    fn finite(&self, value: f32) -> Result<f32> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(format!("arguments must be finite, got {value}")))
        }
    }

    fn invalid(&self, message: String) -> FilterError {
        FilterError::InvalidArguments {
            effect: self.effect.to_string(),
            message,
        }
    }
}

pub type ParseFn = fn(&mut Params<'_>) -> Result<Effect>;

#[derive(Clone, Copy, Debug)]
pub struct EffectSpec {
    pub name: &'static str,
    pub group: &'static str,
    pub params: &'static str,
    pub parse: ParseFn,
}

#[derive(Debug, Default)]
pub struct EffectCatalog {
    entries: BTreeMap<&'static str, EffectSpec>,
}

impl EffectCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in effect group.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::empty();
        standard::register(&mut catalog)?;
        convolution::register(&mut catalog)?;
        blur::register(&mut catalog)?;
        pixelate::register(&mut catalog)?;
        Ok(catalog)
    }

    pub fn register(&mut self, spec: EffectSpec) -> Result<()> {
        if let Some(existing) = self.entries.get(spec.name) {
            return Err(FilterError::DuplicateEffect {
                name: spec.name.to_string(),
                first: existing.group,
                second: spec.group,
            });
        }
        self.entries.insert(spec.name, spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EffectSpec> {
        self.entries.get(name)
    }

    pub fn parse(&self, name: &str, args: &[f32]) -> Result<Effect> {
        let spec = self
            .get(name)
            .ok_or_else(|| FilterError::UnknownEffect(name.to_string()))?;
        let mut params = Params::new(spec.name, args);
        let effect = (spec.parse)(&mut params)?;
        params.finish()?;
        Ok(effect)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectSpec> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_catalog_has_every_effect() {
        let catalog = EffectCatalog::builtin().unwrap();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names.len(), 23);
        for name in ["blur", "colorMatrix", "sobelX", "shiftToBGR", "pixelate"] {
            assert!(names.contains(&name), "missing {name}");
        }
        for spec in catalog.iter() {
            assert_eq!(catalog.get(spec.name).map(|s| s.group), Some(spec.group));
        }
    }

    #[test]
    fn parse_applies_defaults() {
        let catalog = EffectCatalog::builtin().unwrap();
        assert_eq!(catalog.parse("blur", &[]).unwrap(), Effect::Blur { radius: 0.0 });
        assert_eq!(
            catalog.parse("sharpen", &[]).unwrap(),
            Effect::Sharpen { amount: 1.0 }
        );
        assert_eq!(
            catalog.parse("brightness", &[0.2]).unwrap(),
            Effect::Brightness { amount: 0.2 }
        );
        assert_eq!(catalog.parse("sepia", &[]).unwrap().name(), "sepia");
    }

    #[test]
    fn parse_rejects_bad_arguments() {
        let catalog = EffectCatalog::builtin().unwrap();
        let err = catalog.parse("negative", &[1.0]).unwrap_err();
        assert!(matches!(err, FilterError::InvalidArguments { .. }), "{err}");

        let err = catalog.parse("convolution", &[1.0; 8]).unwrap_err();
        assert!(err.to_string().contains("expects 9 arguments"), "{err}");

        let err = catalog.parse("blur", &[f32::NAN]).unwrap_err();
        assert!(err.to_string().contains("finite"), "{err}");

        let err = catalog.parse("nope", &[]).unwrap_err();
        assert!(matches!(err, FilterError::UnknownEffect(ref name) if name == "nope"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut catalog = EffectCatalog::builtin().unwrap();
        let err = catalog
            .register(EffectSpec {
                name: "blur",
                group: "custom",
                params: "",
                parse: |_| Ok(Effect::Negative),
            })
            .unwrap_err();
        match err {
            FilterError::DuplicateEffect { name, first, second } => {
                assert_eq!((name.as_str(), first, second), ("blur", "blur", "custom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn every_effect_name_round_trips_through_the_catalog() {
        let catalog = EffectCatalog::builtin().unwrap();
        for spec in catalog.iter() {
            let args: Vec<f32> = match spec.name {
                "colorMatrix" => vec![0.0; 20],
                "convolution" => vec![0.0; 9],
                _ => Vec::new(),
            };
            let effect = catalog.parse(spec.name, &args).unwrap();
            assert_eq!(effect.name(), spec.name);
        }
    }
}
