use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chainconfig::ChainConfig;
use filterchain::{
    ContextStats, EffectCatalog, FilterChain, GpuContext, GpuOptions, RenderContext,
    SoftwareContext,
};
use image::{DynamicImage, RgbaImage};
use tracing_subscriber::EnvFilter;

use crate::cli::{Backend, EffectArg, RunArgs};

pub fn run(args: RunArgs) -> Result<()> {
    let input = args.input.as_deref().context("missing input path")?;
    let output = args.output.as_deref().context("missing output path")?;
    let steps = collect_steps(&args)?;

    let image = image::open(input)
        .with_context(|| format!("failed to read image {}", input.display()))?
        .to_rgba8();
    tracing::info!(
        input = %input.display(),
        width = image.width(),
        height = image.height(),
        effects = steps.len(),
        backend = ?args.backend,
        "applying filter chain"
    );

    let (filtered, stats) = match args.backend {
        Backend::Gpu => {
            let context = GpuContext::new(GpuOptions {
                power: args.power,
                force_fallback_adapter: args.fallback_adapter,
            })
            .context("failed to initialise the GPU backend; try --backend software")?;
            tracing::info!(adapter = context.adapter_name(), "using GPU adapter");
            render(context, &steps, &image, args.repeat)?
        }
        Backend::Software => render(SoftwareContext::new(), &steps, &image, args.repeat)?,
    };

    save_image(filtered, output)
        .with_context(|| format!("failed to write image {}", output.display()))?;
    tracing::info!(output = %output.display(), "wrote filtered image");

    if args.stats {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("failed to encode statistics")?
        );
    }
    Ok(())
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn list_effects() -> Result<()> {
    let catalog = EffectCatalog::builtin().context("failed to build the effect catalog")?;
    println!("Available effects:");
    for spec in catalog.iter() {
        let params = if spec.params.is_empty() {
            "-"
        } else {
            spec.params
        };
        println!("  {:<12} {:<20} {params}", spec.group, spec.name);
    }
    Ok(())
}

/// Preset steps first, then `--effect` flags, in command-line order.
fn collect_steps(args: &RunArgs) -> Result<Vec<EffectArg>> {
    let mut steps = Vec::new();
    if let Some(path) = args.preset.as_deref() {
        steps.extend(load_preset(path, args.preset_name.as_deref())?);
    }
    steps.extend(args.effects.iter().cloned());
    Ok(steps)
}

fn load_preset(path: &Path, name: Option<&str>) -> Result<Vec<EffectArg>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read preset file {}", path.display()))?;
    let config = ChainConfig::from_toml_str(&raw)
        .with_context(|| format!("failed to load preset file {}", path.display()))?;
    let (selected, preset) = config
        .resolve(name)
        .with_context(|| format!("failed to select a preset from {}", path.display()))?;
    tracing::debug!(
        preset = selected,
        description = preset.description.as_deref().unwrap_or(""),
        effects = preset.effects.len(),
        "loaded preset"
    );
    Ok(preset
        .steps()
        .map(|(step, params)| EffectArg {
            name: step.to_string(),
            params: params.to_vec(),
        })
        .collect())
}

// JPEG has no alpha channel.
fn save_image(image: RgbaImage, path: &Path) -> image::ImageResult<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => DynamicImage::ImageRgba8(image).to_rgb8().save(path),
        _ => image.save(path),
    }
}

fn render<C: RenderContext>(
    context: C,
    steps: &[EffectArg],
    image: &RgbaImage,
    repeat: u32,
) -> Result<(RgbaImage, ContextStats)> {
    let mut chain = FilterChain::new(context)?;
    for step in steps {
        chain
            .add_named(&step.name, &step.params)
            .with_context(|| format!("invalid effect '{}'", step.name))?;
    }

    let mut filtered = apply_once(&mut chain, image, 0)?;
    for iteration in 1..repeat {
        filtered = apply_once(&mut chain, image, iteration)?;
    }
    Ok((filtered, chain.stats()))
}

fn apply_once<C: RenderContext>(
    chain: &mut FilterChain<C>,
    image: &RgbaImage,
    iteration: u32,
) -> Result<RgbaImage> {
    let started = Instant::now();
    let mut surface = chain.apply(image).context("failed to apply the filter chain")?;
    let draws = surface.draws();
    let pixels = surface
        .read_pixels()
        .context("failed to read back the rendered image")?;
    tracing::debug!(
        iteration,
        draws,
        elapsed = ?started.elapsed(),
        "applied filter chain"
    );
    Ok(pixels)
}
