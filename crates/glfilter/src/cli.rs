use std::path::PathBuf;

use clap::{Parser, Subcommand};
use filterchain::GpuPower;

#[derive(Parser, Debug)]
#[command(
    name = "glfilter",
    author,
    version,
    about = "Apply GPU filter chains to images",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Image to read (PNG, JPEG, BMP or GIF).
    #[arg(value_name = "INPUT", required = true)]
    pub input: Option<PathBuf>,

    /// Where to write the filtered image; the format follows the extension.
    #[arg(value_name = "OUTPUT", required = true)]
    pub output: Option<PathBuf>,

    /// Append an effect, e.g. `blur:4` or `brightness:0.1`. Repeatable; runs in order.
    #[arg(
        long = "effect",
        short = 'e',
        value_name = "NAME[:A,B,...]",
        value_parser = parse_effect_arg
    )]
    pub effects: Vec<EffectArg>,

    /// Load effects from a preset TOML file before any `--effect` flags.
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Preset to use from `--preset`; defaults to `defaults.preset`.
    #[arg(long, value_name = "NAME", requires = "preset")]
    pub preset_name: Option<String>,

    /// Rendering backend: `gpu` (wgpu) or `software` (CPU reference).
    #[arg(
        long,
        value_name = "BACKEND",
        value_parser = parse_backend,
        default_value = "gpu"
    )]
    pub backend: Backend,

    /// Adapter power preference for the GPU backend: `low` or `high`.
    #[arg(
        long,
        value_name = "POWER",
        value_parser = parse_power,
        default_value = "high"
    )]
    pub power: GpuPower,

    /// Only consider software (fallback) adapters for the GPU backend.
    #[arg(long)]
    pub fallback_adapter: bool,

    /// Apply the chain this many times; every run after the first reuses programs and targets.
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,

    /// Print backend statistics as JSON on stdout after writing the image.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every effect the chain understands, with its parameters.
    List,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Gpu,
    Software,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EffectArg {
    pub name: String,
    pub params: Vec<f32>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_effect_arg(value: &str) -> Result<EffectArg, String> {
    let trimmed = value.trim();
    let (name, rest) = match trimmed.split_once(':') {
        Some((name, rest)) => (name.trim(), Some(rest.trim())),
        None => (trimmed, None),
    };
    if name.is_empty() {
        return Err("effect name must not be empty".to_string());
    }

    let params = match rest {
        None | Some("") => Vec::new(),
        Some(rest) => rest
            .split(',')
            .map(|raw| {
                let raw = raw.trim();
                raw.parse::<f32>()
                    .map_err(|_| format!("invalid parameter '{raw}' for effect '{name}'"))
            })
            .collect::<Result<_, _>>()?,
    };

    Ok(EffectArg {
        name: name.to_string(),
        params,
    })
}

pub fn parse_backend(value: &str) -> Result<Backend, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "gpu" | "wgpu" => Ok(Backend::Gpu),
        "software" | "cpu" => Ok(Backend::Software),
        other => Err(format!(
            "unknown backend '{other}'; expected gpu or software"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<GpuPower, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(GpuPower::Low),
        "high" | "high-performance" => Ok(GpuPower::High),
        other => Err(format!("unknown power preference '{other}'; expected low or high")),
    }
}
