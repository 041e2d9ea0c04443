use std::path::PathBuf;

use bridgeconfig::ColorProcessing;
use clap::{Args, Parser, Subcommand};
use upscaler::{ColorProcessingMode, DEFAULT_PATTERN_TIME};

#[derive(Parser, Debug)]
#[command(
    name = "upscalectl",
    author,
    version,
    about = "Offline harness for the GPU upscale bridge"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upscale an image file on a headless GPU device.
    Upscale(UpscaleArgs),
    /// Render the fallback plasma pattern into an image file.
    Pattern(PatternArgs),
    /// Print the bridge configuration the plugin would load.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct UpscaleArgs {
    /// Image to upscale (PNG, JPEG or BMP).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Where to write the result; the format follows the extension.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Output-to-input size ratio per axis.
    #[arg(long, value_name = "FACTOR", default_value_t = 2.0, value_parser = parse_scale)]
    pub scale: f32,

    /// Working space for the filter (`perceptual`, `linear`, `hdr`).
    #[arg(
        long,
        value_name = "MODE",
        default_value = "perceptual",
        value_parser = parse_color_processing
    )]
    pub color_processing: ColorProcessingMode,
}

#[derive(Args, Debug)]
pub struct PatternArgs {
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    #[arg(long, value_name = "PIXELS", default_value_t = 256, value_parser = parse_extent)]
    pub width: u32,

    #[arg(long, value_name = "PIXELS", default_value_t = 256, value_parser = parse_extent)]
    pub height: u32,

    /// Animation phase of the pattern.
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_PATTERN_TIME)]
    pub time: f32,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Read this file instead of the discovered one.
    #[arg(long, value_name = "FILE")]
    pub path: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_scale(value: &str) -> Result<f32, String> {
    let scale: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid scale '{value}'"))?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(format!("scale must be a positive number, got '{value}'"));
    }
    Ok(scale)
}

/// Accepts the same names as `color_processing` in `bridge.toml`.
pub fn parse_color_processing(value: &str) -> Result<ColorProcessingMode, String> {
    let mode = match value.parse::<ColorProcessing>()? {
        ColorProcessing::Perceptual => ColorProcessingMode::Perceptual,
        ColorProcessing::Linear => ColorProcessingMode::Linear,
        ColorProcessing::Hdr => ColorProcessingMode::Hdr,
    };
    Ok(mode)
}

pub fn parse_extent(value: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err("size must be at least one pixel".to_string()),
        Ok(extent) => Ok(extent),
        Err(_) => Err(format!("invalid size '{value}'")),
    }
}
