use anyhow::{Context, Result};
use bridgeconfig::BridgeConfig;
use image::RgbaImage;
use tracing::info;
use tracing_subscriber::EnvFilter;
use upscaler::{fallback, image_from_texture, texture_from_image, GpuDevice, SpatialUpscaler};

use crate::cli::{ConfigArgs, PatternArgs, UpscaleArgs};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn upscale(args: UpscaleArgs) -> Result<()> {
    let image = image::open(&args.input)
        .with_context(|| format!("failed to read image at {}", args.input.display()))?
        .to_rgba8();

    let gpu = GpuDevice::request_headless("upscalectl")
        .context("failed to create a headless GPU device")?;
    let input = texture_from_image(&gpu, &image, "upscalectl input");
    let mut upscaler = SpatialUpscaler::new(gpu.clone(), args.color_processing);

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("upscalectl encoder"),
        });
    let output = upscaler
        .upscale(&mut encoder, &input, args.scale)
        .context("failed to encode upscale")?
        .clone();
    gpu.queue.submit(Some(encoder.finish()));

    let result = image_from_texture(&gpu, &output).context("failed to read back upscaled image")?;
    result
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    info!(
        input = ?image.dimensions(),
        output = ?result.dimensions(),
        backend = ?gpu.backend,
        path = %args.output.display(),
        "upscaled image"
    );
    Ok(())
}

pub fn pattern(args: PatternArgs) -> Result<()> {
    let row_pitch = args.width as usize * 4;
    let mut buffer = vec![0u8; row_pitch * args.height as usize];
    fallback::fill_with_time(&mut buffer, args.width, args.height, row_pitch, args.time)?;

    let image = RgbaImage::from_raw(args.width, args.height, buffer)
        .context("pattern buffer does not match the image size")?;
    image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    info!(
        width = args.width,
        height = args.height,
        time = args.time,
        path = %args.output.display(),
        "rendered fallback pattern"
    );
    Ok(())
}

pub fn config(args: ConfigArgs) -> Result<()> {
    let (config, source) = match args.path {
        Some(path) => (BridgeConfig::load(&path)?, Some(path)),
        None => BridgeConfig::discover()?,
    };

    match &source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no configuration file found; showing defaults"),
    }
    print!(
        "{}",
        toml::to_string_pretty(&config).context("failed to render configuration")?
    );
    Ok(())
}
