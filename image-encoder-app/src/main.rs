use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rust_image_encoder::{BackendRegistry, ColorModel, EncoderConfig, ImageContext, ImageFormat};

/// Renders a test pattern through the configured image encoder.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Image width in pixels
    #[arg(long, default_value_t = 256)]
    width: usize,

    /// Image height in pixels
    #[arg(long, default_value_t = 256)]
    height: usize,

    /// Shared library providing the image encoder. Becomes the default format when set.
    #[arg(long)]
    plugin: Option<PathBuf>,

    /// Format to encode with: default, ppm or library
    #[arg(long, default_value = "default")]
    format: ImageFormat,

    /// Output file name. The format's extension is added if missing.
    #[arg(short, long, default_value = "")]
    output: String,
}

/// A diagonal gradient with a grid line every 32 pixels.
fn pattern(x: usize, y: usize, width: usize, height: usize) -> (u8, u8, u8) {
    if x % 32 == 0 || y % 32 == 0 {
        return (0xff, 0xff, 0xff);
    }
    let r = (x * 255 / width.max(1)) as u8;
    let g = (y * 255 / height.max(1)) as u8;
    let b = ((x + y) * 255 / (width + height).max(1)) as u8;
    (r, g, b)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = EncoderConfig::new();
    if let Some(plugin) = &args.plugin {
        config.set_library_backend(plugin);
    }
    let registry = BackendRegistry::new(config);
    if let Some(module) = registry.config().library_backend() {
        info!("Using image module {}", module.display());
    }

    let mut ctx = ImageContext::new();
    ctx.init(
        &registry,
        args.width,
        args.height,
        ColorModel::Rgb,
        args.format,
    )
    .context("Failed to initialize image context")?;

    for y in 0..args.height {
        for x in 0..args.width {
            let (r, g, b) = pattern(x, y, args.width, args.height);
            ctx.add_rgb(r, g, b)?;
        }
    }

    let filename = ctx
        .file_name(&args.output)
        .context("Failed to build output file name")?;
    let file = File::create(&filename).with_context(|| format!("Failed to create {filename}"))?;
    let mut writer = BufWriter::new(file);
    ctx.write(&mut writer)
        .with_context(|| format!("Failed to write {filename}"))?;
    writer.flush()?;
    let format = ctx.format()?;
    ctx.free();

    info!(
        "Wrote {}x{} {} image to {}",
        args.width, args.height, format, filename
    );
    Ok(())
}
