use anyhow::{Context, Result};
use clap::Parser;
use image::ImageReader;
use log::{debug, LevelFilter};

use perspective_rectify::geometry::check_bounds;
use perspective_rectify::{annotate, rectify_with, Cli, CornerSet, RectifyOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    // Load input image
    let img = ImageReader::open(&cli.input)
        .with_context(|| format!("Failed to open input file: {:?}", cli.input))?
        .decode()
        .with_context(|| format!("Failed to decode image: {:?}", cli.input))?;
    let rgba = img.to_rgba8();

    debug!("Loaded image: {:?} ({}x{})", cli.input, rgba.width(), rgba.height());

    check_bounds(&cli.corners, rgba.width(), rgba.height()).context("Invalid corners")?;
    let center = match cli.center {
        Some(center) => center,
        None => CornerSet::new(cli.corners)
            .context("Invalid corners")?
            .projective_center(),
    };

    debug!(
        "Extent: {} x {} at {} px/unit, center ({:.2}, {:.2})",
        cli.extent.width, cli.extent.height, cli.extent.scale, center.x, center.y
    );

    if let Some(path) = &cli.annotate {
        annotate(&rgba, &cli.corners, &center)
            .save(path)
            .with_context(|| format!("Failed to save annotated preview: {:?}", path))?;
        eprintln!("Saved annotated preview: {:?}", path);
    }

    let options = RectifyOptions {
        interpolation: cli.interpolation.into(),
        fill: cli.fill,
    };
    let rectified = rectify_with(&rgba, &cli.extent, &cli.corners, &center, &options)
        .context("Failed to rectify image")?;

    // Save result
    let output_path = cli.output_path();
    rectified
        .save(&output_path)
        .with_context(|| format!("Failed to save output: {:?}", output_path))?;

    eprintln!("Saved rectified image: {:?}", output_path);
    eprintln!(
        "Dimensions: {}x{} -> {}x{}",
        rgba.width(),
        rgba.height(),
        rectified.width(),
        rectified.height()
    );

    Ok(())
}
