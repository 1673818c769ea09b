use clap::{Parser, ValueEnum};
use image::Rgba;
use std::path::PathBuf;

use crate::geometry::{Extent, Point2D};
use crate::transform::Interpolation;

#[derive(Parser, Debug)]
#[command(name = "perspective-rectify")]
#[command(version, about = "Rectify a photographed planar region into a fronto-parallel view")]
pub struct Cli {
    /// Input image path
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output path [default: input_rectified.png]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Corners as "x,y;x,y;x,y;x,y" in pixels: top-left, top-right, bottom-right, bottom-left
    #[arg(short, long, value_parser = parse_corners)]
    pub corners: [Point2D; 4],

    /// Extent as "width,height,scale": physical size and output pixels per unit
    #[arg(short, long, value_parser = parse_extent)]
    pub extent: Extent,

    /// Point to center the output on, "x,y" in pixels [default: diagonal intersection]
    #[arg(long, value_parser = parse_point)]
    pub center: Option<Point2D>,

    /// Sampling kernel
    #[arg(short, long, value_enum, default_value_t = InterpolationArg::Bilinear)]
    pub interpolation: InterpolationArg,

    /// Fill color for regions outside the source, "r,g,b,a"
    #[arg(long, default_value = "0,0,0,0", value_parser = parse_rgba)]
    pub fill: Rgba<u8>,

    /// Also save a copy of the input with the selected region drawn on it
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// Show homography and sizing details
    #[arg(long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationArg {
    Nearest,
    Bilinear,
    Bicubic,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Bilinear => Interpolation::Bilinear,
            InterpolationArg::Bicubic => Interpolation::Bicubic,
        }
    }
}

impl Cli {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self.input.file_stem().unwrap_or_default().to_string_lossy();
            let parent = self.input.parent().unwrap_or(std::path::Path::new("."));
            parent.join(format!("{}_rectified.png", stem))
        })
    }
}

fn parse_numbers(s: &str, expected: usize, what: &str) -> Result<Vec<f64>, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid number '{}' in {}", part.trim(), what))
        })
        .collect::<Result<_, _>>()?;

    if values.len() != expected {
        return Err(format!(
            "Invalid {} '{}', expected {} comma-separated values",
            what, s, expected
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(format!("Values in {} must be finite", what));
    }
    Ok(values)
}

fn parse_point(s: &str) -> Result<Point2D, String> {
    let v = parse_numbers(s, 2, "point")?;
    Ok(Point2D::new(v[0], v[1]))
}

fn parse_corners(s: &str) -> Result<[Point2D; 4], String> {
    let points: Vec<Point2D> = s.split(';').map(parse_point).collect::<Result<_, _>>()?;
    points
        .try_into()
        .map_err(|p: Vec<Point2D>| format!("Expected 4 corners separated by ';', got {}", p.len()))
}

fn parse_extent(s: &str) -> Result<Extent, String> {
    let v = parse_numbers(s, 3, "extent")?;
    let extent = Extent::new(v[0], v[1], v[2]);
    extent.validate().map_err(|e| e.to_string())?;
    Ok(extent)
}

fn parse_rgba(s: &str) -> Result<Rgba<u8>, String> {
    let channels: Vec<u8> = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| format!("Invalid channel value '{}', expected 0-255", part.trim()))
        })
        .collect::<Result<_, _>>()?;

    match channels.as_slice() {
        &[r, g, b, a] => Ok(Rgba([r, g, b, a])),
        _ => Err(format!("Invalid color '{}', expected r,g,b,a", s)),
    }
}
