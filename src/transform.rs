use image::{Rgba, RgbaImage};
use nalgebra::Matrix3;
use rayon::prelude::*;

use crate::homography::project_point;

/// Sampling kernel used when reading the source at non-integer positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

/// Premultiply alpha: RGB values are multiplied by alpha
fn premultiply_alpha(img: &RgbaImage) -> Vec<[f64; 4]> {
    img.pixels()
        .map(|pixel| {
            let alpha = pixel[3] as f64 / 255.0;
            [
                pixel[0] as f64 * alpha,
                pixel[1] as f64 * alpha,
                pixel[2] as f64 * alpha,
                pixel[3] as f64,
            ]
        })
        .collect()
}

/// Unpremultiply alpha: divide RGB by alpha and round to the nearest level
fn unpremultiply_alpha(premultiplied: [f64; 4]) -> Rgba<u8> {
    let alpha = premultiplied[3];
    if alpha < 1.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let alpha_norm = alpha / 255.0;
    let channel = |v: f64| (v / alpha_norm).round().clamp(0.0, 255.0) as u8;

    Rgba([
        channel(premultiplied[0]),
        channel(premultiplied[1]),
        channel(premultiplied[2]),
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}

/// Cubic interpolation kernel (Catmull-Rom)
fn cubic_weight(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;

    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Premultiplied source pixels, addressed with edge clamping.
///
/// Sample positions use pixel-index coordinates: `(i, j)` is the center of
/// pixel `(i, j)`.
struct Sampler {
    data: Vec<[f64; 4]>,
    width: u32,
    height: u32,
}

impl Sampler {
    fn new(img: &RgbaImage) -> Self {
        Self {
            data: premultiply_alpha(img),
            width: img.width(),
            height: img.height(),
        }
    }

    fn get(&self, px: i64, py: i64) -> [f64; 4] {
        let px = px.clamp(0, self.width as i64 - 1) as usize;
        let py = py.clamp(0, self.height as i64 - 1) as usize;
        self.data[py * self.width as usize + px]
    }

    fn sample(&self, x: f64, y: f64, interpolation: Interpolation) -> [f64; 4] {
        match interpolation {
            Interpolation::Nearest => self.get(x.round() as i64, y.round() as i64),
            Interpolation::Bilinear => self.bilinear(x, y),
            Interpolation::Bicubic => self.bicubic(x, y),
        }
    }

    fn bilinear(&self, x: f64, y: f64) -> [f64; 4] {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let x_frac = x - x.floor();
        let y_frac = y - y.floor();

        let p00 = self.get(x0, y0);
        let p10 = self.get(x0 + 1, y0);
        let p01 = self.get(x0, y0 + 1);
        let p11 = self.get(x0 + 1, y0 + 1);

        let mut result = [0.0; 4];
        for c in 0..4 {
            let top = p00[c] * (1.0 - x_frac) + p10[c] * x_frac;
            let bottom = p01[c] * (1.0 - x_frac) + p11[c] * x_frac;
            result[c] = top * (1.0 - y_frac) + bottom * y_frac;
        }
        result
    }

    fn bicubic(&self, x: f64, y: f64) -> [f64; 4] {
        let x_floor = x.floor() as i64;
        let y_floor = y.floor() as i64;

        let wx = cubic_weight(x - x.floor());
        let wy = cubic_weight(y - y.floor());

        let mut result = [0.0; 4];
        for (j, wy) in wy.iter().enumerate() {
            for (i, wx) in wx.iter().enumerate() {
                let p = self.get(x_floor + i as i64 - 1, y_floor + j as i64 - 1);
                let weight = wx * wy;
                for c in 0..4 {
                    result[c] += p[c] * weight;
                }
            }
        }
        result
    }
}

/// Resample `img` into a new `width` x `height` image by inverse mapping.
///
/// `map` sends the center of each output pixel, `(u + 0.5, v + 0.5)`, to a
/// continuous source position. It must be oriented so that positions on the
/// visible side of the plane have a positive homogeneous `w`. Positions with
/// `w <= 0` or outside `[0, w] x [0, h]` of the source receive `fill`.
///
/// Rows are processed in parallel; each pixel depends only on its own
/// coordinates, so the result does not depend on scheduling.
pub fn warp_perspective(
    img: &RgbaImage,
    map: &Matrix3<f64>,
    width: u32,
    height: u32,
    interpolation: Interpolation,
    fill: Rgba<u8>,
) -> RgbaImage {
    let mut output = RgbaImage::new(width, height);
    if width == 0 || height == 0 || img.width() == 0 || img.height() == 0 {
        return output;
    }

    let (src_w, src_h) = (img.width() as f64, img.height() as f64);
    let sampler = Sampler::new(img);

    let row_len = width as usize * 4;
    let buf: &mut [u8] = &mut output;
    buf.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(v, row)| {
            for (u, pixel) in row.chunks_exact_mut(4).enumerate() {
                let source = project_point(map, u as f64 + 0.5, v as f64 + 0.5)
                    .filter(|&(sx, sy)| sx >= 0.0 && sx <= src_w && sy >= 0.0 && sy <= src_h);
                let value = match source {
                    Some((sx, sy)) => {
                        unpremultiply_alpha(sampler.sample(sx - 0.5, sy - 0.5, interpolation))
                    }
                    None => fill,
                };
                pixel.copy_from_slice(&value.0);
            }
        });

    output
}
