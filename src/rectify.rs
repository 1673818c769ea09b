use image::{Rgba, RgbaImage};
use log::debug;
use nalgebra::Matrix3;

use crate::error::RectifyError;
use crate::geometry::{check_bounds, CornerSet, Extent, Point2D};
use crate::homography::Homography;
use crate::transform::{warp_perspective, Interpolation};

/// Largest output accepted, in pixels
pub const MAX_OUTPUT_PIXELS: u64 = 64 * 1024 * 1024;

/// Tunables for [`rectify_with`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectifyOptions {
    pub interpolation: Interpolation,
    /// Written wherever the output maps outside the source image
    pub fill: Rgba<u8>,
}

impl Default for RectifyOptions {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
            fill: Rgba([0, 0, 0, 0]),
        }
    }
}

/// Rectify the quadrilateral `corners` of `image` into a fronto-parallel view
/// using bilinear sampling and a transparent fill.
///
/// See [`rectify_with`].
pub fn rectify(
    image: &RgbaImage,
    extent: &Extent,
    corners: &[Point2D; 4],
    center: &Point2D,
) -> Result<RgbaImage, RectifyError> {
    rectify_with(image, extent, corners, center, &RectifyOptions::default())
}

/// Rectify the quadrilateral `corners` of `image` into a fronto-parallel view.
///
/// The corners (top-left, top-right, bottom-right, bottom-left) are taken as
/// the image of an `extent.width` x `extent.height` rectangle. The output is
/// `round(width * scale)` x `round(height * scale)` pixels, translated in the
/// rectified plane so that `center` lands on the middle of the output.
///
/// Validation happens before any computation: extent first, then corner
/// bounds, then corner geometry.
pub fn rectify_with(
    image: &RgbaImage,
    extent: &Extent,
    corners: &[Point2D; 4],
    center: &Point2D,
    options: &RectifyOptions,
) -> Result<RgbaImage, RectifyError> {
    extent.validate()?;
    let (out_w, out_h) = extent.pixel_dimensions();
    let too_large = out_w
        .checked_mul(out_h)
        .map_or(true, |pixels| pixels > MAX_OUTPUT_PIXELS);
    if too_large {
        return Err(RectifyError::OutputTooLarge {
            width: out_w,
            height: out_h,
        });
    }

    check_bounds(corners, image.width(), image.height())?;
    let corners = CornerSet::new(*corners)?;

    let homography = Homography::from_correspondences(corners.points(), &extent.rectangle())?;
    debug!("Homography (source -> rectangle): {:?}", homography.matrix());

    let inverse = homography.inverse()?;
    let map = output_to_source(&homography, &inverse, &corners, extent, center)?;

    debug!(
        "Rectifying {}x{} source into {}x{} output",
        image.width(),
        image.height(),
        out_w,
        out_h
    );

    Ok(warp_perspective(
        image,
        &map,
        out_w as u32,
        out_h as u32,
        options.interpolation,
        options.fill,
    ))
}

/// Matrix sending output pixel positions to source positions.
///
/// Output position `p` lands on rectangle point `p / scale + offset`, where
/// `offset` shifts the projected center onto the rectangle center. The matrix
/// is signed so that the homogeneous `w` is positive on the side of the
/// vanishing line that holds the quadrilateral.
fn output_to_source(
    homography: &Homography,
    inverse: &Homography,
    corners: &CornerSet,
    extent: &Extent,
    center: &Point2D,
) -> Result<Matrix3<f64>, RectifyError> {
    let plane_w = homography.homogeneous(&corners.projective_center()).z;
    let center_w = homography.homogeneous(center).z;
    if center_w * plane_w <= 0.0 {
        return Err(RectifyError::geometry(
            "center lies on or beyond the vanishing line of the quadrilateral",
        ));
    }

    let projected = homography.map(center);
    if !projected.x.is_finite() || !projected.y.is_finite() {
        return Err(RectifyError::geometry(
            "center projects to infinity under the homography",
        ));
    }

    let offset = projected - extent.center();
    debug!(
        "Center ({:.2}, {:.2}) projects to ({:.4}, {:.4}), offset ({:.4}, {:.4})",
        center.x, center.y, projected.x, projected.y, offset.x, offset.y
    );

    let inv_scale = 1.0 / extent.scale;
    #[rustfmt::skip]
    let output_to_rectangle = Matrix3::new(
        inv_scale, 0.0, offset.x,
        0.0, inv_scale, offset.y,
        0.0, 0.0, 1.0,
    );

    let map = inverse.matrix() * output_to_rectangle;
    if inverse.homogeneous(&extent.center()).z < 0.0 {
        Ok(-map)
    } else {
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::imageops;

    fn pts(p: [(f64, f64); 4]) -> [Point2D; 4] {
        p.map(|(x, y)| Point2D::new(x, y))
    }

    /// Opaque test pattern where every pixel is distinct enough to spot shifts
    fn pattern(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x * 7 % 256) as u8,
                (y * 5 % 256) as u8,
                ((x * 3 + y * 11) % 256) as u8,
                255,
            ])
        })
    }

    fn oblique() -> [Point2D; 4] {
        pts([(40.0, 30.0), (170.0, 45.0), (185.0, 150.0), (25.0, 140.0)])
    }

    #[test]
    fn test_identity_matches_crop() {
        let img = pattern(100, 80);
        let corners = pts([(20.0, 10.0), (70.0, 10.0), (70.0, 40.0), (20.0, 40.0)]);
        let extent = Extent::new(50.0, 30.0, 1.0);
        let center = Point2D::new(45.0, 25.0);

        let result = rectify(&img, &extent, &corners, &center).unwrap();
        let expected = imageops::crop_imm(&img, 20, 10, 50, 30).to_image();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_identity_with_scaled_extent() {
        // Physical units differ from pixels but the scale cancels out.
        let img = pattern(100, 80);
        let corners = pts([(0.0, 0.0), (100.0, 0.0), (100.0, 80.0), (0.0, 80.0)]);
        let extent = Extent::new(0.25, 0.2, 400.0);
        let center = Point2D::new(50.0, 40.0);

        let result = rectify(&img, &extent, &corners, &center).unwrap();
        assert_eq!(result, img);
    }

    #[test]
    fn test_degenerate_corners_rejected() {
        let img = pattern(100, 100);
        let corners = pts([(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (0.0, 10.0)]);
        let err = rectify(
            &img,
            &Extent::new(10.0, 10.0, 1.0),
            &corners,
            &Point2D::new(5.0, 5.0),
        )
        .unwrap_err();
        assert!(matches!(err, RectifyError::InvalidGeometry { .. }));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let img = pattern(100, 100);
        let corners = pts([(10.0, 10.0), (150.0, 50.0), (90.0, 90.0), (10.0, 90.0)]);
        let err = rectify(
            &img,
            &Extent::new(10.0, 10.0, 1.0),
            &corners,
            &Point2D::new(50.0, 50.0),
        )
        .unwrap_err();
        assert!(matches!(err, RectifyError::OutOfBounds { index: 1, .. }));
    }

    #[test]
    fn test_bounds_checked_before_geometry() {
        // Collinear and out of frame: bounds failure wins.
        let img = pattern(100, 100);
        let corners = pts([(0.0, 0.0), (10.0, 0.0), (200.0, 0.0), (0.0, 10.0)]);
        let err = rectify(
            &img,
            &Extent::new(10.0, 10.0, 1.0),
            &corners,
            &Point2D::new(5.0, 5.0),
        )
        .unwrap_err();
        assert!(matches!(err, RectifyError::OutOfBounds { .. }));
    }

    #[test]
    fn test_invalid_extent_rejected() {
        let img = pattern(200, 200);
        let err = rectify(
            &img,
            &Extent::new(200.0, 100.0, 0.0),
            &oblique(),
            &Point2D::new(100.0, 90.0),
        )
        .unwrap_err();
        assert!(matches!(err, RectifyError::InvalidExtent { .. }));
    }

    #[test]
    fn test_oversized_output_rejected() {
        let img = pattern(200, 200);
        let err = rectify(
            &img,
            &Extent::new(100_000.0, 100_000.0, 1.0),
            &oblique(),
            &Point2D::new(100.0, 90.0),
        )
        .unwrap_err();
        assert!(matches!(err, RectifyError::OutputTooLarge { .. }));
    }

    #[test]
    fn test_aspect_ratio_follows_extent() {
        let img = pattern(200, 200);
        let quads = [
            oblique(),
            pts([(0.0, 0.0), (50.0, 0.0), (50.0, 190.0), (0.0, 190.0)]),
            pts([(80.0, 20.0), (120.0, 20.0), (199.0, 199.0), (1.0, 199.0)]),
        ];
        for corners in quads {
            let center = CornerSet::new(corners).unwrap().projective_center();
            let result = rectify(&img, &Extent::new(200.0, 100.0, 1.0), &corners, &center).unwrap();
            assert_eq!(result.dimensions(), (200, 100));
        }
    }

    #[test]
    fn test_projective_center_keeps_corners_at_output_corners() {
        let mut img = RgbaImage::from_pixel(200, 200, Rgba([0, 0, 255, 255]));
        let corners = oblique();
        // Paint the neighborhood of the top-left corner red.
        for y in 25..36 {
            for x in 35..46 {
                img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }

        let center = CornerSet::new(corners).unwrap().projective_center();
        let result = rectify(&img, &Extent::new(60.0, 40.0, 1.0), &corners, &center).unwrap();
        assert_eq!(*result.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*result.get_pixel(59, 39), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_recentering_translates_output() {
        let img = pattern(200, 200);
        let corners = oblique();
        let extent = Extent::new(80.0, 60.0, 1.0);

        let h = Homography::from_correspondences(&corners, &extent.rectangle()).unwrap();
        let inv = h.inverse().unwrap();
        let center_a = inv.map(&Point2D::new(40.0, 30.0));
        // Ten units to the right in the rectified plane.
        let center_b = inv.map(&Point2D::new(50.0, 30.0));

        let a = rectify(&img, &extent, &corners, &center_a).unwrap();
        let b = rectify(&img, &extent, &corners, &center_b).unwrap();
        assert_ne!(a, b);

        let mut max_diff = 0;
        for y in 0..60 {
            for x in 0..70 {
                let pa = a.get_pixel(x + 10, y);
                let pb = b.get_pixel(x, y);
                for c in 0..4 {
                    max_diff = max_diff.max((pa[c] as i32 - pb[c] as i32).abs());
                }
            }
        }
        assert!(max_diff <= 1, "max channel difference {max_diff}");
    }

    #[test]
    fn test_fill_outside_source() {
        let img = pattern(100, 100);
        let corners = pts([(0.0, 0.0), (50.0, 0.0), (50.0, 50.0), (0.0, 50.0)]);
        // Center on the top-left corner pulls the window up and to the left of the frame.
        let options = RectifyOptions {
            fill: Rgba([10, 20, 30, 40]),
            ..Default::default()
        };
        let result = rectify_with(
            &img,
            &Extent::new(50.0, 50.0, 1.0),
            &corners,
            &Point2D::new(0.0, 0.0),
            &options,
        )
        .unwrap();

        assert_eq!(*result.get_pixel(0, 0), Rgba([10, 20, 30, 40]));
        assert_eq!(*result.get_pixel(24, 24), Rgba([10, 20, 30, 40]));
        assert_eq!(*result.get_pixel(49, 49), *img.get_pixel(24, 24));
    }

    /// Trapezoid whose side edges meet at (100, 37.5), so the horizon is y = 37.5.
    fn steep() -> [Point2D; 4] {
        pts([(90.0, 50.0), (110.0, 50.0), (190.0, 150.0), (10.0, 150.0)])
    }

    #[test]
    fn test_fill_beyond_horizon() {
        let img = pattern(200, 200);
        let corners = steep();
        let extent = Extent::new(100.0, 100.0, 1.0);
        let center = Point2D::new(100.0, 180.0);
        let fill = Rgba([1, 2, 3, 4]);
        let options = RectifyOptions {
            fill,
            ..Default::default()
        };

        let result = rectify_with(&img, &extent, &corners, &center, &options).unwrap();

        // Classify output pixels with the unsigned inverse: rectangle points whose
        // w has the opposite sign to the rectangle center lie beyond the horizon.
        let h = Homography::from_correspondences(&corners, &extent.rectangle()).unwrap();
        let inv = h.inverse().unwrap();
        let offset = h.map(&center) - extent.center();
        let reference = inv.homogeneous(&extent.center()).z;

        let mut behind = 0;
        for (x, y, pixel) in result.enumerate_pixels() {
            let rect = Point2D::new(x as f64 + 0.5 + offset.x, y as f64 + 0.5 + offset.y);
            if inv.homogeneous(&rect).z * reference <= 0.0 {
                behind += 1;
                assert_eq!(*pixel, fill, "({x}, {y})");
            }
        }
        assert!(behind > 0);
        assert_eq!(*result.get_pixel(0, 97), fill);
        // The quadrilateral itself is still sampled.
        assert_ne!(*result.get_pixel(50, 20), fill);
    }

    #[test]
    fn test_center_beyond_horizon_rejected() {
        let img = pattern(200, 200);
        let err = rectify(
            &img,
            &Extent::new(100.0, 100.0, 1.0),
            &steep(),
            &Point2D::new(100.0, 10.0),
        )
        .unwrap_err();
        assert!(matches!(err, RectifyError::InvalidGeometry { .. }));
    }

    #[test]
    fn test_origin_on_horizon() {
        // Horizon y = 0 passes through the image origin.
        let img = pattern(200, 200);
        let corners = pts([(80.0, 20.0), (120.0, 20.0), (200.0, 100.0), (0.0, 100.0)]);
        let center = CornerSet::new(corners).unwrap().projective_center();
        let result = rectify(&img, &Extent::new(100.0, 100.0, 1.0), &corners, &center).unwrap();

        assert_eq!(result.dimensions(), (100, 100));
        assert!(result.pixels().all(|p| p[3] == 255));
    }

    fn render_with_threads(threads: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = pattern(200, 200);
        let options = RectifyOptions {
            interpolation: Interpolation::Bicubic,
            ..Default::default()
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;
        let result = pool.install(|| {
            rectify_with(
                &img,
                &Extent::new(0.3, 0.2, 500.0),
                &oblique(),
                &Point2D::new(100.0, 90.0),
                &options,
            )
        })?;
        Ok(result.into_raw())
    }

    #[test]
    fn test_independent_of_thread_count() -> Result<(), Box<dyn std::error::Error>> {
        let single = render_with_threads(1)?;
        assert_eq!(single, render_with_threads(4)?);
        assert_eq!(single, render_with_threads(7)?);
        Ok(())
    }

    #[test]
    fn test_deterministic() {
        let img = pattern(200, 200);
        let corners = oblique();
        let extent = Extent::new(0.3, 0.2, 500.0);
        let center = Point2D::new(100.0, 90.0);
        let options = RectifyOptions {
            interpolation: Interpolation::Bicubic,
            ..Default::default()
        };

        let first = rectify_with(&img, &extent, &corners, &center, &options).unwrap();
        for _ in 0..3 {
            let again = rectify_with(&img, &extent, &corners, &center, &options).unwrap();
            assert_eq!(first.as_raw(), again.as_raw());
        }
    }
}
