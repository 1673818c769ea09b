use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::geometry::Point2D;

const OUTLINE: Rgba<u8> = Rgba([0, 255, 0, 255]);
const TOP_LEFT: Rgba<u8> = Rgba([255, 0, 0, 255]);
const CENTER: Rgba<u8> = Rgba([255, 0, 255, 255]);

/// Draw the selected quadrilateral and center onto a copy of `image`.
///
/// The top-left corner is circled so the winding can be checked by eye.
pub fn annotate(image: &RgbaImage, corners: &[Point2D; 4], center: &Point2D) -> RgbaImage {
    let mut canvas = image.clone();

    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        draw_line_segment_mut(
            &mut canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            OUTLINE,
        );
    }

    let radius = (image.width().min(image.height()) / 100).max(3) as i32;
    let tl = corners[0];
    draw_hollow_circle_mut(
        &mut canvas,
        (tl.x.round() as i32, tl.y.round() as i32),
        radius,
        TOP_LEFT,
    );
    draw_cross_mut(
        &mut canvas,
        CENTER,
        center.x.round() as i32,
        center.y.round() as i32,
    );

    canvas
}
