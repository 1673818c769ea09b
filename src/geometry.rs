use nalgebra::{Point2, Vector2};

use crate::error::RectifyError;

/// A point in source image pixel coordinates.
///
/// Pixel `(i, j)` covers `[i, i + 1) x [j, j + 1)`, so its center is at
/// `(i + 0.5, j + 0.5)`.
pub type Point2D = Point2<f64>;

/// Triangles whose area is below this fraction of the squared quadrilateral
/// diameter count as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-6;

/// Physical size of the rectified region and the resolution to render it at.
///
/// An ARKit-style plane extent `(x, ~0, z)` must be converted by the caller to
/// `Extent::new(x, z, pixels_per_unit)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// Width of the rectangle in physical units
    pub width: f64,
    /// Height of the rectangle in physical units
    pub height: f64,
    /// Output pixels per physical unit
    pub scale: f64,
}

impl Extent {
    pub fn new(width: f64, height: f64, scale: f64) -> Self {
        Self {
            width,
            height,
            scale,
        }
    }

    /// Check that every component is finite and strictly positive
    pub fn validate(&self) -> Result<(), RectifyError> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.width) && ok(self.height) && ok(self.scale) {
            Ok(())
        } else {
            Err(RectifyError::InvalidExtent {
                width: self.width,
                height: self.height,
                scale: self.scale,
            })
        }
    }

    /// Output image dimensions in pixels, never smaller than 1x1
    pub fn pixel_dimensions(&self) -> (u64, u64) {
        let w = (self.width * self.scale).round().max(1.0) as u64;
        let h = (self.height * self.scale).round().max(1.0) as u64;
        (w, h)
    }

    /// Rectangle corners in physical units, in [`CornerSet`] order
    pub fn rectangle(&self) -> [Point2D; 4] {
        [
            Point2D::new(0.0, 0.0),
            Point2D::new(self.width, 0.0),
            Point2D::new(self.width, self.height),
            Point2D::new(0.0, self.height),
        ]
    }

    /// Center of the rectangle in physical units
    pub fn center(&self) -> Point2D {
        Point2D::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Fail with [`RectifyError::OutOfBounds`] on the first corner that lies
/// outside `[0, width] x [0, height]`. Non-finite coordinates are out of
/// bounds as well.
pub fn check_bounds(points: &[Point2D; 4], width: u32, height: u32) -> Result<(), RectifyError> {
    let (w, h) = (width as f64, height as f64);
    for (index, p) in points.iter().enumerate() {
        let inside = p.x >= 0.0 && p.x <= w && p.y >= 0.0 && p.y <= h;
        if !inside {
            return Err(RectifyError::OutOfBounds {
                index,
                x: p.x,
                y: p.y,
                width,
                height,
            });
        }
    }
    Ok(())
}

/// Four corners of a planar quadrilateral, ordered top-left, top-right,
/// bottom-right, bottom-left.
///
/// With y pointing down this is a clockwise winding. Construction rejects
/// non-finite points, collinear triples, non-convex or self-intersecting
/// shapes and the reversed winding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerSet {
    points: [Point2D; 4],
}

impl CornerSet {
    pub fn new(points: [Point2D; 4]) -> Result<Self, RectifyError> {
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(RectifyError::geometry("corner coordinates must be finite"));
        }

        let diameter_sq = points
            .iter()
            .flat_map(|a| points.iter().map(move |b| (*a - *b).norm_squared()))
            .fold(0.0, f64::max);
        if diameter_sq == 0.0 {
            return Err(RectifyError::geometry("all corners coincide"));
        }

        // Every 3-subset of 4 points leaves exactly one index out.
        let min_area = COLLINEAR_TOLERANCE * diameter_sq;
        for skip in 0..4 {
            let [a, b, c] = others(skip).map(|i| points[i]);
            if triangle_area(&a, &b, &c) < min_area {
                return Err(RectifyError::geometry(format!(
                    "corners {:?} are collinear",
                    others(skip)
                )));
            }
        }

        let turns: Vec<f64> = (0..4)
            .map(|i| {
                let e0 = points[(i + 1) % 4] - points[i];
                let e1 = points[(i + 2) % 4] - points[(i + 1) % 4];
                cross(&e0, &e1)
            })
            .collect();

        if turns.iter().all(|&t| t < 0.0) {
            return Err(RectifyError::geometry(
                "corners are wound counter-clockwise, expected top-left, top-right, bottom-right, bottom-left",
            ));
        }
        if !turns.iter().all(|&t| t > 0.0) {
            return Err(RectifyError::geometry(
                "quadrilateral is not convex or its edges cross",
            ));
        }

        Ok(Self { points })
    }

    /// Build from `(x, y)` tuples, validating like [`CornerSet::new`]
    pub fn from_tuples(corners: [(f64, f64); 4]) -> Result<Self, RectifyError> {
        Self::new(corners.map(|(x, y)| Point2D::new(x, y)))
    }

    pub fn points(&self) -> &[Point2D; 4] {
        &self.points
    }

    pub fn top_left(&self) -> Point2D {
        self.points[0]
    }

    pub fn top_right(&self) -> Point2D {
        self.points[1]
    }

    pub fn bottom_right(&self) -> Point2D {
        self.points[2]
    }

    pub fn bottom_left(&self) -> Point2D {
        self.points[3]
    }

    /// Area enclosed by the quadrilateral (shoelace formula)
    pub fn area(&self) -> f64 {
        let p = &self.points;
        let twice: f64 = (0..4)
            .map(|i| {
                let (a, b) = (p[i], p[(i + 1) % 4]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Intersection of the diagonals.
    ///
    /// Any homography onto a rectangle sends this point to the rectangle
    /// center, so it is the natural default re-centering target.
    pub fn projective_center(&self) -> Point2D {
        let [p0, p1, p2, p3] = self.points;
        let d0 = p2 - p0;
        let d1 = p3 - p1;
        // Convexity guarantees the diagonals cross, so the denominator is non-zero.
        let t = cross(&(p1 - p0), &d1) / cross(&d0, &d1);
        p0 + d0 * t
    }
}

fn others(skip: usize) -> [usize; 3] {
    let mut out = [0; 3];
    let mut n = 0;
    for i in (0..4).filter(|&i| i != skip) {
        out[n] = i;
        n += 1;
    }
    out
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn triangle_area(a: &Point2D, b: &Point2D, c: &Point2D) -> f64 {
    cross(&(*b - *a), &(*c - *a)).abs() / 2.0
}
