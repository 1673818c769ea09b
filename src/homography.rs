use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::error::RectifyError;
use crate::geometry::Point2D;

/// Smallest accepted ratio between the smallest and largest singular value of
/// the normalized correspondence system.
pub const MIN_CONDITION_RATIO: f64 = 1e-10;

/// Entries of `h33` below this fraction of the matrix norm count as zero.
const H33_RELATIVE_EPS: f64 = 1e-12;

/// A planar projective transform.
///
/// The matrix is scaled so that `h33 = 1`. When the source origin lies on the
/// vanishing line `h33` is zero and the matrix is scaled to unit Frobenius
/// norm instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Wrap a raw matrix, rescaling it as described on [`Homography`]
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self, RectifyError> {
        let norm = matrix.norm();
        if !norm.is_finite() || norm == 0.0 {
            return Err(RectifyError::geometry(
                "homography has non-finite or zero entries",
            ));
        }
        let h33 = matrix[(2, 2)];
        let matrix = if h33.abs() > H33_RELATIVE_EPS * norm {
            matrix / h33
        } else {
            matrix / norm
        };
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(RectifyError::geometry("homography has non-finite entries"));
        }
        Ok(Self { matrix })
    }

    /// Solve for the homography sending each `src[i]` to `dst[i]`.
    ///
    /// Both point sets are normalized (centroid at the origin, mean distance
    /// sqrt(2)) before building the 8x8 system, which is solved by SVD. A
    /// system whose condition ratio drops below [`MIN_CONDITION_RATIO`] is
    /// rejected instead of producing unbounded coefficients.
    pub fn from_correspondences(
        src: &[Point2D; 4],
        dst: &[Point2D; 4],
    ) -> Result<Self, RectifyError> {
        let t_src = normalization(src)?;
        let t_dst = normalization(dst)?;

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for i in 0..4 {
            let (x, y) = transform_point(&t_src, src[i].x, src[i].y);
            let (u, v) = transform_point(&t_dst, dst[i].x, dst[i].y);

            let r = 2 * i;
            a.row_mut(r)
                .copy_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]);
            a.row_mut(r + 1)
                .copy_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]);
            b[r] = u;
            b[r + 1] = v;
        }

        let svd = a.svd(true, true);
        let max_sv = svd.singular_values.max();
        let min_sv = svd.singular_values.min();
        if !(max_sv > 0.0) || min_sv / max_sv < MIN_CONDITION_RATIO {
            return Err(RectifyError::geometry(format!(
                "correspondence system is near-singular (condition ratio {:.3e})",
                if max_sv > 0.0 { min_sv / max_sv } else { 0.0 }
            )));
        }

        let h = svd
            .solve(&b, f64::EPSILON)
            .map_err(|e| RectifyError::geometry(format!("homography solve failed: {e}")))?;

        #[rustfmt::skip]
        let normalized = Matrix3::new(
            h[0], h[1], h[2],
            h[3], h[4], h[5],
            h[6], h[7], 1.0,
        );

        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or_else(|| RectifyError::geometry("destination normalization is singular"))?;

        let homography = Self::from_matrix(t_dst_inv * normalized * t_src)?;
        let det = homography.matrix.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(RectifyError::geometry("homography is singular"));
        }
        Ok(homography)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> Result<Self, RectifyError> {
        let inv = self
            .matrix
            .try_inverse()
            .ok_or_else(|| RectifyError::geometry("homography is not invertible"))?;
        Self::from_matrix(inv)
    }

    /// Homogeneous image of `p`, before the perspective divide
    pub fn homogeneous(&self, p: &Point2D) -> Vector3<f64> {
        self.matrix * Vector3::new(p.x, p.y, 1.0)
    }

    /// Map a point through the homography
    pub fn map(&self, p: &Point2D) -> Point2D {
        let (x, y) = transform_point(&self.matrix, p.x, p.y);
        Point2D::new(x, y)
    }
}

/// Transform a point with a 3x3 matrix in homogeneous coordinates
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = Vector3::new(x, y, 1.0);
    let result = matrix * p;
    (result.x / result.z, result.y / result.z)
}

/// Like [`transform_point`], but `None` when the homogeneous `w` is not
/// positive, i.e. the point lies on or beyond the vanishing line.
pub fn project_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let result = matrix * Vector3::new(x, y, 1.0);
    (result.z > 0.0).then(|| (result.x / result.z, result.y / result.z))
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2)
fn normalization(points: &[Point2D; 4]) -> Result<Matrix3<f64>, RectifyError> {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;

    if !(mean_dist > 0.0) || !mean_dist.is_finite() {
        return Err(RectifyError::geometry("points have no spatial spread"));
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    #[rustfmt::skip]
    let t = Matrix3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    );
    Ok(t)
}
