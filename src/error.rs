/// Errors returned by [`crate::rectify`] and the geometry constructors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RectifyError {
    /// The corners do not describe a usable quadrilateral.
    #[error("Invalid corner geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// A corner lies outside the source image.
    #[error("Corner {index} at ({x:.2}, {y:.2}) is outside the {width}x{height} image")]
    OutOfBounds {
        index: usize,
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },

    /// Extent components must be finite and positive.
    #[error("Invalid extent ({width}, {height}, {scale}): components must be finite and positive")]
    InvalidExtent { width: f64, height: f64, scale: f64 },

    /// The output image would be unreasonably large.
    #[error("Output of {width}x{height} pixels exceeds the size limit")]
    OutputTooLarge { width: u64, height: u64 },
}

impl RectifyError {
    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }
}
