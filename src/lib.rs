pub mod annotate;
pub mod cli;
pub mod error;
pub mod geometry;
pub mod homography;
pub mod rectify;
pub mod transform;

pub use annotate::annotate;
pub use cli::Cli;
pub use error::RectifyError;
pub use geometry::{CornerSet, Extent, Point2D};
pub use homography::Homography;
pub use rectify::{rectify, rectify_with, RectifyOptions, MAX_OUTPUT_PIXELS};
pub use transform::{warp_perspective, Interpolation};
