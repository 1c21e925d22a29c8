use thiserror::Error;

pub type Result<T> = std::result::Result<T, StitchError>;

/// Failure kinds of a stitch run.
///
/// `InsufficientOverlap` and `AlignmentFailed` are per-pair and are handled
/// inside the pipeline; everything else reaches the caller.
#[derive(Debug, Error)]
pub enum StitchError {
    #[error("unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("frames {pair:?}: {found} good matches, {required} required")]
    InsufficientOverlap {
        pair: (usize, usize),
        found: usize,
        required: usize,
    },

    #[error("frames {pair:?}: inlier ratio {inlier_ratio:.3} below {required:.3}")]
    AlignmentFailed {
        pair: (usize, usize),
        inlier_ratio: f64,
        required: f64,
    },

    #[error("stitch failed: {0}")]
    StitchFailed(String),

    #[error("canvas {width}x{height} exceeds {max_area} px even at the minimum scale")]
    CanvasTooLarge {
        width: u64,
        height: u64,
        max_area: u64,
    },

    #[error("stitch cancelled")]
    Cancelled,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StitchError {
    /// Per-pair failures the pipeline recovers from by gap or fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StitchError::InsufficientOverlap { .. } | StitchError::AlignmentFailed { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StitchError::Cancelled)
    }
}
