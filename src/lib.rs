pub mod alignment;
pub mod compositor;
pub mod config;
pub mod error;
pub mod features;
pub mod frame;
pub mod io;
pub mod pipeline;
pub mod placement;
pub mod projection;
pub mod source;
pub mod synthetic;
pub mod visualization;

pub use compositor::Panorama;
pub use config::{BlendMode, MotionModel, OverlapPolicy, StitchConfig};
pub use error::{Result, StitchError};
pub use frame::Frame;
pub use pipeline::{
    CancelToken, StitchHandle, StitchOutput, StitchSummary, spawn_stitch, stitch_frames,
    stitch_video,
};
pub use placement::{Placement, PlacementIndex, PlacementStatus, Rect};
