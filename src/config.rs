use serde::{Deserialize, Serialize};

use crate::error::{Result, StitchError};

/// Relative motion estimated between adjacent frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionModel {
    /// Pure 2-D translation, the expected motion after cylindrical projection.
    Translation,
    /// Translation plus residual rotation and scale.
    Similarity,
}

/// What happens to a frame no anchor could be aligned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Reuse the previous relative motion and blend the frame as usual.
    CarryForward,
    /// Place the frame by the previous motion for the index but leave it out of the canvas.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    LastWins,
    Feather,
}

/// Immutable parameters of one stitch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub max_frames: usize,
    pub focal_length: f64,
    pub resize_factor: f64,
    pub min_match_num: usize,
    pub max_match_num: usize,
    pub ratio_threshold: f32,
    pub cross_check: bool,
    pub match_window: usize,
    pub motion_model: MotionModel,
    pub ransac_iterations: usize,
    pub inlier_threshold: f64,
    pub min_inlier_ratio: f64,
    pub ransac_seed: u64,
    pub overlap_policy: OverlapPolicy,
    pub blend_mode: BlendMode,
    pub max_canvas_area: u64,
    pub min_canvas_scale: f64,
    pub fallback_frame_rate: f64,
    pub show_progress: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_frames: 50,
            focal_length: 3200.0,
            resize_factor: 1.0,
            min_match_num: 40,
            max_match_num: 100,
            ratio_threshold: 0.75,
            cross_check: true,
            match_window: 2,
            motion_model: MotionModel::Translation,
            ransac_iterations: 500,
            inlier_threshold: 3.0,
            min_inlier_ratio: 0.5,
            ransac_seed: 0x5eed_cafe,
            overlap_policy: OverlapPolicy::CarryForward,
            blend_mode: BlendMode::Feather,
            max_canvas_area: 50_000_000,
            min_canvas_scale: 0.1,
            fallback_frame_rate: 30.0,
            show_progress: false,
        }
    }
}

impl StitchConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(StitchError::InvalidConfig(msg.to_string()));
        if self.max_frames == 0 {
            return invalid("max_frames must be at least 1");
        }
        if !(self.focal_length.is_finite() && self.focal_length > 0.0) {
            return invalid("focal_length must be a positive number of pixels");
        }
        if !(self.resize_factor > 0.0 && self.resize_factor <= 1.0) {
            return invalid("resize_factor must lie in (0, 1]");
        }
        if self.min_match_num == 0 || self.min_match_num > self.max_match_num {
            return invalid("min_match_num must be in 1..=max_match_num");
        }
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return invalid("ratio_threshold must lie in (0, 1]");
        }
        if self.match_window == 0 {
            return invalid("match_window must be at least 1");
        }
        if self.ransac_iterations == 0 {
            return invalid("ransac_iterations must be at least 1");
        }
        if !(self.inlier_threshold > 0.0) {
            return invalid("inlier_threshold must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_inlier_ratio) {
            return invalid("min_inlier_ratio must lie in [0, 1]");
        }
        if self.max_canvas_area == 0 {
            return invalid("max_canvas_area must be positive");
        }
        if !(self.min_canvas_scale > 0.0 && self.min_canvas_scale <= 1.0) {
            return invalid("min_canvas_scale must lie in (0, 1]");
        }
        if !(self.fallback_frame_rate.is_finite() && self.fallback_frame_rate > 0.0) {
            return invalid("fallback_frame_rate must be positive");
        }
        Ok(())
    }
}
