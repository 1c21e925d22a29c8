//! The driving stitch call: decode, project, detect, align, composite.
//!
//! Projection and detection run across the rayon pool; alignment walks the
//! frames in order. A [`CancelToken`] is checked between frames in every stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alignment::estimate_alignment;
use crate::compositor::{Compositor, FrameMotion, Panorama};
use crate::config::{OverlapPolicy, StitchConfig};
use crate::error::{Result, StitchError};
use crate::features::{KeypointSet, OrbDetector, match_pair};
use crate::frame::Frame;
use crate::placement::PlacementStatus;
use crate::projection::CylindricalProjector;
use crate::source::FrameSource;

/// Shared flag for cooperative cancellation of a running stitch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`CancelToken::cancel`] has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StitchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchSummary {
    pub frames: usize,
    pub aligned: usize,
    pub estimated: usize,
    pub skipped: usize,
}

impl StitchSummary {
    fn from_motions(motions: &[FrameMotion]) -> StitchSummary {
        let count = |status| motions.iter().filter(|m| m.status == status).count();
        StitchSummary {
            frames: motions.len(),
            aligned: count(PlacementStatus::Aligned),
            estimated: count(PlacementStatus::Estimated),
            skipped: count(PlacementStatus::Skipped),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StitchOutput {
    pub panorama: Panorama,
    pub frame_rate: f64,
    pub summary: StitchSummary,
}

fn progress_bar(len: usize, config: &StitchConfig, stage: &str) -> ProgressBar {
    if !config.show_progress {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        bar.set_style(style);
    }
    bar.set_message(stage.to_string());
    bar
}

/// Stitches the video (or frame directory, or gif) at `path`.
pub fn stitch_video(
    path: impl AsRef<Path>,
    config: &StitchConfig,
    cancel: &CancelToken,
) -> Result<StitchOutput> {
    config.validate()?;
    cancel.check()?;
    let source = FrameSource::open(path.as_ref(), config.max_frames, config.fallback_frame_rate)?;
    stitch_source(source, config, cancel)
}

/// Drains an opened source, then stitches what it produced.
pub fn stitch_source(
    source: FrameSource,
    config: &StitchConfig,
    cancel: &CancelToken,
) -> Result<StitchOutput> {
    let frame_rate = source.frame_rate();
    let mut frames = Vec::new();
    for frame in source {
        cancel.check()?;
        frames.push(frame?);
    }
    log::info!("decoded {} frames at {:.2} fps", frames.len(), frame_rate);
    stitch_frames(frames, frame_rate, config, cancel)
}

/// Stitches already decoded frames, in order.
pub fn stitch_frames<I>(
    frames: I,
    frame_rate: f64,
    config: &StitchConfig,
    cancel: &CancelToken,
) -> Result<StitchOutput>
where
    I: IntoIterator<Item = Frame>,
{
    config.validate()?;
    let frames: Vec<Frame> = frames.into_iter().collect();
    if frames.is_empty() {
        return Err(StitchError::StitchFailed("no frames to stitch".to_string()));
    }
    cancel.check()?;

    let projector = CylindricalProjector::from_config(config);
    let detector = OrbDetector::new(config.max_match_num);
    let bar = progress_bar(frames.len(), config, "projecting");
    let processed: Vec<(Frame, KeypointSet)> = frames
        .into_par_iter()
        .progress_with(bar.clone())
        .map(|frame| {
            cancel.check()?;
            let projected = projector.project(frame);
            let keypoints = detector.detect_and_compute(&projected);
            Ok((projected, keypoints))
        })
        .collect::<Result<_>>()?;
    bar.finish_and_clear();
    let (frames, keypoints): (Vec<Frame>, Vec<KeypointSet>) = processed.into_iter().unzip();
    log::info!(
        "projected {} frames at f = {:.1} px",
        frames.len(),
        projector.effective_focal_length()
    );

    let motions = align_sequence(&keypoints, config, cancel)?;
    drop(keypoints);
    let summary = StitchSummary::from_motions(&motions);
    log::info!(
        "aligned {}, estimated {}, skipped {} of {} frames",
        summary.aligned,
        summary.estimated,
        summary.skipped,
        summary.frames
    );

    let panorama = Compositor::from_config(config).compose(frames, &motions, frame_rate, cancel)?;
    Ok(StitchOutput {
        panorama,
        frame_rate,
        summary,
    })
}

/// Relative motion of every frame against its predecessor.
///
/// Each frame is aligned against up to `match_window` earlier, non-skipped
/// frames, nearest first. When none aligns the previous motion is carried
/// forward; if there is no previous motion yet the stitch fails.
pub fn align_sequence(
    keypoints: &[KeypointSet],
    config: &StitchConfig,
    cancel: &CancelToken,
) -> Result<Vec<FrameMotion>> {
    let mut motions: Vec<FrameMotion> = Vec::with_capacity(keypoints.len());
    let mut cumulative: Vec<na::Similarity2<f64>> = Vec::with_capacity(keypoints.len());
    if keypoints.is_empty() {
        return Ok(motions);
    }
    motions.push(FrameMotion::origin());
    cumulative.push(na::Similarity2::identity());
    let mut velocity: Option<na::Similarity2<f64>> = None;

    for i in 1..keypoints.len() {
        cancel.check()?;
        let mut placed = None;
        for j in (i.saturating_sub(config.match_window)..i).rev() {
            if motions[j].status == PlacementStatus::Skipped {
                continue;
            }
            let result = match_pair(&keypoints[j], &keypoints[i], config).and_then(|matches| {
                estimate_alignment(&keypoints[j], &keypoints[i], &matches, config)
            });
            match result {
                Ok(alignment) => {
                    placed = Some(cumulative[j] * alignment.transform);
                    break;
                }
                Err(e) if e.is_recoverable() => log::warn!("{}", e),
                Err(e) => return Err(e),
            }
        }

        let motion = match (placed, velocity) {
            (Some(placement), _) => {
                let relative = cumulative[i - 1].inverse() * placement;
                velocity = Some(relative);
                FrameMotion {
                    relative,
                    status: PlacementStatus::Aligned,
                }
            }
            (None, Some(previous)) => {
                let status = match config.overlap_policy {
                    OverlapPolicy::CarryForward => PlacementStatus::Estimated,
                    OverlapPolicy::Skip => PlacementStatus::Skipped,
                };
                log::warn!("frame {}: no anchor aligned, {:?} by previous motion", i, status);
                FrameMotion {
                    relative: previous,
                    status,
                }
            }
            (None, None) => {
                return Err(StitchError::StitchFailed(format!(
                    "frame {} could not be aligned and there is no earlier motion to fall back on",
                    keypoints[i].frame_index
                )));
            }
        };
        cumulative.push(cumulative[i - 1] * motion.relative);
        motions.push(motion);
    }
    Ok(motions)
}

/// A stitch running on its own thread.
pub struct StitchHandle {
    cancel: CancelToken,
    thread: JoinHandle<Result<StitchOutput>>,
}

impl StitchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the stitch and returns its result.
    pub fn join(self) -> Result<StitchOutput> {
        self.thread
            .join()
            .map_err(|_| StitchError::StitchFailed("stitch thread panicked".to_string()))?
    }
}

/// Starts [`stitch_video`] on a background thread.
pub fn spawn_stitch(path: impl Into<PathBuf>, config: StitchConfig) -> Result<StitchHandle> {
    let path = path.into();
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let thread = thread::Builder::new()
        .name("stitch".to_string())
        .spawn(move || stitch_video(&path, &config, &token))?;
    Ok(StitchHandle { cancel, thread })
}
