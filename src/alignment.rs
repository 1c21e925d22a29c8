//! Robust estimation of the relative motion between two frames.

use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{MotionModel, StitchConfig};
use crate::error::{Result, StitchError};
use crate::features::{Correspondence, KeypointSet};

/// A matched point seen in the anchor frame and in the frame being aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    pub anchor: na::Point2<f64>,
    pub moving: na::Point2<f64>,
}

/// Motion model fitted by the robust estimator, mapping moving-frame points
/// into anchor-frame coordinates.
pub trait MotionEstimator {
    fn min_samples(&self) -> usize;
    fn fit(&self, pairs: &[PointPair]) -> Option<na::Similarity2<f64>>;

    fn residual(&self, model: &na::Similarity2<f64>, pair: &PointPair) -> f64 {
        (model.transform_point(&pair.moving) - pair.anchor).norm()
    }
}

pub struct TranslationEstimator;

impl MotionEstimator for TranslationEstimator {
    fn min_samples(&self) -> usize {
        1
    }

    fn fit(&self, pairs: &[PointPair]) -> Option<na::Similarity2<f64>> {
        if pairs.is_empty() {
            return None;
        }
        let sum = pairs
            .iter()
            .fold(na::Vector2::zeros(), |acc, p| acc + (p.anchor - p.moving));
        let t = sum / pairs.len() as f64;
        Some(na::Similarity2::new(t, 0.0, 1.0))
    }
}

pub struct SimilarityEstimator;

impl MotionEstimator for SimilarityEstimator {
    fn min_samples(&self) -> usize {
        2
    }

    /// Closed-form least squares over complex coordinates: `p = a q + t`.
    fn fit(&self, pairs: &[PointPair]) -> Option<na::Similarity2<f64>> {
        if pairs.len() < 2 {
            return None;
        }
        let n = pairs.len() as f64;
        let p_mean = pairs.iter().fold(na::Vector2::zeros(), |acc, p| acc + p.anchor.coords) / n;
        let q_mean = pairs.iter().fold(na::Vector2::zeros(), |acc, p| acc + p.moving.coords) / n;

        let (mut re, mut im, mut norm) = (0.0, 0.0, 0.0);
        for pair in pairs {
            let p = pair.anchor.coords - p_mean;
            let q = pair.moving.coords - q_mean;
            re += q.x * p.x + q.y * p.y;
            im += q.x * p.y - q.y * p.x;
            norm += q.norm_squared();
        }
        if norm < 1e-9 {
            return None;
        }
        let (re, im) = (re / norm, im / norm);
        let scale = (re * re + im * im).sqrt();
        if !scale.is_finite() || scale < 1e-6 {
            return None;
        }
        let angle = im.atan2(re);
        let rotated = na::Rotation2::new(angle) * q_mean * scale;
        Some(na::Similarity2::new(p_mean - rotated, angle, scale))
    }
}

/// Result of aligning one frame against an anchor frame.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Maps the moving frame into the anchor frame.
    pub transform: na::Similarity2<f64>,
    pub inlier_ratio: f64,
    pub inliers: usize,
    pub matches: usize,
}

pub fn point_pairs(
    anchor: &KeypointSet,
    moving: &KeypointSet,
    matches: &[Correspondence],
) -> Vec<PointPair> {
    matches
        .iter()
        .map(|m| {
            let a = anchor.keypoints[m.query].location;
            let b = moving.keypoints[m.train].location;
            PointPair {
                anchor: na::Point2::new(a.x as f64, a.y as f64),
                moving: na::Point2::new(b.x as f64, b.y as f64),
            }
        })
        .collect()
}

fn estimator_for(model: MotionModel) -> Box<dyn MotionEstimator> {
    match model {
        MotionModel::Translation => Box::new(TranslationEstimator),
        MotionModel::Similarity => Box::new(SimilarityEstimator),
    }
}

fn score(
    estimator: &dyn MotionEstimator,
    model: &na::Similarity2<f64>,
    pairs: &[PointPair],
    threshold: f64,
) -> (usize, f64) {
    pairs.iter().fold((0, 0.0), |(count, err), pair| {
        let r = estimator.residual(model, pair);
        if r <= threshold {
            (count + 1, err + r)
        } else {
            (count, err)
        }
    })
}

/// Random-sample consensus fit of `pairs`, refined over the winning inliers.
///
/// `pair` only labels errors and seeds the sampler, so runs are reproducible.
pub fn estimate(
    pairs: &[PointPair],
    config: &StitchConfig,
    pair: (usize, usize),
) -> Result<Alignment> {
    let estimator = estimator_for(config.motion_model);
    let k = estimator.min_samples();
    let failed = |inlier_ratio: f64| StitchError::AlignmentFailed {
        pair,
        inlier_ratio,
        required: config.min_inlier_ratio,
    };
    if pairs.len() < k {
        return Err(failed(0.0));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(
        config.ransac_seed ^ (((pair.0 as u64) << 32) | pair.1 as u64),
    );
    let exhaustive = k == 1 && pairs.len() <= config.ransac_iterations;
    let iterations = if exhaustive {
        pairs.len()
    } else {
        config.ransac_iterations
    };

    let mut best: Option<(na::Similarity2<f64>, usize, f64)> = None;
    for it in 0..iterations {
        let sample: Vec<PointPair> = if exhaustive {
            vec![pairs[it]]
        } else {
            rand::seq::index::sample(&mut rng, pairs.len(), k)
                .iter()
                .map(|i| pairs[i])
                .collect()
        };
        let Some(model) = estimator.fit(&sample) else {
            continue;
        };
        let (count, err) = score(estimator.as_ref(), &model, pairs, config.inlier_threshold);
        let better = match &best {
            None => true,
            Some((_, best_count, best_err)) => {
                count > *best_count || (count == *best_count && err < *best_err)
            }
        };
        if better {
            best = Some((model, count, err));
            if count == pairs.len() && !exhaustive {
                break;
            }
        }
    }

    let Some((model, count, _)) = best else {
        return Err(failed(0.0));
    };
    let inlier_pairs: Vec<PointPair> = pairs
        .iter()
        .filter(|p| estimator.residual(&model, p) <= config.inlier_threshold)
        .copied()
        .collect();
    let (transform, inliers) = match estimator.fit(&inlier_pairs) {
        Some(refined) => {
            let (refined_count, _) =
                score(estimator.as_ref(), &refined, pairs, config.inlier_threshold);
            if refined_count >= count {
                (refined, refined_count)
            } else {
                (model, count)
            }
        }
        None => (model, count),
    };

    let inlier_ratio = inliers as f64 / pairs.len() as f64;
    log::debug!(
        "frames {:?}: offset ({:.2}, {:.2}), {} / {} inliers",
        pair,
        transform.isometry.translation.vector.x,
        transform.isometry.translation.vector.y,
        inliers,
        pairs.len()
    );
    if inlier_ratio < config.min_inlier_ratio {
        return Err(failed(inlier_ratio));
    }
    Ok(Alignment {
        transform,
        inlier_ratio,
        inliers,
        matches: pairs.len(),
    })
}

/// Estimates the transform mapping `moving` into `anchor` from their matches.
pub fn estimate_alignment(
    anchor: &KeypointSet,
    moving: &KeypointSet,
    matches: &[Correspondence],
    config: &StitchConfig,
) -> Result<Alignment> {
    let pairs = point_pairs(anchor, moving, matches);
    estimate(&pairs, config, (anchor.frame_index, moving.frame_index))
}
