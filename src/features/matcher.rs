use rayon::prelude::*;

use super::{Correspondence, Descriptor, KeypointSet};
use crate::config::StitchConfig;
use crate::error::{Result, StitchError};

/// Index and distance of the nearest and second-nearest descriptor in `train`.
fn two_nearest(q: &Descriptor, train: &KeypointSet) -> Option<((usize, u32), Option<u32>)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second: Option<u32> = None;
    for (idx, kp) in train.keypoints.iter().enumerate() {
        let d = q.hamming_distance(&kp.descriptor);
        match best {
            None => best = Some((idx, d)),
            Some((_, best_d)) if d < best_d => {
                second = Some(best_d);
                best = Some((idx, d));
            }
            Some(_) => {
                if second.is_none_or(|s| d < s) {
                    second = Some(d);
                }
            }
        }
    }
    best.map(|b| (b, second))
}

fn nearest(q: &Descriptor, set: &KeypointSet) -> Option<usize> {
    set.keypoints
        .iter()
        .enumerate()
        .min_by_key(|(_, kp)| q.hamming_distance(&kp.descriptor))
        .map(|(idx, _)| idx)
}

/// Brute-force Hamming matching with the ratio test and optional cross-check.
pub fn match_keypoints(
    query: &KeypointSet,
    train: &KeypointSet,
    ratio_threshold: f32,
    cross_check: bool,
) -> Vec<Correspondence> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }
    let reverse: Vec<Option<usize>> = if cross_check {
        train
            .keypoints
            .par_iter()
            .map(|kp| nearest(&kp.descriptor, query))
            .collect()
    } else {
        Vec::new()
    };

    query
        .keypoints
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, kp)| {
            let ((train_idx, distance), second) = two_nearest(&kp.descriptor, train)?;
            let ratio = match second {
                Some(0) => return None,
                Some(s) => distance as f32 / s as f32,
                None => 0.0,
            };
            if second.is_some() && ratio >= ratio_threshold {
                return None;
            }
            if cross_check && reverse[train_idx] != Some(query_idx) {
                return None;
            }
            Some(Correspondence {
                query: query_idx,
                train: train_idx,
                distance,
                ratio,
            })
        })
        .collect()
}

/// Matches two frames, failing with `InsufficientOverlap` below `min_match_num`.
pub fn match_pair(
    query: &KeypointSet,
    train: &KeypointSet,
    config: &StitchConfig,
) -> Result<Vec<Correspondence>> {
    let matches = match_keypoints(query, train, config.ratio_threshold, config.cross_check);
    log::debug!(
        "frames ({}, {}): {} good matches from {}x{} keypoints",
        query.frame_index,
        train.frame_index,
        matches.len(),
        query.len(),
        train.len()
    );
    if matches.len() < config.min_match_num {
        return Err(StitchError::InsufficientOverlap {
            pair: (query.frame_index, train.frame_index),
            found: matches.len(),
            required: config.min_match_num,
        });
    }
    Ok(matches)
}
