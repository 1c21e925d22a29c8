//! ORB-style detector: FAST-9 corners, intensity-centroid orientation and
//! steered BRIEF descriptors over a small image pyramid.

use glam::Vec2;
use image::GrayImage;
use image::imageops::{self, FilterType};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{Descriptor, Keypoint, KeypointSet};
use crate::frame::Frame;

/// Bresenham circle of radius 3 used by FAST.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const FAST_ARC: usize = 9;
const PATTERN_SEED: u64 = 0x0b1e_f256;

/// Sampling pairs inside a disk of radius `patch_size / 2`, identical on every call.
fn steered_brief_pattern(patch_size: u32) -> Vec<[f32; 4]> {
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    let r = (patch_size / 2) as f32;
    let mut point = move || loop {
        let x: f32 = rng.random_range(-r..=r);
        let y: f32 = rng.random_range(-r..=r);
        if x * x + y * y <= r * r {
            return (x, y);
        }
    };
    (0..256)
        .map(|_| {
            let (x1, y1) = point();
            let (x2, y2) = point();
            [x1, y1, x2, y2]
        })
        .collect()
}

/// FAST-9 score at (x, y): summed contrast of the contiguous arc, `None` if not a corner.
fn fast_score(img: &GrayImage, x: i32, y: i32, threshold: i16) -> Option<f32> {
    let p = img.get_pixel(x as u32, y as u32)[0] as i16;
    let mut class = [0i8; 16];
    let mut contrast = [0i16; 16];
    for (i, (dx, dy)) in CIRCLE.iter().enumerate() {
        let d = img.get_pixel((x + dx) as u32, (y + dy) as u32)[0] as i16 - p;
        class[i] = if d > threshold {
            1
        } else if d < -threshold {
            -1
        } else {
            0
        };
        contrast[i] = d.abs() - threshold;
    }
    for sign in [1i8, -1] {
        let mut run = 0;
        let mut longest = 0;
        for i in 0..32 {
            if class[i % 16] == sign {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        if longest >= FAST_ARC {
            let score: i32 = (0..16)
                .filter(|&i| class[i] == sign)
                .map(|i| contrast[i] as i32)
                .sum();
            return Some(score as f32);
        }
    }
    None
}

/// Angle of the intensity centroid of a disk of radius `r` around (x, y).
fn intensity_centroid_angle(img: &GrayImage, x: i32, y: i32, r: i32) -> f32 {
    let mut m01 = 0.0f64;
    let mut m10 = 0.0f64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let v = img.get_pixel((x + dx) as u32, (y + dy) as u32)[0] as f64;
            m10 += v * dx as f64;
            m01 += v * dy as f64;
        }
    }
    m01.atan2(m10) as f32
}

pub struct OrbDetector {
    n_features: usize,
    n_levels: usize,
    scale_factor: f32,
    fast_threshold: u8,
    patch_size: u32,
    blur_sigma: f32,
    pattern: Vec<[f32; 4]>,
}

impl Default for OrbDetector {
    fn default() -> Self {
        OrbDetector::new(500)
    }
}

impl OrbDetector {
    pub fn new(n_features: usize) -> OrbDetector {
        let patch_size = 31;
        OrbDetector {
            n_features,
            n_levels: 3,
            scale_factor: 1.2,
            fast_threshold: 20,
            patch_size,
            blur_sigma: 1.5,
            pattern: steered_brief_pattern(patch_size),
        }
    }

    /// Distance from the image border below which no keypoint is kept, so the
    /// descriptor never reads blurred border pixels.
    pub fn edge(&self) -> i32 {
        (self.patch_size / 2) as i32 + (3.0 * self.blur_sigma).ceil() as i32 + 1
    }

    /// Detects up to `n_features` keypoints of `frame`, strongest first.
    pub fn detect_and_compute(&self, frame: &Frame) -> KeypointSet {
        let luma = frame.to_luma();
        let mut keypoints = Vec::new();
        let mut scale = 1.0f32;
        for level in 0..self.n_levels {
            let level_img = if level == 0 {
                luma.clone()
            } else {
                let w = (luma.width() as f32 / scale).round() as u32;
                let h = (luma.height() as f32 / scale).round() as u32;
                if w == 0 || h == 0 {
                    break;
                }
                imageops::resize(&luma, w, h, FilterType::Triangle)
            };
            keypoints.extend(self.detect_level(&level_img, scale, frame));
            scale *= self.scale_factor;
        }

        keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.location.y.total_cmp(&b.location.y))
                .then(a.location.x.total_cmp(&b.location.x))
        });
        keypoints.truncate(self.n_features);
        log::trace!("frame {}: {} keypoints", frame.index, keypoints.len());
        KeypointSet {
            frame_index: frame.index,
            keypoints,
        }
    }

    fn detect_level(&self, img: &GrayImage, scale: f32, frame: &Frame) -> Vec<Keypoint> {
        let (w, h) = (img.width() as i32, img.height() as i32);
        let edge = self.edge();
        if w <= 2 * edge || h <= 2 * edge {
            return Vec::new();
        }
        let threshold = self.fast_threshold as i16;
        let mut scores = vec![0.0f32; (w * h) as usize];
        let corners: Vec<(i32, i32, f32)> = (edge..h - edge)
            .into_par_iter()
            .flat_map_iter(|y| {
                (edge..w - edge)
                    .filter_map(move |x| fast_score(img, x, y, threshold).map(|s| (x, y, s)))
            })
            .collect();
        for &(x, y, s) in &corners {
            scores[(y * w + x) as usize] = s;
        }

        let blurred = imageops::blur(img, self.blur_sigma);
        let r = (self.patch_size / 2) as i32;
        corners
            .into_iter()
            .filter(|&(x, y, s)| is_local_max(&scores, w, x, y, s))
            .filter(|&(x, y, _)| self.is_covered(frame, x as f32 * scale, y as f32 * scale, scale))
            .map(|(x, y, response)| {
                let orientation = intensity_centroid_angle(img, x, y, r);
                let descriptor = self.steered_brief(&blurred, x, y, orientation);
                Keypoint {
                    location: Vec2::new(x as f32 * scale, y as f32 * scale),
                    scale,
                    orientation,
                    response,
                    descriptor,
                }
            })
            .collect()
    }

    /// Whether the patch around a full-resolution location has source pixels.
    fn is_covered(&self, frame: &Frame, x: f32, y: f32, scale: f32) -> bool {
        let reach = self.edge() as f32 * scale;
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        [
            (0.0, 0.0),
            (-1.0, -1.0),
            (1.0, -1.0),
            (-1.0, 1.0),
            (1.0, 1.0),
        ]
        .iter()
        .all(|(sx, sy)| {
            let px = (x + sx * reach).clamp(0.0, w - 1.0) as u32;
            let py = (y + sy * reach).clamp(0.0, h - 1.0) as u32;
            frame.is_covered(px, py)
        })
    }

    fn steered_brief(&self, blurred: &GrayImage, x: i32, y: i32, angle: f32) -> Descriptor {
        let (sin_a, cos_a) = angle.sin_cos();
        let (w, h) = (blurred.width() as i32, blurred.height() as i32);
        let sample = |px: f32, py: f32| -> u8 {
            let sx = (x + (cos_a * px - sin_a * py).round() as i32).clamp(0, w - 1);
            let sy = (y + (sin_a * px + cos_a * py).round() as i32).clamp(0, h - 1);
            blurred.get_pixel(sx as u32, sy as u32)[0]
        };
        let mut bytes = [0u8; 32];
        for (bit, [x1, y1, x2, y2]) in self.pattern.iter().enumerate() {
            if sample(*x1, *y1) < sample(*x2, *y2) {
                bytes[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
        Descriptor(bytes)
    }
}

/// 3x3 non-maximum suppression; ties go to the first pixel in raster order.
fn is_local_max(scores: &[f32], w: i32, x: i32, y: i32, s: f32) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let n = scores[((y + dy) * w + (x + dx)) as usize];
            let earlier = dy < 0 || (dy == 0 && dx < 0);
            if n > s || (earlier && n == s) {
                return false;
            }
        }
    }
    true
}
