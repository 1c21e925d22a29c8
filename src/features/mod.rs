//! Keypoint detection and descriptor matching between frames.

pub mod matcher;
pub mod orb;

use glam::Vec2;

pub use matcher::{match_keypoints, match_pair};
pub use orb::OrbDetector;

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor(pub [u8; 32]);

impl Descriptor {
    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.0
            .chunks_exact(8)
            .zip(other.0.chunks_exact(8))
            .map(|(a, b)| {
                let a = u64::from_le_bytes([a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]]);
                let b = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                (a ^ b).count_ones()
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    /// Position in full-resolution frame pixels.
    pub location: Vec2,
    /// Pyramid scale the keypoint was found at (1.0 = full resolution).
    pub scale: f32,
    /// Orientation in radians.
    pub orientation: f32,
    pub response: f32,
    pub descriptor: Descriptor,
}

/// Keypoints of one frame, strongest first.
#[derive(Debug, Clone)]
pub struct KeypointSet {
    pub frame_index: usize,
    pub keypoints: Vec<Keypoint>,
}

impl KeypointSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A match between keypoint `query` of one frame and keypoint `train` of another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
    /// Best to second-best distance ratio; lower is more distinctive.
    pub ratio: f32,
}
