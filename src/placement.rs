//! Where every input frame ended up in the panorama.
//!
//! The index is the read-only service downstream consumers use to map a
//! panorama pixel back to a source frame and time.

use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in panorama pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x as f64
            && y >= self.y as f64
            && x < self.right() as f64
            && y < self.bottom() as f64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    /// Placed from a robust alignment against an earlier frame.
    Aligned,
    /// No anchor aligned; placed by carrying the previous motion forward.
    Estimated,
    /// Placed by carried-forward motion but left out of the canvas.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub frame_index: usize,
    pub timestamp: f64,
    /// Maps projected-frame pixel coordinates into panorama coordinates.
    pub transform: na::Similarity2<f64>,
    pub rect: Rect,
    pub status: PlacementStatus,
}

impl Placement {
    pub fn is_blended(&self) -> bool {
        self.status != PlacementStatus::Skipped
    }

    /// Panorama pixel (x, y) in this frame's pixel coordinates.
    pub fn to_frame_coords(&self, x: f64, y: f64) -> na::Point2<f64> {
        let p = self
            .transform
            .inverse_transform_point(&na::Point2::new(x + 0.5, y + 0.5));
        na::Point2::new(p.x - 0.5, p.y - 0.5)
    }
}

/// One placement per input frame, in frame order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementIndex {
    pub frame_rate: f64,
    pub placements: Vec<Placement>,
}

impl PlacementIndex {
    pub fn new(placements: Vec<Placement>, frame_rate: f64) -> PlacementIndex {
        PlacementIndex {
            frame_rate,
            placements,
        }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Placement> {
        self.placements.iter()
    }

    pub fn get(&self, frame_index: usize) -> Option<&Placement> {
        self.placements.iter().find(|p| p.frame_index == frame_index)
    }

    pub fn rects(&self) -> Vec<Rect> {
        self.placements.iter().map(|p| p.rect).collect()
    }

    /// The blended frame covering panorama point (x, y) whose centre is
    /// closest; ties go to the earlier frame.
    pub fn locate(&self, x: f64, y: f64) -> Option<&Placement> {
        let mut best: Option<(&Placement, f64)> = None;
        for placement in self.placements.iter().filter(|p| p.is_blended()) {
            if !placement.rect.contains(x, y) {
                continue;
            }
            let (cx, cy) = placement.rect.center();
            let d = (cx - x).powi(2) + (cy - y).powi(2);
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((placement, d));
            }
        }
        best.map(|(p, _)| p)
    }

    /// Panorama pixel (x, y) in the pixel coordinates of `frame_index`.
    pub fn to_frame_coords(&self, frame_index: usize, x: f64, y: f64) -> Option<na::Point2<f64>> {
        self.get(frame_index).map(|p| p.to_frame_coords(x, y))
    }

    /// Timestamp of the frame shown at panorama point (x, y).
    pub fn time_at(&self, x: f64, y: f64) -> Option<f64> {
        self.locate(x, y).map(|p| p.timestamp)
    }
}

impl<'a> IntoIterator for &'a PlacementIndex {
    type Item = &'a Placement;
    type IntoIter = std::slice::Iter<'a, Placement>;

    fn into_iter(self) -> Self::IntoIter {
        self.placements.iter()
    }
}
