//! Panorama Compositor: chains relative motions into placements, sizes the
//! canvas and blends the frames into it.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use nalgebra as na;
use rayon::prelude::*;

use crate::config::{BlendMode, StitchConfig};
use crate::error::{Result, StitchError};
use crate::frame::Frame;
use crate::pipeline::CancelToken;
use crate::placement::{Placement, PlacementIndex, PlacementStatus, Rect};
use crate::projection::sample_bilinear;

/// Motion of frame i relative to frame i-1, and how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMotion {
    /// Maps frame i pixel coordinates into frame i-1; identity for frame 0.
    pub relative: na::Similarity2<f64>,
    pub status: PlacementStatus,
}

impl FrameMotion {
    pub fn origin() -> FrameMotion {
        FrameMotion {
            relative: na::Similarity2::identity(),
            status: PlacementStatus::Aligned,
        }
    }
}

/// Finished stitch: the canvas plus where every frame landed on it.
#[derive(Debug, Clone)]
pub struct Panorama {
    pub image: RgbaImage,
    pub placements: PlacementIndex,
}

impl Panorama {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        4
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }
}

/// Cumulative transforms: placement(i) = placement(i-1) * relative(i).
pub fn chain_transforms(motions: &[FrameMotion]) -> Vec<na::Similarity2<f64>> {
    let mut cumulative = na::Similarity2::identity();
    motions
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if i > 0 {
                cumulative = cumulative * m.relative;
            }
            cumulative
        })
        .collect()
}

fn bounds(
    transform: &na::Similarity2<f64>,
    width: u32,
    height: u32,
) -> (na::Point2<f64>, na::Point2<f64>) {
    let (w, h) = (width as f64, height as f64);
    let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
        .map(|(x, y)| transform.transform_point(&na::Point2::new(x, y)));
    let mut min = corners[0];
    let mut max = corners[0];
    for c in &corners[1..] {
        min = min.inf(c);
        max = max.sup(c);
    }
    (min, max)
}

struct Layout {
    width: u32,
    height: u32,
    transforms: Vec<na::Similarity2<f64>>,
    rects: Vec<Rect>,
}

impl Layout {
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Places every frame on a canvas scaled by `scale`, origin at the union's top-left.
fn layout(cumulative: &[na::Similarity2<f64>], sizes: &[(u32, u32)], scale: f64) -> Layout {
    let frame_bounds: Vec<_> = cumulative
        .iter()
        .zip(sizes)
        .map(|(t, &(w, h))| bounds(t, w, h))
        .collect();
    let origin = frame_bounds
        .iter()
        .fold(na::Point2::new(f64::INFINITY, f64::INFINITY), |acc, (min, _)| {
            acc.inf(min)
        });
    let to_canvas = na::Similarity2::new(-origin.coords * scale, 0.0, scale);

    let mut width = 0;
    let mut height = 0;
    let mut transforms = Vec::with_capacity(cumulative.len());
    let mut rects = Vec::with_capacity(cumulative.len());
    for (t, &(w, h)) in cumulative.iter().zip(sizes) {
        let transform = to_canvas * t;
        let (min, max) = bounds(&transform, w, h);
        let x0 = min.x.round().max(0.0) as u32;
        let y0 = min.y.round().max(0.0) as u32;
        let x1 = (max.x.round().max(0.0) as u32).max(x0 + 1);
        let y1 = (max.y.round().max(0.0) as u32).max(y0 + 1);
        width = width.max(x1);
        height = height.max(y1);
        transforms.push(transform);
        rects.push(Rect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        });
    }
    Layout {
        width,
        height,
        transforms,
        rects,
    }
}

/// A frame ready to be sampled from canvas coordinates.
struct Layer {
    image: RgbaImage,
    inverse: na::Similarity2<f64>,
    rect: Rect,
    sx: f64,
    sy: f64,
}

impl Layer {
    fn covers_row(&self, y: u32) -> bool {
        y >= self.rect.y && y < self.rect.bottom()
    }

    /// Pixel of this layer under canvas pixel (x, y) with its feather weight.
    fn sample(&self, x: u32, y: u32) -> Option<(Rgba<u8>, f32)> {
        let p = self
            .inverse
            .transform_point(&na::Point2::new(x as f64 + 0.5, y as f64 + 0.5));
        let qx = (p.x * self.sx - 0.5) as f32;
        let qy = (p.y * self.sy - 0.5) as f32;
        let px = sample_bilinear(&self.image, qx, qy)?;
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        let weight = (qx + 1.0).min(qy + 1.0).min(w - qx).min(h - qy).max(0.0);
        Some((px, weight))
    }
}

fn feather_row(layers: &[Layer], y: u32, row: &mut [u8]) {
    let width = (row.len() / 4) as u32;
    // r, g, b, summed weight, max alpha
    let mut acc = vec![[0.0f32; 5]; width as usize];
    for layer in layers.iter().filter(|l| l.covers_row(y)) {
        for x in layer.rect.x..layer.rect.right().min(width) {
            let Some((px, weight)) = layer.sample(x, y) else {
                continue;
            };
            if px[3] == 0 || weight <= 0.0 {
                continue;
            }
            let wa = weight * px[3] as f32 / 255.0;
            let a = &mut acc[x as usize];
            for c in 0..3 {
                a[c] += wa * px[c] as f32;
            }
            a[3] += wa;
            a[4] = a[4].max(px[3] as f32);
        }
    }
    for (out, a) in row.chunks_exact_mut(4).zip(acc) {
        if a[3] <= 0.0 {
            continue;
        }
        for c in 0..3 {
            out[c] = (a[c] / a[3]).round().clamp(0.0, 255.0) as u8;
        }
        out[3] = a[4] as u8;
    }
}

fn last_wins_row(layers: &[Layer], y: u32, row: &mut [u8]) {
    let width = (row.len() / 4) as u32;
    for layer in layers.iter().filter(|l| l.covers_row(y)) {
        for x in layer.rect.x..layer.rect.right().min(width) {
            if let Some((px, _)) = layer.sample(x, y) {
                if px[3] > 0 {
                    let i = 4 * x as usize;
                    row[i..i + 4].copy_from_slice(&px.0);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    pub blend_mode: BlendMode,
    pub max_canvas_area: u64,
    pub min_canvas_scale: f64,
}

impl Compositor {
    pub fn from_config(config: &StitchConfig) -> Compositor {
        Compositor {
            blend_mode: config.blend_mode,
            max_canvas_area: config.max_canvas_area,
            min_canvas_scale: config.min_canvas_scale,
        }
    }

    fn fit_canvas(
        &self,
        cumulative: &[na::Similarity2<f64>],
        sizes: &[(u32, u32)],
    ) -> Result<(Layout, f64)> {
        let full = layout(cumulative, sizes, 1.0);
        if full.area() <= self.max_canvas_area {
            return Ok((full, 1.0));
        }
        let mut scale = (self.max_canvas_area as f64 / full.area() as f64).sqrt();
        loop {
            if scale < self.min_canvas_scale {
                return Err(StitchError::CanvasTooLarge {
                    width: full.width as u64,
                    height: full.height as u64,
                    max_area: self.max_canvas_area,
                });
            }
            let scaled = layout(cumulative, sizes, scale);
            if scaled.area() <= self.max_canvas_area {
                log::info!(
                    "canvas {}x{} over the area cap, downscaled by {:.3} to {}x{}",
                    full.width,
                    full.height,
                    scale,
                    scaled.width,
                    scaled.height
                );
                return Ok((scaled, scale));
            }
            scale *= 0.995;
        }
    }

    /// Places and blends `frames`; `motions[i]` is frame i relative to frame i-1.
    pub fn compose(
        &self,
        frames: Vec<Frame>,
        motions: &[FrameMotion],
        frame_rate: f64,
        cancel: &CancelToken,
    ) -> Result<Panorama> {
        if frames.is_empty() {
            return Err(StitchError::StitchFailed("no frames to composite".to_string()));
        }
        if frames.len() != motions.len() {
            return Err(StitchError::StitchFailed(format!(
                "{} frames but {} motions",
                frames.len(),
                motions.len()
            )));
        }
        let cumulative = chain_transforms(motions);
        let sizes: Vec<(u32, u32)> = frames.iter().map(|f| (f.width(), f.height())).collect();
        let (layout, scale) = self.fit_canvas(&cumulative, &sizes)?;

        let placements: Vec<Placement> = frames
            .iter()
            .zip(motions)
            .enumerate()
            .map(|(i, (frame, motion))| Placement {
                frame_index: frame.index,
                timestamp: frame.timestamp,
                transform: layout.transforms[i],
                rect: layout.rects[i],
                status: motion.status,
            })
            .collect();

        let mut layers = Vec::with_capacity(frames.len());
        for (frame, placement) in frames.into_iter().zip(&placements) {
            cancel.check()?;
            if !placement.is_blended() {
                continue;
            }
            let (w, h) = (frame.width(), frame.height());
            let image = if scale < 1.0 {
                let rw = ((w as f64 * scale).round() as u32).max(1);
                let rh = ((h as f64 * scale).round() as u32).max(1);
                imageops::resize(&frame.image, rw, rh, FilterType::Triangle)
            } else {
                frame.image
            };
            layers.push(Layer {
                sx: image.width() as f64 / w as f64,
                sy: image.height() as f64 / h as f64,
                image,
                inverse: placement.transform.inverse(),
                rect: placement.rect,
            });
        }

        cancel.check()?;
        let (width, height) = (layout.width, layout.height);
        log::info!(
            "compositing {} of {} frames onto a {}x{} canvas",
            layers.len(),
            placements.len(),
            width,
            height
        );
        let mut buf = vec![0u8; width as usize * height as usize * 4];
        let row_len = width as usize * 4;
        buf.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| match self.blend_mode {
                BlendMode::Feather => feather_row(&layers, y as u32, row),
                BlendMode::LastWins => last_wins_row(&layers, y as u32, row),
            });
        let image = RgbaImage::from_raw(width, height, buf)
            .ok_or_else(|| StitchError::StitchFailed("canvas buffer size mismatch".to_string()))?;

        Ok(Panorama {
            image,
            placements: PlacementIndex::new(placements, frame_rate),
        })
    }
}
