//! Synthetic panning footage: crops sliding across a random texture.

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage, imageops};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::frame::Frame;

/// Texture of overlapping random rectangles, rich in corners.
pub fn random_texture(width: u32, height: u32, seed: u64) -> RgbaImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = RgbaImage::from_pixel(width, height, Rgba([128, 128, 128, 255]));
    let blocks = (width as usize * height as usize) / 40;
    for _ in 0..blocks {
        let w = rng.random_range(3..16u32);
        let h = rng.random_range(3..16u32);
        let x0 = rng.random_range(0..width);
        let y0 = rng.random_range(0..height);
        let color = Rgba([
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
            255,
        ]);
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                img.put_pixel(x, y, color);
            }
        }
    }
    img
}

/// `count` frames of `width` x `height` cropped from `world`, each `shift`
/// pixels further right than the previous one.
///
/// Crops that would leave the world are clamped to its right edge.
pub fn panning_frames(
    world: &RgbaImage,
    count: usize,
    shift: u32,
    width: u32,
    height: u32,
    frame_rate: f64,
) -> Vec<Frame> {
    let width = width.min(world.width());
    let height = height.min(world.height());
    (0..count)
        .map(|i| {
            let x = (shift * i as u32).min(world.width() - width);
            let crop = imageops::crop_imm(world, x, 0, width, height).to_image();
            Frame::new(i, i as f64 / frame_rate, crop)
        })
        .collect()
}

/// World wide enough for `count` frames panned by `shift`.
pub fn panning_world(count: usize, shift: u32, width: u32, height: u32, seed: u64) -> RgbaImage {
    let world_width = width + shift * count.saturating_sub(1) as u32;
    random_texture(world_width, height, seed)
}

/// A frame of one flat colour, which no detector finds anything in.
pub fn flat_frame(index: usize, timestamp: f64, width: u32, height: u32) -> Frame {
    Frame::new(
        index,
        timestamp,
        RgbaImage::from_pixel(width, height, Rgba([90, 90, 90, 255])),
    )
}

/// Writes frames as `frame_0000.png`, `frame_0001.png`, ... into `dir`.
pub fn write_sequence(frames: &[Frame], dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    frames
        .iter()
        .map(|frame| -> Result<PathBuf> {
            let path = dir.join(format!("frame_{:04}.png", frame.index));
            frame.image.save(&path)?;
            Ok(path)
        })
        .collect()
}
