use image::{Rgba, RgbaImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::compositor::Panorama;
use crate::placement::{PlacementStatus, Rect};

pub fn id_to_color(id: usize) -> (u8, u8, u8, u8) {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    (
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
        255,
    )
}

fn draw_rect(img: &mut RgbaImage, rect: &Rect, color: Rgba<u8>, dashed: bool) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let x0 = rect.x.min(img.width() - 1);
    let y0 = rect.y.min(img.height() - 1);
    let x1 = rect.right().saturating_sub(1).min(img.width() - 1);
    let y1 = rect.bottom().saturating_sub(1).min(img.height() - 1);
    let on = |i: u32| !dashed || (i / 4) % 2 == 0;
    for x in x0..=x1 {
        if on(x) {
            img.put_pixel(x, y0, color);
            img.put_pixel(x, y1, color);
        }
    }
    for y in y0..=y1 {
        if on(y) {
            img.put_pixel(x0, y, color);
            img.put_pixel(x1, y, color);
        }
    }
}

/// Copy of the panorama with every placement rectangle outlined, one colour
/// per frame. Frames that were not aligned get a dashed outline.
pub fn draw_placements(panorama: &Panorama) -> RgbaImage {
    let mut img = panorama.image.clone();
    for placement in panorama.placements.iter() {
        let (r, g, b, a) = id_to_color(placement.frame_index);
        let dashed = placement.status != PlacementStatus::Aligned;
        draw_rect(&mut img, &placement.rect, Rgba([r, g, b, a]), dashed);
    }
    img
}
