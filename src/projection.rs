use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use nalgebra as na;
use rayon::prelude::*;

use crate::config::StitchConfig;
use crate::frame::Frame;

/// Samples `src` at a sub-pixel position with bilinear weights.
///
/// Colour is interpolated alpha-weighted so uncovered neighbours do not
/// darken edges. Positions up to half a pixel outside the image clamp to the
/// border; anything further out, or NaN, is `None`.
pub fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> Option<Rgba<u8>> {
    let (w, h) = (src.width() as f32, src.height() as f32);
    if x.is_nan() || y.is_nan() || x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
        return None;
    }
    let x = x.clamp(0.0, w - 1.0);
    let y = y.clamp(0.0, h - 1.0);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x1, y0, fx * (1.0 - fy)),
        (x0, y1, (1.0 - fx) * fy),
        (x1, y1, fx * fy),
    ];
    let mut rgb = [0.0f32; 3];
    let mut alpha = 0.0f32;
    for (px, py, w) in taps {
        if w == 0.0 {
            continue;
        }
        let p = src.get_pixel(px, py).0;
        let a = p[3] as f32 * w;
        for c in 0..3 {
            rgb[c] += p[c] as f32 * a;
        }
        alpha += a;
    }
    if alpha <= 0.0 {
        return Some(Rgba([0, 0, 0, 0]));
    }
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Some(Rgba([
        to_u8(rgb[0] / alpha),
        to_u8(rgb[1] / alpha),
        to_u8(rgb[2] / alpha),
        to_u8(alpha),
    ]))
}

/// Resamples `src` through per-pixel source coordinate maps of shape (height, width).
pub fn remap(src: &RgbaImage, xmap: &na::DMatrix<f32>, ymap: &na::DMatrix<f32>) -> RgbaImage {
    let (r, c) = xmap.shape();
    let mut out = RgbaImage::new(c as u32, r as u32);
    out.par_chunks_mut(4 * c.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let p = sample_bilinear(src, xmap[(y, x)], ymap[(y, x)])
                    .unwrap_or(Rgba([0, 0, 0, 0]));
                px.copy_from_slice(&p.0);
            }
        });
    out
}

fn build_map<F>(width: u32, height: u32, f: F) -> (na::DMatrix<f32>, na::DMatrix<f32>)
where
    F: Fn(f64, f64) -> (f64, f64) + Sync,
{
    let (w, h) = (width as usize, height as usize);
    let (xvec, yvec): (Vec<f32>, Vec<f32>) = (0..w * h)
        .into_par_iter()
        .map(|i| {
            let (sx, sy) = f((i % w) as f64, (i / w) as f64);
            if sx.is_finite() && sy.is_finite() {
                (sx as f32, sy as f32)
            } else {
                (f32::NAN, f32::NAN)
            }
        })
        .unzip();
    let xmap = na::DMatrix::from_row_slice(h, w, &xvec);
    let ymap = na::DMatrix::from_row_slice(h, w, &yvec);
    (xmap, ymap)
}

/// Maps for warping a planar image onto a cylinder of radius `focal` pixels.
///
/// Destination (x, y) samples the plane at
/// `(cx + f tan(theta), cy + h f / cos(theta))` with
/// `theta = (x - cx) / f` and `h = (y - cy) / f`.
pub fn init_cylindrical_map(
    width: u32,
    height: u32,
    focal: f64,
) -> (na::DMatrix<f32>, na::DMatrix<f32>) {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    build_map(width, height, |x, y| {
        let theta = (x - cx) / focal;
        if theta.abs() >= std::f64::consts::FRAC_PI_2 {
            return (f64::NAN, f64::NAN);
        }
        let h = (y - cy) / focal;
        (cx + focal * theta.tan(), cy + h * focal / theta.cos())
    })
}

/// Inverse of [`init_cylindrical_map`]: maps a cylinder image back to the plane.
pub fn init_planar_map(
    width: u32,
    height: u32,
    focal: f64,
) -> (na::DMatrix<f32>, na::DMatrix<f32>) {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    build_map(width, height, |x, y| {
        let theta = ((x - cx) / focal).atan();
        (cx + focal * theta, cy + (y - cy) * theta.cos())
    })
}

/// Stateless per-frame cylindrical warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylindricalProjector {
    focal_length: f64,
    resize_factor: f64,
}

impl CylindricalProjector {
    /// `focal_length` is in pixels of the input frames; it is scaled along
    /// with the frames by `resize_factor`.
    pub fn new(focal_length: f64, resize_factor: f64) -> CylindricalProjector {
        CylindricalProjector {
            focal_length,
            resize_factor,
        }
    }

    pub fn from_config(config: &StitchConfig) -> CylindricalProjector {
        CylindricalProjector::new(config.focal_length, config.resize_factor)
    }

    /// Focal length in pixels of the resized frames.
    pub fn effective_focal_length(&self) -> f64 {
        self.focal_length * self.resize_factor
    }

    fn resize(&self, image: RgbaImage) -> RgbaImage {
        if self.resize_factor >= 1.0 {
            return image;
        }
        let w = ((image.width() as f64 * self.resize_factor).round() as u32).max(1);
        let h = ((image.height() as f64 * self.resize_factor).round() as u32).max(1);
        imageops::resize(&image, w, h, FilterType::Triangle)
    }

    /// Consumes a frame and returns its projection, keeping index and timestamp.
    pub fn project(&self, frame: Frame) -> Frame {
        let Frame {
            index,
            timestamp,
            image,
        } = frame;
        let image = self.resize(image);
        let (xmap, ymap) =
            init_cylindrical_map(image.width(), image.height(), self.effective_focal_length());
        log::trace!("projecting frame {}", index);
        Frame::new(index, timestamp, remap(&image, &xmap, &ymap))
    }

    /// Warps a projected frame back onto the image plane.
    pub fn unproject(&self, frame: &Frame) -> Frame {
        let (xmap, ymap) =
            init_planar_map(frame.width(), frame.height(), self.effective_focal_length());
        Frame::new(frame.index, frame.timestamp, remap(&frame.image, &xmap, &ymap))
    }
}
