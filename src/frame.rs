use image::{DynamicImage, GrayImage, RgbaImage};

/// One decoded (or projected) raster frame.
///
/// Alpha marks coverage: source frames are fully opaque, projected frames
/// leave pixels with no source sample at alpha 0.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    /// Presentation time in seconds.
    pub timestamp: f64,
    pub image: RgbaImage,
}

impl Frame {
    pub fn new(index: usize, timestamp: f64, image: RgbaImage) -> Frame {
        Frame {
            index,
            timestamp,
            image,
        }
    }

    pub fn from_dynamic(index: usize, timestamp: f64, img: DynamicImage) -> Frame {
        Frame::new(index, timestamp, img.into_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Luma of the frame with uncovered pixels set to black.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let p = self.image.get_pixel(x, y).0;
            if p[3] == 0 {
                return image::Luma([0]);
            }
            let l = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            image::Luma([l.round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Whether a pixel has a source sample.
    pub fn is_covered(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[3] > 0
    }
}
