use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{AnimationDecoder, DynamicImage, Frames};

use super::{DecodedImage, FrameDecoder};
use crate::error::{Result, StitchError};

fn delay_seconds(frame: &image::Frame) -> f64 {
    let (numer, denom) = frame.delay().numer_denom_ms();
    if denom == 0 {
        return 0.0;
    }
    numer as f64 / denom as f64 / 1000.0
}

/// Animated GIF, decoded one frame at a time.
pub struct GifDecoder {
    frames: Frames<'static>,
    pending: Option<image::Frame>,
    frame_rate: Option<f64>,
    elapsed: f64,
}

impl GifDecoder {
    pub fn open(path: &Path) -> Result<GifDecoder> {
        let file = File::open(path)?;
        let decoder = image::codecs::gif::GifDecoder::new(BufReader::new(file))
            .map_err(|e| StitchError::UnreadableMedia(format!("failed to decode GIF: {}", e)))?;
        let mut frames = decoder.into_frames();
        // the first delay is the only rate hint available before decoding starts
        let pending = match frames.next() {
            Some(frame) => Some(frame.map_err(|e| {
                StitchError::UnreadableMedia(format!("failed to decode first GIF frame: {}", e))
            })?),
            None => None,
        };
        let frame_rate = pending.as_ref().and_then(|f| {
            let d = delay_seconds(f);
            if d > 0.0 { Some(1.0 / d) } else { None }
        });
        Ok(GifDecoder {
            frames,
            pending,
            frame_rate,
            elapsed: 0.0,
        })
    }
}

impl FrameDecoder for GifDecoder {
    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn decode_next(&mut self) -> Result<Option<DecodedImage>> {
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => match self.frames.next() {
                Some(frame) => frame?,
                None => return Ok(None),
            },
        };
        let timestamp = self.elapsed;
        self.elapsed += delay_seconds(&frame);
        Ok(Some(DecodedImage {
            image: DynamicImage::ImageRgba8(frame.into_buffer()),
            timestamp: self.frame_rate.map(|_| timestamp),
        }))
    }
}
