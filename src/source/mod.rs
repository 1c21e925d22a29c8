//! Frame Source: decodes input media into a bounded, lazy sequence of frames.
//!
//! The decoder handle lives inside the [`FrameSource`] and is dropped as soon
//! as the sequence ends, is truncated at `max_frames`, or hits a decode error.

pub mod gif;
pub mod image_sequence;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::path::Path;

use image::DynamicImage;

use crate::error::{Result, StitchError};
use crate::frame::Frame;

pub use self::gif::GifDecoder;
pub use self::image_sequence::ImageSequenceDecoder;

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::FfmpegDecoder;

pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "mkv", "avi", "wmv"];

/// An image produced by a decoder, before it gets its ordinal index.
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Presentation time in seconds, when the container provides one.
    pub timestamp: Option<f64>,
}

/// A media backend yielding images in decode order.
pub trait FrameDecoder {
    /// Frame rate reported by the container, if any.
    fn frame_rate(&self) -> Option<f64>;

    /// Next image in decode order, `Ok(None)` once the stream is exhausted.
    fn decode_next(&mut self) -> Result<Option<DecodedImage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    ImageSequence,
    Gif,
    Video,
}

pub fn media_kind(path: &Path) -> Result<MediaKind> {
    if path.is_dir() {
        return Ok(MediaKind::ImageSequence);
    }
    if !path.exists() {
        return Err(StitchError::UnreadableMedia(format!(
            "{} does not exist",
            path.display()
        )));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "gif" {
        Ok(MediaKind::Gif)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(MediaKind::Video)
    } else {
        Err(StitchError::UnreadableMedia(format!(
            "unsupported media type: {}",
            path.display()
        )))
    }
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path) -> Result<Box<dyn FrameDecoder>> {
    Ok(Box::new(FfmpegDecoder::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameDecoder>> {
    Err(StitchError::UnreadableMedia(format!(
        "{}: video containers need the `ffmpeg` feature",
        path.display()
    )))
}

/// Opens the backend matching `path`.
pub fn open_decoder(path: &Path) -> Result<Box<dyn FrameDecoder>> {
    match media_kind(path)? {
        MediaKind::ImageSequence => Ok(Box::new(ImageSequenceDecoder::open(path)?)),
        MediaKind::Gif => Ok(Box::new(GifDecoder::open(path)?)),
        MediaKind::Video => open_video(path),
    }
}

/// Lazy, finite, non-restartable sequence of frames.
pub struct FrameSource {
    decoder: Option<Box<dyn FrameDecoder>>,
    frame_rate: f64,
    max_frames: usize,
    next_index: usize,
    first: Option<Frame>,
}

impl FrameSource {
    pub fn open(path: &Path, max_frames: usize, fallback_frame_rate: f64) -> Result<FrameSource> {
        log::info!("opening {}", path.display());
        let decoder = open_decoder(path)?;
        FrameSource::from_decoder(decoder, max_frames, fallback_frame_rate)
    }

    /// Wraps a decoder and decodes its first frame, failing with
    /// `UnreadableMedia` when there is none.
    pub fn from_decoder(
        mut decoder: Box<dyn FrameDecoder>,
        max_frames: usize,
        fallback_frame_rate: f64,
    ) -> Result<FrameSource> {
        if max_frames == 0 {
            return Err(StitchError::InvalidConfig(
                "max_frames must be at least 1".to_string(),
            ));
        }
        let frame_rate = match decoder.frame_rate() {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            _ => {
                log::debug!("no usable frame rate, using {}", fallback_frame_rate);
                fallback_frame_rate
            }
        };
        let first = match decoder.decode_next() {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                return Err(StitchError::UnreadableMedia(
                    "media contains no frames".to_string(),
                ));
            }
            Err(e @ StitchError::UnreadableMedia(_)) => return Err(e),
            Err(e) => {
                return Err(StitchError::UnreadableMedia(format!(
                    "first frame could not be decoded: {}",
                    e
                )));
            }
        };
        let mut source = FrameSource {
            decoder: Some(decoder),
            frame_rate,
            max_frames,
            next_index: 0,
            first: None,
        };
        source.first = Some(source.to_frame(first));
        Ok(source)
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Whether the decoder handle is still held.
    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    fn to_frame(&mut self, decoded: DecodedImage) -> Frame {
        let index = self.next_index;
        self.next_index += 1;
        let timestamp = decoded
            .timestamp
            .unwrap_or(index as f64 / self.frame_rate);
        Frame::from_dynamic(index, timestamp, decoded.image)
    }

    fn release(&mut self) {
        if self.decoder.take().is_some() {
            log::trace!("released decoder after {} frames", self.next_index);
        }
    }
}

impl Iterator for FrameSource {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first) = self.first.take() {
            if self.next_index >= self.max_frames {
                self.release();
            }
            return Some(Ok(first));
        }
        if self.next_index >= self.max_frames {
            self.release();
            return None;
        }
        let decoder = self.decoder.as_mut()?;
        match decoder.decode_next() {
            Ok(Some(decoded)) => {
                let frame = self.to_frame(decoded);
                if self.next_index >= self.max_frames {
                    log::debug!("truncating input at {} frames", self.max_frames);
                    self.release();
                }
                Some(Ok(frame))
            }
            Ok(None) => {
                self.release();
                None
            }
            Err(e) => {
                self.release();
                Some(Err(e))
            }
        }
    }
}
