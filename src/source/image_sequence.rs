use std::path::{Path, PathBuf};

use glob::glob;
use image::ImageReader;

use super::{DecodedImage, FrameDecoder};
use crate::error::{Result, StitchError};

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        let lower = p.as_os_str().to_string_lossy().to_ascii_lowercase();
        for ext in &[".png", ".jpg", ".jpeg"] {
            if lower.ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

/// A directory of still images, taken in file-name order.
pub struct ImageSequenceDecoder {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceDecoder {
    pub fn open(folder: &Path) -> Result<ImageSequenceDecoder> {
        let pattern = folder.join("*");
        let pattern = pattern.to_str().ok_or_else(|| {
            StitchError::UnreadableMedia(format!("non utf-8 path: {}", folder.display()))
        })?;
        let img_paths = glob(pattern)
            .map_err(|e| StitchError::UnreadableMedia(format!("bad pattern {}: {}", pattern, e)))?;
        let mut paths: Vec<PathBuf> = img_paths.into_iter().filter_map(img_filter).collect();
        paths.sort();
        log::debug!("{} images in {}", paths.len(), folder.display());
        Ok(ImageSequenceDecoder { paths, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameDecoder for ImageSequenceDecoder {
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    fn decode_next(&mut self) -> Result<Option<DecodedImage>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(Some(DecodedImage {
            image,
            timestamp: None,
        }))
    }
}
