//! Video container backend using ffmpeg-next.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use image::{DynamicImage, RgbaImage};

use super::{DecodedImage, FrameDecoder};
use crate::error::{Result, StitchError};

/// `AV_NOPTS_VALUE`: the container left the field unset.
const NO_PTS: i64 = i64::MIN;

fn media_err(what: &str, e: ffmpeg::Error) -> StitchError {
    StitchError::UnreadableMedia(format!("{}: {}", what, e))
}

/// Seconds since the first presentation time of the stream.
fn presentation_time(pts: i64, start_time: i64, time_base: f64) -> f64 {
    let offset = if start_time == NO_PTS { 0 } else { start_time };
    (pts - offset) as f64 * time_base
}

pub struct FfmpegDecoder {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    start_time: i64,
    frame_rate: Option<f64>,
    width: u32,
    height: u32,
    eof_sent: bool,
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<FfmpegDecoder> {
        ffmpeg::init().map_err(|e| media_err("ffmpeg init failed", e))?;
        let input =
            ffmpeg::format::input(path).map_err(|e| media_err("failed to open input", e))?;

        let (stream_index, time_base, start_time, frame_rate, parameters) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| StitchError::UnreadableMedia("no video stream found".to_string()))?;
            let rate = stream.avg_frame_rate();
            let frame_rate = if rate.denominator() != 0 && rate.numerator() > 0 {
                Some(f64::from(rate))
            } else {
                None
            };
            (
                stream.index(),
                f64::from(stream.time_base()),
                stream.start_time(),
                frame_rate,
                stream.parameters(),
            )
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .map_err(|e| media_err("failed to get codec context", e))?
            .decoder()
            .video()
            .map_err(|e| media_err("failed to get video decoder", e))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGBA,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| media_err("failed to initialize scaler", e))?;

        log::debug!(
            "video stream {}: {}x{}, {:?} fps",
            stream_index,
            width,
            height,
            frame_rate
        );

        Ok(FfmpegDecoder {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_time,
            frame_rate,
            width,
            height,
            eof_sent: false,
        })
    }

    fn convert(&mut self, decoded: &ffmpeg::util::frame::Video) -> Result<DecodedImage> {
        let mut rgba = ffmpeg::util::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgba)
            .map_err(|e| media_err("failed to convert frame", e))?;

        let row_bytes = self.width as usize * 4;
        let stride = rgba.stride(0);
        let data = rgba.data(0);
        let mut buf = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            buf.extend_from_slice(&data[row * stride..row * stride + row_bytes]);
        }
        let image = RgbaImage::from_raw(self.width, self.height, buf).ok_or_else(|| {
            StitchError::UnreadableMedia("decoded frame has an unexpected size".to_string())
        })?;
        let timestamp = decoded
            .timestamp()
            .map(|pts| presentation_time(pts, self.start_time, self.time_base));
        Ok(DecodedImage {
            image: DynamicImage::ImageRgba8(image),
            timestamp,
        })
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn decode_next(&mut self) -> Result<Option<DecodedImage>> {
        let mut decoded = ffmpeg::util::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) if index == self.stream_index => {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| media_err("failed to decode packet", e))?;
                }
                Some(_) => {}
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| media_err("failed to flush decoder", e))?;
                    self.eof_sent = true;
                }
            }
        }
    }
}
