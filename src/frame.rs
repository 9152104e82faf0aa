//! Decoded frame container and stream metadata.
//!
//! - `Frame`: one decoded RGB24 picture plus its position in the stream.
//! - `VideoMetadata`: dimensions, frame rate and reported length of a source.
//! - `RunSummary`: the footer figures appended to the detection log.
//!
//! Frames are owned by the pipeline for a single iteration. They are not
//! `Clone`, and their pixel memory is zeroed on drop.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use zeroize::Zeroize;

/// Bytes per pixel for the RGB24 layout every source produces.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// JPEG quality used when a frame is shipped to the inference backend.
pub const JPEG_QUALITY: u8 = 90;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame in packed RGB24 layout.
pub struct Frame {
    index: u64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

// No Clone: a frame has exactly one owner for the duration of an iteration.

impl Frame {
    /// Build a frame, checking that the buffer matches the dimensions.
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be positive"));
        }
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame #{} expected {} RGB bytes for {}x{}, received {}",
                index,
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            index,
            width,
            height,
            pixels,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB24 rows, `width * 3` bytes each, no padding.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Encode the frame as a baseline JPEG for transmission.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.pixels.len() / 8);
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            encoder
                .encode(
                    &self.pixels,
                    self.width,
                    self.height,
                    ExtendedColorType::Rgb8,
                )
                .with_context(|| format!("encode frame #{} as jpeg", self.index))?;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pixels.zeroize();
    }
}

pub(crate) fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_BYTES_PER_PIXEL))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// Stream metadata
// ----------------------------------------------------------------------------

/// Properties reported by a frame source when it is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Whole frames per second, truncated like the container reports it.
    pub frame_rate: u32,
    /// Frame count reported by the container. May be off by one.
    pub total_frames: u64,
}

impl VideoMetadata {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_frames: self.total_frames,
            frame_rate: self.frame_rate,
        }
    }
}

/// Footer figures written once at the end of the detection log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub total_frames: u64,
    pub frame_rate: u32,
}
