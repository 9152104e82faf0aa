//! Local file frame source.
//!
//! This module provides `FileSource` for reading frames from local video files.
//! The file source is responsible for:
//! - Opening a local video file (no network access)
//! - Reporting dimensions, frame rate and frame count at open time
//! - Decoding frames in-memory to RGB24, in order
//! - Turning decode failures into end-of-stream
//!
//! `stub://<name>?frames=N&fps=F&width=W&height=H` selects a synthetic clip
//! with deterministic pixels instead of a decoder. `fail_at=K` makes frame K
//! undecodable, which ends the clip early the same way a damaged file does.

use anyhow::{anyhow, Context, Result};
use url::Url;

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{is_local_file_path, FrameSource};
use crate::frame::{expected_len, Frame, VideoMetadata};

const DEFAULT_STUB_FRAMES: u64 = 30;
const DEFAULT_STUB_FPS: u32 = 10;
const DEFAULT_STUB_WIDTH: u32 = 320;
const DEFAULT_STUB_HEIGHT: u32 = 240;

/// Local file frame source.
pub struct FileSource {
    path: String,
    metadata: VideoMetadata,
    backend: FileBackend,
    frames_decoded: u64,
    exhausted: bool,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(Box<FfmpegFileSource>),
}

impl FileSource {
    /// Open a local video file (or `stub://` clip) for decoding.
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "video input '{}' must be a local path (no URL schemes)",
                path
            ));
        }
        let backend = if path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticFileSource::parse(path)?)
        } else {
            open_decoder(path)?
        };
        let metadata = match &backend {
            FileBackend::Synthetic(source) => source.metadata(),
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.metadata(),
        };
        log::info!(
            "FileSource: opened {} ({}x{} @ {} fps, {} frames reported)",
            path,
            metadata.width,
            metadata.height,
            metadata.frame_rate,
            metadata.total_frames
        );
        Ok(Self {
            path: path.to_string(),
            metadata,
            backend,
            frames_decoded: 0,
            exhausted: false,
        })
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

impl FrameSource for FileSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.exhausted {
            return None;
        }
        match self.decode_next() {
            Ok(Some(frame)) => {
                self.frames_decoded += 1;
                Some(frame)
            }
            Ok(None) => {
                log::debug!(
                    "FileSource: end of {} after {} frames",
                    self.path,
                    self.frames_decoded
                );
                self.exhausted = true;
                None
            }
            Err(e) => {
                log::warn!(
                    "FileSource: decode failed on {} after {} frames, ending stream: {:#}",
                    self.path,
                    self.frames_decoded,
                    e
                );
                self.exhausted = true;
                None
            }
        }
    }
}

#[cfg(feature = "video-ffmpeg")]
fn open_decoder(path: &str) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(Box::new(FfmpegFileSource::open(path)?)))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_decoder(path: &str) -> Result<FileBackend> {
    Err(anyhow!(
        "cannot decode '{}': video file input requires the video-ffmpeg feature",
        path
    ))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    width: u32,
    height: u32,
    frame_rate: u32,
    total_frames: u64,
    fail_at: Option<u64>,
    next_index: u64,
}

impl SyntheticFileSource {
    fn parse(path: &str) -> Result<Self> {
        let url = Url::parse(path).with_context(|| format!("parse stub clip '{}'", path))?;
        let mut source = Self {
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            frame_rate: DEFAULT_STUB_FPS,
            total_frames: DEFAULT_STUB_FRAMES,
            fail_at: None,
            next_index: 0,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => source.total_frames = parse_param(&key, &value)?,
                "fps" => source.frame_rate = parse_param(&key, &value)?,
                "width" => source.width = parse_param(&key, &value)?,
                "height" => source.height = parse_param(&key, &value)?,
                "fail_at" => source.fail_at = Some(parse_param(&key, &value)?),
                other => return Err(anyhow!("unknown stub clip parameter '{}'", other)),
            }
        }
        if source.width == 0 || source.height == 0 {
            return Err(anyhow!("stub clip dimensions must be positive"));
        }
        if source.frame_rate == 0 {
            return Err(anyhow!("stub clip fps must be >= 1"));
        }
        Ok(source)
    }

    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            total_frames: self.total_frames,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.total_frames {
            return Ok(None);
        }
        let index = self.next_index;
        if self.fail_at == Some(index) {
            return Err(anyhow!("synthetic clip frame #{} is corrupt", index));
        }
        self.next_index += 1;
        let pixels = self.generate_synthetic_pixels(index)?;
        Frame::new(index, self.width, self.height, pixels).map(Some)
    }

    fn generate_synthetic_pixels(&self, index: u64) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; expected_len(self.width, self.height)?];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + index * 7) % 256) as u8;
        }
        Ok(pixels)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub clip parameter '{}' has invalid value '{}'", key, value))
}
