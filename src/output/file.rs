//! Local file frame sink.
//!
//! `FileSink` owns the output video for the duration of a run. It is opened
//! with the dimensions and frame rate of the source and rejects frames of any
//! other size. Dropping a sink that was never finished closes it best-effort.

use anyhow::{anyhow, Result};

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSink;
use super::FrameSink;
use crate::frame::{Frame, VideoMetadata};
use crate::ingest::is_local_file_path;

/// Local file frame sink.
pub struct FileSink {
    path: String,
    width: u32,
    height: u32,
    backend: SinkBackend,
    frames_written: u64,
    finished: bool,
}

enum SinkBackend {
    Counting,
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(Box<FfmpegFileSink>),
}

impl FileSink {
    /// Create (or truncate) the output video at `path`.
    pub fn create(path: &str, metadata: &VideoMetadata) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "video output '{}' must be a local path (no URL schemes)",
                path
            ));
        }
        if metadata.width == 0 || metadata.height == 0 {
            return Err(anyhow!(
                "cannot open video output '{}' with empty dimensions",
                path
            ));
        }
        let backend = if path.starts_with("stub://") {
            SinkBackend::Counting
        } else {
            open_encoder(path, metadata)?
        };
        log::info!(
            "FileSink: writing {} ({}x{} @ {} fps)",
            path,
            metadata.width,
            metadata.height,
            metadata.frame_rate
        );
        Ok(Self {
            path: path.to_string(),
            width: metadata.width,
            height: metadata.height,
            backend,
            frames_written: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FrameSink for FileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("video output '{}' is already finished", self.path));
        }
        if frame.width() != self.width || frame.height() != self.height {
            return Err(anyhow!(
                "frame #{} is {}x{}, output '{}' is {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                self.path,
                self.width,
                self.height
            ));
        }
        match &mut self.backend {
            SinkBackend::Counting => {}
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.write(frame)?,
        }
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        match &mut self.backend {
            SinkBackend::Counting => {}
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.finish()?,
        }
        log::info!(
            "FileSink: closed {} after {} frames",
            self.path,
            self.frames_written
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                log::warn!("FileSink: failed to close {}: {:#}", self.path, e);
            }
        }
    }
}

#[cfg(feature = "video-ffmpeg")]
fn open_encoder(path: &str, metadata: &VideoMetadata) -> Result<SinkBackend> {
    Ok(SinkBackend::Ffmpeg(Box::new(FfmpegFileSink::create(
        path, metadata,
    )?)))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_encoder(path: &str, _metadata: &VideoMetadata) -> Result<SinkBackend> {
    Err(anyhow!(
        "cannot encode '{}': video file output requires the video-ffmpeg feature",
        path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            width: 4,
            height: 2,
            frame_rate: 10,
            total_frames: 3,
        }
    }

    fn frame(index: u64, width: u32, height: u32) -> Frame {
        Frame::new(index, width, height, vec![1u8; (width * height * 3) as usize]).unwrap()
    }

    #[test]
    fn counting_sink_tracks_frames() {
        let mut sink = FileSink::create("stub://out", &metadata()).unwrap();
        sink.write(&frame(0, 4, 2)).unwrap();
        sink.write(&frame(1, 4, 2)).unwrap();
        assert_eq!(sink.frames_written(), 2);
        sink.finish().unwrap();
        assert!(sink.write(&frame(2, 4, 2)).is_err());
        assert_eq!(sink.frames_written(), 2);
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let mut sink = FileSink::create("stub://out", &metadata()).unwrap();
        assert!(sink.write(&frame(0, 2, 2)).is_err());
        assert_eq!(sink.frames_written(), 0);
    }

    #[test]
    fn rejects_remote_and_empty_outputs() {
        assert!(FileSink::create("rtmp://server/live", &metadata()).is_err());
        let empty = VideoMetadata {
            width: 0,
            ..metadata()
        };
        assert!(FileSink::create("stub://out", &empty).is_err());
    }

    #[test]
    fn finish_is_idempotent() {
        let mut sink = FileSink::create("stub://out", &metadata()).unwrap();
        sink.finish().unwrap();
        sink.finish().unwrap();
    }
}
