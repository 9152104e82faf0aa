//! Frame sinks.
//!
//! The output side mirrors `ingest`:
//! - Local video files (feature: video-ffmpeg)
//! - `stub://` sinks that only count frames (tests and dry runs)
//!
//! Sinks are opened with the source's dimensions and frame rate and re-emit
//! each decoded frame unchanged, in the order it was written.

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::FileSink;

use anyhow::Result;

use crate::frame::Frame;

/// An append-only output video stream.
pub trait FrameSink {
    /// Append one frame. Its dimensions must match the stream.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush buffered output and close the container. Further writes fail.
    fn finish(&mut self) -> Result<()>;

    /// Frames accepted by `write` so far.
    fn frames_written(&self) -> u64;
}
