//! Frame sources.
//!
//! This module provides the sources the pipeline pulls frames from:
//! - Local video files (feature: video-ffmpeg)
//! - Synthetic `stub://` clips (tests and dry runs)
//!
//! Every source produces `Frame` instances in strictly increasing index order,
//! starting at 0. A decode failure ends the sequence instead of failing the
//! run, so truncated inputs still yield every frame before the damage.
//!
//! Sources MUST NOT:
//! - Fetch remote URLs
//! - Write decoded frames to disk
//! - Retain frames after handing them to the caller

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::FileSource;

use crate::frame::{Frame, VideoMetadata};

/// An ordered, finite sequence of decoded frames.
///
/// Reopening the underlying file restarts the sequence from index 0.
pub trait FrameSource {
    /// Stream properties captured when the source was opened.
    fn metadata(&self) -> VideoMetadata;

    /// Next frame, or `None` once the stream is exhausted or undecodable.
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Local paths only; `stub://` is the single accepted scheme.
pub(crate) fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
