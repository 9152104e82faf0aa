//! VisionGuard
//!
//! Runs every frame of a video through a remote object-detection backend,
//! keeps the detections at or above a confidence threshold, and reports them.
//!
//! # Architecture
//!
//! A run is a single sequential pass:
//!
//! 1. **Decode**: `ingest::FileSource` yields RGB frames in index order.
//! 2. **Infer**: an `InferenceBackend` returns predictions for one frame.
//! 3. **Filter**: `filter_predictions` keeps `probability >= threshold`.
//! 4. **Log**: `DetectionLog` appends one line per accepted detection.
//! 5. **Emit**: `output::FileSink` re-encodes the unchanged frame.
//! 6. **Alert**: after the loop, `AlertNotifier` mails the log once.
//!
//! `Pipeline` drives the loop and guarantees that the log footer is written
//! and every resource released on all exit paths, including failures.
//!
//! # Module Structure
//!
//! - `config`: Layered configuration (file, environment, CLI overrides)
//! - `frame`: Frame container and stream metadata
//! - `ingest`: Frame sources (local files, synthetic clips)
//! - `detect`: Predictions, threshold filter, inference backends
//! - `log`: Append-only detection log
//! - `output`: Frame sinks (local files, counting stub)
//! - `notify`: Completion alert over SMTP
//! - `pipeline`: Orchestration and failure policy
//! - `ui`: Terminal progress reporting

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod log;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod ui;

pub use config::{ConfigOverrides, PipelineConfig, Secret};
pub use detect::{
    filter_predictions, BoundingBox, CustomVisionClient, DetectionRecord, InferenceBackend,
    InferenceError, Prediction, StubBackend,
};
pub use frame::{Frame, RunSummary, VideoMetadata};
pub use ingest::{FileSource, FrameSource};
pub use crate::log::DetectionLog;
pub use notify::{AlertNotifier, Mailer, NotificationError, SmtpMailer};
pub use output::{FileSink, FrameSink};
pub use pipeline::{
    NotificationOutcome, OpenStage, Pipeline, PipelineError, PipelineState, RunReport,
};
