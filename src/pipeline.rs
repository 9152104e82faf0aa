//! Frame-analysis pipeline.
//!
//! ```text
//! Idle -> Opening -> Streaming -> Finalizing -> Done
//!            |           |             |
//!            +-----------+-------------+-> Failed
//! ```
//!
//! Opening validates the configuration and opens the source, the sink and the
//! detection log, in that order. Streaming pulls one frame at a time, sends it
//! to the inference backend, logs accepted detections and re-emits the frame.
//! Any failure in those two stages jumps to Finalizing, which always writes the
//! log footer (when a log exists), releases every resource and then sends the
//! alert. Alert delivery is best-effort and never changes the final state.

use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::detect::{filter_predictions, DetectionRecord, InferenceBackend, InferenceError};
use crate::frame::{RunSummary, VideoMetadata};
use crate::ingest::{FileSource, FrameSource};
use crate::log::DetectionLog;
use crate::notify::{AlertNotifier, Mailer};
use crate::output::{FileSink, FrameSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opening,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

/// Resource that failed to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenStage {
    VideoInput,
    VideoOutput,
    DetectionLog,
}

impl std::fmt::Display for OpenStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OpenStage::VideoInput => "video input",
            OpenStage::VideoOutput => "video output",
            OpenStage::DetectionLog => "detection log",
        })
    }
}

/// Fatal run errors. Each one names the stage that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration rejected: {0}")]
    Config(String),

    #[error("failed to open {stage}: {message}")]
    Open { stage: OpenStage, message: String },

    #[error("inference failed on frame #{frame_index}: {source}")]
    Inference {
        frame_index: u64,
        #[source]
        source: InferenceError,
    },

    #[error("detection log failed: {0}")]
    Log(String),

    #[error("video output failed: {0}")]
    Encode(String),

    #[error("run cancelled before frame #{frame_index}")]
    Cancelled { frame_index: u64 },
}

impl PipelineError {
    fn open(stage: OpenStage, err: anyhow::Error) -> Self {
        PipelineError::Open {
            stage,
            message: format!("{:#}", err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    /// Delivery failed; the run result is unaffected.
    Failed(String),
    /// No detection log was created, so there was nothing to report.
    Skipped,
}

/// What a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub state: PipelineState,
    /// Frames that went through inference, logging and the sink.
    pub frames_processed: u64,
    pub frames_written: u64,
    pub detections: u64,
    /// Footer written to the log, if any.
    pub summary: Option<RunSummary>,
    pub error: Option<PipelineError>,
    pub notification: NotificationOutcome,
    pub log_path: Option<PathBuf>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }
}

/// Everything `Opening` produced. A partial open drops what it already had.
struct OpenResources<S, K> {
    source: S,
    sink: K,
    log: DetectionLog,
}

#[derive(Default)]
struct Tally {
    frames_processed: u64,
    detections: u64,
}

struct Finalized {
    summary: Option<RunSummary>,
    frames_written: u64,
    log_path: Option<PathBuf>,
    error: Option<PipelineError>,
}

/// Owns the backend and notifier for one or more sequential runs.
pub struct Pipeline<B: InferenceBackend, M: Mailer> {
    config: PipelineConfig,
    backend: B,
    notifier: AlertNotifier<M>,
    cancel: Arc<AtomicBool>,
    progress: ProgressBar,
    state: PipelineState,
}

impl<B: InferenceBackend, M: Mailer> Pipeline<B, M> {
    pub fn new(config: PipelineConfig, backend: B, notifier: AlertNotifier<M>) -> Self {
        Self {
            config,
            backend,
            notifier,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: ProgressBar::hidden(),
            state: PipelineState::Idle,
        }
    }

    /// Share a cancellation flag. Setting it stops the run before the next frame.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report per-frame progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn notifier(&self) -> &AlertNotifier<M> {
        &self.notifier
    }

    /// Run against the configured files.
    pub fn run(&mut self) -> RunReport {
        self.run_with(FileSource::open, FileSink::create)
    }

    /// Run with caller-supplied openers for the source and sink.
    pub fn run_with<S, K, OS, OK>(&mut self, open_source: OS, open_sink: OK) -> RunReport
    where
        S: FrameSource,
        K: FrameSink,
        OS: FnOnce(&str) -> anyhow::Result<S>,
        OK: FnOnce(&str, &VideoMetadata) -> anyhow::Result<K>,
    {
        self.state = PipelineState::Idle;
        let mut tally = Tally::default();

        self.transition(PipelineState::Opening);
        let (mut resources, mut error) = match self.open(open_source, open_sink) {
            Ok(resources) => (Some(resources), None),
            Err(e) => (None, Some(e)),
        };
        if let Some(opened) = resources.as_mut() {
            self.transition(PipelineState::Streaming);
            error = self.stream(opened, &mut tally).err();
        }
        if let Some(e) = &error {
            log::error!("pipeline: {}", e);
        }

        self.transition(PipelineState::Finalizing);
        let finalized = self.finalize(resources);
        if let Some(release_error) = finalized.error {
            if error.is_none() {
                log::error!("pipeline: {}", release_error);
                error = Some(release_error);
            } else {
                log::warn!("pipeline: while finalizing a failed run: {}", release_error);
            }
        }
        let notification = self.send_alert(finalized.log_path.as_deref());

        let state = if error.is_some() {
            self.progress.abandon();
            PipelineState::Failed
        } else {
            self.progress.finish();
            PipelineState::Done
        };
        self.transition(state);

        RunReport {
            state,
            frames_processed: tally.frames_processed,
            frames_written: finalized.frames_written,
            detections: tally.detections,
            summary: finalized.summary,
            error,
            notification,
            log_path: finalized.log_path,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn open<S, K, OS, OK>(
        &self,
        open_source: OS,
        open_sink: OK,
    ) -> Result<OpenResources<S, K>, PipelineError>
    where
        S: FrameSource,
        K: FrameSink,
        OS: FnOnce(&str) -> anyhow::Result<S>,
        OK: FnOnce(&str, &VideoMetadata) -> anyhow::Result<K>,
    {
        self.config
            .validate()
            .map_err(|e| PipelineError::Config(format!("{:#}", e)))?;
        let paths = &self.config.paths;

        let source = open_source(&paths.video_input)
            .map_err(|e| PipelineError::open(OpenStage::VideoInput, e))?;
        let metadata = source.metadata();
        let sink = open_sink(&paths.video_output, &metadata)
            .map_err(|e| PipelineError::open(OpenStage::VideoOutput, e))?;
        let log = DetectionLog::create(&paths.log_path)
            .map_err(|e| PipelineError::open(OpenStage::DetectionLog, e))?;

        log::info!(
            "pipeline: analysing {} with {} (threshold {})",
            paths.video_input,
            self.backend.name(),
            self.config.confidence_threshold
        );
        Ok(OpenResources { source, sink, log })
    }

    fn stream<S, K>(
        &mut self,
        resources: &mut OpenResources<S, K>,
        tally: &mut Tally,
    ) -> Result<(), PipelineError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let OpenResources { source, sink, log } = resources;
        let threshold = self.config.confidence_threshold;
        self.progress.set_length(source.metadata().total_frames);

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(PipelineError::Cancelled {
                    frame_index: tally.frames_processed,
                });
            }
            let Some(frame) = source.next_frame() else {
                log::info!(
                    "pipeline: end of stream after {} frames",
                    tally.frames_processed
                );
                return Ok(());
            };

            let predictions =
                self.backend
                    .infer(&frame)
                    .map_err(|source| PipelineError::Inference {
                        frame_index: frame.index(),
                        source,
                    })?;
            let received = predictions.len();
            let accepted = filter_predictions(predictions, threshold);
            log::debug!(
                "frame #{}: {} predictions, {} accepted",
                frame.index(),
                received,
                accepted.len()
            );
            for prediction in accepted {
                let record = DetectionRecord::new(frame.index(), prediction);
                log.record(&record)
                    .map_err(|e| PipelineError::Log(format!("{:#}", e)))?;
                tally.detections += 1;
            }

            sink.write(&frame)
                .map_err(|e| PipelineError::Encode(format!("{:#}", e)))?;
            tally.frames_processed += 1;
            self.progress.inc(1);
        }
    }

    fn finalize<S, K>(&self, resources: Option<OpenResources<S, K>>) -> Finalized
    where
        S: FrameSource,
        K: FrameSink,
    {
        let Some(OpenResources {
            source,
            mut sink,
            mut log,
        }) = resources
        else {
            return Finalized {
                summary: None,
                frames_written: 0,
                log_path: None,
                error: None,
            };
        };
        let mut error = None;
        let mut summary = None;

        let footer = source.metadata().summary();
        match log.write_summary(&footer) {
            Ok(()) => summary = Some(footer),
            Err(e) => keep_first(&mut error, PipelineError::Log(format!("{:#}", e))),
        }
        if let Err(e) = log.close() {
            keep_first(&mut error, PipelineError::Log(format!("{:#}", e)));
        }

        if let Err(e) = sink.finish() {
            keep_first(&mut error, PipelineError::Encode(format!("{:#}", e)));
        }
        let frames_written = sink.frames_written();

        drop(source);

        Finalized {
            summary,
            frames_written,
            log_path: Some(log.path().to_path_buf()),
            error,
        }
    }

    fn send_alert(&self, log_path: Option<&Path>) -> NotificationOutcome {
        let Some(path) = log_path else {
            log::info!("pipeline: no detection log was created, alert skipped");
            return NotificationOutcome::Skipped;
        };
        match self.notifier.notify(Some(path)) {
            Ok(()) => NotificationOutcome::Sent,
            Err(e) => {
                log::warn!("pipeline: alert not sent: {}", e);
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }
}

fn keep_first(slot: &mut Option<PipelineError>, error: PipelineError) {
    if slot.is_none() {
        *slot = Some(error);
    } else {
        log::warn!("pipeline: {}", error);
    }
}
