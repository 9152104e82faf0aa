//! visionguard - run one video through the detection pipeline
//!
//! Every frame is sent to the configured prediction endpoint, detections at or
//! above the confidence threshold are written to the detection log, frames are
//! re-encoded to the output video, and an alert with the log attached is
//! mailed to the configured recipient at the end of the run.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vision_guard::ui::Ui;
use vision_guard::{
    AlertNotifier, ConfigOverrides, CustomVisionClient, NotificationOutcome, Pipeline,
    PipelineConfig, PipelineError, RunReport, SmtpMailer,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "VISIONGUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Video to analyse (a local path or `stub://` clip).
    #[arg(long)]
    input: Option<String>,
    /// Where to write the re-encoded video.
    #[arg(long)]
    output: Option<String>,
    /// Detection log path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Minimum prediction probability to record (0..=1).
    #[arg(long)]
    threshold: Option<f64>,
    /// Prediction endpoint URL.
    #[arg(long)]
    endpoint: Option<String>,
    /// Terminal output: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let overrides = ConfigOverrides {
        endpoint: args.endpoint,
        confidence_threshold: args.threshold,
        video_input: args.input,
        video_output: args.output,
        log_path: args.log,
    };
    let config = PipelineConfig::load_with(args.config.as_deref(), &overrides)
        .context("failed to load configuration")?;
    let ui = Ui::from_args(Some(args.ui.as_str()), std::io::stderr().is_terminal());

    let pipeline = {
        let _stage = ui.stage("Preparing services");
        let backend = CustomVisionClient::new(&config.inference);
        log::info!("prediction endpoint: {}", backend.endpoint());
        let mailer = SmtpMailer::new(&config.smtp);
        let notifier = AlertNotifier::from_config(mailer, &config)?;
        Pipeline::new(config, backend, notifier)
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("failed to install interrupt handler: {}", e))?;

    let mut pipeline = pipeline
        .with_cancel_flag(cancel)
        .with_progress(ui.frame_progress());
    let report = pipeline.run();
    print_report(&report);

    match report.error {
        None => Ok(()),
        Some(e) => {
            if let PipelineError::Cancelled { .. } = e {
                log::warn!("interrupted, partial results were finalized");
            }
            eprintln!("visionguard: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &RunReport) {
    log::info!(
        "{:?}: {} frames processed, {} written, {} detections",
        report.state,
        report.frames_processed,
        report.frames_written,
        report.detections
    );
    if let Some(path) = &report.log_path {
        log::info!("detection log: {}", path.display());
    }
    match &report.notification {
        NotificationOutcome::Sent => log::info!("alert delivered"),
        NotificationOutcome::Failed(reason) => log::warn!("alert not delivered: {}", reason),
        NotificationOutcome::Skipped => log::info!("no alert sent"),
    }
}
