//! Plain-text detection log.
//!
//! One line per accepted detection, followed by a two-line footer:
//!
//! ```text
//! Frame #3 - prediction with probability 0.91 located at -> left: 0.1, top: 0.2, width: 0.3, height: 0.4. TAG: knife
//! TOTAL FRAMES: 120
//! FPS: 30
//! ```
//!
//! The log is append-only. Lines are never rewritten, and the footer can be
//! written once.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::detect::DetectionRecord;
use crate::frame::RunSummary;

pub struct DetectionLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records_written: u64,
    summary_written: bool,
}

impl DetectionLog {
    /// Create (or truncate) the log file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create detection log {}", path.display()))?;
        log::info!("detection log: writing {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            records_written: 0,
            summary_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn summary_written(&self) -> bool {
        self.summary_written
    }

    /// Append one detection line.
    pub fn record(&mut self, record: &DetectionRecord) -> Result<()> {
        if self.summary_written {
            return Err(anyhow!(
                "detection log {} already has its footer",
                self.path.display()
            ));
        }
        let writer = self.writer()?;
        writeln!(writer, "{}", record)
            .with_context(|| format!("append to detection log {}", self.path.display()))?;
        self.records_written += 1;
        Ok(())
    }

    /// Append the `TOTAL FRAMES` / `FPS` footer. Fails if already written.
    pub fn write_summary(&mut self, summary: &RunSummary) -> Result<()> {
        if self.summary_written {
            return Err(anyhow!(
                "detection log {} already has its footer",
                self.path.display()
            ));
        }
        let writer = self.writer()?;
        write!(
            writer,
            "TOTAL FRAMES: {}\nFPS: {}\n",
            summary.total_frames, summary.frame_rate
        )
        .with_context(|| format!("write footer to detection log {}", self.path.display()))?;
        self.summary_written = true;
        log::info!(
            "detection log: {} detections, {} frames @ {} fps",
            self.records_written,
            summary.total_frames,
            summary.frame_rate
        );
        Ok(())
    }

    /// Flush and close the file. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .flush()
            .with_context(|| format!("flush detection log {}", self.path.display()))?;
        writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("sync detection log {}", self.path.display()))?;
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| anyhow!("detection log {} is closed", path.display()))
    }
}

impl Drop for DetectionLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("{:#}", e);
        }
    }
}
