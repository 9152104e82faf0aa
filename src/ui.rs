use indicatif::{HumanDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Spinner (or a plain line) for setup work before the frame loop.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(name.to_string());
            spinner
        } else {
            log::info!("{}", name);
            ProgressBar::hidden()
        };
        StageGuard {
            name: name.to_string(),
            spinner,
        }
    }

    /// Per-frame bar for the analysis loop. Hidden in plain mode.
    ///
    /// The pipeline sets the length once the source reports its frame count.
    pub fn frame_progress(&self) -> ProgressBar {
        if !self.use_pretty() {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{msg} {bar:40.cyan/blue} {pos}/{len} frames [{elapsed_precise}<{eta_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message("Processing video");
        bar
    }
}

pub struct StageGuard {
    name: String,
    spinner: ProgressBar,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = HumanDuration(self.spinner.elapsed());
        if self.spinner.is_hidden() {
            log::debug!("{} done in {}", self.name, elapsed);
        } else {
            self.spinner
                .finish_with_message(format!("{} ready ({})", self.name, elapsed));
        }
    }
}
