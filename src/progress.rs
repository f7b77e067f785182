//! Spinner shown on stderr while a long git operation runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICKS: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

fn running_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn done_style(ok: bool) -> ProgressStyle {
    let template = if ok {
        "\x1b[32m✔\x1b[0m {wide_msg}"
    } else {
        "\x1b[31m✘\x1b[0m {wide_msg}"
    };
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// One-line spinner labelled with the current stage. Draws nothing when
/// stderr is not a terminal.
pub struct StageSpinner {
    pb: ProgressBar,
    label: String,
}

impl StageSpinner {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        let pb = ProgressBar::new_spinner();
        pb.set_style(running_style());
        pb.set_message(label.clone());
        pb.enable_steady_tick(Duration::from_millis(80));
        Self { pb, label }
    }

    pub fn stage(&self, what: &str) {
        self.pb.set_message(format!("{}: {what}", self.label));
    }

    pub fn finish(&self, ok: bool, detail: &str) {
        self.pb.set_style(done_style(ok));
        self.pb.finish_with_message(format!("{} ({detail})", self.label));
    }
}
