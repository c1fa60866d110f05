use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use geocoder_core::{LogEntry, LogKind, Phase, ProgressView};
use geocoder_engine::{ProgressSink, SessionUpdate};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "[{bar:30.cyan/blue}] {pos:>3}% | {msg}";

/// Prints new log entries above a progress bar on stdout. When stdout is not
/// a terminal the bar is hidden and changed progress lines are printed
/// instead.
pub struct TerminalSink {
    quiet: bool,
    bar: ProgressBar,
    last_line: Mutex<Option<String>>,
}

impl TerminalSink {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stdout())
        };
        Self::with_bar(quiet, bar)
    }

    fn with_bar(quiet: bool, bar: ProgressBar) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self {
            quiet,
            bar,
            last_line: Mutex::new(None),
        }
    }

    /// Removes the bar before the summary is printed.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for TerminalSink {
    fn emit(&self, update: SessionUpdate) {
        if self.quiet {
            return;
        }
        let message = progress_message(&update.view);
        self.bar.set_position(u64::from(update.view.percent));
        self.bar.set_message(message.clone());

        if !self.bar.is_hidden() {
            for entry in &update.entries {
                self.bar.println(entry_line(entry));
            }
            return;
        }
        for entry in &update.entries {
            println!("{}", entry_line(entry));
        }
        let line = format!("{:>3}% | {message}", update.view.percent);
        let mut last = self.last_line.lock().unwrap_or_else(|p| p.into_inner());
        if update.view.phase.is_active() && last.as_deref() != Some(line.as_str()) {
            println!("{line}");
            *last = Some(line);
        }
    }
}

pub fn entry_line(entry: &LogEntry) -> String {
    let stamp = DateTime::<Local>::from(entry.at).format("%H:%M:%S");
    let row = entry
        .row
        .map(|row| format!(" row {row}"))
        .unwrap_or_default();
    let label = match entry.kind {
        LogKind::Started => "start",
        LogKind::Found => "found",
        LogKind::NotFound => "not found",
        LogKind::RowError => "row error",
        LogKind::Fatal => "error",
        LogKind::ArtifactFailed => "no file",
        LogKind::Completed => "done",
        LogKind::Cancelled => "cancelled",
    };
    let mut detail = Vec::new();
    if let Some(fields) = &entry.fields {
        let place = [&fields.address, &fields.postal_code, &fields.municipality]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if !place.is_empty() {
            detail.push(place);
        }
    }
    if let Some(message) = &entry.message {
        detail.push(message.clone());
    }
    if detail.is_empty() {
        format!("[{stamp}] {label}{row}")
    } else {
        format!("[{stamp}] {label}{row}: {}", detail.join(" - "))
    }
}

/// Counters shown next to the bar.
pub fn progress_message(view: &ProgressView) -> String {
    let rows = if view.total_rows > 0 {
        format!("{}/{}", view.processed, view.total_rows)
    } else {
        view.processed.to_string()
    };
    format!(
        "rows {rows}  found {}  not found {}  errors {}  {}",
        view.found,
        view.not_found,
        view.errors,
        view.elapsed_display()
    )
}

pub fn summary_lines(view: &ProgressView, saved: Option<&Path>) -> Vec<String> {
    let mut lines = Vec::new();
    match view.phase {
        Phase::Completed => {
            let (stats, label) = match &view.summary {
                Some(summary) => (summary.stats, summary.elapsed_label.as_str()),
                None => (Default::default(), ""),
            };
            lines.push(format!(
                "Processed {} rows: {} found, {} not found, {} errors",
                stats.processed, stats.found, stats.not_found, stats.errors
            ));
            if label.is_empty() {
                lines.push(format!("Elapsed {}", view.elapsed_display()));
            } else {
                lines.push(format!("Server time {label}, elapsed {}", view.elapsed_display()));
            }
        }
        Phase::Failed => lines.push(format!(
            "Run failed after {}: {}",
            view.elapsed_display(),
            view.failure.as_deref().unwrap_or("unknown error")
        )),
        Phase::Idle | Phase::Uploading | Phase::Streaming => {}
    }
    if let Some(err) = &view.artifact_error {
        lines.push(format!("Result file unavailable: {err}"));
    }
    if let Some(path) = saved {
        lines.push(format!("Saved {}", path.display()));
    }
    lines
}
