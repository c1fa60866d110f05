use std::time::SystemTime;

use crate::view_model::{ArtifactView, ProgressView};
use crate::{AddressFields, Artifact, RunStats};

pub type RunId = u64;

/// Coarse stage of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Uploading,
    Streaming,
    Completed,
    Failed,
}

impl Phase {
    /// Uploading or Streaming: timers run and events are accepted.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

/// How the server reports progress for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Per-row events over a chunked response.
    #[default]
    Streaming,
    /// A single final response; progress is estimated.
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Started,
    Found,
    NotFound,
    RowError,
    Fatal,
    ArtifactFailed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub kind: LogKind,
    pub row: Option<u64>,
    pub fields: Option<AddressFields>,
    pub message: Option<String>,
    pub at: SystemTime,
}

/// Log entry before it gets its sequence number.
#[derive(Debug, Clone)]
pub(crate) struct LogDraft {
    kind: LogKind,
    row: Option<u64>,
    fields: Option<AddressFields>,
    message: Option<String>,
}

impl LogDraft {
    pub(crate) fn new(kind: LogKind) -> Self {
        Self {
            kind,
            row: None,
            fields: None,
            message: None,
        }
    }

    pub(crate) fn row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }

    pub(crate) fn fields(mut self, fields: AddressFields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub(crate) fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub stats: RunStats,
    pub elapsed_label: String,
}

/// Single source of truth for what the user sees about a run.
///
/// Only `update` mutates it; everything else reads through accessors.
#[derive(Debug, PartialEq, Default)]
pub struct ProcessingState {
    phase: Phase,
    mode: RunMode,
    run: RunId,
    file_name: Option<String>,
    total_rows: u64,
    processed: u64,
    found: u64,
    not_found: u64,
    errors: u64,
    progress: f64,
    elapsed_seconds: u64,
    log: Vec<LogEntry>,
    next_seq: u64,
    summary: Option<RunSummary>,
    artifact: Option<Artifact>,
    artifact_error: Option<String>,
    failure: Option<String>,
    timers_armed: bool,
    dirty: bool,
}

impl ProcessingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> ProgressView {
        ProgressView {
            phase: self.phase,
            mode: self.mode,
            run: self.run,
            percent: self.progress.round().clamp(0.0, 100.0) as u8,
            total_rows: self.total_rows,
            processed: self.processed,
            found: self.found,
            not_found: self.not_found,
            errors: self.errors,
            elapsed_seconds: self.elapsed_seconds,
            log_len: self.log.len(),
            last_seq: self.log.last().map(|entry| entry.seq),
            summary: self.summary.clone(),
            artifact: self.artifact.as_ref().map(|artifact| ArtifactView {
                id: artifact.id(),
                filename: artifact.filename().to_string(),
                content_type: artifact.content_type().to_string(),
                size: artifact.len(),
            }),
            artifact_error: self.artifact_error.clone(),
            failure: self.failure.clone(),
            dirty: self.dirty,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn found(&self) -> u64 {
        self.found
    }

    pub fn not_found(&self) -> u64 {
        self.not_found
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Entries appended after `seq`, or the whole log for `None`.
    pub fn entries_after(&self, seq: Option<u64>) -> &[LogEntry] {
        match seq {
            None => &self.log,
            Some(seq) => {
                let start = self.log.partition_point(|entry| entry.seq <= seq);
                &self.log[start..]
            }
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn artifact_error(&self) -> Option<&str> {
        self.artifact_error.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the elapsed/estimator timers of the current run are live.
    pub fn timers_armed(&self) -> bool {
        self.timers_armed
    }

    /// Returns and clears the render flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Resets the run-scoped fields for a fresh run and returns the artifact
    /// of the previous run, if any. Log sequence numbers keep counting.
    pub(crate) fn begin_run(&mut self, mode: RunMode, file_name: String) -> Option<Artifact> {
        let released = self.artifact.take();
        self.run += 1;
        self.phase = Phase::Uploading;
        self.mode = mode;
        self.file_name = Some(file_name);
        self.total_rows = 0;
        self.processed = 0;
        self.found = 0;
        self.not_found = 0;
        self.errors = 0;
        self.progress = 0.0;
        self.elapsed_seconds = 0;
        self.log.clear();
        self.summary = None;
        self.artifact_error = None;
        self.failure = None;
        self.timers_armed = true;
        self.dirty = true;
        released
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.dirty = true;
        }
    }

    /// Disarms the timers; `true` only for the call that actually disarmed.
    pub(crate) fn disarm_timers(&mut self) -> bool {
        std::mem::take(&mut self.timers_armed)
    }

    pub(crate) fn append(&mut self, draft: LogDraft, at: SystemTime) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.log.push(LogEntry {
            seq,
            kind: draft.kind,
            row: draft.row,
            fields: draft.fields,
            message: draft.message,
            at,
        });
        self.dirty = true;
    }

    pub(crate) fn set_total_rows(&mut self, total: u64) {
        self.total_rows = total;
        self.processed = self.processed.min(total);
        self.dirty = true;
    }

    /// Moves the processed counter, never past a known total.
    pub(crate) fn set_processed(&mut self, processed: u64) {
        self.processed = if self.total_rows > 0 {
            processed.min(self.total_rows)
        } else {
            processed
        };
        self.dirty = true;
    }

    pub(crate) fn record_found(&mut self) {
        self.found += 1;
        self.dirty = true;
    }

    pub(crate) fn record_not_found(&mut self) {
        self.not_found += 1;
        self.dirty = true;
    }

    pub(crate) fn record_error(&mut self) {
        self.errors += 1;
        self.dirty = true;
    }

    /// Progress only moves forward within a run.
    pub(crate) fn raise_progress(&mut self, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.progress {
            self.progress = percent;
            self.dirty = true;
        }
    }

    /// Explicit reset, used when a one-shot run fails.
    pub(crate) fn reset_progress(&mut self) {
        self.progress = 0.0;
        self.dirty = true;
    }

    pub(crate) fn set_elapsed(&mut self, seconds: u64) {
        if seconds != self.elapsed_seconds {
            self.elapsed_seconds = seconds;
            self.dirty = true;
        }
    }

    /// Server counters replace the accumulated ones.
    pub(crate) fn apply_final_stats(&mut self, stats: RunStats, elapsed_label: String) {
        self.processed = stats.processed;
        self.found = stats.found;
        self.not_found = stats.not_found;
        self.errors = stats.errors;
        self.total_rows = self.total_rows.max(stats.processed);
        self.summary = Some(RunSummary {
            stats,
            elapsed_label,
        });
        self.dirty = true;
    }

    /// Installs `artifact` and hands back the one it replaced.
    pub(crate) fn install_artifact(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.dirty = true;
        self.artifact.replace(artifact)
    }

    pub(crate) fn release_artifact(&mut self) -> Option<Artifact> {
        let released = self.artifact.take();
        if released.is_some() {
            self.dirty = true;
        }
        released
    }

    pub(crate) fn set_artifact_error(&mut self, message: String) {
        self.artifact_error = Some(message);
        self.dirty = true;
    }

    pub(crate) fn set_failure(&mut self, message: String) {
        self.failure = Some(message);
        self.dirty = true;
    }
}
