use crate::{ArtifactId, Phase, RunId, RunMode, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactView {
    pub id: ArtifactId,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressView {
    pub phase: Phase,
    pub mode: RunMode,
    pub run: RunId,
    pub percent: u8,
    pub total_rows: u64,
    pub processed: u64,
    pub found: u64,
    pub not_found: u64,
    pub errors: u64,
    pub elapsed_seconds: u64,
    pub log_len: usize,
    pub last_seq: Option<u64>,
    pub summary: Option<RunSummary>,
    pub artifact: Option<ArtifactView>,
    pub artifact_error: Option<String>,
    pub failure: Option<String>,
    pub dirty: bool,
}

impl ProgressView {
    /// `mm:ss`, or `h:mm:ss` past the hour.
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

pub fn format_elapsed(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
