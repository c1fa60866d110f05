use std::time::SystemTime;

use crate::{Artifact, Event, RunId, RunMode, RunStats};

#[derive(Debug, PartialEq)]
pub enum Msg {
    /// User submitted a file; a new run begins.
    RunStarted {
        mode: RunMode,
        file_name: String,
        at: SystemTime,
    },
    /// Request is on the wire and the transport has no separate upload phase.
    RequestSent,
    /// Event parsed from the streaming response.
    Stream { event: Event, at: SystemTime },
    /// Network error, rejected status or aborted read.
    TransportFailed { message: String, at: SystemTime },
    /// One-shot response arrived with its out-of-band summary.
    OneShotFinished {
        stats: RunStats,
        elapsed_label: String,
        artifact: Artifact,
        at: SystemTime,
    },
    /// Elapsed-time ticker for `run`.
    ElapsedTick { run: RunId, elapsed_seconds: u64 },
    /// Synthetic progress produced by the estimator for `run`.
    EstimatorTick { run: RunId, percent: f64 },
    /// The owning context is going away.
    Dispose { at: SystemTime },
}
