use crate::{ArtifactId, RunId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Arm the 1 s elapsed ticker and, for one-shot runs, the estimator.
    StartTimers { run: RunId, estimator: bool },
    /// Emitted exactly once per run, together with its terminal transition.
    CancelTimers { run: RunId },
    ArtifactReleased { id: ArtifactId },
    ArtifactReady { id: ArtifactId, filename: String },
}
