use std::time::SystemTime;

use geocoder_logging::{ingest_debug, ingest_warn};

use crate::estimator::ESTIMATE_CEILING;
use crate::parse::derive_percent;
use crate::state::LogDraft;
use crate::{
    Artifact, ArtifactError, Completion, Effect, Event, LogKind, Msg, Phase, ProcessingState,
    RowResult, RowStatus, RunMode, RunStats,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ProcessingState, msg: Msg) -> (ProcessingState, Vec<Effect>) {
    let effects = match msg {
        Msg::RunStarted {
            mode,
            file_name,
            at: _,
        } => start_run(&mut state, mode, file_name),
        Msg::RequestSent => {
            if state.phase() == Phase::Uploading {
                state.set_phase(Phase::Streaming);
            }
            Vec::new()
        }
        Msg::Stream { event, at } => apply_event(&mut state, event, at),
        Msg::TransportFailed { message, at } => {
            if state.phase().is_active() {
                fail_run(&mut state, LogKind::Fatal, message, at)
            } else {
                ingest_warn!(
                    "transport failure after run ended ({:?}): {}",
                    state.phase(),
                    message
                );
                Vec::new()
            }
        }
        Msg::OneShotFinished {
            stats,
            elapsed_label,
            artifact,
            at,
        } => {
            if state.phase().is_active() {
                complete_run(&mut state, stats, elapsed_label, Some(Ok(artifact)), at)
            } else {
                ingest_warn!(
                    "dropping one-shot result in phase {:?}; {} bytes released",
                    state.phase(),
                    artifact.len()
                );
                Vec::new()
            }
        }
        Msg::ElapsedTick {
            run,
            elapsed_seconds,
        } => {
            if accepts_tick(&state, run) {
                state.set_elapsed(elapsed_seconds);
            }
            Vec::new()
        }
        Msg::EstimatorTick { run, percent } => {
            if accepts_tick(&state, run) && state.mode() == RunMode::OneShot {
                state.raise_progress(percent.min(ESTIMATE_CEILING));
            } else {
                ingest_debug!("stale estimator tick for run {} dropped", run);
            }
            Vec::new()
        }
        Msg::Dispose { at } => dispose(&mut state, at),
    };

    (state, effects)
}

fn accepts_tick(state: &ProcessingState, run: crate::RunId) -> bool {
    run == state.run() && state.phase().is_active() && state.timers_armed()
}

fn start_run(state: &mut ProcessingState, mode: RunMode, file_name: String) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(3);
    if state.disarm_timers() {
        effects.push(Effect::CancelTimers { run: state.run() });
    }
    if let Some(previous) = state.begin_run(mode, file_name) {
        effects.push(Effect::ArtifactReleased { id: previous.id() });
    }
    effects.push(Effect::StartTimers {
        run: state.run(),
        estimator: mode == RunMode::OneShot,
    });
    effects
}

fn apply_event(state: &mut ProcessingState, event: Event, at: SystemTime) -> Vec<Effect> {
    if !state.phase().is_active() {
        ingest_warn!("ignoring `{}` event in phase {:?}", event.name(), state.phase());
        return Vec::new();
    }

    match event {
        Event::Start { total } => {
            state.set_phase(Phase::Streaming);
            state.set_total_rows(total);
            state.append(
                LogDraft::new(LogKind::Started).message(format!("{total} rows to process")),
                at,
            );
            Vec::new()
        }
        Event::RowResult(result) => {
            state.set_phase(Phase::Streaming);
            record_row(state, result, at);
            Vec::new()
        }
        Event::RowError { row, message } => {
            state.set_phase(Phase::Streaming);
            state.set_processed(state.processed().saturating_add(1));
            state.record_error();
            state.append(LogDraft::new(LogKind::RowError).row(row).message(message), at);
            refresh_progress(state);
            Vec::new()
        }
        Event::Error { message } => fail_run(state, LogKind::Fatal, message, at),
        Event::Complete(Completion {
            stats,
            elapsed_label,
            artifact_base64,
            filename,
        }) => {
            let artifact = artifact_base64
                .map(|payload| Artifact::from_base64(&payload, filename.as_deref(), None));
            complete_run(state, stats, elapsed_label, artifact, at)
        }
    }
}

fn record_row(state: &mut ProcessingState, result: RowResult, at: SystemTime) {
    let RowResult {
        row,
        status,
        fields,
        processed,
        total,
    } = result;

    if state.total_rows() == 0 {
        if let Some(total) = total.filter(|total| *total > 0) {
            state.set_total_rows(total);
        }
    }
    let processed = processed.unwrap_or_else(|| state.processed().saturating_add(1));
    state.set_processed(processed.max(state.processed()));

    let kind = match status {
        RowStatus::Found => {
            state.record_found();
            LogKind::Found
        }
        RowStatus::NotFound => {
            state.record_not_found();
            LogKind::NotFound
        }
    };
    state.append(LogDraft::new(kind).row(row).fields(fields), at);
    refresh_progress(state);
}

fn refresh_progress(state: &mut ProcessingState) {
    if let Some(percent) = derive_percent(state.processed(), state.total_rows()) {
        state.raise_progress(percent);
    }
}

fn fail_run(
    state: &mut ProcessingState,
    kind: LogKind,
    message: String,
    at: SystemTime,
) -> Vec<Effect> {
    state.append(LogDraft::new(kind).message(message.clone()), at);
    state.set_failure(message);
    if state.mode() == RunMode::OneShot {
        state.reset_progress();
    }
    state.set_phase(Phase::Failed);
    cancel_timers(state)
}

fn complete_run(
    state: &mut ProcessingState,
    stats: RunStats,
    elapsed_label: String,
    artifact: Option<Result<Artifact, ArtifactError>>,
    at: SystemTime,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    state.apply_final_stats(stats, elapsed_label.clone());
    state.raise_progress(100.0);

    match artifact {
        Some(Ok(artifact)) => {
            let (id, filename) = (artifact.id(), artifact.filename().to_string());
            if let Some(previous) = state.install_artifact(artifact) {
                effects.push(Effect::ArtifactReleased { id: previous.id() });
            }
            effects.push(Effect::ArtifactReady { id, filename });
        }
        Some(Err(err)) => {
            ingest_warn!("result file could not be decoded: {}", err);
            state.append(
                LogDraft::new(LogKind::ArtifactFailed).message(err.to_string()),
                at,
            );
            state.set_artifact_error(err.to_string());
        }
        None => {}
    }

    let message = if elapsed_label.is_empty() {
        format!("{} rows processed", stats.processed)
    } else {
        format!("{} rows processed in {}", stats.processed, elapsed_label)
    };
    state.append(LogDraft::new(LogKind::Completed).message(message), at);
    state.set_phase(Phase::Completed);
    effects.extend(cancel_timers(state));
    effects
}

fn dispose(state: &mut ProcessingState, at: SystemTime) -> Vec<Effect> {
    let mut effects = Vec::new();
    if state.phase().is_active() {
        state.append(
            LogDraft::new(LogKind::Cancelled).message("run cancelled"),
            at,
        );
        state.set_failure("run cancelled".to_string());
        state.set_phase(Phase::Failed);
    }
    effects.extend(cancel_timers(state));
    if let Some(artifact) = state.release_artifact() {
        effects.push(Effect::ArtifactReleased { id: artifact.id() });
    }
    effects
}

fn cancel_timers(state: &mut ProcessingState) -> Vec<Effect> {
    if state.disarm_timers() {
        vec![Effect::CancelTimers { run: state.run() }]
    } else {
        Vec::new()
    }
}
