use std::sync::Once;
use std::time::SystemTime;

use geocoder_core::{
    parse_frame, update, Artifact, Effect, Event, FrameDecoder, LogKind, Msg, Phase,
    ProcessingState, RunMode, RunStats,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(geocoder_logging::initialize_for_tests);
}

fn start(state: ProcessingState, mode: RunMode) -> (ProcessingState, Vec<Effect>) {
    update(
        state,
        Msg::RunStarted {
            mode,
            file_name: "direcciones.xlsx".to_string(),
            at: SystemTime::now(),
        },
    )
}

/// Drives raw stream text through decoder, parser and state machine,
/// dropping frames that fail to parse.
fn ingest(mut state: ProcessingState, text: &str) -> (ProcessingState, Vec<Effect>) {
    let mut effects = Vec::new();
    let mut decoder = FrameDecoder::new();
    let mut frames = decoder.feed(text.as_bytes());
    frames.extend(decoder.finish());
    for frame in frames {
        let Ok(Some(event)) = parse_frame(&frame) else {
            continue;
        };
        let (next, mut produced) = send(state, event);
        state = next;
        effects.append(&mut produced);
    }
    (state, effects)
}

fn send(state: ProcessingState, event: Event) -> (ProcessingState, Vec<Effect>) {
    update(
        state,
        Msg::Stream {
            event,
            at: SystemTime::now(),
        },
    )
}

fn completion(file: Option<&str>) -> String {
    let file = file
        .map(|f| format!(r#","file":"{f}","filename":"resultado.xlsx""#))
        .unwrap_or_default();
    format!(
        "data: {{\"type\":\"complete\",\"stats\":{{\"procesadas\":2,\"encontradas\":1,\"no_encontradas\":1,\"errores\":0}},\"elapsed\":\"5s\"{file}}}\n"
    )
}

const START_2: &str = "data: {\"type\":\"start\",\"total\":2}\n";
const ROW_1: &str = "data: {\"type\":\"progress\",\"stats\":{\"procesadas\":1},\"total\":2,\"status\":\"found\",\"row\":1,\"direccion\":\"A\",\"municipio\":\"M\",\"cp\":\"28001\"}\n";

#[test]
fn three_frame_run_completes() {
    init_logging();
    let (state, effects) = start(ProcessingState::new(), RunMode::Streaming);
    assert_eq!(state.phase(), Phase::Uploading);
    assert_eq!(
        effects,
        vec![Effect::StartTimers {
            run: 1,
            estimator: false
        }]
    );

    let text = format!("{START_2}{ROW_1}{}", completion(None));
    let (state, effects) = ingest(state, &text);

    assert_eq!(state.phase(), Phase::Completed);
    assert_eq!(state.total_rows(), 2);
    assert_eq!(state.processed(), 2);
    assert_eq!(state.found(), 1);
    assert_eq!(state.not_found(), 1);
    assert_eq!(state.errors(), 0);
    assert_eq!(state.progress(), 100.0);
    assert_eq!(effects, vec![Effect::CancelTimers { run: 1 }]);

    let kinds: Vec<LogKind> = state.log().iter().map(|entry| entry.kind).collect();
    assert_eq!(kinds, vec![LogKind::Started, LogKind::Found, LogKind::Completed]);
    let row = &state.log()[1];
    assert_eq!(row.row, Some(1));
    assert_eq!(row.fields.as_ref().unwrap().postal_code, "28001");
    assert_eq!(state.summary().unwrap().elapsed_label, "5s");
}

#[test]
fn progress_follows_processed_over_total() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let mut text = String::from("data: {\"type\":\"start\",\"total\":10}\n");
    for row in 1..=4 {
        text.push_str(&format!(
            "data: {{\"type\":\"progress\",\"status\":\"not_found\",\"row\":{row}}}\n"
        ));
    }
    let (state, _) = ingest(state, &text);

    assert_eq!(state.processed(), 4);
    assert_eq!(state.progress(), 40.0);
    assert_eq!(state.view().percent, 40);
    assert_eq!(state.phase(), Phase::Streaming);
}

#[test]
fn unknown_total_leaves_progress_unchanged() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, _) = ingest(
        state,
        "data: {\"type\":\"progress\",\"status\":\"found\",\"row\":1}\n",
    );
    assert_eq!(state.phase(), Phase::Streaming);
    assert_eq!(state.total_rows(), 0);
    assert_eq!(state.processed(), 1);
    assert_eq!(state.progress(), 0.0);
}

#[test]
fn processed_never_exceeds_known_total() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let text = "data: {\"type\":\"start\",\"total\":1}\n\
                data: {\"type\":\"progress\",\"stats\":{\"procesadas\":5},\"status\":\"found\",\"row\":1}\n\
                data: {\"type\":\"row_error\",\"row\":2,\"error\":\"x\"}\n";
    let (state, _) = ingest(state, text);
    assert_eq!(state.processed(), 1);
    assert_eq!(state.progress(), 100.0);
}

#[test]
fn huge_reported_count_saturates_instead_of_overflowing() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let text = "data: {\"type\":\"progress\",\"stats\":{\"procesadas\":18446744073709551615},\"status\":\"found\",\"row\":1}\n\
                data: {\"type\":\"progress\",\"stats\":{\"procesadas\":5},\"status\":\"not_found\",\"row\":2}\n\
                data: {\"type\":\"progress\",\"status\":\"found\",\"row\":3}\n\
                data: {\"type\":\"row_error\",\"row\":4,\"error\":\"x\"}\n";
    let (state, _) = ingest(state, text);
    assert_eq!(state.phase(), Phase::Streaming);
    assert_eq!(state.processed(), u64::MAX);
    assert_eq!((state.found(), state.not_found(), state.errors()), (2, 1, 1));
    assert_eq!(state.log().len(), 4);
}

#[test]
fn malformed_frame_does_not_touch_counters() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, _) = ingest(state, START_2);
    let before = state.view();

    let (state, effects) = ingest(state, "data: {not json\n");
    assert_eq!(state.view(), before);
    assert!(effects.is_empty());

    let (state, _) = ingest(state, ROW_1);
    assert_eq!(state.found(), 1);
}

#[test]
fn row_errors_are_logged_and_processing_continues() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let text = format!(
        "{START_2}data: {{\"type\":\"row_error\",\"row\":1,\"error\":\"geocoder timeout\"}}\n{ROW_1}"
    );
    let (state, _) = ingest(state, &text);

    assert_eq!(state.phase(), Phase::Streaming);
    assert_eq!(state.errors(), 1);
    assert_eq!(state.found(), 1);
    let entry = &state.log()[1];
    assert_eq!(entry.kind, LogKind::RowError);
    assert_eq!(entry.row, Some(1));
    assert_eq!(entry.message.as_deref(), Some("geocoder timeout"));
}

#[test]
fn error_event_fails_run_and_keeps_what_was_collected() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let text = format!("{START_2}{ROW_1}data: {{\"type\":\"error\",\"message\":\"boom\"}}\n");
    let (state, effects) = ingest(state, &text);

    assert_eq!(state.phase(), Phase::Failed);
    assert_eq!(state.failure(), Some("boom"));
    assert_eq!(state.found(), 1);
    assert_eq!(state.progress(), 50.0);
    assert_eq!(state.log().len(), 3);
    assert_eq!(state.log()[2].kind, LogKind::Fatal);
    assert_eq!(effects, vec![Effect::CancelTimers { run: 1 }]);

    // Frames read after the fatal event no longer change the run.
    let (state, effects) = ingest(state, &completion(Some("AAEC")));
    assert_eq!(state.phase(), Phase::Failed);
    assert!(state.artifact().is_none());
    assert_eq!(state.log().len(), 3);
    assert!(effects.is_empty());
}

#[test]
fn transport_failure_cancels_timers_once() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, _) = update(state, Msg::RequestSent);
    assert_eq!(state.phase(), Phase::Streaming);

    let (state, effects) = update(
        state,
        Msg::TransportFailed {
            message: "connection reset".to_string(),
            at: SystemTime::now(),
        },
    );
    assert_eq!(state.phase(), Phase::Failed);
    assert_eq!(effects, vec![Effect::CancelTimers { run: 1 }]);
    assert!(!state.timers_armed());

    let (state, effects) = update(
        state,
        Msg::TransportFailed {
            message: "again".to_string(),
            at: SystemTime::now(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.log().len(), 1);
}

#[test]
fn completion_counts_are_authoritative() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let text = format!(
        "data: {{\"type\":\"start\",\"total\":5}}\n{ROW_1}{}",
        completion(None)
    );
    let (state, _) = ingest(state, &text);
    assert_eq!(state.processed(), 2);
    assert_eq!(state.found(), 1);
    assert_eq!(state.not_found(), 1);
    assert_eq!(state.total_rows(), 5);
    assert_eq!(state.progress(), 100.0);
}

#[test]
fn completion_installs_decoded_artifact() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, effects) = ingest(state, &format!("{START_2}{}", completion(Some("AAEC"))));

    let artifact = state.artifact().expect("artifact installed");
    assert_eq!(artifact.bytes(), &[0, 1, 2]);
    assert_eq!(artifact.filename(), "resultado.xlsx");
    assert_eq!(
        effects,
        vec![
            Effect::ArtifactReady {
                id: artifact.id(),
                filename: "resultado.xlsx".to_string()
            },
            Effect::CancelTimers { run: 1 },
        ]
    );
}

#[test]
fn bad_artifact_payload_completes_with_distinct_error() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, effects) = ingest(state, &format!("{START_2}{}", completion(Some("AA*C"))));

    assert_eq!(state.phase(), Phase::Completed);
    assert_eq!(state.found(), 1);
    assert!(state.artifact().is_none());
    assert!(state.artifact_error().is_some());
    assert!(state.failure().is_none());
    let kinds: Vec<LogKind> = state.log().iter().map(|entry| entry.kind).collect();
    assert_eq!(
        kinds,
        vec![LogKind::Started, LogKind::ArtifactFailed, LogKind::Completed]
    );
    assert_eq!(effects, vec![Effect::CancelTimers { run: 1 }]);
}

#[test]
fn new_runs_release_the_previous_artifact() {
    init_logging();
    let mut state = ProcessingState::new();
    let mut previous = None;
    for run in 1..=4u64 {
        let (next, effects) = start(state, RunMode::Streaming);
        match previous {
            Some(id) => assert!(effects.contains(&Effect::ArtifactReleased { id })),
            None => assert!(!effects
                .iter()
                .any(|e| matches!(e, Effect::ArtifactReleased { .. }))),
        }
        assert!(next.artifact().is_none());
        let (next, _) = ingest(next, &format!("{START_2}{}", completion(Some("AAEC"))));
        assert_eq!(next.run(), run);
        let id = next.artifact().expect("one live artifact").id();
        assert_ne!(Some(id), previous);
        previous = Some(id);
        state = next;
    }
}

#[test]
fn sequence_ids_keep_increasing_across_runs() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, _) = ingest(state, &format!("{START_2}{ROW_1}"));
    let first_run_last = state.log().last().unwrap().seq;

    let (state, _) = start(state, RunMode::Streaming);
    assert!(state.log().is_empty());
    let (state, _) = ingest(state, &format!("{START_2}{ROW_1}{}", completion(None)));

    let seqs: Vec<u64> = state.log().iter().map(|entry| entry.seq).collect();
    assert!(seqs[0] > first_run_last);
    assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(state.entries_after(Some(seqs[0])).len(), 2);
    assert_eq!(state.entries_after(None).len(), 3);
}

#[test]
fn one_shot_estimator_ticks_are_bounded_and_superseded_by_completion() {
    init_logging();
    let (state, effects) = start(ProcessingState::new(), RunMode::OneShot);
    assert_eq!(
        effects,
        vec![Effect::StartTimers {
            run: 1,
            estimator: true
        }]
    );
    let (state, _) = update(state, Msg::RequestSent);
    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 42.5 });
    assert_eq!(state.progress(), 42.5);
    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 30.0 });
    assert_eq!(state.progress(), 42.5);
    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 100.0 });
    assert_eq!(state.progress(), 99.0);

    let (state, effects) = update(
        state,
        Msg::OneShotFinished {
            stats: RunStats {
                processed: 3,
                found: 2,
                not_found: 1,
                errors: 0,
            },
            elapsed_label: "2.1s".to_string(),
            artifact: Artifact::from_binary(vec![1, 2, 3], None, None),
            at: SystemTime::now(),
        },
    );
    assert_eq!(state.phase(), Phase::Completed);
    assert_eq!(state.progress(), 100.0);
    assert_eq!(state.found(), 2);
    assert!(effects.contains(&Effect::CancelTimers { run: 1 }));

    // A tick that was already queued must not overwrite the terminal value.
    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 12.0 });
    assert_eq!(state.progress(), 100.0);
}

#[test]
fn one_shot_failure_resets_progress() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::OneShot);
    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 63.0 });
    let (state, _) = update(
        state,
        Msg::TransportFailed {
            message: "http status 500".to_string(),
            at: SystemTime::now(),
        },
    );
    assert_eq!(state.phase(), Phase::Failed);
    assert_eq!(state.progress(), 0.0);

    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 70.0 });
    assert_eq!(state.progress(), 0.0);
}

#[test]
fn ticks_for_other_runs_are_dropped() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::OneShot);
    let (state, _) = start(state, RunMode::OneShot);
    assert_eq!(state.run(), 2);

    let (state, _) = update(
        state,
        Msg::ElapsedTick {
            run: 1,
            elapsed_seconds: 9,
        },
    );
    let (state, _) = update(state, Msg::EstimatorTick { run: 1, percent: 50.0 });
    assert_eq!(state.elapsed_seconds(), 0);
    assert_eq!(state.progress(), 0.0);

    let (state, _) = update(
        state,
        Msg::ElapsedTick {
            run: 2,
            elapsed_seconds: 3,
        },
    );
    assert_eq!(state.elapsed_seconds(), 3);
    assert_eq!(state.view().elapsed_display(), "00:03");
}

#[test]
fn restarting_an_active_run_cancels_its_timers() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (_, effects) = start(state, RunMode::Streaming);
    assert_eq!(
        effects,
        vec![
            Effect::CancelTimers { run: 1 },
            Effect::StartTimers {
                run: 2,
                estimator: false
            },
        ]
    );
}

#[test]
fn dispose_cancels_active_run_and_releases_artifact() {
    init_logging();
    let (state, _) = start(ProcessingState::new(), RunMode::Streaming);
    let (state, effects) = update(
        state,
        Msg::Dispose {
            at: SystemTime::now(),
        },
    );
    assert_eq!(state.phase(), Phase::Failed);
    assert_eq!(state.log().last().unwrap().kind, LogKind::Cancelled);
    assert_eq!(effects, vec![Effect::CancelTimers { run: 1 }]);

    let (state, _) = start(state, RunMode::Streaming);
    let (state, _) = ingest(state, &format!("{START_2}{}", completion(Some("AAEC"))));
    let id = state.artifact().unwrap().id();
    let (state, effects) = update(
        state,
        Msg::Dispose {
            at: SystemTime::now(),
        },
    );
    assert_eq!(state.phase(), Phase::Completed);
    assert!(state.artifact().is_none());
    assert_eq!(effects, vec![Effect::ArtifactReleased { id }]);
}

#[test]
fn events_before_a_run_are_ignored() {
    init_logging();
    let (state, effects) = ingest(ProcessingState::new(), &format!("{START_2}{ROW_1}"));
    assert_eq!(state.phase(), Phase::Idle);
    assert!(state.log().is_empty());
    assert!(effects.is_empty());
}
