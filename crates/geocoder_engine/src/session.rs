//! Run driver.
//!
//! A run is one cooperative task. Between awaits it feeds chunks through the
//! frame decoder and parser into `update`; while awaiting it also services
//! the elapsed ticker and, for one-shot runs, the progress estimator. Both
//! tickers live in a `RunTimers` value owned by the task, so every way out of
//! a run (completion, failure, cancellation, panic) drops them.

use std::future::Future;
use std::time::SystemTime;

use futures_util::{Stream, StreamExt};
use geocoder_core::{
    parse_frame, update, Artifact, Effect, Frame, FrameDecoder, LogEntry, Msg, Phase,
    ProcessingState, ProgressEstimator, ProgressView, RunId, RunMode,
};
use geocoder_logging::{ingest_debug, ingest_info, ingest_warn, set_run_context};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::transport::{ClientSettings, ReqwestTransport, TimerSettings, Transport, UploadRequest};
use crate::{ClientError, FailureKind};

/// What observers receive after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub view: ProgressView,
    /// Log entries appended since the previous update.
    pub entries: Vec<LogEntry>,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, update: SessionUpdate);
}

/// Sink for callers that only need the final state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _update: SessionUpdate) {}
}

pub struct Session<T = ReqwestTransport> {
    transport: T,
    driver: Driver,
}

impl Session<ReqwestTransport> {
    pub fn connect(settings: ClientSettings) -> Result<Self, ClientError> {
        let timers = settings.timers;
        Ok(Self::new(ReqwestTransport::new(settings)?, timers))
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, timers: TimerSettings) -> Self {
        Self {
            transport,
            driver: Driver {
                state: ProcessingState::new(),
                timing: timers,
                last_seen: None,
            },
        }
    }

    pub fn state(&self) -> &ProcessingState {
        &self.driver.state
    }

    /// Streams per-row events until the server completes or fails the run.
    pub async fn run_streaming(
        &mut self,
        upload: &UploadRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let mut timers = self.driver.begin(RunMode::Streaming, upload, sink);

        let opened = self
            .driver
            .drive(self.transport.open_stream(upload), &mut timers, sink, cancel)
            .await;
        let body = match opened {
            None => return Err(self.driver.cancel(&mut timers, sink)),
            Some(Err(err)) => return Err(self.driver.transport_failed(err, &mut timers, sink)),
            Some(Ok(body)) => body,
        };
        self.driver.apply(Msg::RequestSent, &mut timers, sink);

        self.driver.ingest(body, &mut timers, sink, cancel).await
    }

    /// Sends the file to the one-shot endpoint, estimating progress while
    /// waiting for the answer.
    pub async fn run_one_shot(
        &mut self,
        upload: &UploadRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let mut timers = self.driver.begin(RunMode::OneShot, upload, sink);
        self.driver.apply(Msg::RequestSent, &mut timers, sink);

        let answered = self
            .driver
            .drive(self.transport.send_one_shot(upload), &mut timers, sink, cancel)
            .await;
        let response = match answered {
            None => return Err(self.driver.cancel(&mut timers, sink)),
            Some(Err(err)) => return Err(self.driver.transport_failed(err, &mut timers, sink)),
            Some(Ok(response)) => response,
        };

        ingest_info!(
            "one-shot answer: {} bytes, {:?}",
            response.body.len(),
            response.stats
        );
        let artifact = Artifact::from_binary(
            response.body.to_vec(),
            response.filename.as_deref(),
            response.content_type.as_deref(),
        );
        self.driver.apply(
            Msg::OneShotFinished {
                stats: response.stats,
                elapsed_label: response.elapsed_label,
                artifact,
                at: SystemTime::now(),
            },
            &mut timers,
            sink,
        );
        self.driver.outcome()
    }

    /// Tears the session down, releasing any artifact it still holds.
    pub fn dispose(&mut self, sink: &dyn ProgressSink) {
        let mut timers = RunTimers::new(self.driver.timing);
        self.driver.apply(
            Msg::Dispose {
                at: SystemTime::now(),
            },
            &mut timers,
            sink,
        );
    }
}

struct Driver {
    state: ProcessingState,
    timing: TimerSettings,
    last_seen: Option<u64>,
}

impl Driver {
    fn begin(&mut self, mode: RunMode, upload: &UploadRequest, sink: &dyn ProgressSink) -> RunTimers {
        let mut timers = RunTimers::new(self.timing);
        self.apply(
            Msg::RunStarted {
                mode,
                file_name: upload.file_name.clone(),
                at: SystemTime::now(),
            },
            &mut timers,
            sink,
        );
        set_run_context(self.state.run());
        ingest_info!(
            "{:?} run for {} ({} bytes)",
            mode,
            upload.file_name,
            upload.bytes.len()
        );
        timers
    }

    /// Applies `msg` and carries out the timer effects it produced.
    fn apply(&mut self, msg: Msg, timers: &mut RunTimers, sink: &dyn ProgressSink) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        for effect in effects {
            match effect {
                Effect::StartTimers { run, estimator } => timers.arm(run, estimator),
                Effect::CancelTimers { run } => timers.disarm(run),
                Effect::ArtifactReleased { id } => ingest_debug!("{} released", id),
                Effect::ArtifactReady { id, filename } => {
                    ingest_info!("{} ready as {}", id, filename)
                }
            }
        }
        self.publish(sink);
    }

    fn publish(&mut self, sink: &dyn ProgressSink) {
        if !self.state.consume_dirty() {
            return;
        }
        let entries = self.state.entries_after(self.last_seen).to_vec();
        if let Some(last) = entries.last() {
            self.last_seen = Some(last.seq);
        }
        sink.emit(SessionUpdate {
            view: self.state.view(),
            entries,
        });
    }

    /// Awaits `fut` while servicing the tickers. `None` when cancelled.
    async fn drive<F: Future>(
        &mut self,
        fut: F,
        timers: &mut RunTimers,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                output = &mut fut => return Some(output),
                _ = next_tick(&mut timers.elapsed) => {
                    let msg = Msg::ElapsedTick {
                        run: timers.run,
                        elapsed_seconds: timers.started.elapsed().as_secs(),
                    };
                    self.apply(msg, timers, sink);
                }
                _ = next_tick(&mut timers.estimator) => {
                    let percent = timers.model.tick(self.state.progress());
                    let msg = Msg::EstimatorTick { run: timers.run, percent };
                    self.apply(msg, timers, sink);
                }
            }
        }
    }

    async fn ingest<S>(
        &mut self,
        mut body: S,
        timers: &mut RunTimers,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError>
    where
        S: Stream<Item = Result<bytes::Bytes, ClientError>> + Unpin,
    {
        let mut decoder = FrameDecoder::new();
        let mut chunks = 0usize;
        loop {
            let next = match self.drive(body.next(), timers, sink, cancel).await {
                None => return Err(self.cancel(timers, sink)),
                Some(next) => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    chunks += 1;
                    let frames = decoder.feed(&chunk);
                    self.dispatch(frames, timers, sink);
                }
                Some(Err(err)) => return Err(self.transport_failed(err, timers, sink)),
                None => {
                    ingest_debug!("body finished after {} chunks", chunks);
                    let frames = decoder.finish();
                    self.dispatch(frames, timers, sink);
                    break;
                }
            }
            if self.state.phase().is_terminal() {
                // The run is decided; dropping `body` closes the connection.
                ingest_debug!("stopped reading after {} chunks", chunks);
                break;
            }
        }

        if self.state.phase().is_active() {
            let err = ClientError::new(
                FailureKind::Truncated,
                "response ended before the server reported completion",
            );
            return Err(self.transport_failed(err, timers, sink));
        }
        self.outcome()
    }

    fn dispatch(&mut self, frames: Vec<Frame>, timers: &mut RunTimers, sink: &dyn ProgressSink) {
        for frame in frames {
            if self.state.phase().is_terminal() {
                ingest_debug!("discarding frame received after the run ended");
                continue;
            }
            match parse_frame(&frame) {
                Ok(Some(event)) => {
                    ingest_debug!("{} event", event.name());
                    let msg = Msg::Stream {
                        event,
                        at: SystemTime::now(),
                    };
                    self.apply(msg, timers, sink);
                }
                Ok(None) => ingest_debug!("ignoring frame without a known type"),
                Err(err) => ingest_warn!("dropping frame: {}", err),
            }
        }
    }

    fn transport_failed(
        &mut self,
        err: ClientError,
        timers: &mut RunTimers,
        sink: &dyn ProgressSink,
    ) -> ClientError {
        ingest_warn!("run failed: {}", err);
        let msg = Msg::TransportFailed {
            message: err.to_string(),
            at: SystemTime::now(),
        };
        self.apply(msg, timers, sink);
        err
    }

    fn cancel(&mut self, timers: &mut RunTimers, sink: &dyn ProgressSink) -> ClientError {
        ingest_info!("run cancelled");
        let msg = Msg::Dispose {
            at: SystemTime::now(),
        };
        self.apply(msg, timers, sink);
        ClientError::new(FailureKind::Cancelled, "run cancelled")
    }

    fn outcome(&self) -> Result<(), ClientError> {
        match self.state.phase() {
            Phase::Completed => Ok(()),
            _ => Err(ClientError::new(
                FailureKind::StreamFailed,
                self.state.failure().unwrap_or("run did not complete"),
            )),
        }
    }
}

/// Tickers of the run currently being driven.
struct RunTimers {
    timing: TimerSettings,
    run: RunId,
    started: Instant,
    elapsed: Option<Interval>,
    estimator: Option<Interval>,
    model: ProgressEstimator,
}

impl RunTimers {
    fn new(timing: TimerSettings) -> Self {
        Self {
            timing,
            run: 0,
            started: Instant::now(),
            elapsed: None,
            estimator: None,
            model: ProgressEstimator::new(),
        }
    }

    fn arm(&mut self, run: RunId, estimator: bool) {
        let TimerSettings {
            elapsed_period,
            estimator_period,
        } = self.timing;
        self.run = run;
        self.started = Instant::now();
        self.elapsed = Some(ticker(elapsed_period));
        self.estimator = estimator.then(|| ticker(estimator_period));
    }

    fn disarm(&mut self, run: RunId) {
        if run != self.run {
            return;
        }
        self.elapsed = None;
        self.estimator = None;
    }
}

fn ticker(period: std::time::Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
