use log::{error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use super::hooks::{DecodeHooks, NoopHooks};
use super::pipeline::{DecodeOptions, DecodePipeline, DecodeStep};
use super::state::{AtomicSessionState, SessionState};
use super::stop::StopFlag;
use crate::container::InputSource;
use crate::engine::{Engine, FfmpegEngine};

const NO_FRAME_RATE: f64 = -1.0;

/// State published by the worker, readable from any thread
#[derive(Debug)]
struct Shared {
    state: AtomicSessionState,
    frame_rate: AtomicU64,
}

impl Shared {
    fn set_frame_rate(&self, fps: f64) {
        self.frame_rate.store(fps.to_bits(), Ordering::Release);
    }

    fn frame_rate(&self) -> f64 {
        f64::from_bits(self.frame_rate.load(Ordering::Acquire))
    }
}

struct Session<H> {
    stop: StopFlag,
    worker: JoinHandle<H>,
}

/// Runs one decode session at a time on a dedicated worker thread.
///
/// The hooks move into the worker for the duration of a session and come
/// back when it is joined, so their state can be inspected after
/// [`AsyncDecoder::stop`].
pub struct AsyncDecoder<H: DecodeHooks = NoopHooks, E: Engine = FfmpegEngine> {
    engine: Arc<E>,
    hooks: Option<H>,
    session: Option<Session<H>>,
    shared: Arc<Shared>,
}

impl<H: DecodeHooks> AsyncDecoder<H, FfmpegEngine> {
    pub fn new(hooks: H) -> Self {
        Self::with_engine(FfmpegEngine::new(), hooks)
    }
}

impl Default for AsyncDecoder<NoopHooks, FfmpegEngine> {
    fn default() -> Self {
        Self::new(NoopHooks)
    }
}

impl<H: DecodeHooks, E: Engine> AsyncDecoder<H, E> {
    pub fn with_engine(engine: E, hooks: H) -> Self {
        Self {
            engine: Arc::new(engine),
            hooks: Some(hooks),
            session: None,
            shared: Arc::new(Shared {
                state: AtomicSessionState::new(SessionState::Created),
                frame_rate: AtomicU64::new(NO_FRAME_RATE.to_bits()),
            }),
        }
    }

    /// Start a decode session. Returns `false` while another one is still
    /// running; a session that already finished on its own is joined first.
    pub fn start(&mut self, source: InputSource, options: DecodeOptions) -> bool {
        if self.is_running() {
            return false;
        }
        self.stop();

        let Some(hooks) = self.hooks.take() else {
            error!("AsyncDecoder: hooks lost by a panicked session");
            return false;
        };

        let stop = StopFlag::new();
        self.shared.set_frame_rate(NO_FRAME_RATE);
        self.shared.state.transition(SessionState::Initializing);

        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        let worker_stop = stop.clone();
        let spawned = thread::Builder::new()
            .name("avsplice-decode".into())
            .spawn(move || run_session(&*engine, source, options, hooks, &worker_stop, &shared));

        match spawned {
            Ok(worker) => {
                self.session = Some(Session { stop, worker });
                true
            }
            Err(err) => {
                error!("AsyncDecoder: unable to spawn worker: {}", err);
                self.shared.state.transition(SessionState::Failed);
                false
            }
        }
    }

    /// Request cancellation and wait for the worker to finish.
    ///
    /// Returns once `on_close` has run. Does nothing without a session.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.stop.cancel();

        match session.worker.join() {
            Ok(hooks) => self.hooks = Some(hooks),
            Err(_) => {
                error!("AsyncDecoder: decode worker panicked");
                self.shared.state.transition(SessionState::Failed);
            }
        }
    }

    /// A worker is attached and has not finished yet.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.worker.is_finished())
    }

    /// Nominal frame rate of the current source.
    ///
    /// Negative until a video stream has been selected, 0 when the stream
    /// does not state a rate.
    pub fn frame_rate(&self) -> f64 {
        self.shared.frame_rate()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.load()
    }

    /// Hooks, available while no session holds them
    pub fn hooks(&self) -> Option<&H> {
        self.hooks.as_ref()
    }

    pub fn hooks_mut(&mut self) -> Option<&mut H> {
        self.hooks.as_mut()
    }
}

impl<H: DecodeHooks, E: Engine> Drop for AsyncDecoder<H, E> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker body: decode, then close the hooks exactly once and publish the
/// final state. A panicking hook fails the session instead of losing the
/// hooks with the thread.
fn run_session<E: Engine, H: DecodeHooks>(
    engine: &E,
    source: InputSource,
    options: DecodeOptions,
    mut hooks: H,
    stop: &StopFlag,
    shared: &Shared,
) -> H {
    let mut outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        decode_session(engine, source, &options, &mut hooks, stop, shared)
    }))
    .unwrap_or_else(|_| {
        error!("AsyncDecoder: decode hook panicked");
        SessionState::Failed
    });

    if panic::catch_unwind(AssertUnwindSafe(|| hooks.on_close(stop))).is_err() {
        error!("AsyncDecoder: close hook panicked");
        outcome = SessionState::Failed;
    }
    shared.state.transition(outcome);
    hooks
}

fn decode_session<E: Engine, H: DecodeHooks>(
    engine: &E,
    source: InputSource,
    options: &DecodeOptions,
    hooks: &mut H,
    stop: &StopFlag,
    shared: &Shared,
) -> SessionState {
    let mut pipeline = match DecodePipeline::open(engine, source, options) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("AsyncDecoder: initialization failed: {}", err);
            return SessionState::Failed;
        }
    };

    shared.set_frame_rate(pipeline.frame_rate().unwrap_or(0.0));
    shared.state.transition(SessionState::Running);
    hooks.on_init(stop);

    let mut outcome = SessionState::Closed;
    let mut frames = 0u64;
    while !stop.cancelled() {
        match pipeline.decode() {
            Ok(DecodeStep::Frame(frame)) => {
                frames += 1;
                hooks.on_decode(stop, frame);
            }
            Ok(DecodeStep::Again) => {}
            Ok(DecodeStep::EndOfStream) => {
                info!("AsyncDecoder: end of stream after {} frames", frames);
                break;
            }
            Err(err) => {
                warn!("AsyncDecoder: decoding stopped after {} frames: {}", frames, err);
                outcome = SessionState::Failed;
                break;
            }
        }
    }

    outcome
}
