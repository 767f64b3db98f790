use super::stop::StopFlag;
use crate::media::Frame;

/// Callbacks of one decode session.
///
/// All of them run on the worker thread, one at a time, and block decoding
/// while they run. A hook may request the end of the session through the
/// [`StopFlag`] it receives; it must not call [`super::AsyncDecoder::stop`].
///
/// A panic inside a hook ends the session as failed. `on_close` still runs
/// and the hooks are handed back to the decoder.
pub trait DecodeHooks: Send + 'static {
    /// The decoder is ready, before the first frame.
    fn on_init(&mut self, _stop: &StopFlag) {}

    /// One decoded frame, now owned by the hook.
    fn on_decode(&mut self, _stop: &StopFlag, _frame: Frame) {}

    /// Called exactly once per session, also when initialization failed.
    fn on_close(&mut self, _stop: &StopFlag) {}
}

/// Hooks that ignore every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl DecodeHooks for NoopHooks {}
