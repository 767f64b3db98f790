//! Background decode sessions
//!
//! [`AsyncDecoder`] owns a worker thread that opens a source, negotiates a
//! hardware or software video decoder and hands every decoded frame to the
//! caller's [`DecodeHooks`].

mod async_decoder;
mod hooks;
pub mod pipeline;
mod state;
mod stop;

pub use async_decoder::AsyncDecoder;
pub use hooks::{DecodeHooks, NoopHooks};
pub use pipeline::{DecodeOptions, DecodePipeline, DecodeStep};
pub use state::SessionState;
pub use stop::StopFlag;
