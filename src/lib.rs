//! Stream splitting, re-muxing and background decoding on top of FFmpeg.
//!
//! - [`Demuxer`] splits one container into a video-only and an audio-only
//!   output.
//! - [`Muxer`] merges a video input and an audio input into one output,
//!   synthesizing video timestamps with drift correction.
//! - [`AsyncDecoder`] runs a decode session on a worker thread and reports
//!   frames through [`DecodeHooks`].
//!
//! Pump operations never block on a timer; callers loop on them until
//! [`Flow::EndOfStream`].

pub mod config;
pub mod container;
pub mod decoder;
pub mod demuxer;
pub mod engine;
pub mod error;
pub mod media;
pub mod muxer;

pub use config::Config;
pub use container::{InputHandle, InputSource, OutputHandle, OutputSink};
pub use decoder::{AsyncDecoder, DecodeHooks, DecodeOptions, NoopHooks, SessionState, StopFlag};
pub use demuxer::Demuxer;
pub use error::{EngineError, MediaError, Result};
pub use media::{Frame, MediaKind, Packet, Rational, StreamDescriptor, TimeBase};
pub use muxer::Muxer;

/// Outcome of one pump step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// A packet of this kind reached an output
    Written(MediaKind),
    /// A packet was read but belongs to no open output
    Dropped,
    /// The engine needs more input, try again
    Again,
    /// Every input involved is exhausted
    EndOfStream,
}

impl Flow {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Flow::EndOfStream)
    }
}
