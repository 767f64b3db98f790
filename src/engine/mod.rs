//! Codec / container engine interface
//!
//! Everything that actually parses, writes or decodes bitstreams lives
//! behind these traits. The demux, mux and decode components only move
//! packets between contexts and keep their timelines consistent.
//!
//! The production backend is [`FfmpegEngine`]; unit tests drive the
//! components through a scripted in-memory engine instead.

mod ffmpeg;

#[cfg(test)]
pub(crate) mod mock;

pub use ffmpeg::{FfmpegDecoder, FfmpegEngine, FfmpegInput, FfmpegOutput, FfmpegOutputBuilder};

use crate::container::io::{InputStream, OutputStream};
use crate::error::EngineError;
use crate::media::{Frame, Packet, StreamDescriptor};

/// Factory for container and codec contexts
pub trait Engine: Send + Sync + 'static {
    /// Opaque codec parameters, cloned verbatim from input to output streams
    type Params: Clone + Send + 'static;
    type Input: InputContext<Params = Self::Params>;
    type OutputBuilder: OutputBuilder<Params = Self::Params, Output = Self::Output>;
    type Output: OutputContext;
    type Decoder: FrameDecoder;

    /// Open and probe an input container. `format_hint` forces the demuxer,
    /// otherwise it is detected from the content.
    ///
    /// Probe failures carry [`crate::error::EngineErrorKind::Probe`].
    fn open_input(
        &self,
        stream: InputStream,
        format_hint: Option<&str>,
    ) -> Result<Self::Input, EngineError>;

    /// Prepare an output container. The format is looked up by name or,
    /// when no name is given, guessed from `file_name`.
    fn create_output(
        &self,
        format_name: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<Self::OutputBuilder, EngineError>;

    /// Open a decoder for one stream of `input`. `backend` names a hardware
    /// backend; `None` selects the software decoder.
    fn open_decoder(
        &self,
        input: &Self::Input,
        stream_index: usize,
        backend: Option<&str>,
    ) -> Result<Self::Decoder, EngineError>;
}

/// Readable container
pub trait InputContext: Send {
    type Params;

    fn streams(&self) -> &[StreamDescriptor];

    fn codec_parameters(&self, index: usize) -> Option<Self::Params>;

    /// Next packet in container order, `None` once the input is exhausted.
    fn read(&mut self) -> Result<Option<Packet>, EngineError>;
}

/// Output container whose streams are still being registered
pub trait OutputBuilder: Send {
    type Params;
    type Output: OutputContext;

    /// Register a stream carrying a copy of `params`; returns its index.
    fn add_stream(&mut self, params: &Self::Params) -> Result<usize, EngineError>;

    fn stream_count(&self) -> usize;

    /// Emit the container header into `stream`.
    fn write_header(self, stream: OutputStream) -> Result<Self::Output, EngineError>;
}

/// Writable container, header already emitted
pub trait OutputContext: Send {
    /// Streams as finalized by the header, with the time bases the
    /// container actually uses.
    fn streams(&self) -> &[StreamDescriptor];

    fn write(&mut self, packet: Packet) -> Result<(), EngineError>;

    /// Emit the trailer and flush the byte stream.
    fn write_trailer(self) -> Result<(), EngineError>;
}

/// Packet to frame decoder
pub trait FrameDecoder: Send {
    /// Feed one packet. A full decoder reports an `Again` error and leaves
    /// the packet with the caller for a later retry.
    fn push(&mut self, packet: &Packet) -> Result<(), EngineError>;

    /// Signal end of input so buffered frames can be drained.
    fn flush(&mut self) -> Result<(), EngineError>;

    /// Next decoded frame, `None` if the decoder needs more input.
    fn take(&mut self) -> Result<Option<Frame>, EngineError>;
}
