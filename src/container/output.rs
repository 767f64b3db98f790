use log::{debug, info, warn};

use super::io::{DEFAULT_IO_BUFFER_SIZE, OutputSink, OutputStream};
use crate::engine::{Engine, OutputBuilder, OutputContext};
use crate::error::{MediaError, Result};
use crate::media::{MediaKind, Packet, StreamDescriptor};

enum OutputState<E: Engine> {
    /// Streams are being registered, nothing written yet
    Pending {
        builder: E::OutputBuilder,
        stream: OutputStream,
    },
    /// Header written, packets accepted
    Writing(E::Output),
    /// Trailer written (or attempted), or the header never made it out
    Finalized,
}

impl<E: Engine> OutputState<E> {
    fn name(&self) -> &'static str {
        match self {
            OutputState::Pending { .. } => "pending",
            OutputState::Writing(_) => "writing",
            OutputState::Finalized => "finalized",
        }
    }
}

/// Writable container handle.
///
/// Enforces `new_stream* → write_header → write* → write_trailer`, each of
/// the header and trailer emitted at most once.
pub struct OutputHandle<E: Engine> {
    state: OutputState<E>,
    label: String,
}

impl<E: Engine> OutputHandle<E> {
    /// Prepare an output. With no `format_name` a path sink's extension
    /// decides the container.
    pub fn open(engine: &E, sink: OutputSink, format_name: Option<&str>) -> Result<Self> {
        Self::open_with_buffer(engine, sink, format_name, DEFAULT_IO_BUFFER_SIZE)
    }

    pub fn open_with_buffer(
        engine: &E,
        sink: OutputSink,
        format_name: Option<&str>,
        buffer_size: usize,
    ) -> Result<Self> {
        let label = sink.describe();
        let file_name = match &sink {
            OutputSink::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            OutputSink::Callback(_) => None,
        };

        let format_name = format_name.filter(|name| !name.is_empty());
        let builder = engine
            .create_output(format_name, file_name.as_deref())
            .map_err(|err| MediaError::open(&label, err))?;
        let stream = sink
            .open(buffer_size)
            .map_err(|err| MediaError::open(&label, err.into()))?;

        debug!("OutputHandle: prepared {}", label);
        Ok(Self {
            state: OutputState::Pending { builder, stream },
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Allocate one output stream carrying a copy of `params`.
    pub fn new_stream(&mut self, kind: MediaKind, params: &E::Params) -> Result<usize> {
        match &mut self.state {
            OutputState::Pending { builder, .. } => builder
                .add_stream(params)
                .map_err(|source| MediaError::StreamCopy { kind, source }),
            state => Err(MediaError::invalid_state("add a stream", state.name())),
        }
    }

    pub fn stream_count(&self) -> usize {
        match &self.state {
            OutputState::Pending { builder, .. } => builder.stream_count(),
            OutputState::Writing(context) => context.streams().len(),
            OutputState::Finalized => 0,
        }
    }

    /// Output stream as finalized by the header.
    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        match &self.state {
            OutputState::Writing(context) => context.streams().get(index),
            _ => None,
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, OutputState::Finalized) {
            OutputState::Pending { builder, stream } => {
                let context = builder.write_header(stream).map_err(MediaError::HeaderWrite)?;
                info!("OutputHandle: header written to {}", self.label);
                for stream in context.streams() {
                    info!("OutputHandle:   {}", stream);
                }
                self.state = OutputState::Writing(context);
                Ok(())
            }
            state => {
                let name = state.name();
                self.state = state;
                Err(MediaError::invalid_state("write a header", name))
            }
        }
    }

    pub fn write(&mut self, packet: Packet) -> Result<()> {
        match &mut self.state {
            OutputState::Writing(context) => context.write(packet).map_err(MediaError::Io),
            state => Err(MediaError::invalid_state("write a packet", state.name())),
        }
    }

    /// Emit the trailer. Outputs whose header never went out are simply
    /// finalized; finalized outputs are left alone.
    pub fn write_trailer(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, OutputState::Finalized) {
            OutputState::Writing(context) => {
                context.write_trailer().map_err(MediaError::TrailerWrite)?;
                info!("OutputHandle: trailer written to {}", self.label);
                Ok(())
            }
            OutputState::Pending { .. } => {
                debug!("OutputHandle: {} closed before its header", self.label);
                Ok(())
            }
            OutputState::Finalized => Ok(()),
        }
    }

    /// Header written and trailer still pending
    pub fn is_open(&self) -> bool {
        matches!(self.state, OutputState::Writing(_))
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, OutputState::Finalized)
    }
}

impl<E: Engine> Drop for OutputHandle<E> {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("OutputHandle: {} dropped without trailer", self.label);
        }
    }
}
