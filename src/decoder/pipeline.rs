//! Synchronous decode pipeline: container → best video stream → frames

use log::{debug, info, trace};

use crate::config::Config;
use crate::container::{InputHandle, InputSource};
use crate::engine::{Engine, FrameDecoder};
use crate::error::{EngineError, MediaError, Result};
use crate::media::{Frame, MediaKind, Packet};

/// Per-session decode settings
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    /// Try hardware backends before the software decoder
    pub hardware: bool,
    pub hardware_backends: Vec<String>,
    /// Forces the input container format
    pub format_hint: Option<String>,
    pub io_buffer_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions::from(&Config::default())
    }
}

impl From<&Config> for DecodeOptions {
    fn from(config: &Config) -> Self {
        DecodeOptions {
            hardware: config.decoder.hardware,
            hardware_backends: config.decoder.hardware_backends.clone(),
            format_hint: config.decoder.format_hint.clone(),
            io_buffer_size: config.io_buffer_size,
        }
    }
}

impl DecodeOptions {
    pub fn with_hardware(mut self, hardware: bool) -> Self {
        self.hardware = hardware;
        self
    }

    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        self.format_hint = Some(hint.into());
        self
    }
}

/// Result of one decode step
#[derive(Debug)]
pub enum DecodeStep {
    Frame(Frame),
    /// The decoder needs more input before it can produce a frame
    Again,
    /// Input exhausted and every buffered frame delivered
    EndOfStream,
}

fn fatal(err: EngineError) -> MediaError {
    MediaError::Fatal(err)
}

pub struct DecodePipeline<E: Engine> {
    input: InputHandle<E>,
    decoder: E::Decoder,
    stream_index: usize,
    backend: Option<String>,
    frame_rate: Option<f64>,
    /// Packet the decoder refused while full
    pending: Option<Packet>,
    draining: bool,
}

impl<E: Engine> DecodePipeline<E> {
    /// Open `source`, select its best video stream and negotiate a decoder.
    ///
    /// Hardware backends are tried in order; the software decoder is the
    /// last resort and the only failure that is reported.
    pub fn open(engine: &E, source: InputSource, options: &DecodeOptions) -> Result<Self> {
        let input = InputHandle::open_with_buffer(
            engine,
            source,
            options.format_hint.as_deref(),
            options.io_buffer_size,
        )?;
        let stream_index = input
            .find_best_stream(MediaKind::Video)
            .ok_or(MediaError::StreamNotFound(MediaKind::Video))?;

        let backends: &[String] = if options.hardware {
            &options.hardware_backends
        } else {
            &[]
        };
        let mut negotiated = None;
        for backend in backends {
            match engine.open_decoder(input.context(), stream_index, Some(backend)) {
                Ok(decoder) => {
                    negotiated = Some((decoder, Some(backend.clone())));
                    break;
                }
                Err(err) => debug!("DecodePipeline: {} decoder unavailable: {}", backend, err),
            }
        }
        let (decoder, backend) = match negotiated {
            Some(found) => found,
            None => {
                let decoder = engine
                    .open_decoder(input.context(), stream_index, None)
                    .map_err(fatal)?;
                (decoder, None)
            }
        };

        let frame_rate = input
            .stream(stream_index)
            .and_then(|stream| stream.frame_rate)
            .filter(|rate| rate.is_valid())
            .map(|rate| rate.as_f64());
        info!(
            "DecodePipeline: stream #{} via {} decoder",
            stream_index,
            backend.as_deref().unwrap_or("software")
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            backend,
            frame_rate,
            pending: None,
            draining: false,
        })
    }

    /// Nominal frame rate of the selected stream, when it states one
    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    /// Hardware backend in use, `None` for software decoding
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Produce at most one frame.
    pub fn decode(&mut self) -> Result<DecodeStep> {
        if let Some(frame) = self.decoder.take().map_err(fatal)? {
            return Ok(DecodeStep::Frame(frame));
        }
        if self.draining {
            return Ok(DecodeStep::EndOfStream);
        }

        let packet = match self.pending.take() {
            Some(packet) => packet,
            None => loop {
                match self.input.read() {
                    Ok(Some(packet)) if packet.stream_index == self.stream_index => break packet,
                    Ok(Some(_)) => continue,
                    Ok(None) => return self.drain(),
                    Err(err) if err.is_transient() => return Ok(DecodeStep::Again),
                    Err(err) => return Err(err),
                }
            },
        };

        match self.decoder.push(&packet) {
            Ok(()) => {}
            Err(err) if err.is_again() => {
                trace!("DecodePipeline: decoder full, retrying pts {:?}", packet.pts);
                self.pending = Some(packet);
                return Ok(DecodeStep::Again);
            }
            Err(err) => return Err(fatal(err)),
        }

        match self.decoder.take() {
            Ok(Some(frame)) => Ok(DecodeStep::Frame(frame)),
            Ok(None) => Ok(DecodeStep::Again),
            Err(err) if err.is_again() => Ok(DecodeStep::Again),
            Err(err) => Err(fatal(err)),
        }
    }

    fn drain(&mut self) -> Result<DecodeStep> {
        debug!("DecodePipeline: input exhausted, draining decoder");
        self.draining = true;
        self.decoder.flush().map_err(fatal)?;
        match self.decoder.take().map_err(fatal)? {
            Some(frame) => Ok(DecodeStep::Frame(frame)),
            None => Ok(DecodeStep::EndOfStream),
        }
    }
}
