//! Split one container into a video-only and an audio-only output

use log::{debug, info};

use crate::Flow;
use crate::config::Config;
use crate::container::{InputHandle, InputSource, OutputHandle, OutputSink};
use crate::engine::{Engine, FfmpegEngine};
use crate::error::{MediaError, Result};
use crate::media::{MediaKind, Packet, to_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxerState {
    Idle,
    InputOpened,
    OutputsOpened,
    Flushing,
    Closed,
}

impl DemuxerState {
    pub fn description(&self) -> &'static str {
        match self {
            DemuxerState::Idle => "idle",
            DemuxerState::InputOpened => "input opened",
            DemuxerState::OutputsOpened => "outputs opened",
            DemuxerState::Flushing => "flushing",
            DemuxerState::Closed => "closed",
        }
    }
}

/// Container name for an elementary video stream of `codec`.
pub fn video_format_for_codec(codec: &str) -> String {
    match codec {
        "mpeg4" => "m4v",
        "av1" => "obu",
        "vp8" | "vp9" => "ivf",
        other => other,
    }
    .to_string()
}

/// One selected input stream and the single-stream output it feeds
struct Route<E: Engine> {
    input_index: usize,
    output: OutputHandle<E>,
    /// Last presentation time seen, in milliseconds
    pts_ms: i64,
}

impl<E: Engine> Route<E> {
    fn forward(&mut self, mut packet: Packet) -> Result<()> {
        if let Some(pts) = packet.pts {
            self.pts_ms = self.pts_ms.max(to_millis(pts, packet.time_base));
        }

        packet.stream_index = 0;
        if let Some(stream) = self.output.stream(0) {
            if stream.time_base != packet.time_base {
                packet.rescale_ts(stream.time_base);
            }
        }
        self.output.write(packet)
    }
}

/// Routes the packets of one input container into independent video and
/// audio outputs.
///
/// ```no_run
/// # use avsplice::{Demuxer, InputSource, OutputSink};
/// let mut demuxer = Demuxer::new();
/// demuxer.open_input(InputSource::path("movie.mp4"), None)?;
/// demuxer.open_video_output(OutputSink::path("movie.h264"))?;
/// demuxer.open_audio_output(OutputSink::path("movie.aac"))?;
/// while !demuxer.flush()?.is_end_of_stream() {}
/// demuxer.close()?;
/// # Ok::<(), avsplice::MediaError>(())
/// ```
pub struct Demuxer<E: Engine = FfmpegEngine> {
    engine: E,
    config: Config,
    state: DemuxerState,
    input: Option<InputHandle<E>>,
    video: Option<Route<E>>,
    audio: Option<Route<E>>,
}

impl Demuxer<FfmpegEngine> {
    pub fn new() -> Self {
        Self::with_engine(FfmpegEngine::new(), Config::default())
    }
}

impl Default for Demuxer<FfmpegEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Demuxer<E> {
    pub fn with_engine(engine: E, config: Config) -> Self {
        Self {
            engine,
            config,
            state: DemuxerState::Idle,
            input: None,
            video: None,
            audio: None,
        }
    }

    pub fn state(&self) -> DemuxerState {
        self.state
    }

    pub fn open_input(&mut self, source: InputSource, format_hint: Option<&str>) -> Result<()> {
        if self.state != DemuxerState::Idle {
            return Err(MediaError::invalid_state("open an input", self.state.description()));
        }

        let input = InputHandle::open_with_buffer(
            &self.engine,
            source,
            format_hint,
            self.config.io_buffer_size,
        )?;
        self.input = Some(input);
        self.state = DemuxerState::InputOpened;
        Ok(())
    }

    /// Open the video-only output. Its container follows the input codec.
    pub fn open_video_output(&mut self, sink: OutputSink) -> Result<()> {
        self.open_output(MediaKind::Video, sink)
    }

    /// Open the audio-only output, written as `audio_output_format`.
    pub fn open_audio_output(&mut self, sink: OutputSink) -> Result<()> {
        self.open_output(MediaKind::Audio, sink)
    }

    fn open_output(&mut self, kind: MediaKind, sink: OutputSink) -> Result<()> {
        let (Some(input), DemuxerState::InputOpened | DemuxerState::OutputsOpened) =
            (&self.input, self.state)
        else {
            return Err(MediaError::invalid_state("open an output", self.state.description()));
        };
        let slot_taken = match kind {
            MediaKind::Video => self.video.is_some(),
            MediaKind::Audio => self.audio.is_some(),
            MediaKind::Other => return Err(MediaError::StreamNotFound(kind)),
        };
        if slot_taken {
            return Err(MediaError::invalid_state("open an output twice", self.state.description()));
        }

        let index = input
            .find_best_stream(kind)
            .ok_or(MediaError::StreamNotFound(kind))?;
        let params = input
            .codec_parameters(index)
            .ok_or(MediaError::StreamNotFound(kind))?;
        let format = match kind {
            MediaKind::Video => {
                let codec = input.stream(index).map(|s| s.codec.as_str()).unwrap_or_default();
                video_format_for_codec(codec)
            }
            _ => self.config.audio_output_format.clone(),
        };

        let mut output = OutputHandle::open_with_buffer(
            &self.engine,
            sink,
            Some(&format),
            self.config.io_buffer_size,
        )?;
        output.new_stream(kind, &params)?;
        output.write_header()?;
        info!("Demuxer: {} stream #{} -> {} ({})", kind, index, output.label(), format);

        let route = Route {
            input_index: index,
            output,
            pts_ms: -1,
        };
        match kind {
            MediaKind::Video => self.video = Some(route),
            _ => self.audio = Some(route),
        }
        self.state = DemuxerState::OutputsOpened;
        Ok(())
    }

    /// Move one packet from the input to the output of its kind.
    ///
    /// Packets of streams that were not selected are dropped.
    pub fn flush(&mut self) -> Result<Flow> {
        let input = match (&mut self.input, self.state) {
            (
                Some(input),
                DemuxerState::InputOpened | DemuxerState::OutputsOpened | DemuxerState::Flushing,
            ) => input,
            _ => return Err(MediaError::invalid_state("flush", self.state.description())),
        };
        self.state = DemuxerState::Flushing;

        let packet = match input.read() {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(Flow::EndOfStream),
            Err(err) if err.is_transient() => return Ok(Flow::Again),
            Err(err) => return Err(err),
        };

        for (kind, route) in [
            (MediaKind::Video, &mut self.video),
            (MediaKind::Audio, &mut self.audio),
        ] {
            if let Some(route) = route.as_mut().filter(|r| r.input_index == packet.stream_index) {
                route.forward(packet)?;
                return Ok(Flow::Written(kind));
            }
        }
        Ok(Flow::Dropped)
    }

    /// Write the trailer of every opened output, video first.
    ///
    /// Stops at the first failure. Calling again retries only the outputs
    /// that were not finalized yet.
    pub fn close(&mut self) -> Result<()> {
        for route in [&mut self.video, &mut self.audio].into_iter().flatten() {
            route.output.write_trailer()?;
        }
        if self.state != DemuxerState::Closed {
            debug!("Demuxer: closed");
        }
        self.state = DemuxerState::Closed;
        Ok(())
    }

    /// Last video presentation time in milliseconds, -1 before the first one.
    pub fn video_pts(&self) -> i64 {
        self.video.as_ref().map_or(-1, |route| route.pts_ms)
    }

    /// Last audio presentation time in milliseconds, -1 before the first one.
    pub fn audio_pts(&self) -> i64 {
        self.audio.as_ref().map_or(-1, |route| route.pts_ms)
    }

    pub fn input(&self) -> Option<&InputHandle<E>> {
        self.input.as_ref()
    }

    pub fn video_output(&self) -> Option<&OutputHandle<E>> {
        self.video.as_ref().map(|route| &route.output)
    }

    pub fn audio_output(&self) -> Option<&OutputHandle<E>> {
        self.audio.as_ref().map(|route| &route.output)
    }
}
