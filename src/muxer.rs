//! Merge a video input and an audio input into one container
//!
//! Video timestamps are synthesized from the nominal frame rate rather than
//! copied, with a small step applied to the frame interval whenever the
//! audio timeline drifts away from the video one. Audio keeps the packet
//! durations its source states.

use log::{debug, info, trace};

use crate::Flow;
use crate::config::Config;
use crate::container::{InputHandle, InputSource, OutputHandle, OutputSink};
use crate::engine::{Engine, FfmpegEngine};
use crate::error::{MediaError, Result};
use crate::media::{MediaKind, Packet, Rational, TimeBase, rescale};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    Idle,
    InputsOpened,
    OutputReady,
    Flushing,
    Closed,
}

impl MuxerState {
    pub fn description(&self) -> &'static str {
        match self {
            MuxerState::Idle => "idle",
            MuxerState::InputsOpened => "inputs opened",
            MuxerState::OutputReady => "output ready",
            MuxerState::Flushing => "flushing",
            MuxerState::Closed => "closed",
        }
    }
}

/// One input feeding one output stream
struct Track<E: Engine> {
    input: InputHandle<E>,
    /// Selected stream inside `input`
    stream_index: usize,
    /// Matching stream inside the output, once registered
    output_index: Option<usize>,
    /// Synthesized timestamp in output ticks
    cursor: i64,
    exhausted: bool,
}

impl<E: Engine> Track<E> {
    fn open(
        engine: &E,
        config: &Config,
        kind: MediaKind,
        source: InputSource,
        hint: Option<&str>,
    ) -> Result<Self> {
        let input = InputHandle::open_with_buffer(engine, source, hint, config.io_buffer_size)?;
        let stream_index = input
            .find_best_stream(kind)
            .ok_or(MediaError::StreamNotFound(kind))?;
        Ok(Self {
            input,
            stream_index,
            output_index: None,
            cursor: 0,
            exhausted: false,
        })
    }

    /// Next packet of the selected stream, skipping the others.
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.exhausted {
            return Ok(None);
        }
        while let Some(packet) = self.input.read()? {
            if packet.stream_index == self.stream_index {
                return Ok(Some(packet));
            }
        }
        self.exhausted = true;
        Ok(None)
    }

    /// Move the cursor past `duration` ticks.
    fn advance(&mut self, kind: MediaKind, duration: i64) -> Result<i64> {
        self.cursor = self
            .cursor
            .checked_add(duration)
            .ok_or(MediaError::TimestampOverflow(kind))?;
        Ok(self.cursor)
    }
}

/// Frame interval in ticks of `time_base` for `rate` frames per second.
fn frame_ticks(rate: f64, time_base: TimeBase) -> i64 {
    ((1.0 / (rate * time_base.as_f64())).round() as i64).max(1)
}

/// Combines independent video and audio inputs into a single output.
///
/// Each pump call moves at most one packet per kind; callers loop on
/// [`Muxer::flush`] until it reports [`Flow::EndOfStream`].
pub struct Muxer<E: Engine = FfmpegEngine> {
    engine: E,
    config: Config,
    state: MuxerState,
    video: Option<Track<E>>,
    audio: Option<Track<E>>,
    output: Option<OutputHandle<E>>,
    frame_rate: Option<f64>,
}

impl Muxer<FfmpegEngine> {
    pub fn new() -> Self {
        Self::with_engine(FfmpegEngine::new(), Config::default())
    }
}

impl Default for Muxer<FfmpegEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Muxer<E> {
    /// Invalid timing values in `config` are replaced by their defaults.
    pub fn with_engine(engine: E, config: Config) -> Self {
        Self {
            engine,
            config: config.sanitized(),
            state: MuxerState::Idle,
            video: None,
            audio: None,
            output: None,
            frame_rate: None,
        }
    }

    pub fn state(&self) -> MuxerState {
        self.state
    }

    pub fn open_video_input(
        &mut self,
        source: InputSource,
        format_hint: Option<&str>,
    ) -> Result<()> {
        self.open_input(MediaKind::Video, source, format_hint)
    }

    pub fn open_audio_input(
        &mut self,
        source: InputSource,
        format_hint: Option<&str>,
    ) -> Result<()> {
        self.open_input(MediaKind::Audio, source, format_hint)
    }

    fn open_input(
        &mut self,
        kind: MediaKind,
        source: InputSource,
        format_hint: Option<&str>,
    ) -> Result<()> {
        if !matches!(self.state, MuxerState::Idle | MuxerState::InputsOpened) {
            return Err(MediaError::invalid_state("open an input", self.state.description()));
        }
        let slot = match kind {
            MediaKind::Video => &mut self.video,
            _ => &mut self.audio,
        };
        if slot.is_some() {
            return Err(MediaError::invalid_state(
                "open an input twice",
                self.state.description(),
            ));
        }

        *slot = Some(Track::open(&self.engine, &self.config, kind, source, format_hint)?);
        self.state = MuxerState::InputsOpened;
        Ok(())
    }

    /// Override the nominal video frame rate used to synthesize durations.
    pub fn set_video_frame_rate(&mut self, fps: f64) {
        self.frame_rate = (fps.is_finite() && fps > 0.0).then_some(fps);
    }

    /// Create the output, copy one stream per open input and write the
    /// header.
    pub fn open_output(&mut self, sink: OutputSink, format_name: Option<&str>) -> Result<()> {
        if self.state != MuxerState::InputsOpened {
            return Err(MediaError::invalid_state("open the output", self.state.description()));
        }

        let mut output = OutputHandle::open_with_buffer(
            &self.engine,
            sink,
            format_name,
            self.config.io_buffer_size,
        )?;
        for (kind, track) in [
            (MediaKind::Video, &mut self.video),
            (MediaKind::Audio, &mut self.audio),
        ] {
            let Some(track) = track else { continue };
            let params = track
                .input
                .codec_parameters(track.stream_index)
                .ok_or(MediaError::StreamNotFound(kind))?;
            track.output_index = Some(output.new_stream(kind, &params)?);
        }
        output.write_header()?;
        info!("Muxer: writing {}", output.label());

        self.output = Some(output);
        self.state = MuxerState::OutputReady;
        Ok(())
    }

    fn begin_flush(&mut self) -> Result<()> {
        match self.state {
            MuxerState::OutputReady | MuxerState::Flushing => {
                self.state = MuxerState::Flushing;
                Ok(())
            }
            state => Err(MediaError::invalid_state("flush", state.description())),
        }
    }

    fn nominal_frame_rate(&self, track: &Track<E>) -> f64 {
        self.frame_rate
            .or_else(|| {
                track
                    .input
                    .stream(track.stream_index)
                    .and_then(|stream| stream.frame_rate)
                    .filter(Rational::is_valid)
                    .map(|rate| rate.as_f64())
                    .filter(|&rate| rate > 0.0)
            })
            .unwrap_or(self.config.default_frame_rate)
    }

    /// Output time base of the stream fed by `track`.
    fn output_time_base(&self, track: &Track<E>) -> Option<TimeBase> {
        let index = track.output_index?;
        Some(self.output.as_ref()?.stream(index)?.time_base)
    }

    /// Frame interval scale for the next video packet: shorter while the
    /// audio timeline is ahead, longer while it lags.
    fn drift_scale(&self) -> f64 {
        let (Some(video), Some(audio)) = (&self.video, &self.audio) else {
            return 1.0;
        };
        let (Some(video_tb), Some(audio_tb)) =
            (self.output_time_base(video), self.output_time_base(audio))
        else {
            return 1.0;
        };

        let video_us = rescale(video.cursor, video_tb, Rational::MICROSECONDS);
        let audio_us = rescale(audio.cursor, audio_tb, Rational::MICROSECONDS);
        let step = self.config.drift_correction;
        match audio_us.cmp(&video_us) {
            std::cmp::Ordering::Greater => 1.0 - step,
            std::cmp::Ordering::Less => 1.0 + step,
            std::cmp::Ordering::Equal => 1.0,
        }
    }

    /// Write the next video packet with a synthesized timestamp.
    pub fn flush_video(&mut self) -> Result<Flow> {
        self.begin_flush()?;
        let Some(track) = self.video.as_ref() else {
            return Ok(Flow::EndOfStream);
        };
        let (Some(output_index), Some(output_tb)) =
            (track.output_index, self.output_time_base(track))
        else {
            return Err(MediaError::invalid_state("flush video", "without a video output stream"));
        };
        let rate = self.nominal_frame_rate(track) / self.drift_scale();

        let track = self.video.as_mut().ok_or(MediaError::StreamNotFound(MediaKind::Video))?;
        let Some(mut packet) = track.next_packet()? else {
            debug!("Muxer: video input exhausted");
            return Ok(Flow::EndOfStream);
        };

        packet.duration = frame_ticks(rate, packet.time_base);
        packet.rescale_ts(output_tb);
        let pts = track.advance(MediaKind::Video, packet.duration)?;
        packet.pts = Some(pts);
        packet.dts = Some(pts);
        packet.stream_index = output_index;
        trace!("Muxer: video pts {} at {:.3}fps", pts, rate);

        self.write(packet)?;
        Ok(Flow::Written(MediaKind::Video))
    }

    /// Write the next audio packet, keeping its own duration.
    pub fn flush_audio(&mut self) -> Result<Flow> {
        self.begin_flush()?;
        let Some(track) = self.audio.as_ref() else {
            return Ok(Flow::EndOfStream);
        };
        let (Some(output_index), Some(output_tb)) =
            (track.output_index, self.output_time_base(track))
        else {
            return Err(MediaError::invalid_state("flush audio", "without an audio output stream"));
        };

        let track = self.audio.as_mut().ok_or(MediaError::StreamNotFound(MediaKind::Audio))?;
        let Some(mut packet) = track.next_packet()? else {
            debug!("Muxer: audio input exhausted");
            return Ok(Flow::EndOfStream);
        };

        packet.rescale_ts(output_tb);
        let pts = track.advance(MediaKind::Audio, packet.duration)?;
        packet.pts = Some(pts);
        packet.dts = Some(pts);
        packet.stream_index = output_index;

        self.write(packet)?;
        Ok(Flow::Written(MediaKind::Audio))
    }

    fn write(&mut self, packet: Packet) -> Result<()> {
        match self.output.as_mut() {
            Some(output) => output.write(packet),
            None => Err(MediaError::invalid_state("write", self.state.description())),
        }
    }

    /// Pump video once, then audio once.
    ///
    /// Transient engine conditions are swallowed and reported as
    /// [`Flow::Again`]; `EndOfStream` means every open input is exhausted.
    pub fn flush(&mut self) -> Result<Flow> {
        self.begin_flush()?;

        let mut result = Flow::EndOfStream;
        let pumps: [(bool, fn(&mut Self) -> Result<Flow>); 2] = [
            (self.video.is_some(), Self::flush_video),
            (self.audio.is_some(), Self::flush_audio),
        ];
        for (open, pump) in pumps {
            if !open {
                continue;
            }
            match pump(self) {
                Ok(Flow::EndOfStream) => {}
                Ok(flow) => {
                    if !matches!(result, Flow::Written(_)) {
                        result = flow;
                    }
                }
                Err(err) if err.is_transient() => {
                    debug!("Muxer: transient {}", err);
                    if result == Flow::EndOfStream {
                        result = Flow::Again;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    /// Write the output trailer. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.write_trailer()?;
        }
        self.state = MuxerState::Closed;
        Ok(())
    }

    /// Synthesized video timestamp in output ticks
    pub fn video_cursor(&self) -> Option<i64> {
        self.video.as_ref().map(|track| track.cursor)
    }

    /// Synthesized audio timestamp in output ticks
    pub fn audio_cursor(&self) -> Option<i64> {
        self.audio.as_ref().map(|track| track.cursor)
    }

    pub fn video_input(&self) -> Option<&InputHandle<E>> {
        self.video.as_ref().map(|track| &track.input)
    }

    pub fn audio_input(&self) -> Option<&InputHandle<E>> {
        self.audio.as_ref().map(|track| &track.input)
    }

    pub fn output(&self) -> Option<&OutputHandle<E>> {
        self.output.as_ref()
    }
}
