use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame};
use ac_ffmpeg::codec::{CodecParameters, Decoder};
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo, InputFormat};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::format::muxer::{Muxer, MuxerBuilder, OutputFormat};
use ac_ffmpeg::format::stream::Stream;
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase as FfTimeBase, Timestamp};
use bytes::Bytes;
use std::io::Write;

use super::{Engine, FrameDecoder, InputContext, OutputBuilder, OutputContext};
use crate::container::io::{InputStream, OutputStream};
use crate::error::EngineError;
use crate::media::{Frame, MediaKind, Packet, Plane, Rational, StreamDescriptor, TimeBase};

/// Engine backed by the system FFmpeg libraries.
///
/// Hardware decoding is selected by decoder name: backend `cuvid` for an
/// `h264` stream opens the `h264_cuvid` decoder, and so on.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for FfmpegEngine {
    type Params = CodecParameters;
    type Input = FfmpegInput;
    type OutputBuilder = FfmpegOutputBuilder;
    type Output = FfmpegOutput;
    type Decoder = FfmpegDecoder;

    fn open_input(
        &self,
        stream: InputStream,
        format_hint: Option<&str>,
    ) -> Result<FfmpegInput, EngineError> {
        let input_format = match format_hint {
            Some(name) => Some(
                InputFormat::find_by_name(name)
                    .ok_or_else(|| EngineError::new(format!("unknown input format `{}`", name)))?,
            ),
            None => None,
        };

        let io = if stream.is_seekable() {
            IO::from_seekable_read_stream(stream)
        } else {
            IO::from_read_stream(stream)
        };

        let demuxer = Demuxer::builder()
            .input_format(input_format)
            .build(io)?
            .find_stream_info(None)
            .map_err(|(_, err)| EngineError::probe(err.to_string()))?;

        let streams = demuxer
            .streams()
            .iter()
            .enumerate()
            .map(|(index, stream)| describe_stream(index, stream))
            .collect();

        Ok(FfmpegInput { demuxer, streams })
    }

    fn create_output(
        &self,
        format_name: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<FfmpegOutputBuilder, EngineError> {
        let format = match (format_name, file_name) {
            (Some(name), _) => OutputFormat::find_by_name(name)
                .ok_or_else(|| EngineError::new(format!("unknown output format `{}`", name)))?,
            (None, Some(file)) => OutputFormat::guess_from_file_name(file).ok_or_else(|| {
                EngineError::new(format!("unable to guess output format for `{}`", file))
            })?,
            (None, None) => return Err(EngineError::new("no output format given")),
        };

        Ok(FfmpegOutputBuilder {
            builder: Muxer::builder(),
            format,
            streams: 0,
        })
    }

    fn open_decoder(
        &self,
        input: &FfmpegInput,
        stream_index: usize,
        backend: Option<&str>,
    ) -> Result<FfmpegDecoder, EngineError> {
        let stream = input
            .demuxer
            .streams()
            .get(stream_index)
            .ok_or_else(|| EngineError::new(format!("no stream #{}", stream_index)))?;

        let decoder = match backend {
            None => VideoDecoder::from_stream(stream)?.build()?,
            Some(backend) => {
                let codec = &input.streams[stream_index].codec;
                let name = format!("{}_{}", codec, backend);
                log::debug!("FfmpegEngine: trying decoder {}", name);
                VideoDecoder::builder(&name)?
                    .time_base(stream.time_base())
                    .build()?
            }
        };

        Ok(FfmpegDecoder { decoder })
    }
}

/// Demuxer over an opened byte stream
pub struct FfmpegInput {
    demuxer: DemuxerWithStreamInfo<InputStream>,
    streams: Vec<StreamDescriptor>,
}

// The demuxer is only ever driven by its owner; moving it between threads is sound.
unsafe impl Send for FfmpegInput {}

impl InputContext for FfmpegInput {
    type Params = CodecParameters;

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn codec_parameters(&self, index: usize) -> Option<CodecParameters> {
        self.demuxer
            .streams()
            .get(index)
            .map(|stream| stream.codec_parameters())
    }

    fn read(&mut self) -> Result<Option<Packet>, EngineError> {
        Ok(self.demuxer.take()?.map(from_ffmpeg_packet))
    }
}

/// Muxer whose streams are still being registered
pub struct FfmpegOutputBuilder {
    builder: MuxerBuilder,
    format: OutputFormat,
    streams: usize,
}

unsafe impl Send for FfmpegOutputBuilder {}

impl OutputBuilder for FfmpegOutputBuilder {
    type Params = CodecParameters;
    type Output = FfmpegOutput;

    fn add_stream(&mut self, params: &CodecParameters) -> Result<usize, EngineError> {
        let index = self.builder.add_stream(params)?;
        self.streams += 1;
        Ok(index)
    }

    fn stream_count(&self) -> usize {
        self.streams
    }

    fn write_header(self, stream: OutputStream) -> Result<FfmpegOutput, EngineError> {
        let io = if stream.is_seekable() {
            IO::from_seekable_write_stream(stream)
        } else {
            IO::from_write_stream(stream)
        };

        let muxer = self.builder.build(io, self.format)?;
        let streams = muxer
            .streams()
            .iter()
            .enumerate()
            .map(|(index, stream)| describe_stream(index, stream))
            .collect();

        Ok(FfmpegOutput { muxer, streams })
    }
}

/// Muxer with its header written
pub struct FfmpegOutput {
    muxer: Muxer<OutputStream>,
    streams: Vec<StreamDescriptor>,
}

unsafe impl Send for FfmpegOutput {}

impl OutputContext for FfmpegOutput {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn write(&mut self, packet: Packet) -> Result<(), EngineError> {
        self.muxer.push(to_ffmpeg_packet(&packet))?;
        Ok(())
    }

    fn write_trailer(self) -> Result<(), EngineError> {
        let io = self.muxer.close()?;
        io.into_stream().flush()?;
        Ok(())
    }
}

/// Video decoder, software or hardware
pub struct FfmpegDecoder {
    decoder: VideoDecoder,
}

unsafe impl Send for FfmpegDecoder {}

impl FrameDecoder for FfmpegDecoder {
    fn push(&mut self, packet: &Packet) -> Result<(), EngineError> {
        self.decoder.try_push(to_ffmpeg_packet(packet))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        self.decoder.try_flush()?;
        Ok(())
    }

    fn take(&mut self) -> Result<Option<Frame>, EngineError> {
        Ok(self.decoder.take()?.map(from_ffmpeg_frame))
    }
}

fn to_time_base(time_base: FfTimeBase) -> TimeBase {
    TimeBase::new(time_base.num() as i32, time_base.den() as i32)
}

fn to_ffmpeg_time_base(time_base: TimeBase) -> FfTimeBase {
    FfTimeBase::new(time_base.num(), time_base.den())
}

fn timestamp_value(timestamp: Timestamp) -> Option<i64> {
    if timestamp.is_null() {
        None
    } else {
        Some(timestamp.timestamp())
    }
}

/// Codec name behind the default decoder FFmpeg picks for a stream.
///
/// Wrapper libraries and alternative implementations register under their
/// own names, which neither the elementary stream muxers nor the hardware
/// decoder lookup know about.
fn codec_name(decoder: &str) -> &str {
    match decoder {
        "libdav1d" | "libaom-av1" => "av1",
        "libopenh264" => "h264",
        "libvpx" => "vp8",
        "libvpx-vp9" => "vp9",
        "aac_fixed" | "libfdk_aac" => "aac",
        "ac3_fixed" => "ac3",
        "mp3float" => "mp3",
        "mp2float" => "mp2",
        "libopus" => "opus",
        "libvorbis" => "vorbis",
        other => other,
    }
}

fn describe_stream(index: usize, stream: &Stream) -> StreamDescriptor {
    let params = stream.codec_parameters();
    let time_base = to_time_base(stream.time_base());
    let codec = params.decoder_name().map(codec_name).unwrap_or("unknown");

    if let Some(video) = params.as_video_codec_parameters() {
        let mut descriptor = StreamDescriptor::new(index, MediaKind::Video, codec, time_base)
            .with_dimensions(video.width(), video.height());
        if let Some(rate) = nominal_frame_rate(stream) {
            descriptor = descriptor.with_frame_rate(rate);
        }
        descriptor
    } else if let Some(audio) = params.as_audio_codec_parameters() {
        StreamDescriptor::new(index, MediaKind::Audio, codec, time_base)
            .with_sample_rate(audio.sample_rate())
    } else {
        StreamDescriptor::new(index, MediaKind::Other, codec, time_base)
    }
}

/// Average frame rate derived from the frame count and the stream duration.
fn nominal_frame_rate(stream: &Stream) -> Option<Rational> {
    let frames = stream.frames()?;
    let seconds = stream.duration().as_f64()?;
    if frames == 0 || seconds <= 0.0 {
        return None;
    }
    let fps = frames as f64 / seconds;
    Some(Rational::new((fps * 1000.0).round() as i32, 1000))
}

fn from_ffmpeg_packet(packet: ac_ffmpeg::packet::Packet) -> Packet {
    Packet {
        data: Bytes::copy_from_slice(packet.data()),
        stream_index: packet.stream_index(),
        pts: timestamp_value(packet.pts()),
        dts: timestamp_value(packet.dts()),
        duration: packet.raw_duration(),
        time_base: to_time_base(packet.time_base()),
        key: packet.is_key(),
    }
}

fn to_ffmpeg_packet(packet: &Packet) -> ac_ffmpeg::packet::Packet {
    let time_base = to_ffmpeg_time_base(packet.time_base);
    let stamp = |value: Option<i64>| match value {
        Some(value) => Timestamp::new(value, time_base),
        None => Timestamp::null(),
    };

    PacketMut::from(&packet.data[..])
        .with_time_base(time_base)
        .with_pts(stamp(packet.pts))
        .with_dts(stamp(packet.dts))
        .with_raw_duration(packet.duration)
        .with_stream_index(packet.stream_index)
        .with_key_flag(packet.key)
        .freeze()
}

fn from_ffmpeg_frame(frame: VideoFrame) -> Frame {
    let planes = frame
        .planes()
        .iter()
        .filter(|plane| !plane.data().is_empty())
        .map(|plane| Plane {
            data: Bytes::copy_from_slice(plane.data()),
            line_size: plane.line_size(),
        })
        .collect();

    Frame {
        width: frame.width(),
        height: frame.height(),
        pixel_format: frame.pixel_format().name().to_string(),
        pts: timestamp_value(frame.pts()),
        time_base: to_time_base(frame.time_base()),
        planes,
    }
}
