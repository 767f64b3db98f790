//! Scripted in-memory engine for unit tests
//!
//! Containers are JSON lines: a header line listing the streams, one line per
//! packet and a final trailer line. Inputs are parsed from whatever byte
//! stream they are opened on, outputs are serialized into their sink, so
//! the callback bridging is exercised end to end.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use super::{Engine, FrameDecoder, InputContext, OutputBuilder, OutputContext};
use crate::container::io::{InputSource, InputStream, OutputSink, OutputStream};
use crate::error::EngineError;
use crate::media::{Frame, MediaKind, Packet, Rational, StreamDescriptor, TimeBase};

/// Output formats the mock knows about
const KNOWN_FORMATS: &[&str] = &["mock", "h264", "hevc", "adts", "mp4", "matroska"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockStream {
    pub kind: String,
    pub codec: String,
    pub time_base: (i32, i32),
    pub frame_rate: Option<(i32, i32)>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub sample_rate: Option<u32>,
    pub bit_rate: Option<u64>,
}

impl MockStream {
    pub fn video(codec: &str, time_base: TimeBase, fps: i32) -> Self {
        Self {
            kind: "video".into(),
            codec: codec.into(),
            time_base: (time_base.num(), time_base.den()),
            frame_rate: Some((fps, 1)),
            width: Some(1280),
            height: Some(720),
            sample_rate: None,
            bit_rate: None,
        }
    }

    pub fn audio(codec: &str, sample_rate: u32) -> Self {
        Self {
            kind: "audio".into(),
            codec: codec.into(),
            time_base: (1, sample_rate as i32),
            frame_rate: None,
            width: None,
            height: None,
            sample_rate: Some(sample_rate),
            bit_rate: None,
        }
    }

    pub fn data(codec: &str) -> Self {
        Self {
            kind: "data".into(),
            codec: codec.into(),
            time_base: (1, 1000),
            frame_rate: None,
            width: None,
            height: None,
            sample_rate: None,
            bit_rate: None,
        }
    }

    fn descriptor(&self, index: usize) -> StreamDescriptor {
        let kind = match self.kind.as_str() {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            _ => MediaKind::Other,
        };
        let time_base = TimeBase::new(self.time_base.0, self.time_base.1);
        StreamDescriptor {
            index,
            kind,
            codec: self.codec.clone(),
            time_base,
            frame_rate: self.frame_rate.map(|(n, d)| Rational::new(n, d)),
            width: self.width,
            height: self.height,
            sample_rate: self.sample_rate,
            bit_rate: self.bit_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockPacket {
    pub stream: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub key: bool,
    pub data: Vec<u8>,
}

impl MockPacket {
    pub fn new(stream: usize, pts: i64, duration: i64) -> Self {
        Self {
            stream,
            pts: Some(pts),
            dts: Some(pts),
            duration,
            key: false,
            data: vec![stream as u8; 8],
        }
    }

    /// Packet the mock decoder refuses with a fatal error
    pub fn corrupt(stream: usize, pts: i64) -> Self {
        Self {
            data: b"CORRUPT".to_vec(),
            ..Self::new(stream, pts, 1)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Line {
    Header { format: String, streams: Vec<MockStream> },
    Packet(MockPacket),
    Trailer,
}

/// Parsed mock container
#[derive(Debug, Clone, Default)]
pub struct MockContainer {
    pub format: String,
    pub streams: Vec<MockStream>,
    pub packets: Vec<MockPacket>,
    pub trailer: bool,
}

impl MockContainer {
    pub fn new(streams: Vec<MockStream>) -> Self {
        Self {
            format: "mock".into(),
            streams,
            packets: Vec::new(),
            trailer: true,
        }
    }

    pub fn push(mut self, packet: MockPacket) -> Self {
        self.packets.push(packet);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_line(
            &mut out,
            &Line::Header {
                format: self.format.clone(),
                streams: self.streams.clone(),
            },
        )
        .unwrap();
        for packet in &self.packets {
            write_line(&mut out, &Line::Packet(packet.clone())).unwrap();
        }
        if self.trailer {
            write_line(&mut out, &Line::Trailer).unwrap();
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, EngineError> {
        let text = std::str::from_utf8(bytes).map_err(|e| EngineError::probe(e.to_string()))?;
        let mut container = MockContainer::default();
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        match lines.next().map(serde_json::from_str::<Line>) {
            Some(Ok(Line::Header { format, streams })) => {
                container.format = format;
                container.streams = streams;
            }
            _ => return Err(EngineError::probe("missing stream header")),
        }

        for line in lines {
            match serde_json::from_str::<Line>(line) {
                Ok(Line::Packet(packet)) => container.packets.push(packet),
                Ok(Line::Trailer) => container.trailer = true,
                Ok(Line::Header { .. }) => return Err(EngineError::new("duplicate header")),
                Err(err) => return Err(EngineError::new(err.to_string())),
            }
        }
        Ok(container)
    }

    /// Callback source replaying this container in small chunks
    pub fn source(&self) -> InputSource {
        let bytes = self.to_bytes();
        let mut offset = 0;
        InputSource::callback(move |buf: &mut [u8]| {
            let n = 97usize.min(buf.len()).min(bytes.len() - offset);
            buf[..n].copy_from_slice(&bytes[offset..offset + n]);
            offset += n;
            n as isize
        })
    }

    pub fn packets_of(&self, stream: usize) -> Vec<&MockPacket> {
        self.packets.iter().filter(|p| p.stream == stream).collect()
    }
}

fn write_line(out: &mut impl Write, line: &Line) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")
}

/// Shared byte buffer usable as an output sink
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> OutputSink {
        let bytes = self.bytes.clone();
        OutputSink::callback(move |buf: &[u8]| {
            bytes.lock().unwrap().extend_from_slice(buf);
            buf.len() as isize
        })
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    pub fn container(&self) -> MockContainer {
        MockContainer::parse(&self.bytes()).expect("sink does not hold a mock container")
    }

    pub fn source(&self) -> InputSource {
        self.container().source()
    }
}

/// Scripted engine
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    /// Hardware backends that initialize successfully
    pub hardware: Vec<String>,
    /// Time base forced onto every output stream by the header
    pub output_time_base: Option<TimeBase>,
    /// Stream count after which `add_stream` fails
    pub stream_limit: Option<usize>,
    pub fail_header: bool,
    pub fail_trailer: bool,
    /// Frames the decoder holds back before releasing one
    pub decoder_delay: usize,
    /// Reads that report `Again` before each input starts delivering packets
    pub transient_reads: usize,
    /// Pushes the decoder refuses as full before accepting packets
    pub transient_pushes: usize,
    /// Every decoder backend that was attempted, in order
    pub attempts: Arc<Mutex<Vec<String>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Engine for MockEngine {
    type Params = MockStream;
    type Input = MockInput;
    type OutputBuilder = MockOutputBuilder;
    type Output = MockOutput;
    type Decoder = MockDecoder;

    fn open_input(
        &self,
        mut stream: InputStream,
        format_hint: Option<&str>,
    ) -> Result<MockInput, EngineError> {
        if let Some(hint) = format_hint {
            if hint != "mock" {
                return Err(EngineError::new(format!("unknown input format `{}`", hint)));
            }
        }

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let container = MockContainer::parse(&bytes)?;
        let streams = container
            .streams
            .iter()
            .enumerate()
            .map(|(index, stream)| stream.descriptor(index))
            .collect();

        Ok(MockInput {
            params: container.streams,
            streams,
            packets: container.packets.into(),
            transient_reads: self.transient_reads,
        })
    }

    fn create_output(
        &self,
        format_name: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<MockOutputBuilder, EngineError> {
        let format = match (format_name, file_name) {
            (Some(name), _) => name.to_string(),
            (None, Some(file)) => file.rsplit('.').next().unwrap_or_default().to_string(),
            (None, None) => String::new(),
        };
        if !KNOWN_FORMATS.contains(&format.as_str()) {
            return Err(EngineError::new(format!("unknown output format `{}`", format)));
        }

        Ok(MockOutputBuilder {
            engine: self.clone(),
            format,
            streams: Vec::new(),
        })
    }

    fn open_decoder(
        &self,
        input: &MockInput,
        stream_index: usize,
        backend: Option<&str>,
    ) -> Result<MockDecoder, EngineError> {
        let name = backend.unwrap_or("software").to_string();
        self.attempts.lock().unwrap().push(name.clone());

        if let Some(backend) = backend {
            if !self.hardware.iter().any(|hw| hw == backend) {
                return Err(EngineError::new(format!("{} not available", backend)));
            }
        }

        let stream = &input.streams[stream_index];
        Ok(MockDecoder {
            backend: name,
            time_base: stream.time_base,
            delay: self.decoder_delay,
            transient_pushes: self.transient_pushes,
            pending: VecDeque::new(),
            flushed: false,
        })
    }
}

pub struct MockInput {
    params: Vec<MockStream>,
    streams: Vec<StreamDescriptor>,
    packets: VecDeque<MockPacket>,
    transient_reads: usize,
}

impl InputContext for MockInput {
    type Params = MockStream;

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn codec_parameters(&self, index: usize) -> Option<MockStream> {
        self.params.get(index).cloned()
    }

    fn read(&mut self) -> Result<Option<Packet>, EngineError> {
        if self.transient_reads > 0 {
            self.transient_reads -= 1;
            return Err(EngineError::again("resource temporarily unavailable"));
        }
        let Some(packet) = self.packets.pop_front() else {
            return Ok(None);
        };
        let time_base = self
            .streams
            .get(packet.stream)
            .map(|stream| stream.time_base)
            .ok_or_else(|| EngineError::new("packet for unknown stream"))?;

        Ok(Some(Packet {
            data: packet.data.into(),
            stream_index: packet.stream,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            time_base,
            key: packet.key,
        }))
    }
}

pub struct MockOutputBuilder {
    engine: MockEngine,
    format: String,
    streams: Vec<MockStream>,
}

impl OutputBuilder for MockOutputBuilder {
    type Params = MockStream;
    type Output = MockOutput;

    fn add_stream(&mut self, params: &MockStream) -> Result<usize, EngineError> {
        if let Some(limit) = self.engine.stream_limit {
            if self.streams.len() >= limit {
                return Err(EngineError::new("stream limit reached"));
            }
        }
        self.streams.push(params.clone());
        Ok(self.streams.len() - 1)
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn write_header(mut self, mut stream: OutputStream) -> Result<MockOutput, EngineError> {
        if self.engine.fail_header || self.streams.is_empty() {
            return Err(EngineError::new("header rejected"));
        }
        if let Some(time_base) = self.engine.output_time_base {
            for stream in &mut self.streams {
                stream.time_base = (time_base.num(), time_base.den());
            }
        }

        write_line(
            &mut stream,
            &Line::Header {
                format: self.format,
                streams: self.streams.clone(),
            },
        )?;

        let descriptors = self
            .streams
            .iter()
            .enumerate()
            .map(|(index, stream)| stream.descriptor(index))
            .collect();

        Ok(MockOutput {
            fail_trailer: self.engine.fail_trailer,
            streams: descriptors,
            stream,
        })
    }
}

pub struct MockOutput {
    fail_trailer: bool,
    streams: Vec<StreamDescriptor>,
    stream: OutputStream,
}

impl OutputContext for MockOutput {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn write(&mut self, packet: Packet) -> Result<(), EngineError> {
        let stream = self
            .streams
            .get(packet.stream_index)
            .ok_or_else(|| EngineError::new("packet for unknown output stream"))?;
        if packet.time_base != stream.time_base {
            return Err(EngineError::new("packet time base differs from stream"));
        }

        let line = Line::Packet(MockPacket {
            stream: packet.stream_index,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            key: packet.key,
            data: packet.data.to_vec(),
        });
        write_line(&mut self.stream, &line)?;
        Ok(())
    }

    fn write_trailer(mut self) -> Result<(), EngineError> {
        if self.fail_trailer {
            return Err(EngineError::new("trailer rejected"));
        }
        write_line(&mut self.stream, &Line::Trailer)?;
        self.stream.flush()?;
        Ok(())
    }
}

pub struct MockDecoder {
    backend: String,
    time_base: TimeBase,
    delay: usize,
    transient_pushes: usize,
    pending: VecDeque<i64>,
    flushed: bool,
}

impl FrameDecoder for MockDecoder {
    fn push(&mut self, packet: &Packet) -> Result<(), EngineError> {
        if &packet.data[..] == b"CORRUPT" {
            return Err(EngineError::new("invalid data found when processing input"));
        }
        if self.transient_pushes > 0 {
            self.transient_pushes -= 1;
            return Err(EngineError::again("decoder full"));
        }
        self.pending.push_back(packet.pts.unwrap_or_default());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        self.flushed = true;
        Ok(())
    }

    fn take(&mut self) -> Result<Option<Frame>, EngineError> {
        if self.pending.len() <= self.delay && !self.flushed {
            return Ok(None);
        }
        Ok(self.pending.pop_front().map(|pts| Frame {
            width: 1280,
            height: 720,
            pixel_format: self.backend.clone(),
            pts: Some(pts),
            time_base: self.time_base,
            planes: Vec::new(),
        }))
    }
}
