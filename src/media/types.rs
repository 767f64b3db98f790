//! Core types shared by the demux, mux and decode paths

use bytes::Bytes;

use super::time::{Rational, TimeBase, rescale};

/// Kind of media carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Video access units / pictures
    Video,
    /// Audio access units / sample buffers
    Audio,
    /// Subtitles, data, attachments
    Other,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// Description of one stream inside a container
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Position of the stream inside its container
    pub index: usize,
    pub kind: MediaKind,
    /// Codec identity, e.g. `h264` or `aac`
    pub codec: String,
    pub time_base: TimeBase,
    /// Nominal frame rate, when the container states one (video only)
    pub frame_rate: Option<Rational>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub sample_rate: Option<u32>,
    pub bit_rate: Option<u64>,
}

impl StreamDescriptor {
    pub fn new(
        index: usize,
        kind: MediaKind,
        codec: impl Into<String>,
        time_base: TimeBase,
    ) -> Self {
        Self {
            index,
            kind,
            codec: codec.into(),
            time_base,
            frame_rate: None,
            width: None,
            height: None,
            sample_rate: None,
            bit_rate: None,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_dimensions(mut self, width: usize, height: usize) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} {} tb={}", self.index, self.kind, self.codec, self.time_base)?;
        if let (Some(w), Some(h)) = (self.width, self.height) {
            write!(f, " {}x{}", w, h)?;
        }
        if let Some(rate) = self.frame_rate {
            write!(f, " {:.3}fps", rate.as_f64())?;
        }
        if let Some(sample_rate) = self.sample_rate {
            write!(f, " {}Hz", sample_rate)?;
        }
        Ok(())
    }
}

/// One compressed access unit.
///
/// Moved from the reading handle to the writing handle, never shared.
#[derive(Debug)]
pub struct Packet {
    pub data: Bytes,
    pub stream_index: usize,
    /// Presentation timestamp in `time_base` ticks
    pub pts: Option<i64>,
    /// Decode timestamp in `time_base` ticks
    pub dts: Option<i64>,
    /// Duration in `time_base` ticks, 0 when unknown
    pub duration: i64,
    pub time_base: TimeBase,
    pub key: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>, stream_index: usize, time_base: TimeBase) -> Self {
        Self {
            data: data.into(),
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            time_base,
            key: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key_flag(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    /// Rescale PTS, DTS and duration into another time base.
    pub fn rescale_ts(&mut self, time_base: TimeBase) {
        let from = self.time_base;
        self.pts = self.pts.map(|pts| rescale(pts, from, time_base));
        self.dts = self.dts.map(|dts| rescale(dts, from, time_base));
        self.duration = rescale(self.duration, from, time_base);
        self.time_base = time_base;
    }
}

/// One plane of a decoded picture
#[derive(Debug)]
pub struct Plane {
    pub data: Bytes,
    /// Bytes per row including padding
    pub line_size: usize,
}

/// One decoded picture, owned by whoever holds it
#[derive(Debug)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixel_format: String,
    pub pts: Option<i64>,
    pub time_base: TimeBase,
    pub planes: Vec<Plane>,
}
