use log::{debug, info};

use super::io::{DEFAULT_IO_BUFFER_SIZE, InputSource};
use super::select::best_stream;
use crate::engine::{Engine, InputContext};
use crate::error::{EngineErrorKind, MediaError, Result};
use crate::media::{MediaKind, Packet, StreamDescriptor};

/// Readable container handle.
///
/// Owns the engine demuxer and, for callback sources, the bridge buffer;
/// both are released when the handle is dropped.
pub struct InputHandle<E: Engine> {
    context: E::Input,
    label: String,
}

impl<E: Engine> InputHandle<E> {
    /// Open `source` and probe its streams.
    pub fn open(engine: &E, source: InputSource, format_hint: Option<&str>) -> Result<Self> {
        Self::open_with_buffer(engine, source, format_hint, DEFAULT_IO_BUFFER_SIZE)
    }

    pub fn open_with_buffer(
        engine: &E,
        source: InputSource,
        format_hint: Option<&str>,
        buffer_size: usize,
    ) -> Result<Self> {
        let label = source.describe();
        let stream = source
            .open(buffer_size)
            .map_err(|err| MediaError::open(&label, err.into()))?;

        let format_hint = format_hint.filter(|hint| !hint.is_empty());
        let context = engine
            .open_input(stream, format_hint)
            .map_err(|err| match err.kind() {
                EngineErrorKind::Probe => MediaError::Probe(err),
                _ => MediaError::open(&label, err),
            })?;

        info!("InputHandle: opened {}", label);
        for stream in context.streams() {
            info!("InputHandle:   {}", stream);
        }

        Ok(Self { context, label })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        self.context.streams()
    }

    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.context.streams().get(index)
    }

    /// Index of the most suitable stream of `kind`, if any.
    pub fn find_best_stream(&self, kind: MediaKind) -> Option<usize> {
        best_stream(self.context.streams(), kind)
    }

    pub fn codec_parameters(&self, index: usize) -> Option<E::Params> {
        self.context.codec_parameters(index)
    }

    /// Next packet in container order, `None` at end of stream.
    pub fn read(&mut self) -> Result<Option<Packet>> {
        let packet = self.context.read().map_err(MediaError::Io)?;
        if packet.is_none() {
            debug!("InputHandle: {} exhausted", self.label);
        }
        Ok(packet)
    }

    pub(crate) fn context(&self) -> &E::Input {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockContainer, MockEngine, MockPacket, MockStream};
    use crate::media::TimeBase;

    fn sample() -> MockContainer {
        MockContainer::new(vec![
            MockStream::audio("aac", 44_100),
            MockStream::video("h264", TimeBase::new(1, 90_000), 30),
        ])
        .push(MockPacket::new(1, 0, 3_000))
        .push(MockPacket::new(0, 0, 1_024))
    }

    #[test]
    fn test_open_callback_source() {
        let engine = MockEngine::new();
        let input = InputHandle::open(&engine, sample().source(), None).unwrap();

        assert_eq!(input.label(), "<byte source>");
        assert_eq!(input.streams().len(), 2);
        assert_eq!(input.find_best_stream(MediaKind::Video), Some(1));
        assert_eq!(input.find_best_stream(MediaKind::Audio), Some(0));
        assert_eq!(input.find_best_stream(MediaKind::Other), None);
    }

    #[test]
    fn test_read_in_container_order() {
        let engine = MockEngine::new();
        let mut input = InputHandle::open(&engine, sample().source(), Some("")).unwrap();

        let first = input.read().unwrap().unwrap();
        assert_eq!(first.stream_index, 1);
        assert_eq!(first.time_base, TimeBase::new(1, 90_000));
        let second = input.read().unwrap().unwrap();
        assert_eq!(second.stream_index, 0);
        assert_eq!(second.duration, 1_024);
        assert!(input.read().unwrap().is_none());
    }

    #[test]
    fn test_unreadable_source_is_open_error() {
        let engine = MockEngine::new();
        let result = InputHandle::open(&engine, InputSource::path("/no/such/input.mock"), None);
        assert!(matches!(result, Err(MediaError::Open { .. })));
    }

    #[test]
    fn test_unknown_format_hint_is_open_error() {
        let engine = MockEngine::new();
        let result = InputHandle::open(&engine, sample().source(), Some("flv"));
        assert!(matches!(result, Err(MediaError::Open { .. })));
    }

    #[test]
    fn test_garbage_is_probe_error() {
        let engine = MockEngine::new();
        let source = InputSource::callback({
            let mut sent = false;
            move |buf: &mut [u8]| {
                if sent {
                    return 0isize;
                }
                sent = true;
                buf[..4].copy_from_slice(b"junk");
                4isize
            }
        });
        let result = InputHandle::open(&engine, source, None);
        assert!(matches!(result, Err(MediaError::Probe(_))));
    }
}
