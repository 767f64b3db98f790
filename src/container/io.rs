//! Byte-source / byte-sink bridging
//!
//! Containers are read from and written to either a filesystem path or a
//! caller supplied callback. Callbacks are wrapped in a fixed size buffer
//! allocated once when the handle is opened and released together with the
//! handle, on every exit path.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Default size of the callback bridge buffer (4 MiB)
pub const DEFAULT_IO_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Pull-style byte producer.
///
/// Fills `buf` and returns the number of bytes written into it, `0` at end
/// of stream, or a negative value on error.
pub trait ByteSource: Send {
    fn read_bytes(&mut self, buf: &mut [u8]) -> isize;
}

impl<F> ByteSource for F
where
    F: FnMut(&mut [u8]) -> isize + Send,
{
    fn read_bytes(&mut self, buf: &mut [u8]) -> isize {
        self(buf)
    }
}

/// Push-style byte consumer.
///
/// Consumes `buf` and returns the number of bytes accepted, or a negative
/// value on error.
pub trait ByteSink: Send {
    fn write_bytes(&mut self, buf: &[u8]) -> isize;
}

impl<F> ByteSink for F
where
    F: FnMut(&[u8]) -> isize + Send,
{
    fn write_bytes(&mut self, buf: &[u8]) -> isize {
        self(buf)
    }
}

/// Where an input container comes from
pub enum InputSource {
    Path(PathBuf),
    Callback(Box<dyn ByteSource>),
}

impl InputSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        InputSource::Path(path.into())
    }

    pub fn callback(source: impl ByteSource + 'static) -> Self {
        InputSource::Callback(Box::new(source))
    }

    /// Short label used in logs and errors
    pub fn describe(&self) -> String {
        match self {
            InputSource::Path(path) => path.display().to_string(),
            InputSource::Callback(_) => String::from("<byte source>"),
        }
    }

    pub(crate) fn open(self, buffer_size: usize) -> io::Result<InputStream> {
        match self {
            InputSource::Path(path) => Ok(InputStream::File(File::open(path)?)),
            InputSource::Callback(source) => Ok(InputStream::Callback(BufReader::with_capacity(
                buffer_size,
                SourceReader { source },
            ))),
        }
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InputSource({})", self.describe())
    }
}

/// Where an output container goes
pub enum OutputSink {
    Path(PathBuf),
    Callback(Box<dyn ByteSink>),
}

impl OutputSink {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        OutputSink::Path(path.into())
    }

    pub fn callback(sink: impl ByteSink + 'static) -> Self {
        OutputSink::Callback(Box::new(sink))
    }

    pub fn describe(&self) -> String {
        match self {
            OutputSink::Path(path) => path.display().to_string(),
            OutputSink::Callback(_) => String::from("<byte sink>"),
        }
    }

    pub(crate) fn open(self, buffer_size: usize) -> io::Result<OutputStream> {
        match self {
            OutputSink::Path(path) => Ok(OutputStream::File(File::create(path)?)),
            OutputSink::Callback(sink) => Ok(OutputStream::Callback(BufWriter::with_capacity(
                buffer_size,
                SinkWriter { sink },
            ))),
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutputSink({})", self.describe())
    }
}

/// `Read` adapter over a [`ByteSource`]
pub struct SourceReader {
    source: Box<dyn ByteSource>,
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = self.source.read_bytes(buf);
        if ret < 0 {
            return Err(io::Error::other(format!("byte source failed with code {}", ret)));
        }
        Ok((ret as usize).min(buf.len()))
    }
}

/// `Write` adapter over a [`ByteSink`]
pub struct SinkWriter {
    sink: Box<dyn ByteSink>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let ret = self.sink.write_bytes(buf);
        if ret < 0 {
            return Err(io::Error::other(format!("byte sink failed with code {}", ret)));
        }
        if ret == 0 && !buf.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        Ok((ret as usize).min(buf.len()))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opened input byte stream. Only files can seek.
pub enum InputStream {
    File(File),
    Callback(BufReader<SourceReader>),
}

impl InputStream {
    pub fn is_seekable(&self) -> bool {
        matches!(self, InputStream::File(_))
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputStream::File(file) => file.read(buf),
            InputStream::Callback(reader) => reader.read(buf),
        }
    }
}

impl Seek for InputStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            InputStream::File(file) => file.seek(pos),
            InputStream::Callback(_) => Err(io::Error::from(io::ErrorKind::Unsupported)),
        }
    }
}

/// Opened output byte stream. Only files can seek.
pub enum OutputStream {
    File(File),
    Callback(BufWriter<SinkWriter>),
}

impl OutputStream {
    pub fn is_seekable(&self) -> bool {
        matches!(self, OutputStream::File(_))
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::File(file) => file.write(buf),
            OutputStream::Callback(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::File(file) => file.flush(),
            OutputStream::Callback(writer) => writer.flush(),
        }
    }
}

impl Seek for OutputStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            OutputStream::File(file) => file.seek(pos),
            OutputStream::Callback(_) => Err(io::Error::from(io::ErrorKind::Unsupported)),
        }
    }
}
