//! Container handles
//!
//! An [`InputHandle`] reads packets out of one container, an
//! [`OutputHandle`] writes packets into one. Either side can be backed by a
//! filesystem path or by a byte callback (see [`io`]).

pub mod io;
mod input;
mod output;
pub mod select;

pub use input::InputHandle;
pub use io::{ByteSink, ByteSource, DEFAULT_IO_BUFFER_SIZE, InputSource, OutputSink};
pub use output::OutputHandle;
