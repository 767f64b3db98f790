//! Media domain types
//!
//! Packets, frames and stream descriptors exchanged between container
//! handles, plus the rational time arithmetic used to keep independently
//! clocked streams on a common timeline.

pub mod time;
pub mod types;

pub use time::{Rational, TimeBase, rescale, to_millis};
pub use types::{Frame, MediaKind, Packet, Plane, StreamDescriptor};
