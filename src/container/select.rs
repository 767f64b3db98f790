//! Best stream selection

use crate::media::{MediaKind, StreamDescriptor};

/// Pick the most suitable stream of `kind`.
///
/// Video prefers the largest picture, audio the highest sample rate; the
/// stated bit rate breaks ties, then the lowest index wins.
pub fn best_stream(streams: &[StreamDescriptor], kind: MediaKind) -> Option<usize> {
    streams
        .iter()
        .filter(|stream| stream.kind == kind)
        .map(|stream| (score(stream), stream.index))
        // max_by_key keeps the last maximum, so compare on reversed index
        .max_by_key(|&(score, index)| (score, std::cmp::Reverse(index)))
        .map(|(_, index)| index)
}

fn score(stream: &StreamDescriptor) -> (u64, u64) {
    let class = match stream.kind {
        MediaKind::Video => match (stream.width, stream.height) {
            (Some(w), Some(h)) => (w * h) as u64,
            _ => 0,
        },
        MediaKind::Audio => stream.sample_rate.unwrap_or(0) as u64,
        MediaKind::Other => 0,
    };
    (class, stream.bit_rate.unwrap_or(0))
}
