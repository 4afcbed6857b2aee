//! Event framing for the search stream.
//!
//! A frame is `"event: " + name + "\n" + "data: " + json + "\n\n"`. The
//! encoder writes and flushes one frame per call; the decoder scans a byte
//! stream for the blank-line delimiter and stops at the `done` event.

mod decoder;
mod encoder;
pub mod metrics;

pub use decoder::{decode_frames, read_frames, Frame, WireDecoder};
pub use encoder::{EmitObservation, EmitObserver, WireEncoder};

pub use crate::config::MAX_PAYLOAD_BYTES;

/// Fixed bytes added around the name and payload of every frame:
/// `"event: "`, `"\n"`, `"data: "` and the terminating `"\n\n"`.
pub const FRAME_OVERHEAD: usize = EVENT_PREFIX.len() + 1 + DATA_PREFIX.len() + 2;

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";
const DELIMITER: &[u8] = b"\n\n";

/// Size of the frame that would carry `name` and `data`.
pub fn framed_len(name: &str, data: &[u8]) -> usize {
    name.len() + data.len() + FRAME_OVERHEAD
}
