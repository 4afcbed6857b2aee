use serde::Serialize;

use crate::config::MATCH_BUFFER_THRESHOLD;

/// Accumulates serialized matches into one JSON array.
///
/// Appends are all-or-nothing: a value that fails to serialize leaves the
/// buffer exactly as it was. Once the buffer reaches its threshold the
/// array is closed and handed to the sink.
#[derive(Debug)]
pub struct MatchEventBuffer {
    buf: Vec<u8>,
    threshold: usize,
    items: usize,
}

impl Default for MatchEventBuffer {
    fn default() -> Self {
        Self::new(MATCH_BUFFER_THRESHOLD)
    }
}

impl MatchEventBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            buf: Vec::with_capacity(threshold.min(MATCH_BUFFER_THRESHOLD) + 1),
            threshold,
            items: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn items(&self) -> usize {
        self.items
    }

    pub fn append<T, F>(&mut self, item: &T, sink: F) -> Result<(), serde_json::Error>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&[u8]),
    {
        let mark = self.buf.len();
        self.buf.push(if self.items == 0 { b'[' } else { b',' });
        if let Err(e) = serde_json::to_writer(&mut self.buf, item) {
            self.buf.truncate(mark);
            return Err(e);
        }
        self.items += 1;

        if self.buf.len() >= self.threshold {
            self.flush(sink);
        }
        Ok(())
    }

    /// Close the array and hand it to `sink`. No-op when empty.
    pub fn flush<F: FnOnce(&[u8])>(&mut self, sink: F) {
        if self.items == 0 {
            return;
        }
        self.buf.push(b']');
        sink(&self.buf);
        self.buf.clear();
        self.items = 0;
    }
}
