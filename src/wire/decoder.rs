use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::{DELIMITER, FRAME_OVERHEAD, MAX_PAYLOAD_BYTES};
use crate::api::EVENT_DONE;
use crate::error::WireError;

const READ_CHUNK: usize = 16 * 1024;

/// One decoded `event`/`data` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn is_done(&self) -> bool {
        self.event == EVENT_DONE
    }
}

/// Incremental frame scanner.
///
/// Bytes are pushed as they arrive; [`WireDecoder::scan`] yields complete
/// frames. Decoding ends at the `done` frame even if more bytes follow.
#[derive(Debug)]
pub struct WireDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a delimiter.
    scanned: usize,
    max_frame: usize,
    finished: bool,
}

impl Default for WireDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WireDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame: MAX_PAYLOAD_BYTES,
            finished: false,
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// True once the `done` frame has been returned.
    pub fn is_done(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if !self.finished {
            self.buf.extend_from_slice(chunk);
        }
    }

    /// Next complete frame, or `None` if more input is needed.
    pub fn scan(&mut self) -> Result<Option<Frame>, WireError> {
        if self.finished {
            return Ok(None);
        }

        // A delimiter may straddle the previous end of input.
        let from = self.scanned.saturating_sub(DELIMITER.len() - 1);
        let Some(end) = find_delimiter(&self.buf[from..]).map(|i| from + i) else {
            self.scanned = self.buf.len();
            if self.buf.len() > self.max_frame + FRAME_OVERHEAD {
                return Err(WireError::malformed(format!(
                    "frame exceeds {} bytes without a delimiter",
                    self.max_frame
                )));
            }
            return Ok(None);
        };

        let frame = parse_frame(&self.buf[..end])?;
        self.buf.drain(..end + DELIMITER.len());
        self.scanned = 0;
        self.track_done(&frame);
        Ok(Some(frame))
    }

    /// Parse whatever remains at end of input as a final frame.
    pub fn finish(&mut self) -> Result<Option<Frame>, WireError> {
        if self.finished {
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let trimmed = trim_ascii(&rest);
        if trimmed.is_empty() {
            return Ok(None);
        }
        let frame = parse_frame(trimmed)?;
        self.track_done(&frame);
        Ok(Some(frame))
    }

    fn track_done(&mut self, frame: &Frame) {
        if frame.is_done() {
            trace!(discarded = self.buf.len(), "decoder reached done");
            self.finished = true;
            self.buf = Vec::new();
            self.scanned = 0;
        }
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn parse_frame(chunk: &[u8]) -> Result<Frame, WireError> {
    let newline = chunk
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| WireError::malformed("expected an event line followed by a data line"))?;
    let (event_line, rest) = (&chunk[..newline], &chunk[newline + 1..]);

    let event = field_value(event_line, "event")?;
    let data = field_value(rest, "data")?;

    Ok(Frame {
        event: String::from_utf8(event.to_vec())
            .map_err(|_| WireError::malformed("event name is not valid UTF-8"))?,
        data: data.to_vec(),
    })
}

fn field_value<'a>(line: &'a [u8], label: &str) -> Result<&'a [u8], WireError> {
    let colon = line
        .iter()
        .position(|b| *b == b':')
        .ok_or_else(|| WireError::malformed(format!("missing '{label}:' label")))?;
    let found = trim_ascii(&line[..colon]);
    if !found.eq_ignore_ascii_case(label.as_bytes()) {
        return Err(WireError::malformed(format!(
            "expected '{label}:' label, found '{}'",
            String::from_utf8_lossy(found)
        )));
    }
    Ok(trim_ascii(&line[colon + 1..]))
}

/// Decode every frame in `bytes`, stopping at `done`.
pub fn decode_frames(bytes: &[u8]) -> Result<Vec<Frame>, WireError> {
    let mut decoder = WireDecoder::new();
    decoder.push(bytes);
    let mut frames = Vec::new();
    while let Some(frame) = decoder.scan()? {
        frames.push(frame);
    }
    if let Some(frame) = decoder.finish()? {
        frames.push(frame);
    }
    Ok(frames)
}

/// Read frames from `reader` until `done` or end of input, handing each to
/// `on_frame`. Returns whether the `done` frame was seen.
pub async fn read_frames<R, F>(mut reader: R, mut on_frame: F) -> Result<bool, WireError>
where
    R: AsyncRead + Unpin,
    F: FnMut(Frame) -> Result<(), WireError>,
{
    let mut decoder = WireDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        while let Some(frame) = decoder.scan()? {
            on_frame(frame)?;
        }
        if decoder.is_done() {
            return Ok(true);
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if let Some(frame) = decoder.finish()? {
                on_frame(frame)?;
            }
            return Ok(decoder.is_done());
        }
        decoder.push(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn frames_split_across_pushes() {
        let mut decoder = WireDecoder::new();
        decoder.push(b"event: progress\nda");
        assert_eq!(decoder.scan().unwrap(), None);
        decoder.push(b"ta: {\"done\":false}\n");
        assert_eq!(decoder.scan().unwrap(), None);
        decoder.push(b"\nevent: done\ndata: {}\n\n");

        let first = decoder.scan().unwrap().unwrap();
        assert_eq!(first.event, "progress");
        assert_eq!(first.data, b"{\"done\":false}".to_vec());

        let done = decoder.scan().unwrap().unwrap();
        assert!(done.is_done());
        assert!(decoder.is_done());
        assert_eq!(decoder.scan().unwrap(), None);
    }

    #[test]
    fn labels_are_trimmed_and_case_insensitive() {
        let frames = decode_frames(b"Event : matches\n DATA:[]\n\n").unwrap();
        assert_eq!(
            frames,
            vec![Frame {
                event: "matches".to_string(),
                data: b"[]".to_vec(),
            }]
        );
    }

    #[test]
    fn missing_data_line_is_malformed() {
        let err = decode_frames(b"event: progress\n\n").unwrap_err();
        assert!(matches!(err, WireError::MalformedEvent(_)), "{err}");
    }

    #[test]
    fn mismatched_labels_are_malformed() {
        let err = decode_frames(b"data: {}\nevent: progress\n\n").unwrap_err();
        assert!(err.to_string().contains("expected 'event:'"), "{err}");
    }

    #[test]
    fn stops_at_done_even_with_trailing_bytes() {
        let frames =
            decode_frames(b"event: done\ndata: {}\n\nevent: progress\ndata: {}\n\ngarbage")
                .unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_done());
    }

    #[test]
    fn trailing_frame_without_delimiter_is_decoded() {
        let frames = decode_frames(b"event: alert\ndata: {\"title\":\"x\"}\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "alert");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut decoder = WireDecoder::new().with_max_frame(8);
        decoder.push(b"event: matches\ndata: [1,2,3,4,5,6,7,8,9]");
        assert!(decoder.scan().is_err());
    }

    #[test]
    fn large_frame_in_small_chunks_resumes_search() {
        let payload = format!("[{}]", "1,".repeat(256 * 1024) + "1");
        let body = format!("event: matches\ndata: {payload}\n\nevent: done\ndata: {{}}\n\n");

        let mut decoder = WireDecoder::new();
        let mut frames = Vec::new();
        for chunk in body.as_bytes().chunks(1024) {
            decoder.push(chunk);
            while let Some(frame) = decoder.scan().unwrap() {
                frames.push(frame);
            }
            // The next push resumes where this search stopped.
            assert_eq!(decoder.scanned, decoder.buf.len());
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, payload.into_bytes());
        assert!(frames[1].is_done());
    }

    #[test]
    fn delimiter_split_between_pushes_is_found() {
        let mut decoder = WireDecoder::new();
        decoder.push(b"event: progress\ndata: {}\n");
        assert_eq!(decoder.scan().unwrap(), None);
        assert_eq!(decoder.scanned, decoder.buf.len());

        decoder.push(b"\nevent: alert\ndata: {}");
        let frame = decoder.scan().unwrap().unwrap();
        assert_eq!(frame.event, "progress");
        assert_eq!(decoder.scan().unwrap(), None);

        decoder.push(b"\n\n");
        assert_eq!(decoder.scan().unwrap().unwrap().event, "alert");
    }

    #[tokio::test]
    async fn reads_frames_from_async_reader() {
        let reader = tokio_test::io::Builder::new()
            .read(b"event: progress\ndata: {}\n")
            .read(b"\nevent: done\ndata: {}\n\n")
            .build();

        let mut names = Vec::new();
        let saw_done = read_frames(reader, |frame| {
            names.push(frame.event);
            Ok(())
        })
        .await
        .unwrap();

        assert!(saw_done);
        assert_eq!(names, vec!["progress".to_string(), "done".to_string()]);
    }
}
