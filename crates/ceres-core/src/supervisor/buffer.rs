//! Output accumulation buffer with marker detection.

/// Something the buffer wants the supervisor to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    /// Text ready for the display sink.
    Flush(String),
    /// The marker was found. `before` is the text that preceded it.
    Marker { before: String },
}

/// Accumulates raw output chunks and decides when to flush.
///
/// Bytes that could be the start of a marker, or the start of a split UTF-8
/// character, are held back until the next chunk settles them, so a marker
/// delivered one byte at a time is still recognized.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    marker: Vec<u8>,
    threshold: usize,
}

impl OutputBuffer {
    /// Create a buffer recognizing `marker` and flushing past `threshold` bytes.
    pub fn new(marker: &str, threshold: usize) -> Self {
        Self {
            bytes: Vec::new(),
            marker: marker.as_bytes().to_vec(),
            threshold,
        }
    }

    /// Append a chunk of output.
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Next action implied by the buffered bytes, if any.
    ///
    /// A marker takes priority: everything before it is returned with the
    /// event, the marker itself is discarded, and bytes after it stay
    /// buffered for the next call.
    pub fn next_event(&mut self) -> Option<BufferEvent> {
        if let Some(pos) = self.find_marker() {
            let before = String::from_utf8_lossy(&self.bytes[..pos]).to_string();
            self.bytes.drain(..pos + self.marker.len());
            return Some(BufferEvent::Marker { before });
        }

        if self.bytes.contains(&b'\n') || self.bytes.len() > self.threshold {
            return self.flush_settled().map(BufferEvent::Flush);
        }

        None
    }

    /// Flush whatever is settled, regardless of newline or size.
    ///
    /// Used when output has been idle for a poll interval.
    pub fn flush_idle(&mut self) -> Option<String> {
        if self.find_marker().is_some() {
            return None;
        }
        self.flush_settled()
    }

    /// Take everything, including held-back bytes.
    pub fn finish(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.bytes).to_string();
        self.bytes.clear();
        Some(text)
    }

    fn find_marker(&self) -> Option<usize> {
        if self.marker.is_empty() || self.bytes.len() < self.marker.len() {
            return None;
        }
        self.bytes
            .windows(self.marker.len())
            .position(|window| window == self.marker.as_slice())
    }

    /// Flush all bytes except a possible marker prefix and an incomplete
    /// trailing character.
    fn flush_settled(&mut self) -> Option<String> {
        let held = self.partial_marker_suffix();
        let mut end = self.bytes.len() - held;
        end -= incomplete_utf8_tail(&self.bytes[..end]);

        if end == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&self.bytes[..end]).to_string();
        self.bytes.drain(..end);
        Some(text)
    }

    /// Length of the longest buffer suffix that is a proper marker prefix.
    fn partial_marker_suffix(&self) -> usize {
        let longest = self.marker.len().saturating_sub(1).min(self.bytes.len());
        (1..=longest)
            .rev()
            .find(|&len| self.bytes.ends_with(&self.marker[..len]))
            .unwrap_or(0)
    }
}

/// Number of trailing bytes forming the start of a multi-byte UTF-8
/// character whose remaining bytes have not arrived yet.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(4) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let expected = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if expected > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "<<__REQ__>>";

    fn drain(buffer: &mut OutputBuffer) -> Vec<BufferEvent> {
        let mut events = Vec::new();
        while let Some(event) = buffer.next_event() {
            let stop = matches!(event, BufferEvent::Marker { .. });
            events.push(event);
            if stop {
                break;
            }
        }
        events
    }

    #[test]
    fn test_newline_flushes_line() {
        let mut buffer = OutputBuffer::new(MARKER, 200);
        buffer.push(b"hello");
        assert_eq!(buffer.next_event(), None);

        buffer.push(b" world\n");
        assert_eq!(
            buffer.next_event(),
            Some(BufferEvent::Flush("hello world\n".to_string()))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_marker_split_across_single_byte_chunks() {
        let mut buffer = OutputBuffer::new(MARKER, 200);
        let mut events = Vec::new();

        for byte in b"Enter a number:\n<<__REQ__>>" {
            buffer.push(&[*byte]);
            events.extend(drain(&mut buffer));
        }

        assert_eq!(
            events,
            vec![
                BufferEvent::Flush("Enter a number:\n".to_string()),
                BufferEvent::Marker {
                    before: String::new()
                },
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_marker_prefix_is_held_across_newline_flush() {
        let mut buffer = OutputBuffer::new(MARKER, 200);
        buffer.push(b"line\n<<__R");

        assert_eq!(
            buffer.next_event(),
            Some(BufferEvent::Flush("line\n".to_string()))
        );
        assert_eq!(buffer.len(), "<<__R".len());

        buffer.push(b"EQ__>>");
        assert_eq!(
            buffer.next_event(),
            Some(BufferEvent::Marker {
                before: String::new()
            })
        );
    }

    #[test]
    fn test_text_before_marker_is_returned_without_marker() {
        let mut buffer = OutputBuffer::new(MARKER, 200);
        buffer.push(b"Name: <<__REQ__>>");

        assert_eq!(
            buffer.next_event(),
            Some(BufferEvent::Marker {
                before: "Name: ".to_string()
            })
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_bytes_after_marker_stay_buffered() {
        let mut buffer = OutputBuffer::new(MARKER, 200);
        buffer.push(b"a<<__REQ__>>b<<__REQ__>>c\n");

        assert_eq!(
            drain(&mut buffer),
            vec![BufferEvent::Marker {
                before: "a".to_string()
            }]
        );
        assert_eq!(
            drain(&mut buffer),
            vec![BufferEvent::Marker {
                before: "b".to_string()
            }]
        );
        assert_eq!(drain(&mut buffer), vec![BufferEvent::Flush("c\n".to_string())]);
    }

    #[test]
    fn test_threshold_flushes_long_unterminated_line() {
        let mut buffer = OutputBuffer::new(MARKER, 8);
        buffer.push(b"0123456");
        assert_eq!(buffer.next_event(), None);

        buffer.push(b"789");
        assert_eq!(
            buffer.next_event(),
            Some(BufferEvent::Flush("0123456789".to_string()))
        );
    }

    #[test]
    fn test_split_utf8_character_is_held() {
        let mut buffer = OutputBuffer::new(MARKER, 2);
        let text = "가나";
        let bytes = text.as_bytes();

        buffer.push(&bytes[..4]);
        assert_eq!(buffer.next_event(), Some(BufferEvent::Flush("가".to_string())));
        assert_eq!(buffer.len(), 1);

        buffer.push(&bytes[4..]);
        assert_eq!(buffer.next_event(), Some(BufferEvent::Flush("나".to_string())));
    }

    #[test]
    fn test_idle_flush_keeps_marker_prefix() {
        let mut buffer = OutputBuffer::new(MARKER, 200);
        buffer.push(b"progress...<<");

        assert_eq!(buffer.flush_idle(), Some("progress...".to_string()));
        assert_eq!(buffer.finish(), Some("<<".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_incomplete_utf8_tail() {
        assert_eq!(incomplete_utf8_tail(b"abc"), 0);
        assert_eq!(incomplete_utf8_tail(&"é".as_bytes()[..1]), 1);
        assert_eq!(incomplete_utf8_tail(&"가".as_bytes()[..2]), 2);
        assert_eq!(incomplete_utf8_tail("가".as_bytes()), 0);
        assert_eq!(incomplete_utf8_tail(b""), 0);
    }
}
