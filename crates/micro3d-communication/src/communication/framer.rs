//! Line framing for the controller's byte stream
//!
//! Serial reads return arbitrary slices of the stream: half a line, several
//! lines, or a line split in the middle of a multi-byte character. The framer
//! buffers bytes until a `\n` arrives and only then decodes the line, so the
//! output does not depend on how the input was chunked.
//!
//! An unterminated fragment may grow to [`MAX_LINE_BYTES`]. Past that the
//! fragment is dropped and the rest of that line is skipped up to its newline.

/// Longest fragment kept while waiting for a newline
pub const MAX_LINE_BYTES: usize = 4096;

/// Incremental `\n` line framer
#[derive(Debug, Clone)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Framer with a custom fragment limit
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Feed one chunk and return every line it completed, in order
    ///
    /// The newline is the only delimiter. A single `\r` directly before it is
    /// dropped. Bytes after the last newline stay buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        for (idx, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            if self.discarding {
                self.discarding = false;
            } else if self.buffer.is_empty() {
                lines.push(decode_line(&chunk[start..idx]));
            } else {
                self.buffer.extend_from_slice(&chunk[start..idx]);
                lines.push(decode_line(&self.buffer));
                self.buffer.clear();
            }
            start = idx + 1;
        }

        if !self.discarding {
            self.buffer.extend_from_slice(&chunk[start..]);
            if self.buffer.len() > self.max_line {
                tracing::warn!(
                    bytes = self.buffer.len(),
                    "Dropping line longer than {} bytes",
                    self.max_line
                );
                self.buffer.clear();
                self.discarding = true;
            }
        }
        lines
    }

    /// Bytes received since the last complete line
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop the unterminated fragment
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// End of stream: the unterminated fragment is discarded, never emitted
    ///
    /// Returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            tracing::debug!(bytes = dropped, "Discarding unterminated fragment at end of stream");
        }
        self.buffer.clear();
        self.discarding = false;
        dropped
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_multiple_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"start\necho:Marlin 2.1\nok\n");
        assert_eq!(lines, vec!["start", "echo:Marlin 2.1", "ok"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_fragment_retained_across_pushes() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"X:10.00 Y:").is_empty());
        assert_eq!(framer.pending(), b"X:10.00 Y:");
        let lines = framer.push(b"20.00 Z:5.00\r\no");
        assert_eq!(lines, vec!["X:10.00 Y:20.00 Z:5.00"]);
        assert_eq!(framer.push(b"k\n"), vec!["ok"]);
    }

    #[test]
    fn test_only_trailing_carriage_return_is_trimmed() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"a\rb\r\n\r\n");
        assert_eq!(lines, vec!["a\rb", ""]);
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"ok\r").is_empty());
        assert_eq!(framer.push(b"\n"), vec!["ok"]);
    }

    #[test]
    fn test_multibyte_character_split() {
        let text = "echo:température\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut framer = LineFramer::new();
        assert!(framer.push(&text[..split]).is_empty());
        assert_eq!(framer.push(&text[split..]), vec!["echo:température"]);
    }

    #[test]
    fn test_runaway_fragment_is_dropped() {
        let mut framer = LineFramer::with_max_line(16);
        assert!(framer.push(&[b'x'; 10]).is_empty());
        assert!(framer.push(&[b'x'; 10]).is_empty());
        assert!(framer.pending().is_empty());
        // the rest of the oversized line is skipped, framing resumes after it
        assert_eq!(framer.push(b"xxxx
ok
"), vec!["ok"]);
        assert_eq!(framer.push(b"X:1.00 Y:2.00 Z:3.00\n").len(), 1);
    }

    #[test]
    fn test_default_limit_bounds_buffer() {
        let mut framer = LineFramer::new();
        for _ in 0..64 {
            framer.push(&[b'a'; 1000]);
            assert!(framer.pending().len() <= MAX_LINE_BYTES);
        }
        assert_eq!(framer.push(b"\nok\n"), vec!["ok"]);
    }

    #[test]
    fn test_finish_discards_fragment() {
        let mut framer = LineFramer::new();
        framer.push(b"ok\npartial");
        assert_eq!(framer.finish(), 7);
        assert!(framer.pending().is_empty());
        assert!(framer.push(b"\n") == vec![String::new()]);
    }
}
