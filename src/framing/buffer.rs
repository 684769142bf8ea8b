//! Frame accumulation across chunk boundaries

/// Delimiter used to cut the accumulated text into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Blocks terminated by a blank line (`\n\n`)
    Sse,
    /// Lines terminated by `\n`
    Ndjson,
}

impl FrameMode {
    fn delimiter(self) -> &'static str {
        match self {
            FrameMode::Sse => "\n\n",
            FrameMode::Ndjson => "\n",
        }
    }
}

/// Buffer for accumulating incomplete frames across chunk boundaries.
///
/// Text arrives in chunks that do not align with frame boundaries. The
/// buffer always splits the concatenation of what it holds and the new
/// chunk, so a delimiter straddling two chunks is found like any other.
///
/// # Example
/// ```
/// use opflow::framing::{FrameBuffer, FrameMode};
///
/// let mut buffer = FrameBuffer::new(FrameMode::Ndjson);
///
/// // First chunk contains a partial line
/// assert!(buffer.push("{\"step\":\"sel").is_empty());
///
/// // Second chunk completes it
/// assert_eq!(buffer.push("ect\"}\n"), vec!["{\"step\":\"select\"}"]);
/// ```
#[derive(Debug)]
pub struct FrameBuffer {
    mode: FrameMode,
    /// Trailing partial frame
    pending: String,
    /// Prefix of `pending` already searched without finding a delimiter
    scanned: usize,
}

impl FrameBuffer {
    /// Create a new empty buffer
    pub fn new(mode: FrameMode) -> Self {
        Self {
            mode,
            pending: String::new(),
            scanned: 0,
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Feed a chunk and return every frame it completes, in order.
    ///
    /// Delimiters are stripped from returned frames. In SSE mode carriage
    /// returns are discarded so CRLF streams split the same way.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        match self.mode {
            FrameMode::Sse => self.pending.extend(chunk.chars().filter(|c| *c != '\r')),
            FrameMode::Ndjson => self.pending.push_str(chunk),
        }

        let delimiter = self.mode.delimiter().as_bytes();
        let mut frames = Vec::new();
        let mut consumed = 0;
        // a delimiter may straddle the old tail and the new chunk
        let mut search_from = self.scanned.saturating_sub(delimiter.len() - 1);

        while let Some(pos) = find(&self.pending.as_bytes()[search_from..], delimiter) {
            let end = search_from + pos;
            frames.push(self.pending[consumed..end].to_string());
            consumed = end + delimiter.len();
            search_from = consumed;
        }

        if consumed > 0 {
            self.pending.drain(..consumed);
        }
        self.scanned = self.pending.len();

        frames
    }

    /// Surface the trailing unterminated frame at end of stream.
    ///
    /// Returns `None` when nothing but whitespace is left. The buffer is
    /// empty afterwards either way.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        self.scanned = 0;
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Number of bytes held in the partial frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Byte offset of the first occurrence of `needle`. Delimiters are ASCII,
/// so every match falls on a char boundary.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
