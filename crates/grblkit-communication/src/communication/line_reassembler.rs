//! Reassembly of a fragmented byte stream into protocol lines
//!
//! GRBL frames every response with `\n` (usually preceded by `\r`). Transport
//! reads arrive at arbitrary granularity, so a line, or its terminator, may be
//! split across any number of reads, including empty ones.

/// Longest unterminated input kept; GRBL responses are far shorter
pub const MAX_PENDING_LINE: usize = 1024;

/// Buffers input and yields complete, trimmed lines.
///
/// A line is only emitted once its `\n` has arrived. Lines that are empty
/// after trimming are dropped. An unterminated run longer than
/// [`MAX_PENDING_LINE`] is discarded up to and including its eventual `\n`.
#[derive(Debug, Default)]
pub struct LineReassembler {
    buffer: Vec<u8>,
    overflowed: bool,
}

impl LineReassembler {
    /// Create a reassembler with an empty pending prefix
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            overflowed: false,
        }
    }

    /// Append `chunk` and return every line it completes, in arrival order
    pub fn feed(&mut self, mut chunk: &[u8]) -> Vec<String> {
        if self.overflowed {
            let Some(newline) = chunk.iter().position(|&b| b == b'\n') else {
                return Vec::new();
            };
            chunk = &chunk[newline + 1..];
            self.overflowed = false;
        }
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let complete = match self.buffer.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                let remainder = self.buffer.split_off(last_newline + 1);
                std::mem::replace(&mut self.buffer, remainder)
            }
            None => Vec::new(),
        };

        if self.buffer.len() > MAX_PENDING_LINE {
            tracing::warn!(
                "Discarding {} bytes received without a line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
            self.overflowed = true;
        }

        complete
            .split(|&b| b == b'\n')
            .filter_map(|segment| {
                let segment = segment.strip_suffix(b"\r").unwrap_or(segment);
                let line = String::from_utf8_lossy(segment);
                let line = line.trim();
                (!line.is_empty()).then(|| line.to_string())
            })
            .collect()
    }

    /// Feed an optional chunk; `None` behaves like an empty read
    pub fn feed_opt(&mut self, chunk: Option<&[u8]>) -> Vec<String> {
        chunk.map(|c| self.feed(c)).unwrap_or_default()
    }

    /// Bytes received after the last terminator
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discard any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}
