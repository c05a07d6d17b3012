// Captured command output

use serde::{Deserialize, Serialize};

/// Per-stream cap on stored stdout/stderr (characters)
pub const MAX_OUTPUT_CHARS: usize = 100_000;

/// Worst-case UTF-8 width, used to size the raw byte budget
const MAX_UTF8_WIDTH: usize = 4;

/// How the remote command ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitStatus {
    /// Server reported an exit code
    Code(i32),
    /// Server reported a terminating signal instead of a code
    Signal(String),
    /// Channel closed without any exit report
    Unknown,
}

/// Outcome of one successful channel run (the command ran; it may still have failed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: i64,
}

/// Byte sink that keeps a bounded prefix and silently discards the rest.
///
/// The remote stream must keep being drained after the cap is hit so that the
/// exit status, which arrives last, is still read.
#[derive(Debug)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    max_chars: usize,
    max_bytes: usize,
    overflowed: bool,
}

impl CappedBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            bytes: Vec::new(),
            max_chars,
            max_bytes: max_chars.saturating_mul(MAX_UTF8_WIDTH),
            overflowed: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.max_bytes.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.overflowed = true;
        }
        let take = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..take]);
    }

    /// Decode (lossy UTF-8) and clip to the character cap.
    ///
    /// Returns the text and whether anything was dropped.
    pub fn finish(self) -> (String, bool) {
        let text = String::from_utf8_lossy(&self.bytes);
        match text.char_indices().nth(self.max_chars) {
            Some((cut, _)) => (text[..cut].to_string(), true),
            None => (text.into_owned(), self.overflowed),
        }
    }
}

impl Default for CappedBuffer {
    fn default() -> Self {
        Self::new(MAX_OUTPUT_CHARS)
    }
}
