//! Line-buffered detection of the textual warning marker in streamed output.
use std::sync::OnceLock;

use regex::Regex;

static WARNING_MARKER_REGEX: OnceLock<Regex> = OnceLock::new();

fn warning_marker_regex() -> &'static Regex {
    WARNING_MARKER_REGEX
        .get_or_init(|| Regex::new(r"(?i)warning:").expect("WARNING_MARKER_REGEX is valid"))
}

const MARKER_LEN: usize = "warning:".len();

/// Scans output chunks for a case-insensitive `warning:` on any complete line.
///
/// Chunks may split lines (and the marker) anywhere. Only the last
/// `MARKER_LEN - 1` bytes of the current line are held between chunks, so
/// newline-free output keeps memory flat. A hit on the current line is only
/// committed once its terminator arrives; a fragment still pending when the
/// stream ends is never counted. Once observed, the flag never resets.
#[derive(Debug, Default)]
pub struct WarningScanner {
    tail: String,
    line_hit: bool,
    observed: bool,
}

impl WarningScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) {
        if self.observed {
            return;
        }

        let mut segments = chunk.split('\n').peekable();
        while let Some(segment) = segments.next() {
            self.scan_segment(segment);

            // `\r\n` splits on its `\n`; the `\r` never forms part of the marker.
            if segments.peek().is_some() {
                self.observed |= self.line_hit;
                self.line_hit = false;
                self.tail.clear();
                if self.observed {
                    return;
                }
            }
        }
    }

    fn scan_segment(&mut self, segment: &str) {
        if self.line_hit || segment.is_empty() {
            return;
        }
        self.tail.push_str(segment);
        if warning_marker_regex().is_match(&self.tail) {
            self.line_hit = true;
            self.tail.clear();
            return;
        }
        let mut keep_from = self.tail.len().saturating_sub(MARKER_LEN - 1);
        while !self.tail.is_char_boundary(keep_from) {
            keep_from += 1;
        }
        self.tail.drain(..keep_from);
    }

    pub fn observed(&self) -> bool {
        self.observed
    }

    /// Whether the unterminated current line already contains the marker.
    pub fn line_pending_hit(&self) -> bool {
        self.line_hit
    }

    /// Bytes of the unterminated current line held for the next chunk.
    pub fn pending(&self) -> &str {
        &self.tail
    }
}
