use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use buildq_core::terminal::{OutputSink, TerminalRegistry};
use buildq_core::util::{lock, RingBytes};
use chrono::{DateTime, Local};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// An unterminated line longer than this is written out as if it ended.
const MAX_PARTIAL_LINE: usize = 16 * 1024;

/// Terminal registry that interleaves every job's output on one writer.
///
/// Lines are prefixed with `[<sink name>]`; an unterminated trailing line is
/// held back until its newline arrives or the sink is closed. Lines longer
/// than `MAX_PARTIAL_LINE` are broken up. Each sink keeps the last
/// `capture_bytes` of raw output for [`TerminalRegistry::reveal`].
pub struct StdioTerminals {
    capture_bytes: usize,
    writer: SharedWriter,
    sinks: Mutex<HashMap<String, Arc<StdioSink>>>,
}

impl StdioTerminals {
    pub fn stdout(capture_bytes: usize) -> Self {
        Self::with_writer(capture_bytes, Box::new(std::io::stdout()))
    }

    pub fn with_writer(capture_bytes: usize, writer: Box<dyn Write + Send>) -> Self {
        Self {
            capture_bytes,
            writer: Arc::new(Mutex::new(writer)),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.sinks).keys().cloned().collect();
        names.sort();
        names
    }
}

struct StdioSink {
    name: String,
    opened_at: DateTime<Local>,
    tail: Arc<RingBytes>,
    partial: Mutex<String>,
    writer: SharedWriter,
}

impl StdioSink {
    fn write_lines(&self, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }
        let mut w = lock(&self.writer);
        for line in lines {
            let _ = writeln!(w, "[{}] {}", self.name, line);
        }
        let _ = w.flush();
    }

    fn flush_partial(&self) {
        let rest = std::mem::take(&mut *lock(&self.partial));
        let rest = rest.trim_end_matches('\r');
        if !rest.is_empty() {
            self.write_lines(&[rest]);
        }
    }
}

impl OutputSink for StdioSink {
    fn append(&self, text: &str) {
        self.tail.push(text.as_bytes());

        let complete = {
            let mut partial = lock(&self.partial);
            match text.rfind('\n') {
                Some(end) => {
                    let mut complete = std::mem::take(&mut *partial);
                    complete.push_str(&text[..=end]);
                    partial.push_str(&text[end + 1..]);
                    complete
                }
                None => {
                    partial.push_str(text);
                    if partial.len() < MAX_PARTIAL_LINE {
                        return;
                    }
                    std::mem::take(&mut *partial)
                }
            }
        };
        let lines: Vec<&str> = complete
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .collect();
        self.write_lines(&lines);
    }
}

impl TerminalRegistry for StdioTerminals {
    fn open(&self, name: &str) -> Arc<dyn OutputSink> {
        let mut sinks = lock(&self.sinks);
        let sink = sinks.entry(name.to_string()).or_insert_with(|| {
            Arc::new(StdioSink {
                name: name.to_string(),
                opened_at: Local::now(),
                tail: RingBytes::new(self.capture_bytes),
                partial: Mutex::new(String::new()),
                writer: self.writer.clone(),
            })
        });
        sink.clone()
    }

    fn reveal(&self, name: &str) -> bool {
        let Some(sink) = lock(&self.sinks).get(name).cloned() else {
            return false;
        };
        let tail = sink.tail.to_string_lossy();
        let mut w = lock(&self.writer);
        let _ = writeln!(
            w,
            "==== {} (opened {}) ====",
            sink.name,
            sink.opened_at.format("%H:%M:%S")
        );
        let _ = w.write_all(tail.as_bytes());
        if !tail.is_empty() && !tail.ends_with('\n') {
            let _ = writeln!(w);
        }
        let _ = writeln!(w, "==== end {} ====", sink.name);
        let _ = w.flush();
        true
    }

    fn close_all(&self) {
        let drained: Vec<Arc<StdioSink>> = lock(&self.sinks).drain().map(|(_, s)| s).collect();
        for sink in drained {
            sink.flush_partial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn terminals(capture: usize) -> (StdioTerminals, SharedBuf) {
        let buf = SharedBuf::default();
        (StdioTerminals::with_writer(capture, Box::new(buf.clone())), buf)
    }

    #[test]
    fn prefixes_complete_lines_and_holds_partial_ones() {
        let (terms, buf) = terminals(1024);
        let sink = terms.open("app:build");

        sink.append("Compiling app\r\nwarn");
        assert_eq!(buf.text(), "[app:build] Compiling app\n");

        sink.append("ing: unused\n");
        assert_eq!(
            buf.text(),
            "[app:build] Compiling app\n[app:build] warning: unused\n"
        );
    }

    #[test]
    fn reopening_returns_the_same_sink() {
        let (terms, buf) = terminals(1024);
        terms.open("a:test").append("one ");
        terms.open("a:test").append("two\n");
        assert_eq!(buf.text(), "[a:test] one two\n");
        assert_eq!(terms.open_names(), vec!["a:test".to_string()]);
    }

    #[test]
    fn reveal_prints_retained_tail() {
        let (terms, buf) = terminals(6);
        terms.open("a:test").append("0123456789\n");
        let before = buf.text().len();

        assert!(terms.reveal("a:test"));
        let revealed = buf.text()[before..].to_string();
        assert!(revealed.starts_with("==== a:test (opened "), "{revealed}");
        assert!(revealed.contains("\n56789\n==== end a:test ====\n"), "{revealed}");

        assert!(!terms.reveal("missing:test"));
    }

    #[test]
    fn close_all_flushes_partial_lines_and_forgets_sinks() {
        let (terms, buf) = terminals(1024);
        terms.open("a:test").append("no newline");
        assert_eq!(buf.text(), "");

        terms.close_all();
        assert_eq!(buf.text(), "[a:test] no newline\n");
        assert!(terms.open_names().is_empty());
        assert!(!terms.reveal("a:test"));
    }

    #[test]
    fn oversized_unterminated_line_is_flushed() {
        let (terms, buf) = terminals(64);
        let sink = terms.open("a:build");
        let chunk = "#".repeat(1024);
        for _ in 0..(MAX_PARTIAL_LINE / chunk.len()) - 1 {
            sink.append(&chunk);
        }
        assert_eq!(buf.text(), "");

        sink.append(&chunk);
        let text = buf.text();
        assert!(text.starts_with("[a:build] ###"));
        assert_eq!(text.len(), "[a:build] ".len() + MAX_PARTIAL_LINE + 1);

        sink.append("done\n");
        assert!(buf.text().ends_with("\n[a:build] done\n"));
    }
}
