//! Bounded line history for process output.

use std::collections::VecDeque;

/// Callback invoked with each completed line.
pub type LineCallback = Box<dyn FnMut(&str) + Send>;

/// Split on `\r\n`, `\r` or `\n`. The result always has one more element
/// than there were terminators.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                parts.push(&text[start..i]);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Completed lines plus one pending partial line.
///
/// Text arrives in arbitrary chunks. Lines become visible to subscribers
/// once their terminator has been seen, or when the ring is closed.
pub struct TelemetryRing {
    max_lines: usize,
    lines: VecDeque<String>,
    pending: Option<String>,
    after_cr: bool,
    closed: bool,
    subscribers: Vec<LineCallback>,
}

impl std::fmt::Debug for TelemetryRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRing")
            .field("max_lines", &self.max_lines)
            .field("lines", &self.lines)
            .field("pending", &self.pending)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl TelemetryRing {
    /// Create a ring keeping at most `max_lines` completed lines (0 keeps
    /// everything).
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::new(),
            pending: None,
            after_cr: false,
            closed: false,
            subscribers: Vec::new(),
        }
    }

    /// Register a callback. Lines already in the history are replayed first.
    pub fn subscribe(&mut self, mut callback: LineCallback) {
        for line in &self.lines {
            callback(line);
        }
        self.subscribers.push(callback);
    }

    /// Feed a chunk of text.
    pub fn append(&mut self, chunk: &str) {
        if self.closed || chunk.is_empty() {
            return;
        }

        // A `\r\n` split across chunks is one terminator.
        let mut chunk = chunk;
        if std::mem::take(&mut self.after_cr) {
            chunk = chunk.strip_prefix('\n').unwrap_or(chunk);
            if chunk.is_empty() {
                return;
            }
        }
        self.after_cr = chunk.ends_with('\r');

        let mut parts = split_lines(chunk);
        let tail = parts.pop().unwrap_or_default();

        for (i, part) in parts.into_iter().enumerate() {
            let line = if i == 0 {
                let mut line = self.pending.take().unwrap_or_default();
                line.push_str(part);
                line
            } else {
                part.to_string()
            };
            self.emit(line);
        }

        if !tail.is_empty() {
            self.pending
                .get_or_insert_with(String::new)
                .push_str(tail);
        }
    }

    /// Flush the pending line and stop accepting text.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(line) = self.pending.take() {
            self.emit(line);
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// History and pending line joined by `\n`.
    pub fn get(&self) -> String {
        let mut out: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        if let Some(pending) = &self.pending {
            out.push(pending);
        }
        out.join("\n")
    }

    fn emit(&mut self, line: String) {
        for callback in &mut self.subscribers {
            callback(&line);
        }
        self.lines.push_back(line);
        if self.max_lines > 0 {
            while self.lines.len() > self.max_lines {
                self.lines.pop_front();
            }
        }
    }
}
