// Incremental SSE parser for upstream byte streams. Handles `event:` /
// `data:` fields, comment lines, multi-line data, and events split across
// chunk boundaries.

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:`), when the protocol labels frames.
    pub event_type: Option<String>,
    /// The data payload; multi-line `data:` fields joined with newlines.
    pub data: String,
}

/// Feed chunks of text via `feed()` and receive complete events back.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_lines: Vec<String>,
    has_fields: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk. Returns the events completed by this chunk.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line_end = if pos > 0 && self.buffer.as_bytes()[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            let line = self.buffer[..line_end].to_string();
            self.buffer.drain(..pos + 1);

            if line.is_empty() {
                if let Some(event) = self.emit_event() {
                    events.push(event);
                }
            } else {
                self.process_line(&line);
            }
        }

        events
    }

    /// Flush a trailing event that was not terminated by a blank line
    /// (some upstreams end the body without one).
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                self.process_line(line);
            }
        }
        self.emit_event()
    }

    fn process_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let Some(colon) = line.find(':') else { return };
        let field = &line[..colon];
        let value = line[colon + 1..].strip_prefix(' ').unwrap_or(&line[colon + 1..]);
        match field {
            "event" => {
                self.event_type = Some(value.to_string());
                self.has_fields = true;
            }
            "data" => {
                self.data_lines.push(value.to_string());
                self.has_fields = true;
            }
            _ => {}
        }
    }

    fn emit_event(&mut self) -> Option<SseEvent> {
        if !self.has_fields {
            return None;
        }
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        self.has_fields = false;
        Some(event)
    }
}
