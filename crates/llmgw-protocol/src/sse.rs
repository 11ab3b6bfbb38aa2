use bytes::Bytes;

/// One `text/event-stream` record.
///
/// Framing: each non-empty field is written as its labeled line, multi-line
/// `data` is split on `\n` into one `data:` line per segment, and the record
/// ends with a blank line. A record with neither data nor comment encodes to
/// nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub data: Option<String>,
    pub event: Option<String>,
    /// Reconnection delay in milliseconds.
    pub retry: Option<u64>,
    /// Comment lines keep idle connections alive.
    pub comment: Option<String>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut out = String::new();

        let data = self.data.as_deref().unwrap_or("");
        let comment = self.comment.as_deref().unwrap_or("");
        if data.is_empty() && comment.is_empty() {
            return Bytes::new();
        }

        if !data.is_empty() {
            if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
                out.push_str("id: ");
                out.push_str(id);
                out.push('\n');
            }

            for segment in data.split('\n') {
                out.push_str("data: ");
                out.push_str(segment);
                out.push('\n');
            }

            if let Some(event) = self.event.as_deref().filter(|ev| !ev.is_empty()) {
                out.push_str("event: ");
                out.push_str(event);
                out.push('\n');
            }

            if let Some(retry) = self.retry {
                out.push_str("retry: ");
                out.push_str(&retry.to_string());
                out.push('\n');
            }
        }

        if !comment.is_empty() {
            out.push_str(": ");
            out.push_str(comment);
            out.push('\n');
        }

        out.push('\n');
        Bytes::from(out)
    }
}

/// Incremental decoder for upstream `text/event-stream` bodies.
///
/// Feed arbitrary byte chunks; complete records come out as they close.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    id: Option<String>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);

            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.finish_record(&mut events);
                continue;
            }

            self.consume_line(&line);
        }

        events
    }

    /// Drains any record still open at end of input.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            self.consume_line(&line);
        }

        let mut events = Vec::new();
        self.finish_record(&mut events);
        events
    }

    fn consume_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "id" => self.id = (!value.is_empty()).then(|| value.to_string()),
            "event" => self.event = (!value.is_empty()).then(|| value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
    }

    fn finish_record(&mut self, events: &mut Vec<SseEvent>) {
        if self.event.is_none() && self.data_lines.is_empty() {
            return;
        }

        events.push(SseEvent {
            id: self.id.take(),
            data: Some(self.data_lines.join("\n")),
            event: self.event.take(),
            retry: None,
            comment: None,
        });
        self.data_lines.clear();
    }
}
