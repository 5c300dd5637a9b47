//! Server-Sent Events (SSE) parser.
//!
//! Incrementally parses raw bytes from an HTTP response into SSE events:
//! blocks separated by blank lines, with `event`, `data`, `id`, and `retry`
//! fields. Comment lines (leading `:`) and unknown fields are ignored.

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Incremental SSE parser that processes text chunks into events.
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed a chunk of text and return any complete events.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        // Complete event blocks are separated by double newlines
        while let Some(pos) = self.buffer.find("\n\n") {
            let block = self.buffer[..pos].to_string();
            self.buffer = self.buffer[pos + 2..].to_string();

            if let Some(event) = Self::parse_block(&block) {
                events.push(event);
            }
        }

        events
    }

    /// Parse one event block (the lines between blank lines).
    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        let mut id = None;
        let mut retry = None;

        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }

            if let Some((field, value)) = line.split_once(':') {
                // Leading space after the colon is stripped per the SSE spec
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    "id" => id = Some(value.to_string()),
                    "retry" => retry = value.parse().ok(),
                    _ => {}
                }
            } else if line == "data" {
                data_lines.push(String::new());
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
            id,
            retry,
        })
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: endpoint\ndata: /mcp/messages\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("endpoint"));
        assert_eq!(events[0].data, "/mcp/messages");
    }

    #[test]
    fn unnamed_event_carries_response_body() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].event_type.is_none());
        assert_eq!(events[0].data, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}");
    }

    #[test]
    fn bootstrap_sequence() {
        let mut parser = SseParser::new();
        let events =
            parser.feed("event: session\ndata: S-abc\n\nevent: endpoint\ndata: /mcp/msg?sid=S-abc\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("session"));
        assert_eq!(events[0].data, "S-abc");
        assert_eq!(events[1].event_type.as_deref(), Some("endpoint"));
        assert_eq!(events[1].data, "/mcp/msg?sid=S-abc");
    }

    #[test]
    fn partial_event_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: session\n").is_empty());
        assert!(parser.feed("data: S-1\n").is_empty());
        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "S-1");
    }

    #[test]
    fn multiline_data_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: first\ndata: second\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn comment_and_unknown_fields_ignored() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\nwhatever: x\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn id_and_retry_fields_parsed() {
        let mut parser = SseParser::new();
        let events = parser.feed("id: 42\nretry: 3000\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].retry, Some(3000));
    }

    #[test]
    fn block_without_data_is_dropped() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: ping\n\n").is_empty());
    }

    #[test]
    fn value_without_leading_space() {
        let mut parser = SseParser::new();
        let events = parser.feed("data:tight\n\n");
        assert_eq!(events[0].data, "tight");
    }
}
