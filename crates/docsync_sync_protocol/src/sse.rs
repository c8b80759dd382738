//! Incremental `text/event-stream` decoding.

use std::fmt::Write;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name, `message` when the stream did not name it.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream.
    pub id: Option<String>,
}

impl SseFrame {
    /// Creates a frame without an id.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }

    /// Encodes the frame in stream form, terminated by a blank line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {id}");
        }
        let _ = writeln!(out, "event: {}", self.event);
        for line in self.data.split('\n') {
            let _ = writeln!(out, "data: {line}");
        }
        out.push('\n');
        out
    }
}

/// Decodes a stream delivered in arbitrary chunks.
///
/// Lines may end in `\n`, `\r\n` or `\r`. Comment lines (starting with `:`)
/// and unknown fields are skipped; a blank line dispatches the pending
/// event if it has data.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: String,
    pending_cr: bool,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for c in chunk.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if c == '\n' {
                    continue;
                }
            }
            match c {
                '\r' => {
                    self.pending_cr = true;
                    self.end_line(&mut frames);
                }
                '\n' => self.end_line(&mut frames),
                other => self.line.push(other),
            }
        }
        frames
    }

    /// Reconnection delay the server asked for, in milliseconds.
    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    /// Id of the last event, used to resume a stream.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(delay) = value.parse() {
                    self.retry = Some(delay);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.filter(|name| !name.is_empty()).unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("event: welc").is_empty());
        assert!(decoder.push("ome\ndata: {\"a\"").is_empty());
        let frames = decoder.push(":1}\n\n");
        assert_eq!(frames, vec![SseFrame::new("welcome", "{\"a\":1}")]);
    }

    #[test]
    fn joins_multi_line_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push("data: one\ndata: two\n\n");
        assert_eq!(frames[0].data, "one\ntwo");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn skips_comments_and_empty_events() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(": keep-alive\n\nevent: x\n\ndata: y\n\n");
        assert_eq!(frames, vec![SseFrame::new("message", "y")]);
    }

    #[test]
    fn handles_crlf_and_ids() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push("id: 7\r\nevent: mutation\r\ndata:x\r\n\r\nretry: 3000\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].data, "x");
        assert_eq!(decoder.retry(), Some(3000));
        assert_eq!(decoder.last_event_id(), Some("7"));
    }

    #[test]
    fn crlf_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("data: a\r").is_empty());
        let frames = decoder.push("\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("message", "a")]);
    }

    #[test]
    fn encode_then_decode() {
        let frame = SseFrame {
            event: "mutation".into(),
            data: "line 1\nline 2".into(),
            id: Some("e1".into()),
        };
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(&frame.encode()), vec![frame]);
    }
}
