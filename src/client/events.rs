use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::VecDeque;

use super::{ApiClient, ClientError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub name: String,
    pub data: String,
}

/// Incremental Server-Sent Events decoder. Chunks may split lines (or UTF-8
/// sequences) anywhere; complete events come out as soon as their blank
/// terminator line arrives.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    name: Option<String>,
    data: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<PushEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<PushEvent> {
        if line.is_empty() {
            let name = self.name.take();
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(PushEvent {
                name: name.unwrap_or_else(|| "message".to_string()),
                data,
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

/// A live connection to the push channel.
pub struct EventStream {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    parser: FrameParser,
    pending: VecDeque<PushEvent>,
}

impl EventStream {
    /// Returns once the server has accepted the subscription, so every event
    /// published after this point will be delivered.
    pub async fn connect(client: &ApiClient) -> Result<Self, ClientError> {
        let response = client.open_events().await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(Self {
            body,
            parser: FrameParser::new(),
            pending: VecDeque::new(),
        })
    }

    /// `None` once the server closes the stream.
    pub async fn next_event(&mut self) -> Option<Result<PushEvent, ClientError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            match self.body.next().await? {
                Ok(chunk) => self.pending.extend(self.parser.feed(&chunk)),
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_events_and_skips_comments() {
        let mut parser = FrameParser::new();
        let events = parser.feed(
            b": connected\n\nevent: registration:created\ndata: {\"id\":1}\n\n: keep-alive\n\n",
        );
        assert_eq!(
            events,
            vec![PushEvent {
                name: "registration:created".to_string(),
                data: "{\"id\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn handles_split_chunks_and_crlf() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(b"event: registration:upd").is_empty());
        assert!(parser.feed(b"ated\r\ndata: {}\r").is_empty());
        let events = parser.feed(b"\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "registration:updated");
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn joins_multi_line_data_and_defaults_name() {
        let mut parser = FrameParser::new();
        let events = parser.feed(b"data: a\ndata: b\n\n");
        assert_eq!(events[0].name, "message");
        assert_eq!(events[0].data, "a\nb");
    }
}
