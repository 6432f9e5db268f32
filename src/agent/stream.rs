//! Server-sent-event parsing for agent run streams.
//!
//! The byte stream is split on blank-line boundaries with a carry-over
//! buffer, so partial chunks and keep-alives are tolerated. Event decoding
//! is a pure function over the `event:`/`data:` pair and is tested without
//! any network involvement.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    AssistantDelta(String),
    ToolResult {
        tool_name: String,
        tool_call_id: String,
        content: Value,
    },
    Interrupt(Value),
    RunEnd,
    StreamError(String),
}

/// Accumulates raw SSE bytes and yields complete `(event, data)` pairs.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    pub fn push(&mut self, chunk: &str) -> Vec<(String, String)> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block = self.buffer[..boundary].to_string();
            self.buffer.drain(..boundary + 2);
            if let Some(event) = split_event_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever remains once the HTTP stream has closed.
    pub fn finish(&mut self) -> Option<(String, String)> {
        let block = std::mem::take(&mut self.buffer);
        if block.trim().is_empty() {
            return None;
        }
        split_event_block(&block)
    }
}

fn split_event_block(block: &str) -> Option<(String, String)> {
    let mut event_name = "message".to_string();
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event_name = name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some((event_name, data_lines.join("\n")))
}

/// Decode one SSE event into zero or more stream events.
pub fn process_event(event_name: &str, data: &str) -> Vec<StreamEvent> {
    if data == "[DONE]" || event_name == "end" {
        return vec![StreamEvent::RunEnd];
    }
    if event_name == "metadata" {
        return Vec::new();
    }
    if event_name == "error" {
        return vec![StreamEvent::StreamError(error_message(data))];
    }

    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return Vec::new();
    };

    if let Some(interrupts) = value.get("__interrupt__").and_then(Value::as_array) {
        return interrupts
            .iter()
            .map(|interrupt| {
                let payload = interrupt.get("value").cloned().unwrap_or_else(|| {
                    interrupt.clone()
                });
                StreamEvent::Interrupt(payload)
            })
            .collect();
    }

    message_objects(&value)
        .into_iter()
        .filter_map(decode_message)
        .collect()
}

fn error_message(data: &str) -> String {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| data.to_string())
}

/// Message payloads arrive as a single object, a list of objects, or a
/// `[message, metadata]` tuple per element depending on the stream mode.
fn message_objects(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(tuple) => tuple.first().cloned().unwrap_or(Value::Null),
                other => other.clone(),
            })
            .collect(),
        Value::Object(_) => vec![value.clone()],
        _ => Vec::new(),
    }
}

fn decode_message(message: Value) -> Option<StreamEvent> {
    let kind = message.get("type").and_then(Value::as_str)?;
    match kind {
        "AIMessageChunk" | "ai" => {
            let text = content_text(message.get("content"));
            if text.is_empty() {
                None
            } else {
                Some(StreamEvent::AssistantDelta(text))
            }
        }
        "tool" => Some(StreamEvent::ToolResult {
            tool_name: message
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            tool_call_id: message
                .get("tool_call_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content: message.get("content").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

/// Flatten message content, which is either a plain string or a list of
/// content blocks with `text` fields.
fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buffer_splits_events_across_chunks() {
        let mut buffer = SseBuffer::default();
        let first = buffer.push("event: messages/partial\ndata: [{\"type\": \"ai\",");
        assert!(first.is_empty(), "incomplete event should stay buffered");

        let second = buffer.push(" \"content\": \"Hello\"}]\n\nevent: end\ndata: {}\n\n");
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].0, "messages/partial");
        assert_eq!(second[1].0, "end");
    }

    #[test]
    fn finish_flushes_trailing_event() {
        let mut buffer = SseBuffer::default();
        assert!(buffer.push("data: [DONE]").is_empty());
        let (name, data) = buffer.finish().expect("trailing event should flush");
        assert_eq!(name, "message");
        assert_eq!(data, "[DONE]");
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn assistant_delta_from_message_list() {
        let data = json!([{"type": "AIMessageChunk", "content": "Working on it"}]).to_string();
        let events = process_event("messages/partial", &data);
        assert_eq!(
            events,
            vec![StreamEvent::AssistantDelta("Working on it".to_string())]
        );
    }

    #[test]
    fn assistant_delta_from_content_blocks() {
        let data = json!([{
            "type": "ai",
            "content": [{"type": "text", "text": "part one "}, {"type": "text", "text": "part two"}]
        }])
        .to_string();
        let events = process_event("messages/complete", &data);
        assert_eq!(
            events,
            vec![StreamEvent::AssistantDelta("part one part two".to_string())]
        );
    }

    #[test]
    fn tool_message_carries_raw_content() {
        let data = json!([{
            "type": "tool",
            "name": "create_process",
            "tool_call_id": "call_9",
            "content": "{'status': 'approval_required'}"
        }])
        .to_string();
        let events = process_event("messages/complete", &data);
        assert_eq!(events.len(), 1);
        let StreamEvent::ToolResult {
            tool_name,
            tool_call_id,
            content,
        } = &events[0]
        else {
            panic!("expected tool result");
        };
        assert_eq!(tool_name, "create_process");
        assert_eq!(tool_call_id, "call_9");
        assert_eq!(content, &json!("{'status': 'approval_required'}"));
    }

    #[test]
    fn message_tuples_use_first_element() {
        let data = json!([[{"type": "ai", "content": "hi"}, {"run_id": "r1"}]]).to_string();
        let events = process_event("messages", &data);
        assert_eq!(events, vec![StreamEvent::AssistantDelta("hi".to_string())]);
    }

    #[test]
    fn interrupt_event_extracts_value() {
        let data = json!({
            "__interrupt__": [{"value": {"entity_type": "process", "entity_summary": "P"}}]
        })
        .to_string();
        let events = process_event("values", &data);
        assert_eq!(events.len(), 1);
        let StreamEvent::Interrupt(value) = &events[0] else {
            panic!("expected interrupt");
        };
        assert_eq!(value["entity_type"], "process");
    }

    #[test]
    fn done_marker_ends_run() {
        assert_eq!(process_event("message", "[DONE]"), vec![StreamEvent::RunEnd]);
    }

    #[test]
    fn error_event_prefers_message_field() {
        let events = process_event("error", r#"{"message": "run crashed"}"#);
        assert_eq!(
            events,
            vec![StreamEvent::StreamError("run crashed".to_string())]
        );

        let raw = process_event("error", "plain failure text");
        assert_eq!(
            raw,
            vec![StreamEvent::StreamError("plain failure text".to_string())]
        );
    }

    #[test]
    fn malformed_data_is_skipped() {
        assert!(process_event("messages/partial", "{not json").is_empty());
    }
}
