use crate::agent::ConnectionState;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum AppEvent {
    StreamDelta(String),
    StreamEnd,
    StatusChanged(ConnectionState),
    AgentError(String),
    SessionCreated(String),
    ToolResult {
        tool_name: String,
        tool_call_id: String,
        content: Value,
    },
    InterruptRaised {
        value: Value,
    },
    DecisionDispatched {
        tool_call_id: String,
    },
    SetTheme {
        dark: bool,
    },
}
