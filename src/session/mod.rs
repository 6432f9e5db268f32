use serde::{Deserialize, Serialize};

pub mod store;

pub const SCHEMA_VERSION: u32 = 1;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionMeta {
    pub schema_version: u32,
    pub session_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub messages: Vec<Message>,
}

/// One transcript entry. Tool results keep their raw content so they can
/// be re-parsed and re-classified on load.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn chat(role: &str, content: impl Into<String>, timestamp: String) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            timestamp,
            tool_name: None,
            tool_call_id: None,
        }
    }

    pub fn tool(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: String,
    ) -> Self {
        Self {
            role: ROLE_TOOL.to_string(),
            content: content.into(),
            timestamp,
            tool_name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}
