use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// One exchange flow picked from a search result, sent back with an
/// approving decision so the agent knows which flows to add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSelection {
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// The outbound record handed to the transport's resume call. Created by
/// the UI on submit and consumed exactly once; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDecision {
    pub decision: Decision,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_exchanges: Vec<ExchangeSelection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionError {
    MissingRejectionReason,
}

impl fmt::Display for DecisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRejectionReason => {
                write!(f, "a rejection requires a non-empty reason")
            }
        }
    }
}

impl std::error::Error for DecisionError {}

impl UserDecision {
    pub fn approve() -> Self {
        Self {
            decision: Decision::Approve,
            reason: String::new(),
            suggestions: Vec::new(),
            selected_exchanges: Vec::new(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Reject,
            reason: reason.into(),
            suggestions: Vec::new(),
            selected_exchanges: Vec::new(),
        }
    }

    /// Pre-submission guard: rejections must carry a reason.
    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.decision == Decision::Reject && self.reason.trim().is_empty() {
            return Err(DecisionError::MissingRejectionReason);
        }
        Ok(())
    }

    /// Payload for the transport's resume command.
    pub fn to_resume_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Legacy wrapped shape kept for backward compatibility with older
    /// backend graph versions.
    pub fn to_legacy_payload(&self, tool_name: &str, tool_call_id: &str) -> Value {
        json!({
            "tool_response": {
                "tool_name": tool_name,
                "tool_call_id": tool_call_id,
                "approval_decision": self.to_resume_payload(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_requires_reason() {
        let decision = UserDecision::reject("");
        assert_eq!(
            decision.validate(),
            Err(DecisionError::MissingRejectionReason)
        );

        let whitespace_only = UserDecision::reject("   ");
        assert!(whitespace_only.validate().is_err());
    }

    #[test]
    fn approval_needs_no_reason() {
        assert!(UserDecision::approve().validate().is_ok());
    }

    #[test]
    fn resume_payload_shape() {
        let mut decision = UserDecision::reject("wrong unit");
        decision.suggestions = vec!["use kg instead of t".to_string()];
        let payload = decision.to_resume_payload();
        assert_eq!(payload["decision"], "reject");
        assert_eq!(payload["reason"], "wrong unit");
        assert_eq!(payload["suggestions"][0], "use kg instead of t");
        assert!(payload.get("selected_exchanges").is_none());
    }

    #[test]
    fn selected_exchanges_serialize_with_approval() {
        let mut decision = UserDecision::approve();
        decision.selected_exchanges = vec![ExchangeSelection {
            flow_id: "f1".to_string(),
            process_id: Some("p1".to_string()),
            amount: Some(1.5),
            unit: Some("kg".to_string()),
        }];
        let payload = decision.to_resume_payload();
        assert_eq!(payload["decision"], "approve");
        assert_eq!(payload["selected_exchanges"][0]["flow_id"], "f1");
        assert_eq!(payload["selected_exchanges"][0]["amount"], 1.5);
    }

    #[test]
    fn legacy_payload_wraps_tool_response() {
        let payload = UserDecision::approve().to_legacy_payload("create_process", "call_1");
        let tool_response = &payload["tool_response"];
        assert_eq!(tool_response["tool_name"], "create_process");
        assert_eq!(tool_response["tool_call_id"], "call_1");
        assert_eq!(tool_response["approval_decision"]["decision"], "approve");
    }
}
