use crate::event::AppEvent;
use crate::payload::decision::{DecisionError, UserDecision};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::RwLock;

pub mod stream;

use stream::{process_event, SseBuffer, StreamEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Agent runs can spend minutes in database work before the first token.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub enum AgentClientError {
    RuntimeUnavailable(String),
    HttpClient(String),
}

impl fmt::Display for AgentClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimeUnavailable(message) => {
                write!(f, "tokio runtime unavailable: {message}")
            }
            Self::HttpClient(message) => write!(f, "failed to build HTTP client: {message}"),
        }
    }
}

impl std::error::Error for AgentClientError {}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub assistant_id: String,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("MANTLE_AGENT_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:2024".to_string()),
            assistant_id: std::env::var("MANTLE_ASSISTANT_ID")
                .unwrap_or_else(|_| "lca_agent".to_string()),
        }
    }
}

/// Client for the agent backend: thread creation, run streaming, and
/// interrupt resumption. All calls are fire-and-forget; outcomes come back
/// over the app event channel.
#[derive(Clone)]
pub struct AgentClient {
    config: AgentConfig,
    http: HttpClient,
    http_stream: HttpClient,
    tx: mpsc::Sender<AppEvent>,
    thread_id: Arc<RwLock<Option<String>>>,
    runtime_handle: Handle,
}

impl AgentClient {
    pub fn new(config: AgentConfig, tx: mpsc::Sender<AppEvent>) -> Result<Self, AgentClientError> {
        let runtime_handle = Handle::try_current()
            .map_err(|err| AgentClientError::RuntimeUnavailable(err.to_string()))?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AgentClientError::HttpClient(err.to_string()))?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AgentClientError::HttpClient(err.to_string()))?;

        Ok(Self {
            config,
            http,
            http_stream,
            tx,
            thread_id: Arc::new(RwLock::new(None)),
            runtime_handle,
        })
    }

    pub fn start(&self) {
        let _ = self
            .tx
            .send(AppEvent::StatusChanged(ConnectionState::Connecting));

        let client = self.clone();
        self.runtime_handle.spawn(async move {
            let health_url = format!("{}/ok", client.config.base_url);
            match client.http.get(&health_url).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    client.report_connection_error(format!(
                        "agent backend health check returned {}",
                        response.status()
                    ));
                    return;
                }
                Err(err) => {
                    client.report_connection_error(format!("agent backend unreachable: {err}"));
                    return;
                }
            }

            let threads_url = format!("{}/threads", client.config.base_url);
            let created = client
                .http
                .post(&threads_url)
                .json(&json!({}))
                .send()
                .await;
            let thread_id = match created {
                Ok(response) => match response.json::<Value>().await {
                    Ok(body) => body
                        .get("thread_id")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    Err(err) => {
                        client.report_connection_error(format!(
                            "failed to decode thread response: {err}"
                        ));
                        return;
                    }
                },
                Err(err) => {
                    client.report_connection_error(format!("failed to create thread: {err}"));
                    return;
                }
            };

            let Some(thread_id) = thread_id else {
                client.report_connection_error("thread response carried no thread_id".to_string());
                return;
            };

            {
                let mut slot = client.thread_id.write().await;
                *slot = Some(thread_id.clone());
            }
            let _ = client.tx.send(AppEvent::SessionCreated(thread_id));
            let _ = client
                .tx
                .send(AppEvent::StatusChanged(ConnectionState::Connected));
        });
    }

    pub fn send(&self, prompt: String) {
        let body = json!({
            "assistant_id": self.config.assistant_id,
            "input": {"messages": [{"role": "user", "content": prompt}]},
            "stream_mode": ["messages"],
        });
        self.spawn_run(body, None);
    }

    /// Validate and dispatch a user decision as a resume command.
    ///
    /// The guard runs synchronously so the UI can surface the failure next
    /// to the widget; nothing reaches the transport on a guard violation.
    /// The dispatch confirmation is emitted only after the backend accepts
    /// the run request, so a dead thread or unreachable backend leaves the
    /// decision pending instead of falsely resolved.
    pub fn submit_decision(
        &self,
        tool_call_id: &str,
        decision: &UserDecision,
    ) -> Result<(), DecisionError> {
        decision.validate()?;
        let body = json!({
            "assistant_id": self.config.assistant_id,
            "command": {"resume": decision.to_resume_payload()},
            "stream_mode": ["messages"],
        });
        self.spawn_run(
            body,
            Some(AppEvent::DecisionDispatched {
                tool_call_id: tool_call_id.to_string(),
            }),
        );
        Ok(())
    }

    fn spawn_run(&self, body: Value, on_accept: Option<AppEvent>) {
        let client = self.clone();
        self.runtime_handle.spawn(async move {
            let thread_id = {
                let guard = client.thread_id.read().await;
                guard.clone()
            };
            let Some(thread_id) = thread_id else {
                let _ = client
                    .tx
                    .send(AppEvent::AgentError("no active agent thread".to_string()));
                return;
            };

            let url = format!("{}/threads/{}/runs/stream", client.config.base_url, thread_id);
            let response = client.http_stream.post(&url).json(&body).send().await;
            match response {
                Ok(response) if response.status().is_success() => {
                    if let Some(event) = on_accept {
                        let _ = client.tx.send(event);
                    }
                    client.pump_stream(response).await;
                }
                Ok(response) => {
                    let status = response.status();
                    let detail = response.text().await.unwrap_or_default();
                    let _ = client.tx.send(AppEvent::AgentError(format!(
                        "run request failed with {status}: {detail}"
                    )));
                    let _ = client.tx.send(AppEvent::StreamEnd);
                }
                Err(err) => {
                    let _ = client
                        .tx
                        .send(AppEvent::AgentError(format!("run request failed: {err}")));
                    let _ = client.tx.send(AppEvent::StreamEnd);
                }
            }
        });
    }

    async fn pump_stream(&self, response: reqwest::Response) {
        let mut bytes = response.bytes_stream();
        let mut buffer = SseBuffer::default();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    let text = String::from_utf8_lossy(&chunk);
                    for (event_name, data) in buffer.push(&text) {
                        for event in process_event(&event_name, &data) {
                            self.forward(event);
                        }
                    }
                }
                Err(err) => {
                    let _ = self
                        .tx
                        .send(AppEvent::AgentError(format!("stream read error: {err}")));
                    break;
                }
            }
        }

        if let Some((event_name, data)) = buffer.finish() {
            for event in process_event(&event_name, &data) {
                self.forward(event);
            }
        }
        let _ = self.tx.send(AppEvent::StreamEnd);
    }

    fn forward(&self, event: StreamEvent) {
        let app_event = match event {
            StreamEvent::AssistantDelta(delta) => AppEvent::StreamDelta(delta),
            StreamEvent::ToolResult {
                tool_name,
                tool_call_id,
                content,
            } => AppEvent::ToolResult {
                tool_name,
                tool_call_id,
                content,
            },
            StreamEvent::Interrupt(value) => AppEvent::InterruptRaised { value },
            StreamEvent::RunEnd => AppEvent::StreamEnd,
            StreamEvent::StreamError(message) => AppEvent::AgentError(message),
        };
        let _ = self.tx.send(app_event);
    }

    fn report_connection_error(&self, message: String) {
        let _ = self
            .tx
            .send(AppEvent::StatusChanged(ConnectionState::Error));
        let _ = self.tx.send(AppEvent::AgentError(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decision::UserDecision;

    #[tokio::test]
    async fn rejected_decision_without_reason_never_dispatches() {
        let (tx, rx) = mpsc::channel();
        let client = AgentClient::new(
            AgentConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                assistant_id: "lca_agent".to_string(),
            },
            tx,
        )
        .expect("client should build inside a runtime");

        let result = client.submit_decision("call_1", &UserDecision::reject(""));
        assert!(result.is_err());
        assert!(
            rx.try_recv().is_err(),
            "guard violation must not emit any event"
        );
    }

    #[tokio::test]
    async fn decision_without_backend_never_resolves() {
        let (tx, rx) = mpsc::channel();
        let client = AgentClient::new(
            AgentConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                assistant_id: "lca_agent".to_string(),
            },
            tx,
        )
        .expect("client should build inside a runtime");

        client
            .submit_decision("call_2", &UserDecision::approve())
            .expect("approval should pass the guard");
        assert!(
            rx.try_recv().is_err(),
            "dispatch confirmation must wait for the run request"
        );

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let event = rx.try_recv().expect("missing thread should be reported");
        assert!(matches!(event, AppEvent::AgentError(_)));
        assert!(
            rx.try_recv().is_err(),
            "no dispatch confirmation without an accepted run"
        );
    }
}
