use crate::agent::{AgentClient, ConnectionState};
use crate::event::AppEvent;
use crate::host::{ChannelBridge, HostBridge};
use crate::payload::classify::{self, Classified};
use crate::payload::decision::Decision;
use crate::payload::parse::{self, RawPayload};
use crate::session::store;
use crate::session::{Message, SessionMeta, ROLE_ASSISTANT, ROLE_TOOL, ROLE_USER, SCHEMA_VERSION};
use crate::theme::Theme;
use crate::ui::cards::{self, CardAction, ToolView};
use crate::ui::draft::DecisionDraft;
use eframe::egui::{self, Color32, RichText, ScrollArea};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const INTERRUPT_TOOL_NAME: &str = "interrupt";

pub enum ChatEntry {
    User(Message),
    Assistant(Message),
    Tool(ToolEntry),
}

pub struct ToolEntry {
    pub tool_name: String,
    pub tool_call_id: String,
    pub raw_text: String,
    pub classified: Classified,
    pub view: ToolView,
}

pub struct MantleApp {
    rx: Receiver<AppEvent>,
    agent: AgentClient,
    bridge: Arc<ChannelBridge>,
    connection_state: ConnectionState,
    transcript: Vec<ChatEntry>,
    sessions: Vec<SessionMeta>,
    current_session: Option<SessionMeta>,
    input_buffer: String,
    in_progress_assistant: String,
    is_streaming: bool,
    diagnostics_log: Vec<String>,
    scroll_to_bottom: bool,
    session_unavailable: bool,
    theme: Theme,
    theme_dirty: bool,
    drafts: BTreeMap<String, DecisionDraft>,
    pending_decisions: BTreeMap<String, Decision>,
    interrupt_seq: u64,
}

/// Parse and classify raw tool content in one step. String payloads go
/// through the tolerant text path; anything already structured skips it.
fn classify_content(content: &Value) -> (Classified, String) {
    let (raw, raw_text) = match content {
        Value::String(text) => (RawPayload::from_text(text), text.clone()),
        other => (RawPayload::from_value(other.clone()), other.to_string()),
    };
    (classify::classify(&parse::parse(&raw)), raw_text)
}

impl MantleApp {
    pub fn new(rx: Receiver<AppEvent>, agent: AgentClient, bridge: Arc<ChannelBridge>) -> Self {
        let (sessions, warnings) = store::load_all();
        let mut app = Self {
            rx,
            agent,
            bridge,
            connection_state: ConnectionState::Disconnected,
            transcript: Vec::new(),
            sessions,
            current_session: None,
            input_buffer: String::new(),
            in_progress_assistant: String::new(),
            is_streaming: false,
            diagnostics_log: Vec::new(),
            scroll_to_bottom: false,
            session_unavailable: false,
            theme: Theme::default(),
            theme_dirty: false,
            drafts: BTreeMap::new(),
            pending_decisions: BTreeMap::new(),
            interrupt_seq: 0,
        };

        for warning in warnings {
            app.log_diagnostic(format!("session load warning: {warning}"));
        }

        app
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    fn timestamp() -> String {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs().to_string(),
            Err(_) => "0".to_string(),
        }
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics_log
            .push(format!("[{}] {}", Self::timestamp(), message.into()));
    }

    fn connection_label(&self) -> (&'static str, Color32) {
        match self.connection_state {
            ConnectionState::Connected => ("Agent Connected", self.theme.success),
            ConnectionState::Connecting => ("Connecting...", self.theme.warning),
            ConnectionState::Disconnected => ("Disconnected", self.theme.text_muted),
            ConnectionState::Error => ("Agent Error", self.theme.danger),
        }
    }

    fn connection_state_name(state: ConnectionState) -> &'static str {
        match state {
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }

    fn refresh_sessions(&mut self) {
        let (sessions, warnings) = store::load_all();
        self.sessions = sessions;
        for warning in warnings {
            self.log_diagnostic(format!("session load warning: {warning}"));
        }
    }

    fn persist_message(&mut self, message: Message) {
        if let Some(meta) = self.current_session.as_mut() {
            meta.messages.push(message);
            if let Err(err) = store::save(meta) {
                self.log_diagnostic(format!("failed to persist session: {err}"));
            }
        }
    }

    fn submit_prompt(&mut self, ctx: &egui::Context) {
        let prompt = self.input_buffer.trim().to_string();
        if prompt.is_empty() {
            return;
        }

        let message = Message::chat(ROLE_USER, prompt.clone(), Self::timestamp());
        self.transcript.push(ChatEntry::User(message.clone()));
        self.persist_message(message);

        self.agent.send(prompt);
        self.input_buffer.clear();
        self.is_streaming = true;
        self.scroll_to_bottom = true;
        ctx.request_repaint();
    }

    fn open_session(&mut self, session_id: &str) {
        let (session, warning) = store::load_one(session_id);
        if let Some(warning) = warning {
            self.log_diagnostic(format!("session load warning: {warning}"));
        }

        if let Some(session) = session {
            self.transcript = session
                .messages
                .iter()
                .map(|message| match message.role.as_str() {
                    ROLE_TOOL => {
                        let (classified, raw_text) =
                            classify_content(&Value::String(message.content.clone()));
                        ChatEntry::Tool(ToolEntry {
                            tool_name: message
                                .tool_name
                                .clone()
                                .unwrap_or_else(|| "tool".to_string()),
                            tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                            raw_text,
                            classified,
                            view: ToolView::default(),
                        })
                    }
                    ROLE_ASSISTANT => ChatEntry::Assistant(message.clone()),
                    _ => ChatEntry::User(message.clone()),
                })
                .collect();
            self.current_session = Some(session);
            self.is_streaming = false;
            self.in_progress_assistant.clear();
            self.scroll_to_bottom = true;
            self.session_unavailable = false;
            // Loaded decisions are history; no drafts are recreated for them.
            self.drafts.clear();
            self.pending_decisions.clear();
        } else {
            self.session_unavailable = true;
        }
    }

    fn accept_tool_result(&mut self, tool_name: String, tool_call_id: String, content: Value) {
        let (classified, raw_text) = classify_content(&content);
        self.log_diagnostic(format!(
            "tool result classified tool={tool_name} category={}",
            classified.category_name()
        ));

        if classified.awaits_decision() {
            self.drafts
                .entry(tool_call_id.clone())
                .or_insert_with(DecisionDraft::default);
        }
        if classified.mutates_database() {
            self.bridge.refresh_navigator();
        }

        let message = Message::tool(
            tool_name.clone(),
            tool_call_id.clone(),
            raw_text.clone(),
            Self::timestamp(),
        );
        self.persist_message(message);

        self.transcript.push(ChatEntry::Tool(ToolEntry {
            tool_name,
            tool_call_id,
            raw_text,
            classified,
            view: ToolView::default(),
        }));
        self.scroll_to_bottom = true;
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.apply_event(event, Some(ctx)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }

        for note in self.bridge.drain_refreshes() {
            self.log_diagnostic(note);
        }
    }

    fn apply_event(&mut self, event: AppEvent, ctx: Option<&egui::Context>) {
        match event {
            AppEvent::StreamDelta(text) => {
                self.in_progress_assistant.push_str(&text);
                self.is_streaming = true;
                self.scroll_to_bottom = true;
                if let Some(ctx) = ctx {
                    ctx.request_repaint();
                }
            }
            AppEvent::StreamEnd => {
                if !self.in_progress_assistant.is_empty() {
                    let message = Message::chat(
                        ROLE_ASSISTANT,
                        std::mem::take(&mut self.in_progress_assistant),
                        Self::timestamp(),
                    );
                    self.transcript.push(ChatEntry::Assistant(message.clone()));
                    self.persist_message(message);
                }

                self.is_streaming = false;
                self.scroll_to_bottom = true;
                if let Some(ctx) = ctx {
                    ctx.request_repaint();
                }
            }
            AppEvent::StatusChanged(state) => {
                self.connection_state = state;
                self.log_diagnostic(format!(
                    "connection state changed: {}",
                    Self::connection_state_name(state)
                ));
            }
            AppEvent::AgentError(message) => {
                self.log_diagnostic(format!("agent error: {message}"));
                self.is_streaming = false;
            }
            AppEvent::SessionCreated(session_id) => {
                let meta = SessionMeta {
                    schema_version: SCHEMA_VERSION,
                    session_id: session_id.clone(),
                    title: Some(format!(
                        "Session {}",
                        session_id.chars().take(8).collect::<String>()
                    )),
                    created_at: Self::timestamp(),
                    messages: Vec::new(),
                };

                self.current_session = Some(meta.clone());
                self.transcript.clear();
                self.in_progress_assistant.clear();
                self.is_streaming = false;
                self.session_unavailable = false;
                self.drafts.clear();
                self.pending_decisions.clear();

                if let Err(err) = store::save(&meta) {
                    self.log_diagnostic(format!("failed to persist new session: {err}"));
                }

                self.refresh_sessions();
            }
            AppEvent::ToolResult {
                tool_name,
                tool_call_id,
                content,
            } => {
                self.accept_tool_result(tool_name, tool_call_id, content);
                if let Some(ctx) = ctx {
                    ctx.request_repaint();
                }
            }
            AppEvent::InterruptRaised { value } => {
                self.interrupt_seq += 1;
                let tool_call_id = format!("interrupt-{}", self.interrupt_seq);
                self.accept_tool_result(INTERRUPT_TOOL_NAME.to_string(), tool_call_id, value);
                if let Some(ctx) = ctx {
                    ctx.request_repaint();
                }
            }
            AppEvent::DecisionDispatched { tool_call_id } => {
                self.log_diagnostic(format!("decision dispatched for {tool_call_id}"));
                if let Some(draft) = self.drafts.get_mut(&tool_call_id) {
                    draft.submitting = false;
                    draft.resolved = self.pending_decisions.remove(&tool_call_id);
                    // An approved mutation is about to land in the database.
                    if draft.resolved == Some(Decision::Approve) {
                        self.bridge.refresh_navigator();
                    }
                }
                self.is_streaming = true;
            }
            AppEvent::SetTheme { dark } => {
                self.theme = Theme::for_mode(dark);
                self.log_diagnostic(format!(
                    "theme switched to {}",
                    if dark { "dark" } else { "light" }
                ));
                match ctx {
                    Some(ctx) => self.theme.apply_visuals(ctx),
                    None => self.theme_dirty = true,
                }
            }
        }
    }

    fn dispatch_decision(&mut self, tool_call_id: &str, action: CardAction) {
        let decision = match action {
            CardAction::Approve => Decision::Approve,
            CardAction::Reject => Decision::Reject,
        };

        let search = self.transcript.iter().find_map(|entry| match entry {
            ChatEntry::Tool(tool) if tool.tool_call_id == tool_call_id => match &tool.classified {
                Classified::ExchangeSearch(result) => Some(result.clone()),
                _ => None,
            },
            _ => None,
        });

        let Some(draft) = self.drafts.get_mut(tool_call_id) else {
            return;
        };
        let user_decision = draft.build(decision, search.as_ref());

        match self.agent.submit_decision(tool_call_id, &user_decision) {
            Ok(()) => {
                draft.guard_error = None;
                draft.submitting = true;
                self.pending_decisions
                    .insert(tool_call_id.to_string(), decision);
            }
            Err(err) => {
                draft.guard_error = Some(err.to_string());
            }
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        let (status_label, status_color) = self.connection_label();
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Mantle");
                ui.separator();
                ui.label(RichText::new(status_label).color(status_color));
                ui.separator();
                let toggle_label = if self.theme.dark {
                    "Light mode"
                } else {
                    "Dark mode"
                };
                if ui.button(toggle_label).clicked() {
                    self.bridge.set_theme(!self.theme.dark);
                }
            });
        });
    }

    fn render_left_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("sessions_panel")
            .resizable(true)
            .show(ctx, |ui| {
                ui.heading("Sessions");
                ui.separator();

                let mut clicked_session: Option<String> = None;
                for session in &self.sessions {
                    let label = session
                        .title
                        .clone()
                        .unwrap_or_else(|| session.session_id.clone());
                    if ui.button(label).clicked() {
                        clicked_session = Some(session.session_id.clone());
                    }
                }

                if let Some(session_id) = clicked_session {
                    self.open_session(&session_id);
                }
            });
    }

    fn render_right_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("decisions_panel")
            .resizable(true)
            .show(ctx, |ui| {
                ui.heading("Pending Decisions");
                ui.separator();

                let mut any = false;
                for entry in &self.transcript {
                    let ChatEntry::Tool(tool) = entry else {
                        continue;
                    };
                    let pending = self
                        .drafts
                        .get(&tool.tool_call_id)
                        .map(DecisionDraft::is_pending)
                        .unwrap_or(false);
                    if !pending {
                        continue;
                    }
                    any = true;
                    let label = match &tool.classified {
                        Classified::Approval(request)
                        | Classified::FoundationApproval(request) => {
                            request.entity_summary.clone()
                        }
                        Classified::ExchangeSearch(result) => {
                            format!("Select from {} flows", result.total_flows_found)
                        }
                        _ => tool.tool_name.clone(),
                    };
                    ui.label(RichText::new(label).color(self.theme.warning));
                }

                if !any {
                    ui.label(
                        RichText::new("Nothing awaiting your decision")
                            .color(self.theme.text_muted),
                    );
                }
            });
    }

    fn render_center_panel(&mut self, ctx: &egui::Context) {
        let mut actions: Vec<(String, CardAction)> = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Chat");
            ui.separator();

            let transcript_height = (ui.available_height() - 170.0).max(120.0);
            ScrollArea::vertical()
                .id_salt("chat_transcript")
                .max_height(transcript_height)
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    if self.session_unavailable {
                        ui.label(RichText::new("Session unavailable").color(self.theme.danger));
                    }

                    for entry in &mut self.transcript {
                        match entry {
                            ChatEntry::User(message) => {
                                ui.label(format!("[You] {}", message.content));
                            }
                            ChatEntry::Assistant(message) => {
                                ui.label(format!("[Assistant] {}", message.content));
                            }
                            ChatEntry::Tool(tool) => {
                                let draft = self.drafts.get_mut(&tool.tool_call_id);
                                let action = cards::render_tool_result(
                                    ui,
                                    &self.theme,
                                    &tool.tool_name,
                                    &tool.classified,
                                    &mut tool.view,
                                    draft,
                                    &tool.raw_text,
                                );
                                if let Some(action) = action {
                                    actions.push((tool.tool_call_id.clone(), action));
                                }
                            }
                        }
                    }

                    if self.is_streaming && !self.in_progress_assistant.is_empty() {
                        ui.label(format!("[Assistant] {}", self.in_progress_assistant));
                    }

                    if self.scroll_to_bottom {
                        ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                    }
                });
            self.scroll_to_bottom = false;

            ui.separator();
            egui::CollapsingHeader::new("Diagnostics")
                .default_open(false)
                .show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt("diagnostics_log")
                        .max_height(90.0)
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for entry in &self.diagnostics_log {
                                ui.label(entry);
                            }
                        });
                });

            ui.separator();
            let connected = self.connection_state == ConnectionState::Connected;
            let input_enabled = connected && !self.is_streaming;
            let hint = if !connected {
                "Not connected"
            } else if self.is_streaming {
                "Waiting for response..."
            } else {
                "Type a message..."
            };

            let mut send_now = false;
            ui.horizontal(|ui| {
                let response = ui.add_enabled(
                    input_enabled,
                    egui::TextEdit::singleline(&mut self.input_buffer)
                        .desired_width(f32::INFINITY)
                        .hint_text(hint),
                );
                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    send_now = true;
                }

                let clicked = ui
                    .add_enabled(
                        input_enabled && !self.input_buffer.trim().is_empty(),
                        egui::Button::new("Send"),
                    )
                    .clicked();
                send_now |= clicked;
            });

            if send_now && input_enabled {
                self.submit_prompt(ctx);
            }
        });

        for (tool_call_id, action) in actions {
            self.dispatch_decision(&tool_call_id, action);
        }
    }
}

impl eframe::App for MantleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if std::mem::take(&mut self.theme_dirty) {
            self.theme.apply_visuals(ctx);
        }
        self.drain_events(ctx);
        self.render_top_bar(ctx);
        self.render_left_panel(ctx);
        self.render_right_panel(ctx);
        self.render_center_panel(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use serde_json::json;
    use std::sync::mpsc;

    fn test_app() -> (MantleApp, mpsc::Sender<AppEvent>) {
        let (tx, rx) = mpsc::channel();
        let agent = AgentClient::new(
            AgentConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                assistant_id: "lca_agent".to_string(),
            },
            tx.clone(),
        )
        .expect("client should build inside a runtime");
        let bridge = Arc::new(ChannelBridge::new(tx.clone()));
        (MantleApp::new(rx, agent, bridge), tx)
    }

    #[tokio::test]
    async fn approval_result_opens_a_draft() {
        let (mut app, _tx) = test_app();
        app.apply_event(
            AppEvent::ToolResult {
                tool_name: "create_process".to_string(),
                tool_call_id: "call_1".to_string(),
                content: json!({
                    "status": "approval_required",
                    "approval_request": {
                        "entity_type": "process",
                        "entity_summary": "Process: Clinker"
                    }
                }),
            },
            None,
        );

        assert!(app.drafts.contains_key("call_1"));
        assert!(matches!(
            app.transcript.last(),
            Some(ChatEntry::Tool(tool)) if matches!(tool.classified, Classified::Approval(_))
        ));
    }

    #[tokio::test]
    async fn addition_result_requests_navigator_refresh() {
        let (mut app, _tx) = test_app();
        app.apply_event(
            AppEvent::ToolResult {
                tool_name: "add_exchanges".to_string(),
                tool_call_id: "call_2".to_string(),
                content: json!({
                    "status": "success",
                    "exchanges_added": ["clinker"],
                    "search_metadata": {}
                }),
            },
            None,
        );

        assert!(app.drafts.is_empty());
        assert_eq!(app.bridge.drain_refreshes().len(), 1);
    }

    #[tokio::test]
    async fn interrupts_get_synthetic_call_ids() {
        let (mut app, _tx) = test_app();
        let interrupt = json!({
            "approval_required": true,
            "entity_type": "flow",
            "entity_summary": "Flow: Steel"
        });
        app.apply_event(
            AppEvent::InterruptRaised {
                value: interrupt.clone(),
            },
            None,
        );
        app.apply_event(AppEvent::InterruptRaised { value: interrupt }, None);

        assert!(app.drafts.contains_key("interrupt-1"));
        assert!(app.drafts.contains_key("interrupt-2"));
    }

    #[tokio::test]
    async fn theme_event_swaps_palette() {
        let (mut app, _tx) = test_app();
        assert!(app.theme.dark);
        app.apply_event(AppEvent::SetTheme { dark: false }, None);
        assert!(!app.theme.dark);
        assert!(app.theme_dirty);
    }
}
