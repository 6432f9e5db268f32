use crate::payload::classify::{
    ApprovalRequest, Classified, ErrorReport, ExchangeAddition, ExchangeSearchResult, PlainResult,
    ValidationReport,
};
use crate::payload::decision::Decision;
use crate::theme::Theme;
use crate::ui::draft::DecisionDraft;
use eframe::egui::{self, RichText};
use serde_json::Value;

const PLAIN_PREVIEW_CHARS: usize = 600;

/// What the user did on a decision card this frame, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAction {
    Approve,
    Reject,
}

/// Per-card display toggles. Lives beside the transcript entry, not in
/// the classified record, so re-classification never resets them.
#[derive(Debug, Clone, Default)]
pub struct ToolView {
    pub show_raw: bool,
    pub show_full: bool,
}

pub fn render_tool_result(
    ui: &mut egui::Ui,
    theme: &Theme,
    tool_name: &str,
    classified: &Classified,
    view: &mut ToolView,
    draft: Option<&mut DecisionDraft>,
    raw_text: &str,
) -> Option<CardAction> {
    let mut action = None;
    theme.card_frame().show(ui, |ui| {
        ui.horizontal(|ui| {
            ui.label(
                RichText::new(tool_name)
                    .color(theme.text_primary)
                    .size(13.0)
                    .strong(),
            );
            ui.label(
                RichText::new(classified.category_name())
                    .color(theme.text_muted)
                    .size(12.0),
            );
        });
        ui.add_space(theme.spacing_8);

        action = match classified {
            Classified::Approval(request) => render_approval(ui, theme, request, false, draft),
            Classified::FoundationApproval(request) => {
                render_approval(ui, theme, request, true, draft)
            }
            Classified::Validation(report) => {
                render_validation(ui, theme, report);
                None
            }
            Classified::ExchangeSearch(result) => render_search(ui, theme, result, draft),
            Classified::ExchangeAddition(addition) => {
                render_addition(ui, theme, addition);
                None
            }
            Classified::ExchangeAdditionError(report) => {
                render_error(ui, theme, "Exchange addition failed", report);
                None
            }
            Classified::RollbackError(report) => {
                render_error(ui, theme, "Creation rolled back", report);
                None
            }
            Classified::GenericError(report) => {
                render_error(ui, theme, "Tool error", report);
                None
            }
            Classified::PlainResult(plain) => {
                render_plain(ui, theme, plain, view);
                None
            }
        };

        if !raw_text.is_empty() {
            ui.add_space(theme.spacing_4);
            let label = if view.show_raw {
                "hide raw payload"
            } else {
                "show raw payload"
            };
            if ui
                .label(RichText::new(label).color(theme.accent_primary).size(12.0))
                .on_hover_cursor(egui::CursorIcon::PointingHand)
                .clicked()
            {
                view.show_raw = !view.show_raw;
            }
            if view.show_raw {
                ui.label(
                    RichText::new(raw_text)
                        .color(theme.text_muted)
                        .size(12.0)
                        .monospace(),
                );
            }
        }
    });
    action
}

fn render_approval(
    ui: &mut egui::Ui,
    theme: &Theme,
    request: &ApprovalRequest,
    foundation: bool,
    draft: Option<&mut DecisionDraft>,
) -> Option<CardAction> {
    let heading = if foundation {
        "Foundation approval required"
    } else {
        "Approval required"
    };
    ui.label(RichText::new(heading).color(theme.warning).size(14.0).strong());
    ui.add_space(theme.spacing_4);
    ui.label(
        RichText::new(&request.entity_summary)
            .color(theme.text_primary)
            .size(14.0),
    );
    ui.label(
        RichText::new(format!("{} {}", request.action, request.entity_type))
            .color(theme.text_muted)
            .size(12.0),
    );

    if let Some(impact) = &request.impact {
        ui.add_space(theme.spacing_4);
        ui.label(RichText::new(impact).color(theme.text_primary).size(13.0));
    }
    if let Some(message) = &request.message {
        ui.label(RichText::new(message).color(theme.text_muted).size(13.0));
    }

    if !request.will_create.is_empty() {
        ui.add_space(theme.spacing_4);
        ui.label(
            RichText::new("Will create:")
                .color(theme.text_muted)
                .size(12.0),
        );
        for item in &request.will_create {
            ui.label(
                RichText::new(format!("• {item}"))
                    .color(theme.text_primary)
                    .size(13.0),
            );
        }
    }

    if let Some(details) = &request.entity_details {
        ui.add_space(theme.spacing_4);
        egui::Grid::new(ui.id().with("entity_details"))
            .num_columns(2)
            .spacing(egui::vec2(theme.spacing_12, theme.spacing_4))
            .show(ui, |ui| {
                for (key, value) in details {
                    ui.label(RichText::new(key).color(theme.text_muted).size(12.0));
                    ui.label(
                        RichText::new(detail_text(value))
                            .color(theme.text_primary)
                            .size(12.0),
                    );
                    ui.end_row();
                }
            });
    }

    render_decision_form(ui, theme, draft, false)
}

fn render_validation(ui: &mut egui::Ui, theme: &Theme, report: &ValidationReport) {
    let (label, color) = if report.is_valid {
        ("Validation passed", theme.success)
    } else {
        ("Validation failed", theme.danger)
    };
    ui.label(RichText::new(label).color(color).size(14.0).strong());
    ui.add_space(theme.spacing_4);
    ui.label(
        RichText::new(format!("{} ({})", report.process_name, report.process_id))
            .color(theme.text_primary)
            .size(13.0),
    );

    for error in &report.validation_errors {
        ui.label(
            RichText::new(format!("• {error}"))
                .color(theme.danger)
                .size(13.0),
        );
    }
    for warning in &report.validation_warnings {
        ui.label(
            RichText::new(format!("• {warning}"))
                .color(theme.warning)
                .size(13.0),
        );
    }

    if let Some(summary) = &report.exchange_summary {
        ui.add_space(theme.spacing_4);
        ui.label(
            RichText::new(format!(
                "{} exchanges: {} inputs, {} outputs, {} quantitative references",
                summary.total, summary.inputs, summary.outputs, summary.quantitative_references
            ))
            .color(theme.text_muted)
            .size(12.0),
        );
    }

    if !report.next_steps.is_empty() {
        ui.add_space(theme.spacing_4);
        ui.label(
            RichText::new("Next steps:")
                .color(theme.text_muted)
                .size(12.0),
        );
        for step in &report.next_steps {
            ui.label(
                RichText::new(format!("• {step}"))
                    .color(theme.text_primary)
                    .size(13.0),
            );
        }
    }
}

fn render_search(
    ui: &mut egui::Ui,
    theme: &Theme,
    result: &ExchangeSearchResult,
    draft: Option<&mut DecisionDraft>,
) -> Option<CardAction> {
    ui.label(
        RichText::new(format!(
            "Exchange search: {} flows found",
            result.total_flows_found
        ))
        .color(theme.text_primary)
        .size(14.0)
        .strong(),
    );

    let mut draft = draft;
    for (material, group) in &result.material_groups {
        ui.add_space(theme.spacing_8);
        ui.label(
            RichText::new(material)
                .color(theme.text_primary)
                .size(13.0)
                .strong(),
        );
        if !group.original_description.is_empty() {
            ui.label(
                RichText::new(format!(
                    "{} ({})",
                    group.original_description, group.material_type
                ))
                .color(theme.text_muted)
                .size(12.0),
            );
        }

        for flow in &group.flows {
            let label = format!(
                "{} — {} [{}] {} {}",
                flow.flow_name, flow.process_name, flow.location, flow.amount, flow.unit
            );
            match draft.as_deref_mut() {
                Some(draft) => {
                    let mut selected = draft.selected_flows.contains(&flow.flow_id);
                    if ui.checkbox(&mut selected, label).changed() {
                        draft.toggle_flow(&flow.flow_id);
                    }
                }
                None => {
                    ui.label(RichText::new(label).color(theme.text_primary).size(13.0));
                }
            }
            if let Some(documentation) = &flow.documentation {
                ui.label(
                    RichText::new(documentation)
                        .color(theme.text_muted)
                        .size(12.0),
                );
            }
        }
    }

    if let Some(draft) = draft.as_deref() {
        if !draft.selected_flows.is_empty() {
            ui.add_space(theme.spacing_4);
            ui.label(
                RichText::new(format!("{} flows selected", draft.selected_flows.len()))
                    .color(theme.accent_primary)
                    .size(12.0),
            );
        }
    }

    render_decision_form(ui, theme, draft, true)
}

fn render_addition(ui: &mut egui::Ui, theme: &Theme, addition: &ExchangeAddition) {
    ui.label(
        RichText::new(format!("Added {} exchanges", addition.added_count))
            .color(theme.success)
            .size(14.0)
            .strong(),
    );
    for item in &addition.added {
        ui.label(
            RichText::new(format!("• {item}"))
                .color(theme.text_primary)
                .size(13.0),
        );
    }
    if let Some(message) = &addition.message {
        ui.add_space(theme.spacing_4);
        ui.label(RichText::new(message).color(theme.text_muted).size(13.0));
    }
}

fn render_error(ui: &mut egui::Ui, theme: &Theme, heading: &str, report: &ErrorReport) {
    ui.label(RichText::new(heading).color(theme.danger).size(14.0).strong());
    ui.add_space(theme.spacing_4);
    ui.label(
        RichText::new(&report.message)
            .color(theme.text_primary)
            .size(13.0),
    );
    if let Some(details) = &report.details {
        ui.label(RichText::new(details).color(theme.text_muted).size(12.0));
    }
    for error in &report.validation_errors {
        ui.label(
            RichText::new(format!("• {error}"))
                .color(theme.danger)
                .size(13.0),
        );
    }
    if !report.rollback_errors.is_empty() {
        ui.add_space(theme.spacing_4);
        ui.label(
            RichText::new("Rollback issues:")
                .color(theme.text_muted)
                .size(12.0),
        );
        for error in &report.rollback_errors {
            ui.label(
                RichText::new(format!("• {error}"))
                    .color(theme.warning)
                    .size(13.0),
            );
        }
    }
    if !report.suggestions.is_empty() {
        ui.add_space(theme.spacing_4);
        for suggestion in &report.suggestions {
            ui.label(
                RichText::new(format!("Try: {suggestion}"))
                    .color(theme.accent_primary)
                    .size(13.0),
            );
        }
    }
}

fn render_plain(ui: &mut egui::Ui, theme: &Theme, plain: &PlainResult, view: &mut ToolView) {
    if plain.was_truncated {
        ui.label(
            RichText::new("Result was truncated by the agent")
                .color(theme.warning)
                .size(12.0),
        );
        ui.add_space(theme.spacing_4);
    }

    let overflow = plain.text.chars().count() > PLAIN_PREVIEW_CHARS;
    let shown: String = if overflow && !view.show_full {
        plain.text.chars().take(PLAIN_PREVIEW_CHARS).collect()
    } else {
        plain.text.clone()
    };
    ui.label(
        RichText::new(shown)
            .color(theme.text_primary)
            .size(13.0)
            .monospace(),
    );
    if overflow {
        let label = if view.show_full { "show less" } else { "show more" };
        if ui
            .label(RichText::new(label).color(theme.accent_primary).size(12.0))
            .on_hover_cursor(egui::CursorIcon::PointingHand)
            .clicked()
        {
            view.show_full = !view.show_full;
        }
    }
}

/// The approve/reject strip shared by approval and search cards. With no
/// draft the card is read-only (history loaded from disk).
fn render_decision_form(
    ui: &mut egui::Ui,
    theme: &Theme,
    draft: Option<&mut DecisionDraft>,
    with_suggestions_hint: bool,
) -> Option<CardAction> {
    let Some(draft) = draft else {
        return None;
    };

    if let Some(decision) = draft.resolved {
        ui.add_space(theme.spacing_8);
        let (label, color) = match decision {
            Decision::Approve => ("Approved", theme.success),
            Decision::Reject => ("Rejected", theme.danger),
        };
        ui.label(RichText::new(label).color(color).size(13.0).strong());
        return None;
    }

    ui.add_space(theme.spacing_8);
    let mut action = None;

    ui.label(
        RichText::new("Reason (required to reject)")
            .color(theme.text_muted)
            .size(12.0),
    );
    ui.text_edit_singleline(&mut draft.reason);

    let suggestions_label = if with_suggestions_hint {
        "Suggestions for a better search, one per line"
    } else {
        "Suggestions, one per line"
    };
    ui.label(
        RichText::new(suggestions_label)
            .color(theme.text_muted)
            .size(12.0),
    );
    ui.add(
        egui::TextEdit::multiline(&mut draft.suggestions)
            .desired_rows(2)
            .desired_width(f32::INFINITY),
    );

    ui.add_space(theme.spacing_4);
    ui.horizontal(|ui| {
        if draft.submitting {
            ui.label(
                RichText::new("Submitting decision...")
                    .color(theme.text_muted)
                    .size(13.0),
            );
            return;
        }
        if ui.button("Approve").clicked() {
            action = Some(CardAction::Approve);
        }
        if ui.button("Reject").clicked() {
            action = Some(CardAction::Reject);
        }
    });

    if let Some(error) = &draft.guard_error {
        ui.label(RichText::new(error).color(theme.danger).size(12.0));
    }

    action
}

fn detail_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_view_defaults_to_collapsed() {
        let view = ToolView::default();
        assert!(!view.show_raw);
        assert!(!view.show_full);
    }

    #[test]
    fn detail_text_keeps_strings_unquoted() {
        assert_eq!(detail_text(&Value::String("kg".to_string())), "kg");
        assert_eq!(detail_text(&serde_json::json!(1.5)), "1.5");
    }
}
