use crate::payload::classify::ExchangeSearchResult;
use crate::payload::decision::{Decision, ExchangeSelection, UserDecision};
use std::collections::BTreeSet;

/// Mutable widget state behind a pending approval or exchange-search card:
/// the reason buffer, suggestion lines, flow selection, and submission
/// progress. Cleared once the decision is handed to the transport.
#[derive(Debug, Clone, Default)]
pub struct DecisionDraft {
    pub reason: String,
    pub suggestions: String,
    pub selected_flows: BTreeSet<String>,
    pub submitting: bool,
    pub resolved: Option<Decision>,
    pub guard_error: Option<String>,
}

impl DecisionDraft {
    pub fn is_pending(&self) -> bool {
        self.resolved.is_none() && !self.submitting
    }

    pub fn toggle_flow(&mut self, flow_id: &str) {
        if !self.selected_flows.remove(flow_id) {
            self.selected_flows.insert(flow_id.to_string());
        }
    }

    /// Suggestion lines, one per non-empty line of the input buffer.
    pub fn suggestion_list(&self) -> Vec<String> {
        self.suggestions
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Assemble the outbound decision from the draft. Selected flows are
    /// resolved against the search result so the selection carries the
    /// amounts and units the backend needs.
    pub fn build(&self, decision: Decision, search: Option<&ExchangeSearchResult>) -> UserDecision {
        let selected_exchanges = search
            .map(|search| {
                search
                    .material_groups
                    .values()
                    .flat_map(|group| group.flows.iter())
                    .filter(|flow| self.selected_flows.contains(&flow.flow_id))
                    .map(|flow| ExchangeSelection {
                        flow_id: flow.flow_id.clone(),
                        process_id: (!flow.process_id.is_empty())
                            .then(|| flow.process_id.clone()),
                        amount: Some(flow.amount),
                        unit: (!flow.unit.is_empty()).then(|| flow.unit.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        UserDecision {
            decision,
            reason: self.reason.trim().to_string(),
            suggestions: self.suggestion_list(),
            selected_exchanges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::classify::{Flow, MaterialGroup};
    use std::collections::BTreeMap;

    fn search_with_two_flows() -> ExchangeSearchResult {
        let flows = vec![
            Flow {
                flow_id: "f1".to_string(),
                process_id: "p1".to_string(),
                flow_name: "clinker".to_string(),
                process_name: "clinker production".to_string(),
                location: "GLO".to_string(),
                amount: 0.95,
                unit: "kg".to_string(),
                material_type: "mineral".to_string(),
                documentation: None,
            },
            Flow {
                flow_id: "f2".to_string(),
                process_id: String::new(),
                flow_name: "gypsum".to_string(),
                process_name: "gypsum quarry".to_string(),
                location: "RER".to_string(),
                amount: 0.05,
                unit: String::new(),
                material_type: "mineral".to_string(),
                documentation: None,
            },
        ];
        let mut material_groups = BTreeMap::new();
        material_groups.insert(
            "cement clinker".to_string(),
            MaterialGroup {
                original_description: "clinker for CEM I".to_string(),
                material_type: "mineral".to_string(),
                flows,
            },
        );
        ExchangeSearchResult {
            material_groups,
            total_flows_found: 2,
        }
    }

    #[test]
    fn build_resolves_selected_flows() {
        let mut draft = DecisionDraft::default();
        draft.toggle_flow("f1");

        let decision = draft.build(Decision::Approve, Some(&search_with_two_flows()));
        assert_eq!(decision.selected_exchanges.len(), 1);
        let selection = &decision.selected_exchanges[0];
        assert_eq!(selection.flow_id, "f1");
        assert_eq!(selection.process_id.as_deref(), Some("p1"));
        assert_eq!(selection.amount, Some(0.95));
        assert_eq!(selection.unit.as_deref(), Some("kg"));
    }

    #[test]
    fn empty_fields_stay_out_of_the_selection() {
        let mut draft = DecisionDraft::default();
        draft.toggle_flow("f2");

        let decision = draft.build(Decision::Approve, Some(&search_with_two_flows()));
        let selection = &decision.selected_exchanges[0];
        assert!(selection.process_id.is_none());
        assert!(selection.unit.is_none());
    }

    #[test]
    fn toggle_flow_is_an_involution() {
        let mut draft = DecisionDraft::default();
        draft.toggle_flow("f1");
        assert!(draft.selected_flows.contains("f1"));
        draft.toggle_flow("f1");
        assert!(draft.selected_flows.is_empty());
    }

    #[test]
    fn suggestions_split_on_lines_and_trim() {
        let draft = DecisionDraft {
            suggestions: "  use kg\n\nsearch for low-alloyed steel  \n".to_string(),
            ..Default::default()
        };
        assert_eq!(
            draft.suggestion_list(),
            vec!["use kg", "search for low-alloyed steel"]
        );
    }

    #[test]
    fn rejection_built_from_draft_trims_reason() {
        let draft = DecisionDraft {
            reason: "  wrong reference unit  ".to_string(),
            ..Default::default()
        };
        let decision = draft.build(Decision::Reject, None);
        assert_eq!(decision.reason, "wrong reference unit");
        assert!(decision.validate().is_ok());
    }
}
