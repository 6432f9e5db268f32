use crate::payload::parse::ParsedPayload;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const FOUNDATION_ENTITY_TYPE: &str = "product_system_foundation";
const ROLLBACK_MARKER: &str = "Rollback errors:";

const UNKNOWN_ENTITY_TYPE: &str = "entity";
const MISSING_SUMMARY: &str = "(no summary provided)";
const DEFAULT_ACTION: &str = "create";

/// The closed set of presentation categories. Exactly one is assigned per
/// message; the normalized record is the only way payload data reaches the
/// rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Approval(ApprovalRequest),
    FoundationApproval(ApprovalRequest),
    Validation(ValidationReport),
    ExchangeSearch(ExchangeSearchResult),
    ExchangeAddition(ExchangeAddition),
    ExchangeAdditionError(ErrorReport),
    RollbackError(ErrorReport),
    GenericError(ErrorReport),
    PlainResult(PlainResult),
}

impl Classified {
    pub fn category_name(&self) -> &'static str {
        match self {
            Self::Approval(_) => "approval",
            Self::FoundationApproval(_) => "foundation_approval",
            Self::Validation(_) => "validation",
            Self::ExchangeSearch(_) => "exchange_search",
            Self::ExchangeAddition(_) => "exchange_addition",
            Self::ExchangeAdditionError(_) => "exchange_addition_error",
            Self::RollbackError(_) => "rollback_error",
            Self::GenericError(_) => "generic_error",
            Self::PlainResult(_) => "plain_result",
        }
    }

    /// Whether this result should prompt the host to refresh its navigator.
    pub fn mutates_database(&self) -> bool {
        matches!(self, Self::ExchangeAddition(_))
    }

    pub fn awaits_decision(&self) -> bool {
        matches!(
            self,
            Self::Approval(_) | Self::FoundationApproval(_) | Self::ExchangeSearch(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub entity_type: String,
    pub entity_summary: String,
    pub impact: Option<String>,
    pub message: Option<String>,
    pub entity_details: Option<Map<String, Value>>,
    pub action: String,
    pub entity_data: Option<Value>,
    pub will_create: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub process_id: String,
    pub process_name: String,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub validation_warnings: Vec<String>,
    pub exchange_summary: Option<ExchangeSummary>,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSummary {
    pub total: u64,
    pub inputs: u64,
    pub outputs: u64,
    pub quantitative_references: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSearchResult {
    pub material_groups: BTreeMap<String, MaterialGroup>,
    pub total_flows_found: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialGroup {
    pub original_description: String,
    pub material_type: String,
    pub flows: Vec<Flow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub flow_id: String,
    pub process_id: String,
    pub flow_name: String,
    pub process_name: String,
    pub location: String,
    pub amount: f64,
    pub unit: String,
    pub material_type: String,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeAddition {
    pub added_count: u64,
    pub added: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub message: String,
    pub details: Option<String>,
    pub validation_errors: Vec<String>,
    pub rollback_errors: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlainResult {
    pub text: String,
    pub parse_failed: bool,
    pub was_truncated: bool,
}

/// Assign a category to a parsed payload, first match wins.
///
/// The ordering is a deliberate tie-break policy: payloads can satisfy more
/// than one shape predicate, and approval requests always win over result
/// shapes that happen to ride along in the same object.
pub fn classify(parsed: &ParsedPayload) -> Classified {
    let value = &parsed.value;
    if !parsed.succeeded || !value.is_object() {
        return Classified::PlainResult(plain_result(parsed));
    }

    let status = str_of(value, "status");
    let status = status.as_deref();

    if entity_type_of(value).as_deref() == Some(FOUNDATION_ENTITY_TYPE) {
        return Classified::FoundationApproval(extract_approval(value));
    }

    let nested_approval = value
        .get("approval_request")
        .map(Value::is_object)
        .unwrap_or(false);
    let flagged_approval = value.get("approval_required") == Some(&Value::Bool(true))
        && entity_type_of(value).is_some();
    if (status == Some("approval_required") && nested_approval) || flagged_approval {
        return Classified::Approval(extract_approval(value));
    }

    let details = str_of(value, "details");
    if status == Some("error") {
        if let Some(details) = details.as_deref() {
            if details.contains(ROLLBACK_MARKER) {
                return Classified::RollbackError(extract_error(value));
            }
        }
    }

    if status == Some("success") {
        if let Some(results) = value.get("search_results").and_then(Value::as_object) {
            if !results.is_empty() {
                return Classified::ExchangeSearch(extract_search(value, results));
            }
        }
        if value.get("exchanges_added").is_some() && value.get("search_metadata").is_some() {
            return Classified::ExchangeAddition(extract_addition(value));
        }
    }

    if status == Some("error") {
        let mentions_addition_failure = [details.as_deref(), str_of(value, "message").as_deref()]
            .iter()
            .flatten()
            .any(|text| {
                let lowered = text.to_ascii_lowercase();
                lowered.contains("failed to add exchange") || lowered.contains("exchange addition")
            });
        if value.get("validation_errors").is_some() || mentions_addition_failure {
            return Classified::ExchangeAdditionError(extract_error(value));
        }
    }

    if status == Some("validation_complete") && value.get("process_id").is_some() {
        return Classified::Validation(extract_validation(value));
    }

    if status == Some("error") {
        return Classified::GenericError(extract_error(value));
    }

    Classified::PlainResult(plain_result(parsed))
}

fn plain_result(parsed: &ParsedPayload) -> PlainResult {
    let text = match &parsed.value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    PlainResult {
        text,
        parse_failed: !parsed.succeeded,
        was_truncated: parsed.was_truncated,
    }
}

fn entity_type_of(value: &Value) -> Option<String> {
    value
        .get("approval_request")
        .and_then(|request| str_of(request, "entity_type"))
        .or_else(|| str_of(value, "entity_type"))
}

fn extract_approval(value: &Value) -> ApprovalRequest {
    let source = value
        .get("approval_request")
        .filter(|v| v.is_object())
        .unwrap_or(value);
    ApprovalRequest {
        entity_type: str_of(source, "entity_type")
            .unwrap_or_else(|| UNKNOWN_ENTITY_TYPE.to_string()),
        entity_summary: str_of(source, "entity_summary")
            .unwrap_or_else(|| MISSING_SUMMARY.to_string()),
        impact: str_of(source, "impact"),
        message: str_of(source, "message").or_else(|| str_of(value, "message")),
        entity_details: source
            .get("entity_details")
            .and_then(Value::as_object)
            .cloned(),
        action: str_of(source, "action").unwrap_or_else(|| DEFAULT_ACTION.to_string()),
        entity_data: source
            .get("entity_data")
            .filter(|data| !data.is_null())
            .cloned(),
        will_create: string_seq(source.get("will_create")),
    }
}

fn extract_validation(value: &Value) -> ValidationReport {
    ValidationReport {
        process_id: str_of(value, "process_id").unwrap_or_default(),
        process_name: str_of(value, "process_name").unwrap_or_default(),
        is_valid: value
            .get("is_valid")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        validation_errors: string_seq(value.get("validation_errors")),
        validation_warnings: string_seq(value.get("validation_warnings")),
        exchange_summary: value
            .get("exchange_summary")
            .filter(|summary| summary.is_object())
            .map(|summary| ExchangeSummary {
                total: u64_of(summary, "total"),
                inputs: u64_of(summary, "inputs"),
                outputs: u64_of(summary, "outputs"),
                quantitative_references: u64_of(summary, "quantitative_references"),
            }),
        next_steps: string_seq(value.get("next_steps")),
    }
}

fn extract_search(value: &Value, results: &Map<String, Value>) -> ExchangeSearchResult {
    let mut material_groups = BTreeMap::new();
    for (material, group) in results {
        let flows = group
            .get("flows")
            .and_then(Value::as_array)
            .map(|flows| flows.iter().map(extract_flow).collect())
            .unwrap_or_default();
        material_groups.insert(
            material.clone(),
            MaterialGroup {
                original_description: str_of(group, "original_description").unwrap_or_default(),
                material_type: str_of(group, "material_type").unwrap_or_default(),
                flows,
            },
        );
    }

    let counted = material_groups
        .values()
        .map(|group| group.flows.len() as u64)
        .sum();
    ExchangeSearchResult {
        material_groups,
        total_flows_found: value
            .get("total_flows_found")
            .and_then(Value::as_u64)
            .unwrap_or(counted),
    }
}

fn extract_flow(flow: &Value) -> Flow {
    Flow {
        flow_id: str_of(flow, "flow_id").unwrap_or_default(),
        process_id: str_of(flow, "process_id").unwrap_or_default(),
        flow_name: str_of(flow, "flow_name").unwrap_or_default(),
        process_name: str_of(flow, "process_name").unwrap_or_default(),
        location: str_of(flow, "location").unwrap_or_default(),
        amount: flow.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
        unit: str_of(flow, "unit").unwrap_or_default(),
        material_type: str_of(flow, "material_type").unwrap_or_default(),
        documentation: str_of(flow, "documentation"),
    }
}

fn extract_addition(value: &Value) -> ExchangeAddition {
    let (added_count, added) = match value.get("exchanges_added") {
        Some(Value::Array(items)) => {
            let added = items.iter().map(describe_added_exchange).collect::<Vec<_>>();
            (added.len() as u64, added)
        }
        Some(Value::Number(count)) => (count.as_u64().unwrap_or(0), Vec::new()),
        _ => (0, Vec::new()),
    };
    ExchangeAddition {
        added_count,
        added,
        message: str_of(value, "message"),
    }
}

fn describe_added_exchange(item: &Value) -> String {
    if let Some(text) = item.as_str() {
        return text.to_string();
    }
    let name = str_of(item, "flow_name").or_else(|| str_of(item, "name"));
    match name {
        Some(name) => {
            let amount = item.get("amount").and_then(Value::as_f64);
            let unit = str_of(item, "unit");
            match (amount, unit) {
                (Some(amount), Some(unit)) => format!("{name} ({amount} {unit})"),
                _ => name,
            }
        }
        None => item.to_string(),
    }
}

fn extract_error(value: &Value) -> ErrorReport {
    let details = str_of(value, "details");
    let rollback_errors = details
        .as_deref()
        .and_then(|details| details.split_once(ROLLBACK_MARKER))
        .map(|(_, rest)| {
            rest.split(|ch| ch == ';' || ch == '\n')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    ErrorReport {
        message: str_of(value, "message").unwrap_or_else(|| "Unknown error".to_string()),
        details,
        validation_errors: string_seq(value.get("validation_errors")),
        rollback_errors,
        suggestions: string_seq(value.get("suggestions")),
    }
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn u64_of(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn string_seq(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
