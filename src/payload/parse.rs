use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Literal ellipsis appended by the backend when a tool result is cut off.
pub const TRUNCATION_MARKER: &str = "...";

/// Marker wrapping an approval payload embedded inside an error string.
const INTERRUPT_MARKER: &str = "Interrupt(value=";

/// Unmodified tool-result content, exactly one of text or structured value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
    pub content_text: Option<String>,
    pub content_value: Option<Value>,
}

impl RawPayload {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content_text: Some(text.into()),
            content_value: None,
        }
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            content_text: None,
            content_value: Some(value),
        }
    }
}

/// Best-effort structured view of a [`RawPayload`].
///
/// On total failure `value` holds the original text untouched and
/// `succeeded` is false; the function never errors and never panics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub value: Value,
    pub succeeded: bool,
    pub was_truncated: bool,
    pub was_reconstructed: bool,
}

impl ParsedPayload {
    fn success(value: Value) -> Self {
        Self {
            value,
            succeeded: true,
            was_truncated: false,
            was_reconstructed: false,
        }
    }

    fn failure(text: &str) -> Self {
        Self {
            value: Value::String(text.to_string()),
            succeeded: false,
            was_truncated: false,
            was_reconstructed: false,
        }
    }
}

/// Tolerant parse of an inbound tool-result payload.
///
/// Repairs, in priority order: the single-quote convention produced by
/// formatting backend-native values as text, truncation ellipses, and an
/// embedded `Interrupt(value={...})` wrapper, which takes precedence over
/// the surrounding text because it signals an explicit approval request.
pub fn parse(raw: &RawPayload) -> ParsedPayload {
    let Some(text) = raw.content_text.as_deref() else {
        return ParsedPayload::success(raw.content_value.clone().unwrap_or(Value::Null));
    };

    let parsed = parse_text(text);
    match extract_interrupt(text) {
        Some(interrupt) => interrupt,
        None => parsed,
    }
}

fn parse_text(text: &str) -> ParsedPayload {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return ParsedPayload::failure(text);
    }

    let candidate = rewrite_single_quotes(trimmed);

    if let Some(stripped) = candidate.strip_suffix(TRUNCATION_MARKER) {
        if let Some(cut) = last_balanced_cut(stripped) {
            if let Ok(value) = serde_json::from_str::<Value>(&stripped[..=cut]) {
                return ParsedPayload {
                    value,
                    succeeded: true,
                    was_truncated: true,
                    was_reconstructed: false,
                };
            }
        }
        if let Ok(value) = serde_json::from_str::<Value>(stripped) {
            return ParsedPayload {
                value,
                succeeded: true,
                was_truncated: true,
                was_reconstructed: false,
            };
        }
        return ParsedPayload {
            value: Value::String(text.to_string()),
            succeeded: false,
            was_truncated: true,
            was_reconstructed: false,
        };
    }

    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => ParsedPayload::success(value),
        Err(_) => ParsedPayload::failure(text),
    }
}

/// Rewrite `'` to `"` when the text uses only single quotes.
///
/// Known limitation: lossy when a string value legitimately contains an
/// apostrophe; the strict parse then fails and the raw text is preserved.
fn rewrite_single_quotes(text: &str) -> String {
    if text.contains('\'') && !text.contains('"') {
        text.replace('\'', "\"")
    } else {
        text.to_string()
    }
}

/// Right-most byte position where brace and bracket depth both return to
/// zero, ignoring structural characters inside string literals. This is the
/// best candidate for the last complete structural unit of a truncated text.
fn last_balanced_cut(text: &str) -> Option<usize> {
    let mut brace: i32 = 0;
    let mut bracket: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut cut = None;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => brace += 1,
            '}' => {
                brace -= 1;
                if brace == 0 && bracket == 0 {
                    cut = Some(i);
                }
            }
            '[' => bracket += 1,
            ']' => {
                bracket -= 1;
                if brace == 0 && bracket == 0 {
                    cut = Some(i);
                }
            }
            _ => {}
        }
    }

    cut
}

fn extract_interrupt(text: &str) -> Option<ParsedPayload> {
    let start = text.find(INTERRUPT_MARKER)?;
    let after = text[start + INTERRUPT_MARKER.len()..].trim_start();

    if after.starts_with('{') {
        if let Some(body) = balanced_braces(after) {
            let normalized = normalize_python_literals(body);
            if let Ok(mut value) = serde_json::from_str::<Value>(&normalized) {
                if has_approval_fields(&value) {
                    tag_as_approval(&mut value);
                    return Some(ParsedPayload {
                        value,
                        succeeded: true,
                        was_truncated: false,
                        was_reconstructed: true,
                    });
                }
            }
        }
    }

    scrape_approval_fields(after).map(|value| ParsedPayload {
        value,
        succeeded: true,
        was_truncated: false,
        was_reconstructed: true,
    })
}

/// Balanced `{...}` prefix of `text`, tracking both quote conventions so
/// braces inside string values are not counted.
fn balanced_braces(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut quote = 0u8;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == quote {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => {
                in_string = true;
                quote = b;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn python_literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(True|False|None)\b").expect("literal pattern compiles"))
}

fn normalize_python_literals(body: &str) -> String {
    let rewritten = rewrite_single_quotes(body);
    python_literal_regex()
        .replace_all(&rewritten, |caps: &regex::Captures<'_>| {
            match caps.get(1).map(|m| m.as_str()) {
                Some("True") => "true",
                Some("False") => "false",
                _ => "null",
            }
        })
        .into_owned()
}

/// Interrupt payloads carry no `status` field of their own; tag them so
/// classification treats both extraction paths as approval requests.
fn tag_as_approval(value: &mut Value) {
    if let Value::Object(fields) = value {
        fields.insert("approval_required".to_string(), Value::Bool(true));
    }
}

fn has_approval_fields(value: &Value) -> bool {
    let source = value
        .get("approval_request")
        .filter(|v| v.is_object())
        .unwrap_or(value);
    source.get("entity_type").is_some()
        && source.get("entity_summary").is_some()
        && source.get("action").is_some()
}

fn scrape_field_regexes() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        ["entity_type", "entity_summary", "action", "impact"]
            .into_iter()
            .map(|field| {
                // Accepts both quoting conventions around keys and values.
                let pattern = format!(r#"['"]{field}['"]\s*:\s*['"]([^'"]*)['"]"#);
                (field, Regex::new(&pattern).expect("scrape pattern compiles"))
            })
            .collect()
    })
}

/// Field-by-field scrape of an approval payload that failed structural
/// extraction. Best-effort by design: a partial record beats giving up.
fn scrape_approval_fields(text: &str) -> Option<Value> {
    let mut fields = Map::new();

    for (key, pattern) in scrape_field_regexes() {
        if let Some(caps) = pattern.captures(text) {
            if let Some(found) = caps.get(1) {
                fields.insert(key.to_string(), Value::String(found.as_str().to_string()));
            }
        }
    }

    if !fields.contains_key("entity_type") {
        return None;
    }

    static DETAILS_RE: OnceLock<Regex> = OnceLock::new();
    let details_re = DETAILS_RE
        .get_or_init(|| Regex::new(r#"['"]entity_details['"]\s*:\s*"#).expect("pattern compiles"));
    if let Some(found) = details_re.find(text) {
        let rest = &text[found.end()..];
        if rest.starts_with('{') {
            if let Some(body) = balanced_braces(rest) {
                if let Ok(details) = serde_json::from_str::<Value>(&normalize_python_literals(body))
                {
                    if details.is_object() {
                        fields.insert("entity_details".to_string(), details);
                    }
                }
            }
        }
    }

    let mut value = Value::Object(fields);
    tag_as_approval(&mut value);
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_content_short_circuits() {
        let raw = RawPayload::from_value(json!({"status": "success"}));
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert_eq!(parsed.value, json!({"status": "success"}));
    }

    #[test]
    fn plain_prose_is_unstructured() {
        let raw = RawPayload::from_text("Created the process successfully.");
        let parsed = parse(&raw);
        assert!(!parsed.succeeded);
        assert_eq!(
            parsed.value,
            Value::String("Created the process successfully.".to_string())
        );
    }

    #[test]
    fn strict_json_parses() {
        let raw = RawPayload::from_text(r#"{"status": "error", "message": "boom"}"#);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert_eq!(parsed.value["message"], "boom");
    }

    #[test]
    fn single_quote_rewrite_round_trips() {
        let raw = RawPayload::from_text("{'a': 'b'}");
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert_eq!(parsed.value, json!({"a": "b"}));
    }

    #[test]
    fn single_quotes_left_alone_when_double_quotes_present() {
        let raw = RawPayload::from_text(r#"{"note": "it's fine"}"#);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert_eq!(parsed.value["note"], "it's fine");
    }

    #[test]
    fn truncation_recovers_last_complete_unit() {
        let raw = RawPayload::from_text(r#"{"a": {"b": 1}, "c": 2}..."#);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert!(parsed.was_truncated);
        assert_eq!(parsed.value["a"]["b"], 1);
        assert_eq!(parsed.value["c"], 2);
    }

    #[test]
    fn truncation_without_valid_cut_point_fails_honestly() {
        let text = r#"{"a": {"b": 1}, "c": ..."#;
        let raw = RawPayload::from_text(text);
        let parsed = parse(&raw);
        assert!(!parsed.succeeded);
        assert!(parsed.was_truncated);
        assert_eq!(parsed.value, Value::String(text.to_string()));
    }

    #[test]
    fn truncation_ignores_braces_inside_strings() {
        let raw = RawPayload::from_text(r#"{"a": "has } brace", "b": 1}..."#);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert_eq!(parsed.value["b"], 1);
    }

    #[test]
    fn parsing_is_idempotent() {
        for text in [
            r#"{"status": "success"}"#,
            "{'a': 'b'}",
            r#"{"a": 1}..."#,
            "free text with no structure",
        ] {
            let raw = RawPayload::from_text(text);
            assert_eq!(parse(&raw), parse(&raw));
        }
    }

    #[test]
    fn interrupt_wrapper_takes_precedence() {
        let text = "Error raised: Interrupt(value={'entity_type': 'process', \
                    'entity_summary': 'Process: Steel', 'action': 'create', \
                    'impact': 'Will create a process'})";
        let raw = RawPayload::from_text(text);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert!(parsed.was_reconstructed);
        assert_eq!(parsed.value["entity_type"], "process");
        assert_eq!(parsed.value["entity_summary"], "Process: Steel");
        assert_eq!(parsed.value["action"], "create");
        assert_eq!(
            parsed.value["approval_required"], true,
            "structural extraction must tag the record like the scrape does"
        );
    }

    #[test]
    fn interrupt_normalizes_python_literals() {
        let text = "Interrupt(value={'entity_type': 'flow', 'entity_summary': 'Flow: X', \
                    'action': 'create', 'approval_required': True, 'entity_data': None})";
        let raw = RawPayload::from_text(text);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert_eq!(parsed.value["approval_required"], true);
        assert_eq!(parsed.value["entity_data"], Value::Null);
    }

    #[test]
    fn interrupt_scrape_recovers_partial_record() {
        // Unbalanced braces defeat structural extraction; the scrape still
        // recovers the flat fields.
        let text = "Interrupt(value={'entity_type': 'process', \
                    'entity_summary': 'Process: Clinker', 'action': 'create', \
                    'impact': 'Will create a process'";
        let raw = RawPayload::from_text(text);
        let parsed = parse(&raw);
        assert!(parsed.succeeded);
        assert!(parsed.was_reconstructed);
        assert_eq!(parsed.value["entity_type"], "process");
        assert_eq!(parsed.value["impact"], "Will create a process");
        assert_eq!(parsed.value["approval_required"], true);
    }

    #[test]
    fn interrupt_scrape_without_entity_type_keeps_outer_result() {
        let raw = RawPayload::from_text("Interrupt(value={'unrelated': 1}");
        let parsed = parse(&raw);
        assert!(!parsed.succeeded);
        assert!(!parsed.was_reconstructed);
    }

    #[test]
    fn missing_text_and_value_yields_null() {
        let parsed = parse(&RawPayload::default());
        assert!(parsed.succeeded);
        assert_eq!(parsed.value, Value::Null);
    }
}
