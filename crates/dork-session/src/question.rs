//! `AskUserQuestion` structured input/answer shapes.
//!
//! The session manager never interprets tool input in general — it only
//! special-cases the `AskUserQuestion` tool name, whose `questions[]` input
//! drives the `question` stream event and whose answers are addressed by
//! position (`"0"`, `"1"`, ...) rather than by a question id, per
//! index rather than by a generated question id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One option offered for a question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Display label; also the value submitted back for single-select.
    pub label: String,
    /// Optional longer description shown alongside the option.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single question surfaced to the user via the `question` stream event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    /// Position within the tool's `questions[]` array; this is the key used
    /// when answers are submitted (`"0"`, `"1"`, ...).
    pub index: usize,
    /// The question text.
    pub question: String,
    /// Offered options.
    pub options: Vec<QuestionOption>,
    /// Whether more than one option may be selected.
    pub multi_select: bool,
    /// Whether a free-form "Other" response is accepted.
    pub allow_other: bool,
}

/// Parse an `AskUserQuestion` tool call's `input.questions[]` into
/// [`QuestionSpec`]s. Unrecognised shapes are skipped rather than erroring —
/// the caller of a tool decides its own input schema; this parser is lenient
/// because the session manager only needs enough structure to render the
/// `question` event.
#[must_use]
pub fn parse_questions(input: &Value) -> Vec<QuestionSpec> {
    let Some(questions) = input.get("questions").and_then(Value::as_array) else {
        return Vec::new();
    };

    questions
        .iter()
        .enumerate()
        .filter_map(|(index, q)| {
            let question = q.get("question")?.as_str()?.to_owned();
            let options = q
                .get("options")
                .and_then(Value::as_array)
                .map(|opts| {
                    opts.iter()
                        .filter_map(|o| {
                            if let Some(s) = o.as_str() {
                                Some(QuestionOption {
                                    label: s.to_owned(),
                                    description: None,
                                })
                            } else {
                                let label = o.get("label")?.as_str()?.to_owned();
                                let description = o
                                    .get("description")
                                    .and_then(Value::as_str)
                                    .map(str::to_owned);
                                Some(QuestionOption { label, description })
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            let multi_select = q
                .get("multiSelect")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let allow_other = q
                .get("allowOther")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(QuestionSpec {
                index,
                question,
                options,
                multi_select,
                allow_other,
            })
        })
        .collect()
}

/// Encode a submitted answer:
/// multi-select answers are a JSON-stringified array of option labels;
/// single-select (or free-form "Other" text) is the raw label/text.
#[must_use]
pub fn encode_answer(selected: &[String], other: Option<&str>, multi_select: bool) -> String {
    if multi_select {
        serde_json::to_string(selected).unwrap_or_else(|_| "[]".to_owned())
    } else if let Some(other) = other {
        other.to_owned()
    } else {
        selected.first().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_options() {
        let input = json!({
            "questions": [
                {"question": "Pick one", "options": ["A", "B"]},
            ]
        });
        let qs = parse_questions(&input);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].index, 0);
        assert_eq!(qs[0].options[0].label, "A");
        assert!(!qs[0].multi_select);
    }

    #[test]
    fn parses_object_options_with_description() {
        let input = json!({
            "questions": [
                {
                    "question": "Pick one",
                    "options": [{"label": "A", "description": "first"}],
                    "multiSelect": true,
                    "allowOther": true,
                },
            ]
        });
        let qs = parse_questions(&input);
        assert_eq!(qs[0].options[0].description.as_deref(), Some("first"));
        assert!(qs[0].multi_select);
        assert!(qs[0].allow_other);
    }

    #[test]
    fn missing_questions_field_yields_empty() {
        let qs = parse_questions(&json!({}));
        assert!(qs.is_empty());
    }

    #[test]
    fn preserves_ordering_via_index() {
        let input = json!({
            "questions": [
                {"question": "first", "options": ["A", "B"]},
                {"question": "second", "options": ["C", "D"]},
            ]
        });
        let qs = parse_questions(&input);
        assert_eq!(qs[0].index, 0);
        assert_eq!(qs[1].index, 1);
    }

    #[test]
    fn encode_single_select() {
        assert_eq!(encode_answer(&["A".into()], None, false), "A");
    }

    #[test]
    fn encode_multi_select() {
        let encoded = encode_answer(&["A".into(), "B".into()], None, true);
        assert_eq!(encoded, "[\"A\",\"B\"]");
    }

    #[test]
    fn encode_other_text_wins_for_single_select() {
        assert_eq!(encode_answer(&[], Some("custom"), false), "custom");
    }
}
