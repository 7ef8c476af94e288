//! Reconstructs a renderable transcript from a session's raw JSONL log.
//!
//! Backends persist every turn as newline-delimited JSON; this module turns
//! that log back into the same shape the live `send_message` stream would
//! have produced.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw entry types that carry no user-facing content and are dropped
/// outright.
const SKIPPED_TYPES: &[&str] = &[
    "file-history-snapshot",
    "progress",
    "system",
    "summary",
    "task-notification",
];

/// Classification of a reconstructed transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A user-authored message.
    User,
    /// An assistant-authored message.
    Assistant,
    /// A collapsed local slash-command invocation and its output.
    Command,
    /// A context-compaction marker.
    Compaction,
}

/// A tool call reconstructed from an assistant message, with its result
/// grafted on from a later `tool_result` entry when present.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptToolCall {
    /// Identifier correlating the call with its result.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Input the tool was invoked with.
    pub input: Value,
    /// Result content, once grafted from a `tool_result` entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// One message in the reconstructed transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Classification of this message.
    pub message_type: MessageType,
    /// Plain-text content, with `<system-reminder>` regions stripped.
    pub text: String,
    /// Tool calls made during this message, in original order.
    pub tool_calls: Vec<TranscriptToolCall>,
    /// Slash-command name, set only on [`MessageType::Command`] messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
    /// Slash-command arguments, set only on [`MessageType::Command`]
    /// messages that carried any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_args: Option<String>,
    /// Timestamp, when the raw entry carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Cheaply extracted session metadata, read from only the head and tail of
/// a transcript file rather than a full line-by-line parse.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    /// Best-effort session title, taken from the first user message.
    pub title: Option<String>,
    /// Working directory the session ran in, if recorded.
    pub cwd: Option<String>,
    /// Permission mode the session ran with, if recorded.
    pub permission_mode: Option<String>,
    /// Model named by the most recent assistant message.
    pub last_model: Option<String>,
    /// Token usage total from the most recent assistant message, summing
    /// input, output, and cache tokens.
    pub total_context_tokens: Option<u64>,
}

/// Bytes scanned from the start of the file for [`extract_metadata`].
const METADATA_HEAD_BYTES: usize = 8 * 1024;
/// Bytes scanned from the end of the file for [`extract_metadata`].
const METADATA_TAIL_BYTES: usize = 16 * 1024;

fn system_reminder_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").expect("valid regex")
    })
}

/// Matches an entry whose *entire* text is some subset of the three local
/// command tags and nothing else — a `<command-name>` entry and a later
/// `<command-args>` entry in a split sequence each match this on their own,
/// as does the combined single-entry form the tags collapse into when a
/// backend emits them all at once.
fn local_command_tags_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(
            r"(?s)^\s*(?:<command-name>(?P<name>.*?)</command-name>\s*)?(?:<command-args>(?P<args>.*?)</command-args>\s*)?(?:<local-command-stdout>(?P<stdout>.*?)</local-command-stdout>\s*)?$",
        )
        .expect("valid regex")
    })
}

fn strip_system_reminders(text: &str) -> String {
    system_reminder_pattern().replace_all(text, "").trim().to_owned()
}

fn is_compaction_marker(text: &str) -> bool {
    text.trim_start().starts_with("This session is being continued")
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut idx = index.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut idx = index.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn is_pure_tool_result(content: &Value) -> bool {
    match content.as_array() {
        Some(parts) if !parts.is_empty() => parts
            .iter()
            .all(|p| p.get("type").and_then(Value::as_str) == Some("tool_result")),
        _ => false,
    }
}

fn extract_tool_uses(content: &Value) -> Vec<TranscriptToolCall> {
    let Some(parts) = content.as_array() else { return Vec::new() };
    parts
        .iter()
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(|p| {
            let tool_call_id = p.get("id")?.as_str()?.to_owned();
            let name = p.get("name")?.as_str()?.to_owned();
            let input = p.get("input").cloned().unwrap_or(Value::Null);
            Some(TranscriptToolCall { tool_call_id, name, input, result: None })
        })
        .collect()
}

/// Classifies a `user` entry's flattened text as local-command-tag-only
/// content: `Some((name, args, stdout))` with each field `None` if that tag
/// wasn't present in *this* entry. Returns `None` for anything else,
/// including a blank entry with no tags at all.
fn parse_command_tags(text: &str) -> Option<(Option<String>, Option<String>, Option<String>)> {
    let captures = local_command_tags_pattern().captures(text.trim())?;
    let name = captures.name("name").map(|m| m.as_str().trim().to_owned());
    let args = captures.name("args").map(|m| m.as_str().trim().to_owned());
    let stdout = captures.name("stdout").map(|m| m.as_str().trim().to_owned());
    if name.is_none() && args.is_none() && stdout.is_none() {
        return None;
    }
    Some((name, args, stdout))
}

fn extract_timestamp(entry: &Value) -> Option<DateTime<Utc>> {
    entry
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract display metadata without parsing the full transcript: the head
/// is scanned for session-level fields and an opening title, the tail for
/// the most recently used model and its token totals.
#[must_use]
pub fn extract_metadata(raw: &str) -> TranscriptMetadata {
    let mut metadata = TranscriptMetadata::default();

    let head_end = floor_char_boundary(raw, raw.len().min(METADATA_HEAD_BYTES));
    for line in raw[..head_end].lines() {
        let Ok(entry) = serde_json::from_str::<Value>(line.trim()) else { continue };

        if metadata.cwd.is_none() {
            metadata.cwd = entry.get("cwd").and_then(Value::as_str).map(str::to_owned);
        }
        if metadata.permission_mode.is_none() {
            metadata.permission_mode = entry
                .get("permissionMode")
                .or_else(|| entry.get("permission_mode"))
                .and_then(Value::as_str)
                .map(str::to_owned);
        }
        if metadata.title.is_none() && entry.get("type").and_then(Value::as_str) == Some("user") {
            if let Some(content) = entry.pointer("/message/content") {
                let text = strip_system_reminders(&flatten_content(content));
                if !text.is_empty() {
                    metadata.title = Some(text.chars().take(80).collect());
                }
            }
        }
        if metadata.title.is_some() && metadata.cwd.is_some() && metadata.permission_mode.is_some() {
            break;
        }
    }

    let tail_start = ceil_char_boundary(raw, raw.len().saturating_sub(METADATA_TAIL_BYTES));
    for line in raw[tail_start..].lines().rev() {
        let Ok(entry) = serde_json::from_str::<Value>(line.trim()) else { continue };
        if entry.get("type").and_then(Value::as_str) != Some("assistant") {
            continue;
        }

        if metadata.last_model.is_none() {
            metadata.last_model = entry.pointer("/message/model").and_then(Value::as_str).map(str::to_owned);
        }
        if metadata.total_context_tokens.is_none() {
            if let Some(usage) = entry.pointer("/message/usage") {
                let tokens = ["input_tokens", "output_tokens", "cache_read_input_tokens", "cache_creation_input_tokens"]
                    .iter()
                    .filter_map(|key| usage.get(key).and_then(Value::as_u64))
                    .sum::<u64>();
                if tokens > 0 {
                    metadata.total_context_tokens = Some(tokens);
                }
            }
        }
        if metadata.last_model.is_some() && metadata.total_context_tokens.is_some() {
            break;
        }
    }

    metadata
}

/// Parse a session's raw JSONL transcript log into renderable messages.
///
/// Pure tool-result `user` entries are grafted onto the tool call they
/// answer rather than emitted as their own message; local slash-command
/// invocations collapse into a single [`MessageType::Command`] message;
/// `<system-reminder>` regions are stripped from visible text.
#[must_use]
pub fn parse_transcript(jsonl: &str) -> Vec<TranscriptMessage> {
    let mut messages: Vec<TranscriptMessage> = Vec::new();
    let mut tool_index: HashMap<String, (usize, usize)> = HashMap::new();
    let mut pending_command: Option<PendingCommand> = None;

    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Value>(line) else { continue };
        let entry_type = entry.get("type").and_then(Value::as_str).unwrap_or("");
        if SKIPPED_TYPES.contains(&entry_type) {
            continue;
        }

        match entry_type {
            "user" => {
                let Some(content) = entry.pointer("/message/content") else { continue };

                if is_pure_tool_result(content) {
                    flush_pending_command(&mut pending_command, &mut messages);
                    graft_tool_results(&entry, content, &mut messages, &tool_index);
                    continue;
                }

                let raw_text = flatten_content(content);

                if let Some((name, args, stdout)) = parse_command_tags(&raw_text) {
                    let stdout_arrived = stdout.is_some();
                    let command = pending_command.get_or_insert_with(|| PendingCommand {
                        name: String::new(),
                        args: String::new(),
                        stdout: String::new(),
                        timestamp: None,
                    });
                    if let Some(name) = name {
                        command.name = name;
                    }
                    if let Some(args) = args {
                        command.args = args;
                    }
                    if let Some(stdout) = stdout {
                        command.stdout = stdout;
                    }
                    if command.timestamp.is_none() {
                        command.timestamp = extract_timestamp(&entry);
                    }
                    // Stdout means the command is locally complete (no
                    // expansion message follows); flush right away instead
                    // of waiting for the next entry.
                    if stdout_arrived {
                        flush_pending_command(&mut pending_command, &mut messages);
                    }
                    continue;
                }

                if pending_command.is_some() {
                    // The substituted prompt for the pending command: it
                    // completes the collapse but contributes no text of its
                    // own to the transcript.
                    flush_pending_command(&mut pending_command, &mut messages);
                    continue;
                }

                let text = strip_system_reminders(&raw_text);
                if text.is_empty() {
                    continue;
                }
                let message_type = if is_compaction_marker(&text) {
                    MessageType::Compaction
                } else {
                    MessageType::User
                };
                messages.push(TranscriptMessage {
                    message_type,
                    text,
                    tool_calls: Vec::new(),
                    command_name: None,
                    command_args: None,
                    timestamp: extract_timestamp(&entry),
                });
            }
            "assistant" => {
                flush_pending_command(&mut pending_command, &mut messages);

                let Some(content) = entry.pointer("/message/content") else { continue };
                let text = strip_system_reminders(&flatten_content(content));
                let tool_calls = extract_tool_uses(content);

                let message_index = messages.len();
                for (tool_call_index, call) in tool_calls.iter().enumerate() {
                    tool_index.insert(call.tool_call_id.clone(), (message_index, tool_call_index));
                }

                messages.push(TranscriptMessage {
                    message_type: MessageType::Assistant,
                    text,
                    tool_calls,
                    command_name: None,
                    command_args: None,
                    timestamp: extract_timestamp(&entry),
                });
            }
            _ => {}
        }
    }

    flush_pending_command(&mut pending_command, &mut messages);
    messages
}

/// A local slash-command invocation being assembled across one or more
/// consecutive `user` entries: a backend may emit `<command-name>`,
/// `<command-args>`, and `<local-command-stdout>` as a single combined
/// entry, or as separate entries in sequence followed by an unrelated
/// "expansion message" entry (the substituted prompt actually sent to the
/// model) that carries no tags of its own and is dropped once it completes
/// the collapse.
struct PendingCommand {
    name: String,
    args: String,
    stdout: String,
    timestamp: Option<DateTime<Utc>>,
}

impl PendingCommand {
    fn rendered(&self) -> String {
        let mut text = format!("/{}", self.name);
        if !self.args.is_empty() {
            text.push(' ');
            text.push_str(&self.args);
        }
        if !self.stdout.is_empty() {
            text.push('\n');
            text.push_str(&self.stdout);
        }
        text
    }

    fn into_message(self) -> TranscriptMessage {
        TranscriptMessage {
            message_type: MessageType::Command,
            command_name: Some(self.name.clone()),
            command_args: (!self.args.is_empty()).then(|| self.args.clone()),
            text: self.rendered(),
            tool_calls: Vec::new(),
            timestamp: self.timestamp,
        }
    }
}

/// Push `pending`'s collapsed [`MessageType::Command`] message onto
/// `messages` and clear it, if a command is in progress. A no-op otherwise.
fn flush_pending_command(pending: &mut Option<PendingCommand>, messages: &mut Vec<TranscriptMessage>) {
    if let Some(command) = pending.take() {
        messages.push(command.into_message());
    }
}

/// Graft tool results from a pure-`tool_result` user entry onto the
/// correlated assistant tool calls. `AskUserQuestion` results are rewritten
/// into an index-keyed answer map; `Skill` results additionally emit a
/// collapsed [`MessageType::Command`] message.
fn graft_tool_results(
    entry: &Value,
    content: &Value,
    messages: &mut Vec<TranscriptMessage>,
    tool_index: &HashMap<String, (usize, usize)>,
) {
    let Some(parts) = content.as_array() else { return };
    let tool_use_result = entry.get("toolUseResult");
    let mut pending_commands = Vec::new();

    for part in parts {
        let Some(tool_use_id) = part.get("tool_use_id").and_then(Value::as_str) else { continue };
        let Some(&(message_index, tool_call_index)) = tool_index.get(tool_use_id) else { continue };
        let raw_result = part.get("content").cloned().unwrap_or(Value::Null);

        let Some((name, input)) = messages
            .get(message_index)
            .and_then(|m| m.tool_calls.get(tool_call_index))
            .map(|call| (call.name.clone(), call.input.clone()))
        else {
            continue;
        };

        let graft = if name == "AskUserQuestion" {
            correlate_question_answers(&input, tool_use_result, &raw_result)
        } else {
            raw_result
        };

        if let Some(message) = messages.get_mut(message_index) {
            if let Some(call) = message.tool_calls.get_mut(tool_call_index) {
                call.result = Some(graft);
            }
        }

        if name == "Skill" {
            if let Some(command) = skill_command_message(&input, tool_use_result) {
                pending_commands.push(command);
            }
        }
    }

    messages.extend(pending_commands);
}

/// Correlate an `AskUserQuestion` call's `questions[]` with their answers,
/// producing a `{"0": answer, "1": answer, ...}` map keyed by question
/// index. Prefers `toolUseResult.answers` keyed by question text, falling
/// back to a `"question"="answer"` text pattern in the raw result.
fn correlate_question_answers(input: &Value, tool_use_result: Option<&Value>, raw_result: &Value) -> Value {
    let questions: Vec<String> = input
        .get("questions")
        .and_then(Value::as_array)
        .map(|qs| {
            qs.iter()
                .filter_map(|q| q.get("question").and_then(Value::as_str).map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();

    if questions.is_empty() {
        return raw_result.clone();
    }

    let mut answers = serde_json::Map::new();

    if let Some(answer_map) = tool_use_result.and_then(|r| r.get("answers")).and_then(Value::as_object) {
        for (index, question) in questions.iter().enumerate() {
            if let Some(answer) = answer_map.get(question) {
                answers.insert(index.to_string(), answer.clone());
            }
        }
    }

    if answers.is_empty() {
        let text = flatten_content(raw_result);
        for (index, question) in questions.iter().enumerate() {
            if let Some(answer) = fallback_qa_pattern(&text, question) {
                answers.insert(index.to_string(), Value::String(answer));
            }
        }
    }

    Value::Object(answers)
}

fn fallback_qa_pattern(text: &str, question: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*=\s*"([^"]*)""#, regex::escape(question));
    let re = regex::Regex::new(&pattern).ok()?;
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_owned())
}

/// Build the collapsed command-style message for a `Skill` tool call, once
/// its `toolUseResult.commandName` has arrived.
fn skill_command_message(input: &Value, tool_use_result: Option<&Value>) -> Option<TranscriptMessage> {
    let command_name = tool_use_result?.get("commandName")?.as_str()?.to_owned();
    let command_args = input.get("args").map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    let mut text = format!("/{command_name}");
    if let Some(args) = &command_args {
        if !args.is_empty() {
            text.push(' ');
            text.push_str(args);
        }
    }

    Some(TranscriptMessage {
        message_type: MessageType::Command,
        text,
        tool_calls: Vec::new(),
        command_name: Some(command_name),
        command_args,
        timestamp: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(value: serde_json::Value) -> String {
        serde_json::to_string(&value).unwrap()
    }

    #[test]
    fn skips_housekeeping_entry_types() {
        let jsonl = line(serde_json::json!({"type": "progress", "data": {}}));
        assert!(parse_transcript(&jsonl).is_empty());
    }

    #[test]
    fn strips_system_reminder_regions() {
        let jsonl = line(serde_json::json!({
            "type": "user",
            "message": {"content": "hello <system-reminder>internal</system-reminder>world"},
        }));
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello world");
    }

    #[test]
    fn collapses_local_command_sequence() {
        let jsonl = line(serde_json::json!({
            "type": "user",
            "message": {
                "content": "<command-name>status</command-name><command-args>--short</command-args><local-command-stdout>clean</local-command-stdout>",
            },
        }));
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::Command);
        assert_eq!(messages[0].text, "/status --short\nclean");
        assert_eq!(messages[0].command_name.as_deref(), Some("status"));
        assert_eq!(messages[0].command_args.as_deref(), Some("--short"));
    }

    #[test]
    fn collapses_local_command_split_across_entries() {
        let name_entry = line(serde_json::json!({
            "type": "user",
            "message": {"content": "<command-name>ideate</command-name>"},
        }));
        let args_entry = line(serde_json::json!({
            "type": "user",
            "message": {"content": "<command-args>Add settings</command-args>"},
        }));
        let expansion_entry = line(serde_json::json!({
            "type": "user",
            "message": {"content": "Add settings to the app, focusing on dark mode"},
        }));
        let jsonl = format!("{name_entry}\n{args_entry}\n{expansion_entry}");
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::Command);
        assert_eq!(messages[0].text, "/ideate Add settings");
        assert_eq!(messages[0].command_name.as_deref(), Some("ideate"));
        assert_eq!(messages[0].command_args.as_deref(), Some("Add settings"));
    }

    #[test]
    fn dangling_command_tag_flushes_at_end_of_transcript() {
        let jsonl = line(serde_json::json!({
            "type": "user",
            "message": {"content": "<command-name>status</command-name>"},
        }));
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::Command);
        assert_eq!(messages[0].command_name.as_deref(), Some("status"));
    }

    #[test]
    fn grafts_tool_result_onto_prior_tool_call() {
        let assistant = line(serde_json::json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "tool_use", "id": "tc_1", "name": "Read", "input": {"path": "a.rs"}},
                ],
            },
        }));
        let result = line(serde_json::json!({
            "type": "user",
            "message": {
                "content": [
                    {"type": "tool_result", "tool_use_id": "tc_1", "content": "file contents"},
                ],
            },
        }));
        let jsonl = format!("{assistant}\n{result}");
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].tool_calls[0].result,
            Some(Value::String("file contents".into()))
        );
    }

    #[test]
    fn classifies_compaction_marker() {
        let jsonl = line(serde_json::json!({
            "type": "user",
            "message": {"content": "This session is being continued from a previous conversation"},
        }));
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages[0].message_type, MessageType::Compaction);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let jsonl = "not json\n".to_owned()
            + &line(serde_json::json!({"type": "user", "message": {"content": "hi"}}));
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi");
    }

    #[test]
    fn correlates_ask_user_question_answers_from_tool_use_result() {
        let assistant = line(serde_json::json!({
            "type": "assistant",
            "message": {
                "content": [
                    {
                        "type": "tool_use",
                        "id": "tc_q1",
                        "name": "AskUserQuestion",
                        "input": {"questions": [{"question": "Which environment?"}, {"question": "Proceed?"}]},
                    },
                ],
            },
        }));
        let result = line(serde_json::json!({
            "type": "user",
            "message": {
                "content": [
                    {"type": "tool_result", "tool_use_id": "tc_q1", "content": "answered"},
                ],
            },
            "toolUseResult": {"answers": {"Which environment?": "staging", "Proceed?": "yes"}},
        }));
        let jsonl = format!("{assistant}\n{result}");
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 1);
        let answers = messages[0].tool_calls[0].result.as_ref().unwrap();
        assert_eq!(answers["0"], "staging");
        assert_eq!(answers["1"], "yes");
    }

    #[test]
    fn correlates_ask_user_question_answers_from_text_fallback() {
        let assistant = line(serde_json::json!({
            "type": "assistant",
            "message": {
                "content": [
                    {
                        "type": "tool_use",
                        "id": "tc_q2",
                        "name": "AskUserQuestion",
                        "input": {"questions": [{"question": "Ship today?"}]},
                    },
                ],
            },
        }));
        let result = line(serde_json::json!({
            "type": "user",
            "message": {
                "content": [
                    {"type": "tool_result", "tool_use_id": "tc_q2", "content": "\"Ship today?\"=\"yes\""},
                ],
            },
        }));
        let jsonl = format!("{assistant}\n{result}");
        let messages = parse_transcript(&jsonl);
        let answers = messages[0].tool_calls[0].result.as_ref().unwrap();
        assert_eq!(answers["0"], "yes");
    }

    #[test]
    fn skill_tool_use_collapses_into_command_message() {
        let assistant = line(serde_json::json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "tool_use", "id": "tc_skill", "name": "Skill", "input": {"args": "--fix"}},
                ],
            },
        }));
        let result = line(serde_json::json!({
            "type": "user",
            "message": {
                "content": [
                    {"type": "tool_result", "tool_use_id": "tc_skill", "content": "done"},
                ],
            },
            "toolUseResult": {"commandName": "lint"},
        }));
        let jsonl = format!("{assistant}\n{result}");
        let messages = parse_transcript(&jsonl);
        assert_eq!(messages.len(), 2);
        let command = messages.iter().find(|m| m.message_type == MessageType::Command).unwrap();
        assert_eq!(command.command_name.as_deref(), Some("lint"));
        assert_eq!(command.command_args.as_deref(), Some("--fix"));
        assert_eq!(command.text, "/lint --fix");
    }

    #[test]
    fn extract_metadata_reads_head_and_tail() {
        let head = line(serde_json::json!({
            "type": "user",
            "cwd": "/workspace/app",
            "permissionMode": "default",
            "message": {"content": "fix the flaky test"},
        }));
        let tail = line(serde_json::json!({
            "type": "assistant",
            "message": {
                "model": "claude-test",
                "usage": {"input_tokens": 100, "output_tokens": 50},
                "content": "done",
            },
        }));
        let jsonl = format!("{head}\n{tail}");
        let metadata = extract_metadata(&jsonl);
        assert_eq!(metadata.cwd.as_deref(), Some("/workspace/app"));
        assert_eq!(metadata.permission_mode.as_deref(), Some("default"));
        assert_eq!(metadata.title.as_deref(), Some("fix the flaky test"));
        assert_eq!(metadata.last_model.as_deref(), Some("claude-test"));
        assert_eq!(metadata.total_context_tokens, Some(150));
    }
}
