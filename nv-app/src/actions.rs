//! Extracts reasoning and action requests from one raw model response.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static THINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>(.*?)</think>").expect("think regex must compile")
});

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<action>(.*?)</action>").expect("action regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Message,
    Read,
    Write,
    Run,
    Vision,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Read => "read",
            Self::Write => "write",
            Self::Run => "run",
            Self::Vision => "vision",
        }
    }
}

/// Write payloads that fail shape checks still reach the dispatcher, which
/// reports them without asking for permission.
#[derive(Debug, Clone, PartialEq)]
pub enum WritePayload {
    File { path: String, data: Value },
    Malformed { content: Value, reason: &'static str },
}

impl WritePayload {
    fn from_content(content: Value) -> Self {
        let Value::Object(map) = &content else {
            return Self::Malformed {
                content,
                reason: "content is not an object",
            };
        };
        let path = map
            .get("path")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let data = map.get("data").filter(|d| !d.is_null()).cloned();
        match (path, data) {
            (Some(path), Some(data)) => Self::File { path, data },
            _ => Self::Malformed {
                content,
                reason: "missing 'path' or 'data'",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Message(String),
    Read(String),
    Write(WritePayload),
    Run(String),
    Vision(String),
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Message(_) => ActionKind::Message,
            Self::Read(_) => ActionKind::Read,
            Self::Write(_) => ActionKind::Write,
            Self::Run(_) => ActionKind::Run,
            Self::Vision(_) => ActionKind::Vision,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAction {
    Request(ActionRequest),
    /// Decoded fine, but names no known action type.
    Unknown { action_type: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// Present only when exactly one reasoning block was found.
    pub reasoning: Option<String>,
    pub actions: Vec<ParsedAction>,
    /// Action blocks that could not be decoded.
    pub dropped: usize,
}

pub fn parse_response(raw: &str) -> ParsedResponse {
    let thoughts: Vec<&str> = THINK_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect();
    let reasoning = match thoughts.as_slice() {
        [only] => Some(only.to_string()),
        [] => None,
        many => {
            tracing::debug!(blocks = many.len(), "multiple reasoning blocks; ignoring all");
            None
        }
    };

    let mut actions = Vec::new();
    let mut dropped = 0usize;
    for (index, cap) in ACTION_RE.captures_iter(raw).enumerate() {
        let body = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        match decode_action(body) {
            Ok(action) => actions.push(action),
            Err(reason) => {
                dropped += 1;
                tracing::warn!(action_index = index, %reason, "dropping undecodable action block");
            }
        }
    }

    ParsedResponse {
        reasoning,
        actions,
        dropped,
    }
}

fn decode_action(body: &str) -> Result<ParsedAction, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let Value::Object(mut map) = value else {
        return Err("action is not an object".to_string());
    };
    let action_type = map
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let content = map.remove("content").unwrap_or(Value::Null);

    let string_content = |content: Value| match content {
        Value::String(s) => Ok(s),
        other => Err(format!("{action_type} content must be a string, got {other}")),
    };

    let request = match action_type.as_str() {
        "message" => Some(ActionRequest::Message(match content {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })),
        "read" => Some(ActionRequest::Read(string_content(content)?)),
        "run" => Some(ActionRequest::Run(string_content(content)?)),
        "vision" => Some(ActionRequest::Vision(string_content(content)?)),
        "write" => Some(ActionRequest::Write(WritePayload::from_content(content))),
        _ => None,
    };
    Ok(match request {
        Some(request) => ParsedAction::Request(request),
        None => ParsedAction::Unknown { action_type },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requests(parsed: &ParsedResponse) -> Vec<ActionRequest> {
        parsed
            .actions
            .iter()
            .filter_map(|a| match a {
                ParsedAction::Request(r) => Some(r.clone()),
                ParsedAction::Unknown { .. } => None,
            })
            .collect()
    }

    #[test]
    fn one_think_and_actions_in_order() {
        let raw = r#"<think> read then write </think>
<action>{"type": "read", "content": "projects/configs/default_esr_config.json"}</action>
<action>
{
  "type": "write",
  "content": {"path": "configs/x.json", "data": {"a": 1}}
}
</action>"#;
        let parsed = parse_response(raw);
        assert_eq!(parsed.reasoning.as_deref(), Some("read then write"));
        assert_eq!(parsed.dropped, 0);
        assert_eq!(
            requests(&parsed),
            vec![
                ActionRequest::Read("projects/configs/default_esr_config.json".into()),
                ActionRequest::Write(WritePayload::File {
                    path: "configs/x.json".into(),
                    data: json!({"a": 1}),
                }),
            ]
        );
    }

    #[test]
    fn two_think_blocks_mean_no_reasoning() {
        let parsed = parse_response("<think>a</think><think>b</think>");
        assert_eq!(parsed.reasoning, None);
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn malformed_action_does_not_block_others() {
        let raw = r#"<think>x</think>
<action>{"type": "message", "content": "hi"</action>
<action>{"type": "message", "content": "hello"}</action>"#;
        let parsed = parse_response(raw);
        assert_eq!(parsed.dropped, 1);
        assert_eq!(requests(&parsed), vec![ActionRequest::Message("hello".into())]);
    }

    #[test]
    fn unknown_type_is_an_explicit_outcome() {
        let raw = r#"<action>{"type": "Delete", "content": "configs/x.json"}</action>
<action>{"content": "no type"}</action>"#;
        let parsed = parse_response(raw);
        assert_eq!(
            parsed.actions,
            vec![
                ParsedAction::Unknown {
                    action_type: "delete".into()
                },
                ParsedAction::Unknown {
                    action_type: String::new()
                },
            ]
        );
    }

    #[test]
    fn type_is_case_insensitive() {
        let parsed = parse_response(r#"<action>{"type": "RUN", "content": "py x"}</action>"#);
        assert_eq!(requests(&parsed), vec![ActionRequest::Run("py x".into())]);
    }

    #[test]
    fn path_actions_need_string_content() {
        let parsed = parse_response(r#"<action>{"type": "read", "content": {"path": "a"}}</action>"#);
        assert_eq!(parsed.dropped, 1);
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn write_shape_problems_are_kept_for_reporting() {
        let parsed = parse_response(
            r#"<action>{"type": "write", "content": "configs/x.json"}</action>
<action>{"type": "write", "content": {"path": "configs/x.json"}}</action>"#,
        );
        let reasons: Vec<_> = requests(&parsed)
            .into_iter()
            .map(|r| match r {
                ActionRequest::Write(WritePayload::Malformed { reason, .. }) => reason,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(reasons, vec!["content is not an object", "missing 'path' or 'data'"]);
    }

    #[test]
    fn structured_message_content_is_stringified() {
        let parsed = parse_response(r#"<action>{"type": "message", "content": {"a": 1}}</action>"#);
        assert_eq!(requests(&parsed), vec![ActionRequest::Message(r#"{"a":1}"#.into())]);
    }

    #[test]
    fn no_blocks_at_all() {
        let parsed = parse_response("plain text reply");
        assert_eq!(parsed, ParsedResponse::default());
    }
}
