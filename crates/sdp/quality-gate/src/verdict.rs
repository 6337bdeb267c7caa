//! Reviewer response parsing.
//!
//! The payload may be wrapped in prose or fenced code blocks. Candidates
//! are tried in order: fenced blocks first, then every balanced `{...}`
//! span. The first JSON object with an `approved` key wins. Anything that
//! does not fit the schema is a parse failure, which callers treat as
//! rejection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parsed reviewer decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved {
        reason: String,
        changes: Vec<String>,
        final_code: Option<String>,
    },
    Rejected {
        reason: String,
    },
    ParseFailed {
        raw: String,
    },
}

impl ReviewVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewVerdict::Approved { .. })
    }
}

/// Parse reviewer output into a verdict.
pub fn parse_verdict(output: &str) -> ReviewVerdict {
    let candidate = fenced_blocks(output)
        .into_iter()
        .chain(brace_spans(output))
        .filter_map(|text| serde_json::from_str::<Value>(text.trim()).ok())
        .find(|value| value.get("approved").is_some());

    match candidate {
        Some(value) => interpret(&value).unwrap_or_else(|| ReviewVerdict::ParseFailed {
            raw: output.to_string(),
        }),
        None => ReviewVerdict::ParseFailed {
            raw: output.to_string(),
        },
    }
}

fn interpret(value: &Value) -> Option<ReviewVerdict> {
    let approved = value.get("approved")?.as_bool()?;

    let reason = match value.get("reason") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return None,
    };

    let changes = match value.get("changes") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?,
        Some(_) => return None,
    };

    let final_code = match value.get("final_code") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return None,
    };

    Some(if approved {
        ReviewVerdict::Approved {
            reason: reason.unwrap_or_else(|| "approved by reviewer".to_string()),
            changes,
            final_code,
        }
    } else {
        ReviewVerdict::Rejected {
            reason: reason.unwrap_or_else(|| "rejected by reviewer".to_string()),
        }
    })
}

/// Contents of ``` fenced blocks, with any language tag removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        match body.find("```") {
            Some(end) => {
                blocks.push(&body[..end]);
                rest = &body[end + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Every balanced `{...}` span, outermost first, respecting JSON strings.
fn brace_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    for (start, &b) in bytes.iter().enumerate() {
        if b != b'{' {
            continue;
        }
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &c) in bytes[start..].iter().enumerate() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..start + offset + 1]);
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    spans
}
