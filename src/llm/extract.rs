//! JSON extraction from model responses.
//!
//! Model output may wrap JSON in markdown fences or explanatory prose.
//! Extraction tries three strategies in order:
//! 1. the trimmed content is already JSON,
//! 2. JSON inside a fenced code block,
//! 3. the first balanced object/array anywhere in the content.

use regex::Regex;

use crate::error::LlmError;

/// Extracts the JSON payload from a model response.
pub fn extract_json(content: &str) -> Result<String, LlmError> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(json) = balanced_json(trimmed) {
            return Ok(json);
        }
    }

    // Fenced code block, with or without a language tag.
    let fence = Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid regex");
    if let Some(captures) = fence.captures(content) {
        let inner = captures[1].trim();
        if inner.starts_with('{') || inner.starts_with('[') {
            if let Some(json) = balanced_json(inner) {
                return Ok(json);
            }
        }
    }

    if let Some(start) = content.find(['{', '[']) {
        if let Some(json) = balanced_json(&content[start..]) {
            return Ok(json);
        }
    }

    let preview: String = content.chars().take(80).collect();
    Err(LlmError::Parse(format!(
        "no JSON content found in response starting with '{preview}'"
    )))
}

/// Returns the longest balanced JSON object/array at the start of `content`.
///
/// Tracks string literals and escapes so braces inside strings do not count.
fn balanced_json(content: &str) -> Option<String> {
    let bytes = content.as_bytes();
    let open = *bytes.first()?;
    let close = match open {
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
