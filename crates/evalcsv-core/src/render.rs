//! Text renderers for content and tool calls.
//!
//! Both renderers are pure: equal input gives an equal string, and absent
//! input gives `""`.

use serde_json::Value;

use crate::error::RenderError;
use crate::types::{Content, IntermediateData};

/// Join the text parts of `content` with newlines. Parts carrying other
/// payloads (tool calls, inline data) are skipped.
pub fn content_to_text(content: Option<&Content>) -> Result<String, RenderError> {
    let Some(content) = content else {
        return Ok(String::new());
    };

    let mut lines = Vec::with_capacity(content.parts.len());
    for (index, part) in content.parts.iter().enumerate() {
        let count = part.payload_count();
        if count > 1 {
            return Err(RenderError::AmbiguousPart { index, count });
        }
        if let Some(text) = &part.text {
            lines.push(text.as_str());
        }
    }
    Ok(lines.join("\n"))
}

/// One `name(args)` line per tool call, args as compact JSON.
pub fn tool_calls_to_text(data: Option<&IntermediateData>) -> Result<String, RenderError> {
    let Some(data) = data else {
        return Ok(String::new());
    };

    let mut lines = Vec::with_capacity(data.tool_uses.len());
    for (index, call) in data.tool_uses.iter().enumerate() {
        let name = match call.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(RenderError::MissingToolName { index }),
        };
        let args = match &call.args {
            None | Some(Value::Null) => "{}".to_string(),
            Some(args @ Value::Object(_)) => args.to_string(),
            Some(_) => {
                return Err(RenderError::InvalidToolArgs {
                    index,
                    name: name.to_string(),
                })
            }
        };
        lines.push(format!("{name}({args})"));
    }
    Ok(lines.join("\n"))
}
