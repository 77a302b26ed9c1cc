use rust_decimal::Decimal;

use tasq_models::{AgentVerdict, SynthesizedPayload};

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles the formats Claude is known to produce:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prose around the object: `Here is the verdict:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    for candidate in candidate_blocks(text) {
        if is_json_object(&candidate) {
            return Ok(candidate);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Candidate JSON substrings in decreasing order of likelihood.
fn candidate_blocks(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let mut candidates = Vec::new();

    if trimmed.starts_with('{') {
        candidates.push(trimmed.to_string());
    }
    candidates.extend(fenced_blocks(trimmed));
    if let Some(object) = first_balanced_object(trimmed) {
        candidates.push(object);
    }

    candidates
}

fn is_json_object(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|v| v.is_object())
        .unwrap_or(false)
}

/// Every ``` fenced block, with any language tag on the opening line dropped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let Some(newline) = after_fence.find('\n') else {
            break;
        };
        let body = &after_fence[newline + 1..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim().to_string());
        rest = &body[close + 3..];
    }

    blocks
}

/// The first balanced `{ ... }` region, ignoring braces inside JSON strings.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut opened_at = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    opened_at = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return opened_at.map(|start| text[start..=idx].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse and validate an agent verdict from raw Claude CLI output.
pub fn parse_verdict(raw: &str) -> Result<AgentVerdict, AgentError> {
    let json_str = extract_json(raw)?;
    let verdict: AgentVerdict = serde_json::from_str(&json_str).map_err(|e| {
        AgentError::Parse(format!("Failed to parse AgentVerdict: {e}\nJSON: {json_str}"))
    })?;

    check_unit_range("confidence", verdict.confidence)?;
    check_unit_range("score", verdict.score)?;

    Ok(verdict)
}

/// Parse and validate a synthesizer payload from raw Claude CLI output.
pub fn parse_synthesis(raw: &str) -> Result<SynthesizedPayload, AgentError> {
    let json_str = extract_json(raw)?;
    let payload: SynthesizedPayload = serde_json::from_str(&json_str).map_err(|e| {
        AgentError::Parse(format!(
            "Failed to parse SynthesizedPayload: {e}\nJSON: {json_str}"
        ))
    })?;

    check_unit_range("confidence", payload.confidence)?;
    if payload.reasoning.trim().is_empty() {
        return Err(AgentError::Parse(
            "Synthesis reasoning is empty".to_string(),
        ));
    }
    if let Some(targets) = &payload.price_targets {
        for (field, value) in [
            ("entry", targets.entry),
            ("stop_loss", targets.stop_loss),
            ("take_profit", targets.take_profit),
        ] {
            if value <= Decimal::ZERO {
                return Err(AgentError::Parse(format!(
                    "Price target {field} must be positive, got {value}"
                )));
            }
        }
    }

    Ok(payload)
}

fn check_unit_range(field: &str, value: Decimal) -> Result<(), AgentError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(AgentError::Parse(format!(
            "Field {field} is {value}, outside [0, 1]"
        )));
    }
    Ok(())
}
