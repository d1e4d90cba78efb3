use checkloop_common::Verdict;
use serde_json::Value;

use crate::errors::{WorkflowError, WorkflowResult};
use crate::util::{extract_json_object, truncate};

pub const NO_FEEDBACK: &str = "No feedback provided.";

/// Parse a judge reply into a [`Verdict`].
///
/// The reply is free text expected to contain one JSON object. Fields are
/// coerced rather than rejected: `passed` must be a boolean (else false),
/// `confidence` a number clamped into `[0, 1]` (else 0), `feedback` a string
/// (else a placeholder), and `issues` keeps only its string elements.
pub fn parse_verdict(service: &'static str, reply: &str) -> WorkflowResult<Verdict> {
    let json = extract_json_object(reply).ok_or_else(|| {
        WorkflowError::invalid_response(
            service,
            format!("no JSON object in reply: {}", truncate(reply.trim(), 200)),
        )
    })?;
    let value: Value = serde_json::from_str(json).map_err(|e| {
        WorkflowError::invalid_response(service, format!("unparseable verdict JSON: {}", e))
    })?;

    let passed = value.get("passed").and_then(Value::as_bool).unwrap_or(false);

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| !c.is_nan())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or(NO_FEEDBACK)
        .to_string();

    let issues = value
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Ok(Verdict {
        passed,
        confidence,
        feedback,
        issues,
    })
}
