use serde::{Deserialize, Serialize};

use crate::seq;

/// Structured result of one checker review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub passed: bool,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub feedback: String,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub issues: Vec<String>,
}

impl Verdict {
    /// Whether this verdict clears the given pass bar.
    pub fn meets(&self, threshold: f64) -> bool {
        self.passed && self.confidence >= threshold
    }
}
