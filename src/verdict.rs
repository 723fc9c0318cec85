// Verdicts for pocscan
// One ExecutionResult per (target, rule) pair, whatever happened

use std::fmt;

use serde::Serialize;

/// Final state of one rule against one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Matched,
    NotMatched,
    Error,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Matched => "VULNERABLE",
            Outcome::NotMatched => "SECURE",
            Outcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of running one rule against one target.
///
/// `raw_request`/`raw_response` hold the audit text of the step that decided
/// the outcome. `diagnostics` collects expression failures that were treated
/// as "condition not satisfied".
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub vul_id: String,
    pub target: String,
    pub outcome: Outcome,
    pub detail: Option<String>,
    pub raw_request: Option<String>,
    pub raw_response: Option<String>,
    pub steps_run: usize,
    pub diagnostics: Vec<String>,
}

impl ExecutionResult {
    pub fn new(vul_id: &str, target: &str, outcome: Outcome) -> Self {
        ExecutionResult {
            vul_id: vul_id.to_string(),
            target: target.to_string(),
            outcome,
            detail: None,
            raw_request: None,
            raw_response: None,
            steps_run: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn error(vul_id: &str, target: &str, detail: impl Into<String>) -> Self {
        ExecutionResult {
            detail: Some(detail.into()),
            ..ExecutionResult::new(vul_id, target, Outcome::Error)
        }
    }

    pub fn matched(&self) -> bool {
        self.outcome == Outcome::Matched
    }

    /// One-line summary, e.g. `[VULNERABLE] poc-001 http://host/`.
    pub fn summary(&self) -> String {
        match &self.detail {
            Some(detail) => format!("[{}] {} {}: {}", self.outcome, self.vul_id, self.target, detail),
            None => format!("[{}] {} {}", self.outcome, self.vul_id, self.target),
        }
    }
}
