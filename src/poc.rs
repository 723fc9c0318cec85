// Rule (PoC) documents
// Decoded once per load, then shared read-only by every task that runs them

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::SchemaError;
use crate::expr::{CelLite, Evaluator};
use crate::models::Method;

/// HTTP part of a step, before substitution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestTemplate {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub follow_redirects: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_enabled() -> bool {
    true
}

/// One probe of a rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    pub request: RequestTemplate,
    /// Variable name => expression over the response. Evaluated in name order.
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
    pub expression: String,
    /// Condition true => the rule matches here.
    #[serde(default)]
    pub terminal: bool,
    /// Condition false => the rule fails here.
    #[serde(default, rename = "shortCircuit", alias = "short_circuit")]
    pub short_circuit: bool,
    #[serde(skip)]
    method: Method,
}

impl Step {
    pub fn method(&self) -> Method {
        self.method
    }
}

/// A decoded rule document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Poc {
    pub vul_id: String,
    pub affects: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub sets: Vec<Step>,
}

/// A loaded rule plus the store metadata it was selected by.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub vul_id: String,
    pub affects: String,
    pub enabled: bool,
    pub poc: Arc<Poc>,
}

impl Plugin {
    pub fn new(poc: Poc) -> Self {
        Plugin {
            vul_id: poc.vul_id.clone(),
            affects: poc.affects.clone(),
            enabled: poc.enabled,
            poc: Arc::new(poc),
        }
    }
}

/// Decode a rule, validating expressions with the built-in evaluator.
pub fn decode(json: &[u8]) -> Result<Poc, SchemaError> {
    decode_with(json, &CelLite::new())
}

/// Decode a rule. Any structural problem or bad expression rejects the whole
/// document.
pub fn decode_with(json: &[u8], evaluator: &dyn Evaluator) -> Result<Poc, SchemaError> {
    let mut poc: Poc = serde_json::from_slice(json)?;
    if poc.vul_id.trim().is_empty() {
        return Err(SchemaError::Empty("vul_id"));
    }
    for (i, step) in poc.sets.iter_mut().enumerate() {
        step.method = step
            .request
            .method
            .parse()
            .map_err(|_| SchemaError::Method {
                step: i,
                method: step.request.method.clone(),
            })?;
        let exprs = std::iter::once(&step.expression).chain(step.extract.values());
        for expr in exprs {
            evaluator.check(expr).map_err(|source| SchemaError::Expression {
                step: i,
                expr: expr.clone(),
                source,
            })?;
        }
    }
    Ok(poc)
}
