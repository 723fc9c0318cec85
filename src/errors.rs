// Error types for pocscan
// One enum per concern; execution-level errors never abort a run

use std::io;

/// A target or template URL could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid url {input:?}: {source}")]
pub struct ParseError {
    pub input: String,
    #[source]
    pub source: url::ParseError,
}

/// A rule document is structurally invalid and must be rejected whole.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed rule document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("step {step}: unsupported method {method:?}")]
    Method { step: usize, method: String },
    #[error("step {step}: bad expression {expr:?}: {source}")]
    Expression {
        step: usize,
        expr: String,
        #[source]
        source: EvalError,
    },
    #[error("field {0} must not be empty")]
    Empty(&'static str),
}

/// Network-level failure while running one probe.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("connect failed: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("http: {0}")]
    Http(#[source] reqwest::Error),
    #[error(transparent)]
    Url(#[from] ParseError),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e)
        } else if e.is_connect() {
            TransportError::Connect(e)
        } else {
            TransportError::Http(e)
        }
    }
}

/// Expression compilation or evaluation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error at {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("unknown identifier {0}")]
    Unknown(String),
    #[error("type mismatch: {0}")]
    Type(String),
    #[error("expression did not yield a bool (got {0})")]
    NotBool(String),
    #[error("regex: {0}")]
    Regex(String),
    #[error("{0}")]
    Other(String),
}

/// Failure to select rule records from a store.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("plugin store io: {0}")]
    Io(#[from] io::Error),
    #[error("walk {path}: {msg}")]
    Walk { path: String, msg: String },
    #[error("no enabled plugin with id {0}")]
    NotFound(String),
}

/// A scan target could not be built from user input.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("read targets {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Url(#[from] ParseError),
    #[error("malformed raw request: {0}")]
    Raw(String),
}

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid proxy {0:?}")]
    Proxy(String),
    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Fatal orchestrator misconfiguration.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("worker pool capacity must be at least 1")]
    NoWorkers,
}
