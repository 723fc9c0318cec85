// Expression evaluation contract
//
// The engine never looks inside an expression. It hands the source text and
// an Environment to an Evaluator and gets back a Value (extraction) or a bool
// (conditions). Swapping the grammar means swapping the Evaluator.
//
// CelLite is the bundled evaluator: a small CEL-flavoured language with
// literals, member/index access, arithmetic, comparisons, && || ! and a few
// string/bytes/regex helpers.

pub mod eval;
pub mod parser;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::EvalError;
use crate::models::{Headers, Request, Response};
use crate::urlcodec::UrlParts;

pub use eval::CelLite;

/// Dynamic value flowing through expressions and variable bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Text used when a value is substituted into a request template.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Bool(b) => Cow::Owned(b.to_string()),
            Value::Int(i) => Cow::Owned(i.to_string()),
            Value::Str(s) => Cow::Borrowed(s.as_str()),
            Value::Bytes(b) => String::from_utf8_lossy(b),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Byte view for string-like values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&UrlParts> for Value {
    fn from(u: &UrlParts) -> Self {
        let mut m = BTreeMap::new();
        m.insert("scheme".into(), Value::from(u.scheme.as_str()));
        m.insert("domain".into(), Value::from(u.domain.as_str()));
        m.insert("host".into(), Value::from(u.host.as_str()));
        m.insert("port".into(), Value::from(u.port.as_str()));
        m.insert("path".into(), Value::from(u.path.as_str()));
        m.insert("query".into(), Value::from(u.query.as_str()));
        m.insert("fragment".into(), Value::from(u.fragment.as_str()));
        Value::Map(m)
    }
}

impl From<&Headers> for Value {
    fn from(h: &Headers) -> Self {
        let mut m: BTreeMap<String, Value> = BTreeMap::new();
        for (k, v) in h.iter() {
            let key = k.to_ascii_lowercase();
            match m.get_mut(&key) {
                Some(Value::Str(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(v);
                }
                _ => {
                    m.insert(key, Value::from(v));
                }
            }
        }
        Value::Map(m)
    }
}

impl From<&Request> for Value {
    fn from(r: &Request) -> Self {
        let mut m = BTreeMap::new();
        m.insert("method".into(), Value::from(r.method.as_str()));
        m.insert("url".into(), Value::from(&r.url));
        m.insert("headers".into(), Value::from(&r.headers));
        m.insert("body".into(), Value::Bytes(r.body.clone()));
        Value::Map(m)
    }
}

impl From<&Response> for Value {
    fn from(r: &Response) -> Self {
        let mut m = BTreeMap::new();
        m.insert("status".into(), Value::Int(i64::from(r.status)));
        m.insert("url".into(), Value::from(&r.url));
        m.insert("headers".into(), Value::from(&r.headers));
        m.insert("content_type".into(), Value::from(r.content_type.as_str()));
        m.insert("body".into(), Value::Bytes(r.body.clone()));
        Value::Map(m)
    }
}

/// Variable bindings for one (target, rule) execution.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Bind `name`, replacing any earlier binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn set_request(&mut self, req: &Request) {
        self.set("request", Value::from(req));
    }

    pub fn set_response(&mut self, resp: &Response) {
        self.set("response", Value::from(resp));
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Anything able to compile and evaluate rule expressions.
///
/// Implementations must be deterministic and side-effect free for a given
/// environment; the engine calls them from many tasks at once.
pub trait Evaluator: Send + Sync {
    /// Validate `expr` without running it.
    fn check(&self, expr: &str) -> Result<(), EvalError>;

    /// Evaluate `expr` to a value.
    fn eval(&self, expr: &str, env: &Environment) -> Result<Value, EvalError>;

    /// Evaluate a condition. Non-bool results are errors.
    fn evaluate(&self, expr: &str, env: &Environment) -> Result<bool, EvalError> {
        match self.eval(expr, env)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBool(other.type_name().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urlcodec::decompose;

    #[test]
    fn response_snapshot_exposes_fields() {
        let mut resp = Response {
            status: 302,
            url: decompose("http://h/a?b=1").unwrap(),
            content_type: "text/html".into(),
            body: b"moved".to_vec(),
            ..Default::default()
        };
        resp.headers.append("Location", "/login");
        resp.headers.append("Set-Cookie", "a=1");
        resp.headers.append("set-cookie", "b=2");

        let Value::Map(m) = Value::from(&resp) else {
            panic!("expected map");
        };
        assert_eq!(m["status"], Value::Int(302));
        assert_eq!(m["body"], Value::Bytes(b"moved".to_vec()));
        let Value::Map(h) = &m["headers"] else {
            panic!("expected header map");
        };
        assert_eq!(h["location"], Value::from("/login"));
        assert_eq!(h["set-cookie"], Value::from("a=1, b=2"));
    }

    #[test]
    fn as_text_renders_scalars() {
        assert_eq!(Value::Int(7).as_text(), "7");
        assert_eq!(Value::Null.as_text(), "");
        assert_eq!(Value::Bytes(b"ab".to_vec()).as_text(), "ab");
        assert_eq!(Value::from("x").as_text(), "x");
    }

    #[test]
    fn later_bindings_overwrite() {
        let mut env = Environment::new();
        env.set("token", Value::from("a"));
        env.set("token", Value::from("b"));
        assert_eq!(env.get("token"), Some(&Value::from("b")));
        assert_eq!(env.len(), 1);
    }
}
