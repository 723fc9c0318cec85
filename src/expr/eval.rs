// CelLite interpreter
// Compiled trees and literal regexes are cached by source text; evaluation itself is pure.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use regex::bytes::Regex as BytesRegex;

use crate::errors::EvalError;

use super::parser::{parse, BinOp, Expr, UnOp};
use super::{Environment, Evaluator, Value};

/// Built-in evaluator.
#[derive(Default)]
pub struct CelLite {
    programs: Mutex<HashMap<String, Arc<Expr>>>,
    regexes: Mutex<HashMap<String, BytesRegex>>,
}

impl CelLite {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, src: &str) -> Result<Arc<Expr>, EvalError> {
        if let Ok(cache) = self.programs.lock() {
            if let Some(hit) = cache.get(src) {
                return Ok(Arc::clone(hit));
            }
        }
        let expr = Arc::new(parse(src)?);
        if let Ok(mut cache) = self.programs.lock() {
            cache.insert(src.to_string(), Arc::clone(&expr));
        }
        Ok(expr)
    }

    /// Only literal patterns are cached. Patterns built from response data
    /// are compiled per call so the cache cannot grow with scan traffic.
    fn regex(&self, pattern: &str, literal: bool) -> Result<BytesRegex, EvalError> {
        if !literal {
            return BytesRegex::new(pattern).map_err(|e| EvalError::Regex(e.to_string()));
        }
        if let Ok(cache) = self.regexes.lock() {
            if let Some(re) = cache.get(pattern) {
                return Ok(re.clone());
            }
        }
        let re = BytesRegex::new(pattern).map_err(|e| EvalError::Regex(e.to_string()))?;
        if let Ok(mut cache) = self.regexes.lock() {
            cache.insert(pattern.to_string(), re.clone());
        }
        Ok(re)
    }

    fn run(&self, expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
        match expr {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Ident(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Unknown(name.clone())),
            Expr::Member(base, field) => match self.run(base, env)? {
                Value::Map(m) => Ok(lookup(&m, field)),
                other => Err(EvalError::Type(format!("no field {} on {}", field, other.type_name()))),
            },
            Expr::Index(base, idx) => {
                let base = self.run(base, env)?;
                let idx = self.run(idx, env)?;
                index(base, idx)
            }
            Expr::Unary(op, inner) => match (op, self.run(inner, env)?) {
                (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnOp::Neg, Value::Int(i)) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Other("integer overflow".into())),
                (op, v) => Err(EvalError::Type(format!("{:?} on {}", op, v.type_name()))),
            },
            Expr::Binary(BinOp::And, l, r) => {
                if !self.truth(l, env)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.truth(r, env)?))
            }
            Expr::Binary(BinOp::Or, l, r) => {
                if self.truth(l, env)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.truth(r, env)?))
            }
            Expr::Binary(op, l, r) => {
                let l = self.run(l, env)?;
                let r = self.run(r, env)?;
                binary(*op, l, r)
            }
            Expr::Call { recv: None, name, args } => {
                let args = self.run_args(args, env)?;
                self.function(name, args)
            }
            Expr::Call {
                recv: Some(recv),
                name,
                args,
            } => {
                let literal = matches!(**recv, Expr::Lit(_));
                let recv = self.run(recv, env)?;
                let args = self.run_args(args, env)?;
                self.method(recv, literal, name, args)
            }
        }
    }

    fn truth(&self, expr: &Expr, env: &Environment) -> Result<bool, EvalError> {
        match self.run(expr, env)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBool(other.type_name().to_string())),
        }
    }

    fn run_args(&self, args: &[Expr], env: &Environment) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|a| self.run(a, env)).collect()
    }

    fn function(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let [arg] = one(name, args)?;
        match name {
            "string" => Ok(Value::Str(arg.as_text().into_owned())),
            "bytes" => Ok(Value::Bytes(match arg {
                Value::Bytes(b) => b,
                other => other.as_text().into_owned().into_bytes(),
            })),
            "int" => match arg {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                other => {
                    let text = other.as_text().trim().to_string();
                    text.parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| EvalError::Type(format!("cannot convert {} to int", other)))
                }
            },
            "len" => {
                let n = match &arg {
                    Value::Str(s) => s.len(),
                    Value::Bytes(b) => b.len(),
                    Value::List(l) => l.len(),
                    Value::Map(m) => m.len(),
                    other => return Err(EvalError::Type(format!("len of {}", other.type_name()))),
                };
                Ok(Value::Int(n as i64))
            }
            "base64" => {
                let raw = string_like(&arg, name)?;
                Ok(Value::Str(general_purpose::STANDARD.encode(raw)))
            }
            "base64Decode" => {
                let raw = string_like(&arg, name)?;
                general_purpose::STANDARD
                    .decode(raw)
                    .map(Value::Bytes)
                    .map_err(|e| EvalError::Other(format!("base64Decode: {}", e)))
            }
            "urlencode" => {
                let raw = string_like(&arg, name)?;
                Ok(Value::Str(url::form_urlencoded::byte_serialize(raw).collect()))
            }
            _ => Err(EvalError::Unknown(format!("function {}", name))),
        }
    }

    fn method(&self, recv: Value, literal: bool, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let [arg] = one(name, args)?;
        match name {
            "contains" | "bcontains" => {
                let hay = string_like(&recv, name)?;
                let needle = string_like(&arg, name)?;
                Ok(Value::Bool(find(hay, needle)))
            }
            "icontains" => {
                let hay = recv.as_text().to_lowercase();
                let needle = arg.as_text().to_lowercase();
                Ok(Value::Bool(hay.contains(&needle)))
            }
            "startsWith" => Ok(Value::Bool(
                string_like(&recv, name)?.starts_with(string_like(&arg, name)?),
            )),
            "endsWith" => Ok(Value::Bool(
                string_like(&recv, name)?.ends_with(string_like(&arg, name)?),
            )),
            // the receiver is the pattern: "root:.*:0:0".bmatches(response.body)
            "matches" | "bmatches" => {
                let re = self.regex(&recv.as_text(), literal)?;
                Ok(Value::Bool(re.is_match(string_like(&arg, name)?)))
            }
            "submatch" | "bsubmatch" => {
                let re = self.regex(&recv.as_text(), literal)?;
                let hay = string_like(&arg, name)?;
                let mut groups = BTreeMap::new();
                if let Some(caps) = re.captures(hay) {
                    for group in re.capture_names().flatten() {
                        if let Some(m) = caps.name(group) {
                            groups.insert(
                                group.to_string(),
                                Value::Str(String::from_utf8_lossy(m.as_bytes()).into_owned()),
                            );
                        }
                    }
                }
                Ok(Value::Map(groups))
            }
            _ => Err(EvalError::Unknown(format!("method {}", name))),
        }
    }
}

impl Evaluator for CelLite {
    fn check(&self, expr: &str) -> Result<(), EvalError> {
        self.compile(expr).map(|_| ())
    }

    fn eval(&self, expr: &str, env: &Environment) -> Result<Value, EvalError> {
        let program = self.compile(expr)?;
        self.run(&program, env)
    }
}

fn one(name: &str, args: Vec<Value>) -> Result<[Value; 1], EvalError> {
    let n = args.len();
    <[Value; 1]>::try_from(args)
        .map_err(|_| EvalError::Type(format!("{} takes 1 argument, got {}", name, n)))
}

fn string_like<'v>(v: &'v Value, ctx: &str) -> Result<&'v [u8], EvalError> {
    v.as_bytes()
        .ok_or_else(|| EvalError::Type(format!("{} expects string or bytes, got {}", ctx, v.type_name())))
}

fn find(hay: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || hay.windows(needle.len()).any(|w| w == needle)
}

/// Exact key first, then case-insensitive (header names).
fn lookup(m: &BTreeMap<String, Value>, key: &str) -> Value {
    m.get(key)
        .or_else(|| {
            m.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn index(base: Value, idx: Value) -> Result<Value, EvalError> {
    match (base, idx) {
        (Value::Map(m), Value::Str(k)) => Ok(lookup(&m, &k)),
        (Value::List(l), Value::Int(i)) => usize::try_from(i)
            .ok()
            .and_then(|i| l.get(i).cloned())
            .ok_or_else(|| EvalError::Other(format!("index {} out of range", i))),
        (b, i) => Err(EvalError::Type(format!(
            "cannot index {} with {}",
            b.type_name(),
            i.type_name()
        ))),
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use Value::*;
    let overflow = || EvalError::Other("integer overflow".into());
    match (op, l, r) {
        (BinOp::Eq, l, r) => Ok(Bool(loose_eq(&l, &r))),
        (BinOp::Ne, l, r) => Ok(Bool(!loose_eq(&l, &r))),
        (BinOp::Lt, Int(a), Int(b)) => Ok(Bool(a < b)),
        (BinOp::Le, Int(a), Int(b)) => Ok(Bool(a <= b)),
        (BinOp::Gt, Int(a), Int(b)) => Ok(Bool(a > b)),
        (BinOp::Ge, Int(a), Int(b)) => Ok(Bool(a >= b)),
        (BinOp::Lt, Str(a), Str(b)) => Ok(Bool(a < b)),
        (BinOp::Le, Str(a), Str(b)) => Ok(Bool(a <= b)),
        (BinOp::Gt, Str(a), Str(b)) => Ok(Bool(a > b)),
        (BinOp::Ge, Str(a), Str(b)) => Ok(Bool(a >= b)),
        (BinOp::In, Str(k), Map(m)) => Ok(Bool(m.keys().any(|key| key.eq_ignore_ascii_case(&k)))),
        (BinOp::In, v, List(l)) => Ok(Bool(l.iter().any(|x| loose_eq(x, &v)))),
        (BinOp::In, Str(needle), Str(hay)) => Ok(Bool(hay.contains(&needle))),
        (BinOp::Add, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(overflow),
        (BinOp::Add, Str(a), Str(b)) => Ok(Str(a + &b)),
        (BinOp::Add, Bytes(mut a), Bytes(b)) => {
            a.extend_from_slice(&b);
            Ok(Bytes(a))
        }
        (BinOp::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(overflow),
        (BinOp::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(overflow),
        (BinOp::Div | BinOp::Rem, Int(_), Int(0)) => Err(EvalError::Other("division by zero".into())),
        (BinOp::Div, Int(a), Int(b)) => a.checked_div(b).map(Int).ok_or_else(overflow),
        (BinOp::Rem, Int(a), Int(b)) => a.checked_rem(b).map(Int).ok_or_else(overflow),
        (op, l, r) => Err(EvalError::Type(format!(
            "{:?} between {} and {}",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

/// Strings and bytes compare by content.
fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Str(_) | Value::Bytes(_), Value::Str(_) | Value::Bytes(_)) => l.as_bytes() == r.as_bytes(),
        _ => l == r,
    }
}
