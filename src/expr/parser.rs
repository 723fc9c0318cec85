// Lexer and recursive-descent parser for CelLite expressions
//
// Precedence, loosest first:
//   ||  &&  (== != < <= > >= in)  (+ -)  (* / %)  (! unary -)  (. [] call)

use crate::errors::EvalError;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        recv: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Functions callable as `f(x)`.
pub const FUNCTIONS: &[&str] = &["string", "bytes", "int", "len", "base64", "base64Decode", "urlencode"];

/// Methods callable as `recv.m(x)`.
pub const METHODS: &[&str] = &[
    "contains",
    "icontains",
    "bcontains",
    "startsWith",
    "endsWith",
    "matches",
    "bmatches",
    "submatch",
    "bsubmatch",
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Ident(String),
    Op(&'static str),
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

const OPS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")", "[", "]", ".", ",",
];

fn syntax(pos: usize, msg: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        pos,
        msg: msg.into(),
    }
}

impl<'a> Lexer<'a> {
    fn tokens(src: &'a str) -> Result<Vec<(usize, Tok)>, EvalError> {
        let mut lx = Lexer {
            src: src.as_bytes(),
            pos: 0,
        };
        let mut out = Vec::new();
        while let Some(t) = lx.next_token()? {
            out.push(t);
        }
        Ok(out)
    }

    fn next_token(&mut self) -> Result<Option<(usize, Tok)>, EvalError> {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let start = self.pos;
        let Some(&c) = self.src.get(self.pos) else {
            return Ok(None);
        };

        if c == b'b' && matches!(self.src.get(self.pos + 1), Some(b'"') | Some(b'\'')) {
            self.pos += 1;
            let raw = self.quoted()?;
            return Ok(Some((start, Tok::Bytes(raw))));
        }
        if c == b'"' || c == b'\'' {
            let raw = self.quoted()?;
            let s = String::from_utf8(raw).map_err(|_| syntax(start, "string literal is not utf-8"))?;
            return Ok(Some((start, Tok::Str(s))));
        }
        if c.is_ascii_digit() {
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
            let n = text
                .parse::<i64>()
                .map_err(|_| syntax(start, format!("integer out of range: {}", text)))?;
            return Ok(Some((start, Tok::Int(n))));
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            while self.pos < self.src.len()
                && (self.src[self.pos].is_ascii_alphanumeric() || self.src[self.pos] == b'_')
            {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
            return Ok(Some((start, Tok::Ident(text.to_string()))));
        }
        for op in OPS {
            if self.src[self.pos..].starts_with(op.as_bytes()) {
                self.pos += op.len();
                return Ok(Some((start, Tok::Op(*op))));
            }
        }
        Err(syntax(start, format!("unexpected character {:?}", c as char)))
    }

    fn quoted(&mut self) -> Result<Vec<u8>, EvalError> {
        let start = self.pos;
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let Some(&c) = self.src.get(self.pos) else {
                return Err(syntax(start, "unterminated string"));
            };
            self.pos += 1;
            if c == quote {
                return Ok(out);
            }
            if c != b'\\' {
                out.push(c);
                continue;
            }
            let Some(&e) = self.src.get(self.pos) else {
                return Err(syntax(start, "unterminated string"));
            };
            self.pos += 1;
            match e {
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'0' => out.push(0),
                b'\\' | b'"' | b'\'' => out.push(e),
                b'x' => {
                    let hex = self
                        .src
                        .get(self.pos..self.pos + 2)
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| syntax(self.pos, "bad \\x escape"))?;
                    self.pos += 2;
                    out.push(hex);
                }
                // keep unknown escapes verbatim so regex classes like \d survive
                other => {
                    out.push(b'\\');
                    out.push(other);
                }
            }
        }
    }
}

/// Bracket, call and unary-operator nesting allowed in one expression.
pub const MAX_NESTING: usize = 64;
/// Operator and postfix links allowed along any path of the tree.
pub const MAX_LINKS: usize = 256;

/// Parse `src` into an expression tree. Trees deeper than the limits above
/// are rejected so that evaluating or dropping them stays within the stack.
pub fn parse(src: &str) -> Result<Expr, EvalError> {
    let tokens = Lexer::tokens(src)?;
    if tokens.is_empty() {
        return Err(syntax(0, "empty expression"));
    }
    let mut p = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
        links: 0,
    };
    let expr = p.or()?;
    if let Some((pos, tok)) = p.tokens.get(p.pos) {
        return Err(syntax(*pos, format!("unexpected token {:?}", tok)));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
    end: usize,
    depth: usize,
    links: usize,
}

impl Parser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some((_, Tok::Op(op))) => Some(*op),
            Some((_, Tok::Ident(id))) if id == "in" => Some("in"),
            _ => None,
        }
    }

    fn here(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn expect(&mut self, op: &'static str) -> Result<(), EvalError> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(self.here(), format!("expected {:?}", op)))
        }
    }

    fn nested<F>(&mut self, inner: F) -> Result<Expr, EvalError>
    where
        F: FnOnce(&mut Parser) -> Result<Expr, EvalError>,
    {
        if self.depth >= MAX_NESTING {
            return Err(syntax(self.here(), "expression nested too deeply"));
        }
        self.depth += 1;
        let out = inner(self);
        self.depth -= 1;
        out
    }

    /// Count one more level of a left-deep chain (`a && b && ...`, `a.b.c`).
    fn link(&mut self) -> Result<(), EvalError> {
        self.links += 1;
        if self.links > MAX_LINKS {
            return Err(syntax(self.here(), "expression too long"));
        }
        Ok(())
    }

    fn binary<F>(&mut self, ops: &[(&str, BinOp)], next: F) -> Result<Expr, EvalError>
    where
        F: FnMut(&mut Parser) -> Result<Expr, EvalError>,
    {
        let base = self.links;
        let out = self.binary_chain(ops, next);
        self.links = base;
        out
    }

    fn binary_chain<F>(&mut self, ops: &[(&str, BinOp)], mut next: F) -> Result<Expr, EvalError>
    where
        F: FnMut(&mut Parser) -> Result<Expr, EvalError>,
    {
        let mut lhs = next(self)?;
        'outer: loop {
            let Some(cur) = self.peek_op() else { break };
            for (sym, op) in ops {
                if *sym == cur {
                    self.pos += 1;
                    self.link()?;
                    let rhs = next(self)?;
                    lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        self.binary(&[("||", BinOp::Or)], Parser::and)
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        self.binary(&[("&&", BinOp::And)], Parser::cmp)
    }

    fn cmp(&mut self) -> Result<Expr, EvalError> {
        self.binary(
            &[
                ("==", BinOp::Eq),
                ("!=", BinOp::Ne),
                ("<=", BinOp::Le),
                (">=", BinOp::Ge),
                ("<", BinOp::Lt),
                (">", BinOp::Gt),
                ("in", BinOp::In),
            ],
            Parser::add,
        )
    }

    fn add(&mut self) -> Result<Expr, EvalError> {
        self.binary(&[("+", BinOp::Add), ("-", BinOp::Sub)], Parser::mul)
    }

    fn mul(&mut self) -> Result<Expr, EvalError> {
        self.binary(
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)],
            Parser::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek_op() {
            Some("!") => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Not, Box::new(self.nested(Parser::unary)?)))
            }
            Some("-") => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.nested(Parser::unary)?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let base = self.links;
        let out = self.postfix_chain();
        self.links = base;
        out
    }

    fn postfix_chain(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_op() {
                Some(".") => {
                    self.pos += 1;
                    self.link()?;
                    let at = self.here();
                    let name = match self.tokens.get(self.pos) {
                        Some((_, Tok::Ident(name))) => name.clone(),
                        _ => return Err(syntax(at, "expected field or method name")),
                    };
                    self.pos += 1;
                    if self.peek_op() == Some("(") {
                        if !METHODS.contains(&name.as_str()) {
                            return Err(EvalError::Unknown(format!("method {}", name)));
                        }
                        let args = self.args()?;
                        expr = Expr::Call {
                            recv: Some(Box::new(expr)),
                            name,
                            args,
                        };
                    } else {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                }
                Some("[") => {
                    self.pos += 1;
                    self.link()?;
                    let idx = self.nested(Parser::or)?;
                    self.expect("]")?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, EvalError> {
        self.expect("(")?;
        let mut args = Vec::new();
        if self.peek_op() == Some(")") {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.nested(Parser::or)?);
            match self.peek_op() {
                Some(",") => self.pos += 1,
                Some(")") => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(syntax(self.here(), "expected ',' or ')'")),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let at = self.here();
        let Some((_, tok)) = self.tokens.get(self.pos).cloned() else {
            return Err(syntax(at, "unexpected end of expression"));
        };
        self.pos += 1;
        match tok {
            Tok::Int(n) => Ok(Expr::Lit(Value::Int(n))),
            Tok::Str(s) => Ok(Expr::Lit(Value::Str(s))),
            Tok::Bytes(b) => Ok(Expr::Lit(Value::Bytes(b))),
            Tok::Ident(id) => match id.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                "null" => Ok(Expr::Lit(Value::Null)),
                "in" => Err(syntax(at, "unexpected 'in'")),
                _ if self.peek_op() == Some("(") => {
                    if !FUNCTIONS.contains(&id.as_str()) {
                        return Err(EvalError::Unknown(format!("function {}", id)));
                    }
                    let args = self.args()?;
                    Ok(Expr::Call {
                        recv: None,
                        name: id,
                        args,
                    })
                }
                _ => Ok(Expr::Ident(id)),
            },
            Tok::Op("(") => {
                let inner = self.nested(Parser::or)?;
                self.expect(")")?;
                Ok(inner)
            }
            Tok::Op(op) => Err(syntax(at, format!("unexpected {:?}", op))),
        }
    }
}
