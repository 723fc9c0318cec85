// Canonical request/response model for pocscan
// Every probe is built, sent and evaluated through these types

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::pool::{Pool, RawText, Recycle};
use crate::urlcodec::UrlParts;

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
    TRACE,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::OPTIONS => "OPTIONS",
            Method::HEAD => "HEAD",
            Method::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "OPTIONS" => Ok(Method::OPTIONS),
            "HEAD" => Ok(Method::HEAD),
            "TRACE" => Ok(Method::TRACE),
            other => Err(format!("unsupported method {}", other)),
        }
    }
}

/// Ordered header list. Names compare case-insensitively; repeated names
/// carry multiple values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value of `name` with a single one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// Add a value, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// A probe request. The raw wire text is rendered on first use and cached
/// until the next mutation through the setters.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub url: UrlParts,
    pub headers: Headers,
    pub body: Vec<u8>,
    raw: Option<String>,
}

impl Request {
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name, value);
        self.raw = None;
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
        self.raw = None;
    }

    /// Drop the cached raw text after editing fields directly.
    pub fn touch(&mut self) {
        self.raw = None;
    }

    /// Overwrite this request with `other`, reusing allocations.
    pub fn copy_from(&mut self, other: &Request) {
        self.method = other.method;
        self.url.clone_from(&other.url);
        self.headers.clone_from(&other.headers);
        self.body.clear();
        self.body.extend_from_slice(&other.body);
        self.raw = None;
    }

    /// Raw wire text (request line, headers, blank line, body).
    pub fn raw(&mut self, scratch: &Pool<RawText>) -> &str {
        if self.raw.is_none() {
            let mut buf = scratch.acquire();
            write_request_head(&mut buf.head, self.method, &self.url, &self.headers);
            buf.body.push_str(&String::from_utf8_lossy(&self.body));
            self.raw = Some(buf.render());
        }
        self.raw.as_deref().unwrap_or_default()
    }
}

impl Recycle for Request {
    fn reset(&mut self) {
        self.method = Method::GET;
        self.url.clear();
        self.headers.clear();
        self.body.clear();
        self.raw = None;
    }
}

/// A normalized response plus the audit text of the exchange.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub url: UrlParts,
    pub headers: Headers,
    pub content_type: String,
    pub body: Vec<u8>,
    pub raw_request: String,
    pub raw_response: String,
}

impl Recycle for Response {
    fn reset(&mut self) {
        self.status = 0;
        self.url.clear();
        self.headers.clear();
        self.content_type.clear();
        self.body.clear();
        self.raw_request.clear();
        self.raw_response.clear();
    }
}

pub(crate) fn write_request_head(out: &mut String, method: Method, url: &UrlParts, headers: &Headers) {
    out.push_str(method.as_str());
    out.push(' ');
    out.push_str(&url.request_target());
    out.push_str(" HTTP/1.1\r\n");
    if !headers.contains("Host") && !url.host.is_empty() {
        out.push_str("Host: ");
        out.push_str(&url.host);
        out.push_str("\r\n");
    }
    write_headers(out, headers);
}

pub(crate) fn write_headers(out: &mut String, headers: &Headers) {
    for (k, v) in headers.iter() {
        out.push_str(k);
        out.push_str(": ");
        out.push_str(v);
        out.push_str("\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urlcodec::decompose;

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::POST);
        assert_eq!(" Head ".parse::<Method>().unwrap(), Method::HEAD);
        assert!("BREW".parse::<Method>().is_err());
        assert_eq!(Method::PATCH.to_string(), "PATCH");
    }

    #[test]
    fn headers_are_case_insensitive_and_multi_valued() {
        let mut h = Headers::new();
        h.append("Set-Cookie", "a=1");
        h.append("set-cookie", "b=2");
        assert_eq!(h.get("SET-COOKIE"), Some("a=1"));
        assert_eq!(h.get_all("Set-Cookie").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
        h.insert("SET-cookie", "c=3");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("set-cookie"), Some("c=3"));
    }

    #[test]
    fn raw_rendering_is_cached_until_mutation() {
        let scratch: Pool<RawText> = Pool::new(2);
        let mut req = Request {
            method: Method::POST,
            url: decompose("http://example.com:8080/login?x=1").unwrap(),
            ..Default::default()
        };
        req.set_header("Content-Type", "application/x-www-form-urlencoded");
        req.set_body(b"user=admin".to_vec());

        let raw = req.raw(&scratch).to_string();
        assert!(raw.starts_with("POST /login?x=1 HTTP/1.1\r\nHost: example.com:8080\r\n"));
        assert!(raw.ends_with("\r\n\r\nuser=admin"));
        assert_eq!(scratch.idle(), 1);

        req.set_body(b"user=root".to_vec());
        assert!(req.raw(&scratch).ends_with("user=root"));
    }

    #[test]
    fn copy_from_replaces_everything() {
        let mut target = Request::default();
        target.set_header("User-Agent", "ua");
        target.url = decompose("https://h/a").unwrap();
        let mut req = Request::default();
        req.set_header("X-Old", "1");
        req.set_body(b"old".to_vec());
        req.copy_from(&target);
        assert_eq!(req.headers.get("x-old"), None);
        assert_eq!(req.headers.get("user-agent"), Some("ua"));
        assert!(req.body.is_empty());
        assert_eq!(req.url.path, "/a");
    }
}
