// URL decomposition and deterministic re-serialization
// Used to build probe URLs and to record the URL a response was fetched for

use serde::Serialize;
use url::Url;

use crate::errors::ParseError;

/// Typed URL components. `host` is the authority host (IPv6 literals keep
/// their brackets) plus the explicit port, if any. `domain` is the bare name
/// or address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlParts {
    pub scheme: String,
    pub domain: String,
    pub host: String,
    pub port: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl UrlParts {
    pub fn clear(&mut self) {
        self.scheme.clear();
        self.domain.clear();
        self.host.clear();
        self.port.clear();
        self.path.clear();
        self.query.clear();
        self.fragment.clear();
    }

    /// Origin-form request target: path plus `?query`.
    pub fn request_target(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        if self.query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.query)
        }
    }
}

impl From<&Url> for UrlParts {
    fn from(u: &Url) -> Self {
        let authority = u.host_str().unwrap_or_default();
        let domain = authority
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(authority)
            .to_string();
        let port = u.port().map(|p| p.to_string()).unwrap_or_default();
        let host = if port.is_empty() {
            authority.to_string()
        } else {
            format!("{}:{}", authority, port)
        };
        UrlParts {
            scheme: u.scheme().to_string(),
            domain,
            host,
            port,
            path: u.path().to_string(),
            query: u.query().unwrap_or_default().to_string(),
            fragment: u.fragment().unwrap_or_default().to_string(),
        }
    }
}

/// Parse an absolute URL into its components.
pub fn decompose(raw: &str) -> Result<UrlParts, ParseError> {
    let u = Url::parse(raw).map_err(|source| ParseError {
        input: raw.to_string(),
        source,
    })?;
    Ok(UrlParts::from(&u))
}

/// Render components back into a URL string. Never fails.
pub fn recompose(u: &UrlParts) -> String {
    let mut buf = String::with_capacity(
        u.scheme.len() + u.host.len() + u.path.len() + u.query.len() + u.fragment.len() + 8,
    );
    if !u.scheme.is_empty() {
        buf.push_str(&u.scheme);
        buf.push(':');
    }
    if !u.scheme.is_empty() || !u.host.is_empty() {
        if !u.host.is_empty() || !u.path.is_empty() {
            buf.push_str("//");
        }
        buf.push_str(&u.host);
    }
    let path = u.path.as_str();
    if !path.is_empty() && !path.starts_with('/') && !u.host.is_empty() {
        buf.push('/');
    }
    if buf.is_empty() {
        // "a:b/c" would otherwise read back as scheme "a"
        if let Some(i) = path.find(':') {
            if !path[..i].contains('/') {
                buf.push_str("./");
            }
        }
    }
    buf.push_str(path);
    if !u.query.is_empty() {
        buf.push('?');
        buf.push_str(&u.query);
    }
    if !u.fragment.is_empty() {
        buf.push('#');
        buf.push_str(&u.fragment);
    }
    buf
}

/// Assume `http` for targets given without a scheme.
pub fn normalize_target(raw: &str) -> String {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    }
}
