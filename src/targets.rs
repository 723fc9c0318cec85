// Scan target construction
// Turns --url, --url-file and --url-raw input into base requests

use std::path::Path;

use crate::errors::TargetError;
use crate::models::{Method, Request};
use crate::urlcodec::{decompose, normalize_target};

/// A GET request for `url`, `http://` assumed when no scheme is given.
pub fn target_from_url(url: &str, user_agent: &str) -> Result<Request, TargetError> {
    let mut req = Request::default();
    req.url = decompose(&normalize_target(url))?;
    if !user_agent.is_empty() {
        req.set_header("User-Agent", user_agent);
    }
    Ok(req)
}

/// Non-empty, non-comment lines of a URL list.
pub fn url_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

/// One target per line of the file at `path`.
pub fn targets_from_file(path: &Path, user_agent: &str) -> Result<Vec<Request>, TargetError> {
    let text = std::fs::read_to_string(path).map_err(|source| TargetError::Read {
        path: path.display().to_string(),
        source,
    })?;
    url_lines(&text)
        .into_iter()
        .map(|line| target_from_url(line, user_agent))
        .collect()
}

/// Parse a raw HTTP/1.x request. A relative request target is resolved
/// against the Host header over plain http.
pub fn target_from_raw(raw: &[u8], user_agent: &str) -> Result<Request, TargetError> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = match text.find("\r\n\r\n") {
        Some(i) => (&text[..i], &text[i + 4..]),
        None => match text.find("\n\n") {
            Some(i) => (&text[..i], &text[i + 2..]),
            None => (text.as_ref(), ""),
        },
    };

    let mut lines = head.lines().map(|l| l.trim_end_matches('\r'));
    let request_line = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| TargetError::Raw("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(TargetError::Raw(format!("bad request line {:?}", request_line)));
    };
    let method: Method = method.parse().map_err(TargetError::Raw)?;

    let mut req = Request::default();
    req.method = method;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(TargetError::Raw(format!("bad header line {:?}", line)));
        };
        let name = name.trim();
        // the body of every probe is replaced, so is its length
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        req.headers.append(name, value.trim());
    }

    let lower = target.to_ascii_lowercase();
    let url = if lower.starts_with("http://") || lower.starts_with("https://") {
        target.to_string()
    } else {
        let host = req
            .headers
            .get("Host")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TargetError::Raw("relative request target without Host header".into()))?;
        format!("http://{}{}", host, target)
    };
    req.url = decompose(&url)?;
    req.body = body.as_bytes().to_vec();
    if !user_agent.is_empty() && !req.headers.contains("User-Agent") {
        req.headers.insert("User-Agent", user_agent);
    }
    req.touch();
    Ok(req)
}
