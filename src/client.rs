// HTTP execution layer for pocscan
// Uses reqwest and tokio; one shared client per redirect policy

use std::future::Future;
use std::time::Duration;

use reqwest::{redirect, Client, Proxy};
use tracing::debug;

use crate::errors::{ConfigError, TransportError};
use crate::models::{write_headers, Request, Response};
use crate::pool::{MessagePool, Pooled};
use crate::urlcodec::{recompose, UrlParts};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Process-wide transport settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: Duration::from_secs(10),
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
        }
    }
}

/// Sends one canonical request and returns the canonical response.
///
/// The request is consumed: its pooled storage goes back to the pool when the
/// call returns, whether it succeeded or not.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        req: Pooled<Request>,
        follow_redirects: bool,
    ) -> impl Future<Output = Result<Pooled<Response>, TransportError>> + Send;
}

/// reqwest-backed transport. TLS verification is off so self-signed hosts can
/// be probed.
pub struct HttpClient {
    follow: Client,
    direct: Client,
    config: ClientConfig,
    pool: MessagePool,
}

impl HttpClient {
    pub fn new(config: ClientConfig, pool: MessagePool) -> Result<Self, ConfigError> {
        let follow = build_client(&config, redirect::Policy::limited(config.max_redirects))?;
        let direct = build_client(&config, redirect::Policy::none())?;
        if let Some(proxy) = &config.proxy {
            debug!(proxy = %proxy, "http client uses upstream proxy");
        }
        Ok(Self {
            follow,
            direct,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn build_client(config: &ClientConfig, policy: redirect::Policy) -> Result<Client, ConfigError> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .danger_accept_invalid_certs(true)
        .pool_max_idle_per_host(10)
        .redirect(policy);
    builder = match &config.proxy {
        Some(url) => builder.proxy(Proxy::all(url).map_err(|_| ConfigError::Proxy(url.clone()))?),
        None => builder.no_proxy(),
    };
    builder.build().map_err(ConfigError::Client)
}

/// Fill in the headers every probe must carry.
pub fn prepare(req: &mut Request, user_agent: &str) {
    if !req.body.is_empty() {
        let len = req.body.len().to_string();
        req.set_header("Content-Length", &len);
        if req.headers.get("Content-Type").map_or(true, str::is_empty) {
            req.set_header("Content-Type", "application/x-www-form-urlencoded");
        }
    }
    if !user_agent.is_empty() && !req.headers.contains("User-Agent") {
        req.set_header("User-Agent", user_agent);
    }
}

impl Transport for HttpClient {
    async fn execute(
        &self,
        mut req: Pooled<Request>,
        follow_redirects: bool,
    ) -> Result<Pooled<Response>, TransportError> {
        prepare(&mut req, &self.config.user_agent);
        let url = recompose(&req.url);
        let method = reqwest::Method::from_bytes(req.method.as_str().as_bytes())
            .map_err(|e| TransportError::Invalid(e.to_string()))?;

        let client = if follow_redirects { &self.follow } else { &self.direct };
        let mut builder = client.request(method, url.as_str());
        for (name, value) in req.headers.iter() {
            // reqwest derives it from the body
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }
        let raw_request = req.raw(&self.pool.scratch).to_string();

        debug!(method = %req.method, url = %url, follow_redirects, "sending probe");
        let resp = builder.send().await?;

        let mut out = self.pool.responses.acquire();
        let status = resp.status();
        let version = resp.version();
        out.status = status.as_u16();
        out.url = UrlParts::from(resp.url());
        for (name, value) in resp.headers() {
            out.headers
                .append(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let content_type = out.headers.get("Content-Type").unwrap_or_default().to_string();
        out.content_type = content_type;

        let body = resp.bytes().await?;
        out.body.extend_from_slice(&body);

        let mut raw = self.pool.scratch.acquire();
        raw.head.push_str(&format!(
            "{:?} {} {}\r\n",
            version,
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ));
        write_headers(&mut raw.head, &out.headers);
        raw.body.push_str(&String::from_utf8_lossy(&out.body));
        out.raw_response = raw.render();
        out.raw_request = raw_request;

        debug!(url = %url, status = out.status, bytes = out.body.len(), "probe answered");
        Ok(out)
    }
}
