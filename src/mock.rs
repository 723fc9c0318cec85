// In-process transport for unit tests
// Answers from a route table, records what was asked and how many probes
// were in flight at once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::client::Transport;
use crate::errors::TransportError;
use crate::models::{Request, Response};
use crate::pool::{MessagePool, Pooled};

struct Route {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

pub(crate) struct ScriptedTransport {
    pool: MessagePool,
    routes: HashMap<String, Route>,
    failing: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            pool: MessagePool::new(64),
            routes: HashMap::new(),
            failing: HashSet::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Unrouted request targets get an empty 404.
    pub(crate) fn route(mut self, target: &str, status: u16, body: &str) -> Self {
        self.routes.insert(
            target.to_string(),
            Route {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            },
        );
        self
    }

    pub(crate) fn route_with_header(mut self, target: &str, status: u16, body: &str, name: &str, value: &str) -> Self {
        self = self.route(target, status, body);
        if let Some(r) = self.routes.get_mut(target) {
            r.headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub(crate) fn fail(mut self, target: &str) -> Self {
        self.failing.insert(target.to_string());
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn pool(&self) -> &MessagePool {
        &self.pool
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn execute(&self, req: Pooled<Request>, _follow_redirects: bool) -> Result<Pooled<Response>, TransportError> {
        let target = req.url.request_target();
        self.calls.lock().unwrap().push(target.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&target) {
            return Err(TransportError::Invalid(format!("scripted failure for {}", target)));
        }

        let mut resp = self.pool.responses.acquire();
        resp.url = req.url.clone();
        resp.status = 404;
        if let Some(route) = self.routes.get(&target) {
            resp.status = route.status;
            for (name, value) in &route.headers {
                resp.headers.append(name.as_str(), value.as_str());
            }
            resp.body.extend_from_slice(&route.body);
        }
        resp.raw_request = format!("{} {} HTTP/1.1\r\n", req.method, target);
        resp.raw_response = format!("HTTP/1.1 {}\r\n", resp.status);
        Ok(resp)
    }
}
