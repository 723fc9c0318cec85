// Rule execution engine for pocscan
// Drives one rule's steps, in order, against one target

use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::Transport;
use crate::expr::{Environment, Evaluator};
use crate::models::Request;
use crate::poc::{Plugin, Step};
use crate::pool::MessagePool;
use crate::substitution::{render, render_path};
use crate::urlcodec::recompose;
use crate::verdict::{ExecutionResult, Outcome};

/// Everything a rule execution needs, built once at startup and shared by
/// reference with every task.
pub struct ScanContext<T: Transport> {
    pub transport: T,
    pub evaluator: Arc<dyn Evaluator>,
    pub pool: MessagePool,
}

impl<T: Transport> ScanContext<T> {
    pub fn new(transport: T, evaluator: Arc<dyn Evaluator>, pool: MessagePool) -> Self {
        Self {
            transport,
            evaluator,
            pool,
        }
    }
}

/// Join a template path onto the target path. A leading `^` means "use as is".
pub fn join_path(base: &str, path: &str) -> String {
    if let Some(absolute) = path.strip_prefix('^') {
        return if absolute.starts_with('/') {
            absolute.to_string()
        } else {
            format!("/{}", absolute)
        };
    }
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Build a step's request from the shared target. The target is only read.
pub fn build_request(req: &mut Request, target: &Request, step: &Step, env: &Environment) {
    req.copy_from(target);
    req.method = step.method();

    let rendered = render_path(&step.request.path, env);
    let (path, query) = match rendered.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rendered.as_str(), None),
    };
    req.url.path = join_path(&target.url.path, path);
    if let Some(q) = query {
        req.url.query = q.to_string();
    }
    req.url.fragment.clear();

    for (name, value) in &step.request.headers {
        req.headers.insert(name.as_str(), render(value, env));
    }
    req.body.clear();
    req.body
        .extend_from_slice(render(&step.request.body, env).as_bytes());
    req.touch();
}

/// Run every step of `plugin` against `target` and decide the outcome.
pub async fn run_poc<T: Transport>(ctx: &ScanContext<T>, target: &Request, plugin: &Plugin) -> ExecutionResult {
    let target_url = recompose(&target.url);
    let mut result = ExecutionResult::new(&plugin.vul_id, &target_url, Outcome::NotMatched);
    let mut env = Environment::new();
    let steps = &plugin.poc.sets;

    for (i, step) in steps.iter().enumerate() {
        let mut req = ctx.pool.requests.acquire();
        build_request(&mut req, target, step, &env);
        env.set_request(&req);
        result.steps_run = i + 1;

        let mut resp = match ctx.transport.execute(req, step.request.follow_redirects).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(vul_id = %plugin.vul_id, target = %target_url, step = i, error = %e, "probe failed");
                result.outcome = Outcome::Error;
                result.detail = Some(format!("step {}: {}", i, e));
                return result;
            }
        };
        env.set_response(&resp);

        for (name, expr) in &step.extract {
            match ctx.evaluator.eval(expr, &env) {
                Ok(value) => env.set(name.as_str(), value),
                Err(e) => result
                    .diagnostics
                    .push(format!("step {} extract {}: {}", i, name, e)),
            }
        }

        let passed = match ctx.evaluator.evaluate(&step.expression, &env) {
            Ok(b) => b,
            Err(e) => {
                debug!(vul_id = %plugin.vul_id, step = i, error = %e, "condition failed to evaluate");
                result.diagnostics.push(format!("step {} condition: {}", i, e));
                false
            }
        };
        debug!(vul_id = %plugin.vul_id, step = i, status = resp.status, passed, "step evaluated");

        let decided = if passed && step.terminal {
            Some(Outcome::Matched)
        } else if !passed && step.short_circuit {
            Some(Outcome::NotMatched)
        } else if i + 1 == steps.len() {
            Some(Outcome::NotMatched)
        } else {
            None
        };
        if let Some(outcome) = decided {
            result.outcome = outcome;
            result.raw_request = Some(std::mem::take(&mut resp.raw_request));
            result.raw_response = Some(std::mem::take(&mut resp.raw_response));
            return result;
        }
    }
    result
}
