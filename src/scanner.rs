// Bounded-concurrency scan orchestrator
// One task per rule, at most `workers` in flight, results in rule order

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::Transport;
use crate::engine::{run_poc, ScanContext};
use crate::errors::ScanError;
use crate::models::Request;
use crate::poc::Plugin;
use crate::urlcodec::recompose;
use crate::verdict::{ExecutionResult, Outcome};

pub struct Scanner<T: Transport> {
    ctx: Arc<ScanContext<T>>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl<T: Transport> Scanner<T> {
    pub fn new(ctx: Arc<ScanContext<T>>, workers: usize) -> Result<Self, ScanError> {
        if workers == 0 {
            return Err(ScanError::NoWorkers);
        }
        Ok(Self {
            ctx,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn context(&self) -> &ScanContext<T> {
        &self.ctx
    }

    /// Run every plugin against `target` and wait for all of them.
    ///
    /// Submission blocks while `workers` executions are in flight, so the
    /// number of spawned-but-unfinished tasks never exceeds the budget.
    pub async fn run(&self, target: Arc<Request>, plugins: &[Plugin]) -> Vec<ExecutionResult> {
        let target_url = recompose(&target.url);
        info!(target = %target_url, rules = plugins.len(), workers = self.workers, "scan started");

        let mut handles: Vec<Option<JoinHandle<ExecutionResult>>> = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            // the semaphore is never closed
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                handles.push(None);
                continue;
            };
            let ctx = Arc::clone(&self.ctx);
            let target = Arc::clone(&target);
            let plugin = plugin.clone();
            handles.push(Some(tokio::spawn(async move {
                let _permit = permit;
                run_poc(&ctx, &target, &plugin).await
            })));
        }

        let mut results = Vec::with_capacity(plugins.len());
        for (handle, plugin) in handles.into_iter().zip(plugins) {
            let joined = match handle {
                Some(handle) => handle.await,
                None => {
                    results.push(ExecutionResult::error(&plugin.vul_id, &target_url, "no worker available"));
                    continue;
                }
            };
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    let detail = if e.is_panic() {
                        "rule execution panicked"
                    } else {
                        "rule execution cancelled"
                    };
                    error!(vul_id = %plugin.vul_id, target = %target_url, "{}", detail);
                    results.push(ExecutionResult::error(&plugin.vul_id, &target_url, detail));
                }
            }
        }

        let matched = results.iter().filter(|r| r.outcome == Outcome::Matched).count();
        let errors = results.iter().filter(|r| r.outcome == Outcome::Error).count();
        info!(target = %target_url, matched, errors, "scan finished");
        results
    }

    /// Scan targets one after another with the same worker budget.
    pub async fn run_many(&self, targets: &[Arc<Request>], plugins: &[Plugin]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(targets.len() * plugins.len());
        for target in targets {
            results.extend(self.run(Arc::clone(target), plugins).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::errors::EvalError;
    use crate::expr::{CelLite, Environment, Evaluator, Value};
    use crate::mock::ScriptedTransport;
    use crate::poc::decode;
    use crate::urlcodec::decompose;

    fn target(url: &str) -> Arc<Request> {
        let mut t = Request::default();
        t.url = decompose(url).unwrap();
        Arc::new(t)
    }

    fn rule(id: &str, path: &str, expression: &str) -> Plugin {
        let doc = format!(
            r#"{{"vul_id":"{}","affects":"server","sets":[
                {{"request":{{"path":"{}"}},"expression":"{}","terminal":true}}]}}"#,
            id, path, expression
        );
        Plugin::new(decode(doc.as_bytes()).unwrap())
    }

    fn scanner(transport: ScriptedTransport, evaluator: Arc<dyn Evaluator>, workers: usize) -> Scanner<ScriptedTransport> {
        let pool = transport.pool().clone();
        Scanner::new(Arc::new(ScanContext::new(transport, evaluator, pool)), workers).unwrap()
    }

    /// Panics on the `boom` identifier, delegates everything else.
    struct Exploding(CelLite);

    impl Evaluator for Exploding {
        fn check(&self, expr: &str) -> Result<(), EvalError> {
            self.0.check(expr)
        }

        fn eval(&self, expr: &str, env: &Environment) -> Result<Value, EvalError> {
            if expr == "boom" {
                panic!("evaluator blew up");
            }
            self.0.eval(expr, env)
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let transport = ScriptedTransport::new();
        let pool = transport.pool().clone();
        let ctx = Arc::new(ScanContext::new(transport, Arc::new(CelLite::new()), pool));
        assert!(matches!(Scanner::new(ctx, 0), Err(ScanError::NoWorkers)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn caps_in_flight_executions_and_returns_every_result() {
        let transport = ScriptedTransport::new()
            .route("/hit", 200, "")
            .delay(Duration::from_millis(20));
        let s = scanner(transport, Arc::new(CelLite::new()), 3);

        let plugins: Vec<Plugin> = (0..20)
            .map(|i| {
                let path = if i % 5 == 0 { "/hit" } else { "/miss" };
                rule(&format!("rule-{:02}", i), path, "response.status == 200")
            })
            .collect();
        let results = s.run(target("http://h/"), &plugins).await;

        assert_eq!(results.len(), 20);
        for (r, p) in results.iter().zip(&plugins) {
            assert_eq!(r.vul_id, p.vul_id);
        }
        assert_eq!(results.iter().filter(|r| r.matched()).count(), 4);
        let peak = s.context().transport.peak();
        assert!(peak <= 3, "peak in-flight was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn panic_in_one_rule_becomes_error_result() {
        let s = scanner(
            ScriptedTransport::new().route("/", 200, ""),
            Arc::new(Exploding(CelLite::new())),
            2,
        );
        let plugins = vec![
            rule("ok-before", "/", "response.status == 200"),
            rule("explodes", "/", "boom"),
            rule("ok-after", "/", "response.status == 200"),
        ];
        let results = s.run(target("http://h/"), &plugins).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome, Outcome::Matched);
        assert_eq!(results[1].outcome, Outcome::Error);
        assert_eq!(results[1].detail.as_deref(), Some("rule execution panicked"));
        assert_eq!(results[2].outcome, Outcome::Matched);
    }

    #[tokio::test]
    async fn run_many_scans_each_target() {
        let s = scanner(ScriptedTransport::new(), Arc::new(CelLite::new()), 4);
        let plugins = vec![rule("a", "/a", "true"), rule("b", "/b", "false")];
        let targets = vec![target("http://one/"), target("http://two:8080/")];
        let results = s.run_many(&targets, &plugins).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].target, "http://one/");
        assert_eq!(results[3].target, "http://two:8080/");
        assert_eq!(results[3].vul_id, "b");
    }

    #[tokio::test]
    async fn empty_plugin_list_yields_nothing() {
        let s = scanner(ScriptedTransport::new(), Arc::new(CelLite::new()), 1);
        assert!(s.run(target("http://h/"), &[]).await.is_empty());
    }
}
