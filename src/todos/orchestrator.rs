use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::Instrument;

use crate::telemetry::{self};
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::fetch::{Fetch, Phase as FetchPhase};

use super::client::TodoSource;
use super::config::FetchConfig;
use super::types::{FetchRequest, FetchResult, RunReport, RunSummary, Todo};

/// Receives run events as they happen. All methods default to no-ops.
pub trait RunObserver: Send + Sync {
    fn on_start(&self, _count: usize, _retry_budget: u32) {}
    /// `attempt` is 1-based: the first retry after the initial failure is 1.
    fn on_retry(&self, _id: u64, _attempt: u32) {}
    fn on_permanent_failure(&self, _id: u64, _retry_budget: u32) {}
    fn on_resolved(&self, _result: &FetchResult, _summary: &RunSummary) {}
    fn on_finish(&self, _summary: &RunSummary) {}
}

pub struct NoopObserver;
impl RunObserver for NoopObserver {}

/// IDs requested for a run of `count` items: 2, 4, ..., 2*count, produced lazily.
/// Stops early rather than wrap if `2*count` would overflow; config rejects such counts.
pub fn ids(count: usize) -> impl Iterator<Item = u64> {
    (1..=count as u64).map_while(|i| i.checked_mul(2))
}

pub struct FetchOrchestrator<S> {
    config: FetchConfig,
    source: S,
    log: LogCtx<Fetch>,
}

impl<S: TodoSource> FetchOrchestrator<S> {
    pub fn new(config: FetchConfig, source: S) -> Self {
        Self { config, source, log: telemetry::fetch() }
    }

    pub fn config(&self) -> &FetchConfig { &self.config }

    /// Try `id` once, then up to `retry_budget` more times. Never errors:
    /// exhaustion turns into an absent result.
    pub async fn fetch_with_retry(&self, id: u64, observer: &dyn RunObserver) -> FetchResult {
        let budget = self.config.retry_budget;
        let mut req = FetchRequest::new(id, budget);
        loop {
            let span = self.log.span_kv(&FetchPhase::Request, [("id", id.to_string())]);
            match self.source.fetch_todo(req.id).instrument(span).await {
                Ok(todo) => return FetchResult::fetched(id, todo),
                Err(err) if req.retries_remaining > 0 => {
                    let attempt = budget - req.retries_remaining + 1;
                    self.log.span(&FetchPhase::Retry).in_scope(|| self.log.retry(id, attempt, &err));
                    observer.on_retry(id, attempt);
                    req.retries_remaining -= 1;
                }
                Err(err) => {
                    self.log.permanent_failure(id, budget, &err);
                    observer.on_permanent_failure(id, budget);
                    return FetchResult::failed(id);
                }
            }
        }
    }

    /// Start every chain, fold outcomes as they settle, finalize once all have resolved.
    pub async fn run(&self, observer: &dyn RunObserver) -> RunReport {
        let limit = self.config.concurrency.unwrap_or(self.config.count).max(1);
        self.log.span(&FetchPhase::Plan).in_scope(|| {
            self.log.info(format!(
                "📝 Fetch plan — num={} retries={} in_flight={}",
                self.config.count, self.config.retry_budget, limit
            ))
        });

        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut todos: Vec<Todo> = Vec::new();
        observer.on_start(self.config.count, self.config.retry_budget);

        let mut results = stream::iter(ids(self.config.count))
            .map(|id| self.fetch_with_retry(id, observer))
            .buffer_unordered(limit);

        while let Some(result) = results.next().await {
            summary.record(&result);
            observer.on_resolved(&result, &summary);
            if let Some(todo) = result.todo {
                todos.push(todo);
            }
        }

        let _s = self.log.span(&FetchPhase::Summary).entered();
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        summary.failed_ids.sort_unstable();
        todos.sort_by_key(|t| t.id);
        self.log.totals(summary.attempted, summary.succeeded, summary.failed, summary.elapsed_secs);
        observer.on_finish(&summary);

        RunReport { summary, todos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use crate::todos::client::FetchError;

    /// Deterministic source: some ids always fail, some fail a fixed number of times first.
    #[derive(Default)]
    struct ScriptedSource {
        always_fail: HashSet<u64>,
        fail_first: HashMap<u64, u32>,
        calls: Mutex<HashMap<u64, u32>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn failing(ids: &[u64]) -> Self {
            Self { always_fail: ids.iter().copied().collect(), ..Self::default() }
        }

        fn calls_for(&self, id: u64) -> u32 {
            self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl TodoSource for ScriptedSource {
        async fn fetch_todo(&self, id: u64) -> Result<Todo, FetchError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(id).or_insert(0);
                *n += 1;
                *n
            };
            if let Some(delay) = self.delay {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            let fails = self.always_fail.contains(&id)
                || self.fail_first.get(&id).is_some_and(|k| n <= *k);
            if fails {
                return Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(Todo { id, title: format!("Todo {}", id / 2), completed: (id / 2) % 2 == 1 })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Start(usize, u32),
        Retry(u64, u32),
        Failed(u64, u32),
        Resolved(u64, bool),
        Finish(usize),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> { self.events.lock().unwrap().clone() }

        fn retries_for(&self, id: u64) -> Vec<u32> {
            self.events()
                .into_iter()
                .filter_map(|e| match e { Event::Retry(i, a) if i == id => Some(a), _ => None })
                .collect()
        }
    }

    impl RunObserver for Recorder {
        fn on_start(&self, count: usize, retry_budget: u32) { self.events.lock().unwrap().push(Event::Start(count, retry_budget)); }
        fn on_retry(&self, id: u64, attempt: u32) { self.events.lock().unwrap().push(Event::Retry(id, attempt)); }
        fn on_permanent_failure(&self, id: u64, retry_budget: u32) { self.events.lock().unwrap().push(Event::Failed(id, retry_budget)); }
        fn on_resolved(&self, result: &FetchResult, summary: &RunSummary) {
            assert_eq!(summary.succeeded + summary.failed, summary.attempted);
            assert_eq!(summary.completed + summary.incomplete, summary.succeeded);
            self.events.lock().unwrap().push(Event::Resolved(result.id, result.todo.is_some()));
        }
        fn on_finish(&self, summary: &RunSummary) { self.events.lock().unwrap().push(Event::Finish(summary.attempted)); }
    }

    fn orchestrator(count: usize, retry_budget: u32, source: ScriptedSource) -> FetchOrchestrator<ScriptedSource> {
        FetchOrchestrator::new(FetchConfig { count, retry_budget, concurrency: None }, source)
    }

    #[test]
    fn ids_are_even_numbers_up_to_twice_count() {
        assert_eq!(ids(5).collect::<Vec<_>>(), vec![2, 4, 6, 8, 10]);
        let big: Vec<u64> = ids(20).collect();
        assert_eq!(big.len(), 20);
        assert!(big.windows(2).all(|w| w[1] == w[0] + 2));
        assert_eq!((big[0], big[19]), (2, 40));
        assert_eq!(ids(0).count(), 0);
    }

    #[test]
    fn ids_are_produced_lazily() {
        assert_eq!(ids(usize::MAX).take(3).collect::<Vec<_>>(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn all_successful_run() {
        let orch = orchestrator(20, 3, ScriptedSource::default());
        let rec = Recorder::default();
        let report = orch.run(&rec).await;

        let s = &report.summary;
        assert_eq!((s.attempted, s.succeeded, s.failed), (20, 20, 0));
        assert_eq!((s.completed, s.incomplete), (10, 10));
        assert_eq!(report.todos.len(), 20);
        assert!(report.todos.windows(2).all(|w| w[0].id < w[1].id));
        assert!(rec.events().iter().all(|e| !matches!(e, Event::Retry(..) | Event::Failed(..))));
        assert_eq!(rec.events().first(), Some(&Event::Start(20, 3)));
        assert_eq!(rec.events().last(), Some(&Event::Finish(20)));
    }

    #[tokio::test]
    async fn always_failing_ids_exhaust_the_budget() {
        let orch = orchestrator(20, 3, ScriptedSource::failing(&[4, 8]));
        let rec = Recorder::default();
        let report = orch.run(&rec).await;

        let s = &report.summary;
        assert_eq!((s.attempted, s.succeeded, s.failed), (20, 18, 2));
        assert_eq!(s.failed_ids, vec![4, 8]);
        for id in [4, 8] {
            assert_eq!(rec.retries_for(id), vec![1, 2, 3]);
            assert!(rec.events().contains(&Event::Failed(id, 3)));
            assert!(rec.events().contains(&Event::Resolved(id, false)));
            assert_eq!(orch.source.calls_for(id), 4);
        }
        assert_eq!(orch.source.calls_for(2), 1);
        assert!(report.todos.iter().all(|t| t.id != 4 && t.id != 8));
    }

    #[tokio::test]
    async fn success_on_kth_attempt_emits_k_minus_one_retries() {
        let mut source = ScriptedSource::default();
        source.fail_first.insert(6, 2);
        let orch = orchestrator(3, 3, source);
        let rec = Recorder::default();

        let result = orch.fetch_with_retry(6, &rec).await;
        assert!(result.todo.is_some());
        assert_eq!(rec.retries_for(6), vec![1, 2]);
        assert_eq!(orch.source.calls_for(6), 3);
        assert!(!rec.events().iter().any(|e| matches!(e, Event::Failed(..))));
    }

    #[tokio::test]
    async fn success_on_last_allowed_attempt() {
        let mut source = ScriptedSource::default();
        source.fail_first.insert(2, 3);
        let orch = orchestrator(1, 3, source);
        let rec = Recorder::default();

        let report = orch.run(&rec).await;
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(rec.retries_for(2), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_budget_fails_after_one_call() {
        let orch = orchestrator(2, 0, ScriptedSource::failing(&[2]));
        let rec = Recorder::default();
        let report = orch.run(&rec).await;

        assert_eq!(report.summary.failed, 1);
        assert!(rec.retries_for(2).is_empty());
        assert_eq!(orch.source.calls_for(2), 1);
        assert!(rec.events().contains(&Event::Failed(2, 0)));
    }

    #[tokio::test]
    async fn empty_run_still_finishes() {
        let orch = orchestrator(0, 3, ScriptedSource::default());
        let rec = Recorder::default();
        let report = orch.run(&rec).await;

        assert_eq!(report.summary, RunSummary { elapsed_secs: report.summary.elapsed_secs, ..RunSummary::default() });
        assert_eq!(rec.events(), vec![Event::Start(0, 3), Event::Finish(0)]);
    }

    #[tokio::test]
    async fn repeated_runs_agree_on_counters() {
        let run = || async {
            let mut source = ScriptedSource::failing(&[10]);
            source.fail_first.insert(12, 1);
            let mut s = orchestrator(8, 2, source).run(&NoopObserver).await.summary;
            s.elapsed_secs = 0.0;
            s
        };
        assert_eq!(run().await, run().await);
    }

    #[tokio::test]
    async fn all_chains_in_flight_without_a_limit() {
        let source = ScriptedSource { delay: Some(Duration::from_millis(20)), ..ScriptedSource::default() };
        let orch = orchestrator(10, 0, source);
        orch.run(&NoopObserver).await;
        assert_eq!(orch.source.max_in_flight.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn concurrency_limit_caps_in_flight_requests() {
        let source = ScriptedSource { delay: Some(Duration::from_millis(10)), ..ScriptedSource::default() };
        let orch = FetchOrchestrator::new(FetchConfig { count: 9, retry_budget: 0, concurrency: Some(3) }, source);
        let report = orch.run(&NoopObserver).await;

        assert_eq!(report.summary.succeeded, 9);
        assert!(orch.source.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn http_503_then_200_counts_one_retry_and_one_success() {
        use crate::todos::client::{ClientConfig, HttpTodoSource};
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos/2"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/todos/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": 1, "id": 2, "title": "quis ut nam facilis", "completed": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpTodoSource::new(ClientConfig {
            base_url: format!("{}/todos", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let orch = FetchOrchestrator::new(FetchConfig { count: 1, retry_budget: 3, concurrency: None }, source);
        let rec = Recorder::default();
        let report = orch.run(&rec).await;

        let s = &report.summary;
        assert_eq!((s.attempted, s.succeeded, s.failed, s.incomplete), (1, 1, 0, 1));
        assert_eq!(rec.retries_for(2), vec![1]);
        assert_eq!(report.todos[0].title, "quis ut nam facilis");
        assert_eq!(server.received_requests().await.map(|r| r.len()), Some(2));
    }
}
