//! Lifecycle tests for the monitor loop.
//!
//! A scripted source, enricher and notifier record every call with the
//! (paused) tokio clock, so cadence and pacing can be asserted without real
//! waiting.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use mail_monitor::config::MonitorConfig;
use mail_monitor::enrich::Enricher;
use mail_monitor::error::{MonitorError, SourceError};
use mail_monitor::monitor::{Monitor, MonitorDeps, MonitorState, RunOutcome};
use mail_monitor::notify::Notifier;
use mail_monitor::pipeline::{Item, RunReport};
use mail_monitor::source::MailSource;

const INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Connect,
    Disconnect,
    Fetch,
    Enrich(String),
    Deliver(String),
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl Recorder {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|(c, _)| pred(c)).count()
    }

    fn times(&self, pred: impl Fn(&Call) -> bool) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| pred(c))
            .map(|(_, t)| *t)
            .collect()
    }

    fn fetches(&self) -> usize {
        self.count(|c| *c == Call::Fetch)
    }

    fn disconnects(&self) -> usize {
        self.count(|c| *c == Call::Disconnect)
    }

    fn enriches(&self) -> usize {
        self.count(|c| matches!(c, Call::Enrich(_)))
    }

    fn delivers(&self) -> usize {
        self.count(|c| matches!(c, Call::Deliver(_)))
    }
}

enum FetchStep {
    Items(Vec<Item>),
    Fail,
    Panic,
}

/// Replays queued connect/fetch results; defaults to success and no mail.
struct ScriptedSource {
    rec: Arc<Recorder>,
    connects: VecDeque<Result<(), SourceError>>,
    fetches: VecDeque<FetchStep>,
    fail_disconnect: bool,
}

impl ScriptedSource {
    fn new(rec: &Arc<Recorder>) -> Self {
        Self {
            rec: Arc::clone(rec),
            connects: VecDeque::new(),
            fetches: VecDeque::new(),
            fail_disconnect: false,
        }
    }

    fn connect_fails(mut self) -> Self {
        self.connects.push_back(Err(SourceError::Connection {
            host: "imap.test".into(),
            reason: "refused".into(),
        }));
        self
    }

    fn connect_ok(mut self) -> Self {
        self.connects.push_back(Ok(()));
        self
    }

    fn then(mut self, step: FetchStep) -> Self {
        self.fetches.push_back(step);
        self
    }
}

#[async_trait]
impl MailSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        self.rec.push(Call::Connect);
        self.connects.pop_front().unwrap_or(Ok(()))
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        self.rec.push(Call::Disconnect);
        if self.fail_disconnect {
            return Err(SourceError::Transport("socket already closed".into()));
        }
        Ok(())
    }

    async fn fetch_new(&mut self) -> Result<Vec<Item>, SourceError> {
        self.rec.push(Call::Fetch);
        match self.fetches.pop_front() {
            None => Ok(Vec::new()),
            Some(FetchStep::Items(items)) => Ok(items),
            Some(FetchStep::Fail) => Err(SourceError::Transport("connection reset".into())),
            Some(FetchStep::Panic) => panic!("fetch blew up"),
        }
    }
}

struct StubEnricher {
    rec: Arc<Recorder>,
    panic_on: Option<&'static str>,
}

#[async_trait]
impl Enricher for StubEnricher {
    async fn enrich(&self, item: Item) -> Item {
        self.rec.push(Call::Enrich(item.id.clone()));
        if self.panic_on.is_some_and(|id| id == item.id) {
            panic!("enricher blew up");
        }
        let summary = format!("summary of {}", item.id);
        item.with_summary(summary)
    }
}

struct StubNotifier {
    rec: Arc<Recorder>,
    reject: Vec<&'static str>,
    panic_on: Option<&'static str>,
}

#[async_trait]
impl Notifier for StubNotifier {
    fn name(&self) -> &str {
        "stub"
    }

    async fn deliver(&self, item: &Item) -> bool {
        self.rec.push(Call::Deliver(item.id.clone()));
        assert!(item.is_enriched(), "delivered item must carry a summary");
        if self.panic_on.is_some_and(|id| id == item.id) {
            panic!("notifier blew up");
        }
        !self.reject.iter().any(|id| *id == item.id)
    }
}

fn items(ids: &[&str]) -> FetchStep {
    FetchStep::Items(
        ids.iter()
            .map(|id| Item::new(*id, "alice@example.com").with_subject(format!("Mail {id}")))
            .collect(),
    )
}

fn config(pacing: Duration) -> MonitorConfig {
    MonitorConfig {
        poll_interval: INTERVAL,
        pacing_delay: pacing,
        reconnect_on_fetch_failure: true,
    }
}

struct Setup {
    rec: Arc<Recorder>,
    source: ScriptedSource,
    config: MonitorConfig,
    enrich_panic_on: Option<&'static str>,
    reject: Vec<&'static str>,
    deliver_panic_on: Option<&'static str>,
}

impl Setup {
    fn new() -> Self {
        let rec = Arc::new(Recorder::default());
        let source = ScriptedSource::new(&rec);
        Self {
            rec,
            source,
            config: config(Duration::from_secs(1)),
            enrich_panic_on: None,
            reject: Vec::new(),
            deliver_panic_on: None,
        }
    }

    fn source(mut self, f: impl FnOnce(ScriptedSource) -> ScriptedSource) -> Self {
        self.source = f(self.source);
        self
    }

    fn build(self) -> (Arc<Monitor>, Arc<Recorder>) {
        let deps = MonitorDeps {
            source: Box::new(self.source),
            enricher: Arc::new(StubEnricher {
                rec: Arc::clone(&self.rec),
                panic_on: self.enrich_panic_on,
            }),
            notifier: Arc::new(StubNotifier {
                rec: Arc::clone(&self.rec),
                reject: self.reject,
                panic_on: self.deliver_panic_on,
            }),
        };
        (Arc::new(Monitor::new(self.config, deps)), self.rec)
    }
}

/// Start the monitor, let `duration` of virtual time pass, stop, and return
/// the run report.
async fn run_for(monitor: &Arc<Monitor>, duration: Duration) -> RunReport {
    let m = Arc::clone(monitor);
    let handle = tokio::spawn(async move { m.start().await });
    tokio::time::sleep(duration).await;
    monitor.stop();
    match handle.await.unwrap().unwrap() {
        RunOutcome::Completed(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn every_fetched_item_is_enriched_and_delivered_once() {
    let (monitor, rec) = Setup::new()
        .source(|s| s.then(items(&["1", "2", "3"])))
        .build();

    let report = run_for(&monitor, Duration::from_secs(90)).await;

    assert_eq!(report.fetched, 3);
    assert_eq!(rec.enriches(), 3);
    assert_eq!(rec.delivers(), 3);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn items_are_processed_in_fetch_order() {
    let (monitor, rec) = Setup::new()
        .source(|s| s.then(items(&["a", "b", "c"])))
        .build();

    run_for(&monitor, Duration::from_secs(30)).await;

    let pipeline: Vec<Call> = rec
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Enrich(_) | Call::Deliver(_)))
        .collect();
    assert_eq!(
        pipeline,
        vec![
            Call::Enrich("a".into()),
            Call::Deliver("a".into()),
            Call::Enrich("b".into()),
            Call::Deliver("b".into()),
            Call::Enrich("c".into()),
            Call::Deliver("c".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_delivery_does_not_abort_the_batch() {
    let mut setup = Setup::new().source(|s| s.then(items(&["1", "2", "3"])));
    setup.reject = vec!["2"];
    let (monitor, rec) = setup.build();

    let report = run_for(&monitor, Duration::from_secs(90)).await;

    assert_eq!(rec.enriches(), 3);
    assert_eq!(rec.delivers(), 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);

    // The loop went on to sleep and poll again.
    let fetches = rec.times(|c| *c == Call::Fetch);
    assert_eq!(fetches.len(), 2);
    assert!(fetches[1] - fetches[0] >= INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_reconnects_once_and_skips_the_cycle() {
    let (monitor, rec) = Setup::new()
        .source(|s| s.then(FetchStep::Fail).then(items(&["x"])))
        .build();

    let report = run_for(&monitor, Duration::from_secs(90)).await;

    assert_eq!(
        rec.calls(),
        vec![
            Call::Connect,
            Call::Fetch,
            Call::Disconnect,
            Call::Connect,
            Call::Fetch,
            Call::Enrich("x".into()),
            Call::Deliver("x".into()),
            Call::Disconnect,
        ]
    );
    assert_eq!(report.cycles, 2);
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.reconnects, 1);
    assert_eq!(report.delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_keeps_the_loop_running() {
    let (monitor, rec) = Setup::new()
        .source(|s| {
            s.connect_ok()
                .connect_fails()
                .then(FetchStep::Fail)
                .then(items(&["late"]))
        })
        .build();

    let report = run_for(&monitor, Duration::from_secs(90)).await;

    assert_eq!(rec.fetches(), 2);
    assert_eq!(rec.count(|c| *c == Call::Connect), 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn reconnect_can_be_disabled() {
    let mut setup = Setup::new().source(|s| s.then(FetchStep::Fail));
    setup.config.reconnect_on_fetch_failure = false;
    let (monitor, rec) = setup.build();

    let report = run_for(&monitor, Duration::from_secs(90)).await;

    assert_eq!(
        rec.calls(),
        vec![Call::Connect, Call::Fetch, Call::Fetch, Call::Disconnect]
    );
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.reconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetch_is_treated_as_transport_error() {
    let (monitor, rec) = Setup::new()
        .source(|s| s.then(FetchStep::Panic).then(items(&["y"])))
        .build();

    let report = run_for(&monitor, Duration::from_secs(90)).await;

    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(rec.disconnects(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_during_sleep_ends_without_another_fetch() {
    let (monitor, rec) = Setup::new().build();

    let m = Arc::clone(&monitor);
    let handle = tokio::spawn(async move { m.start().await });
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(monitor.state(), MonitorState::Polling);

    let stopped_at = Instant::now();
    monitor.stop();
    let outcome = handle.await.unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(rec.fetches(), 1);
    assert_eq!(rec.disconnects(), 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let (monitor, rec) = Setup::new().build();

    let m = Arc::clone(&monitor);
    let handle = tokio::spawn(async move { m.start().await });
    tokio::time::sleep(Duration::from_secs(5)).await;
    monitor.stop();
    monitor.stop();
    handle.await.unwrap().unwrap();
    monitor.stop();

    assert_eq!(rec.disconnects(), 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn startup_connection_failure_is_fatal() {
    let (monitor, rec) = Setup::new().source(|s| s.connect_fails()).build();

    let result = monitor.start().await;

    assert!(matches!(
        result,
        Err(MonitorError::StartupConnection(SourceError::Connection { .. }))
    ));
    assert_eq!(rec.fetches(), 0);
    assert_eq!(rec.calls(), vec![Call::Connect, Call::Disconnect]);
    assert_eq!(monitor.state(), MonitorState::Stopped);

    let again = monitor.start().await.unwrap();
    assert_eq!(again, RunOutcome::AlreadyStarted(MonitorState::Stopped));
    assert_eq!(rec.count(|c| *c == Call::Connect), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_cycles_make_no_calls_but_still_sleep() {
    let (monitor, rec) = Setup::new().build();

    let report = run_for(&monitor, Duration::from_secs(150)).await;

    assert_eq!(rec.enriches(), 0);
    assert_eq!(rec.delivers(), 0);
    assert_eq!(report.cycles, 3);

    let fetches = rec.times(|c| *c == Call::Fetch);
    assert_eq!(fetches.len(), 3);
    for pair in fetches.windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL);
    }
}

#[tokio::test(start_paused = true)]
async fn deliveries_in_a_batch_are_paced() {
    let pacing = Duration::from_millis(1500);
    let mut setup = Setup::new().source(|s| s.then(items(&["1", "2", "3"])));
    setup.config = config(pacing);
    let (monitor, rec) = setup.build();

    run_for(&monitor, Duration::from_secs(30)).await;

    let deliveries = rec.times(|c| matches!(c, Call::Deliver(_)));
    assert_eq!(deliveries.len(), 3);
    for pair in deliveries.windows(2) {
        assert!(pair[1] - pair[0] >= pacing);
    }
}

#[tokio::test(start_paused = true)]
async fn stop_mid_batch_abandons_remaining_items() {
    let mut setup = Setup::new().source(|s| s.then(items(&["1", "2", "3"])));
    setup.config = config(Duration::from_secs(10));
    let (monitor, rec) = setup.build();

    let report = run_for(&monitor, Duration::from_secs(5)).await;

    assert_eq!(rec.delivers(), 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.abandoned, 2);
    assert_eq!(rec.fetches(), 1);
    assert_eq!(rec.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_skips_connect() {
    let (monitor, rec) = Setup::new().build();

    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopping);

    let outcome = monitor.start().await.unwrap();

    assert_eq!(outcome, RunOutcome::Completed(RunReport::default()));
    assert_eq!(rec.calls(), vec![Call::Disconnect]);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn second_start_while_running_is_a_no_op() {
    let (monitor, rec) = Setup::new().build();

    let m = Arc::clone(&monitor);
    let handle = tokio::spawn(async move { m.start().await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let second = monitor.start().await.unwrap();
    assert_eq!(second, RunOutcome::AlreadyStarted(MonitorState::Polling));

    monitor.stop();
    handle.await.unwrap().unwrap();
    assert_eq!(rec.count(|c| *c == Call::Connect), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_enricher_is_isolated_to_its_item() {
    let mut setup = Setup::new().source(|s| s.then(items(&["1", "2", "3"])));
    setup.enrich_panic_on = Some("2");
    let (monitor, rec) = setup.build();

    let report = run_for(&monitor, Duration::from_secs(30)).await;

    assert_eq!(rec.enriches(), 3);
    assert_eq!(
        rec.times(|c| matches!(c, Call::Deliver(_))).len(),
        2,
        "item 2 never reaches the notifier"
    );
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_notifier_is_isolated_to_its_item() {
    let mut setup = Setup::new().source(|s| s.then(items(&["1", "2", "3"])));
    setup.deliver_panic_on = Some("1");
    let (monitor, rec) = setup.build();

    let report = run_for(&monitor, Duration::from_secs(30)).await;

    assert_eq!(rec.delivers(), 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn disconnect_error_on_shutdown_still_stops() {
    let (monitor, rec) = Setup::new()
        .source(|mut s| {
            s.fail_disconnect = true;
            s
        })
        .build();

    run_for(&monitor, Duration::from_secs(10)).await;

    assert_eq!(rec.disconnects(), 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_state_changes() {
    let (monitor, _rec) = Setup::new().build();
    let rx = monitor.subscribe();
    assert_eq!(*rx.borrow(), MonitorState::Idle);

    let m = Arc::clone(&monitor);
    let handle = tokio::spawn(async move { m.start().await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*rx.borrow(), MonitorState::Polling);

    monitor.stop();
    handle.await.unwrap().unwrap();
    assert_eq!(*rx.borrow(), MonitorState::Stopped);
}
