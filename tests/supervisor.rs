//! Supervisor scenarios driven by scripted workers on a paused clock.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use shipvisor::{
    Event, EventKind, Settings, Shutdown, ShutdownCause, Subscribe, Supervisor, SupervisorError,
    TransportError, Tunnel, TunnelError, TunnelFactory, TunnelHandle, Worker, WorkerError,
    WorkerFactory,
};

#[derive(Clone, Copy, Debug)]
enum Step {
    /// Factory raises a transport failure instead of returning a worker.
    RefuseTransport,
    /// Run reports a transport failure.
    LoseTransport,
    /// Run returns cleanly.
    Complete,
    /// Run interrupts the supervisor, then returns cleanly.
    CompleteAndInterrupt,
    /// Run fails fatally.
    Fatal,
    /// Run never returns.
    Hang,
    /// Run interrupts the supervisor, then never returns.
    HangAndInterrupt,
}

struct Script {
    steps: Mutex<VecDeque<Step>>,
    created: AtomicUsize,
    closed: AtomicUsize,
    shutdown: CancellationToken,
}

impl Script {
    fn new(steps: &[Step], shutdown: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.iter().copied().collect()),
            created: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            shutdown: shutdown.clone(),
        })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedFactory(Arc<Script>);

#[async_trait]
impl WorkerFactory for ScriptedFactory {
    async fn create(
        &self,
        _settings: &Settings,
        _tunnel: &Tunnel,
    ) -> Result<Box<dyn Worker>, WorkerError> {
        self.0.created.fetch_add(1, Ordering::SeqCst);
        let step = self.0.steps.lock().unwrap().pop_front().unwrap_or(Step::Hang);
        if let Step::RefuseTransport = step {
            return Err(TransportError::new("redis", "connection refused").into());
        }
        Ok(Box::new(ScriptedWorker {
            step,
            script: self.0.clone(),
        }))
    }
}

struct ScriptedWorker {
    step: Step,
    script: Arc<Script>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn run(&mut self) -> Result<(), WorkerError> {
        match self.step {
            Step::RefuseTransport | Step::LoseTransport => {
                Err(TransportError::new("redis", "connection reset").into())
            }
            Step::Complete => Ok(()),
            Step::CompleteAndInterrupt => {
                self.script.shutdown.cancel();
                Ok(())
            }
            Step::Fatal => Err(WorkerError::fatal("unreadable log path")),
            Step::Hang => std::future::pending().await,
            Step::HangAndInterrupt => {
                self.script.shutdown.cancel();
                std::future::pending().await
            }
        }
    }

    async fn close(&mut self) {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Tunnels {
    active: bool,
    fail: bool,
    created: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl Tunnels {
    fn active() -> Arc<Self> {
        Arc::new(Self {
            active: true,
            ..Self::default()
        })
    }

    fn none() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct CountingTunnel(Arc<AtomicUsize>);

#[async_trait]
impl TunnelHandle for CountingTunnel {
    fn endpoint(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 6380))
    }

    async fn close(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TunnelFactory for Tunnels {
    async fn create(&self, _settings: &Settings) -> Result<Tunnel, TunnelError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TunnelError::Exited {
                grace: Duration::from_secs(1),
                status: "exit status: 255".to_string(),
            });
        }
        if self.active {
            Ok(Tunnel::Active(Box::new(CountingTunnel(self.closed.clone()))))
        } else {
            Ok(Tunnel::None)
        }
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    fn backoff_secs(&self) -> Vec<u64> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::BackoffScheduled)
            .filter_map(|e| e.delay.map(|d| d.as_secs()))
            .collect()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

fn settings(max_failure: &str, respawn_delay: &str) -> Settings {
    [("max_failure", max_failure), ("respawn_delay", respawn_delay)]
        .into_iter()
        .collect()
}

struct Harness {
    script: Arc<Script>,
    tunnels: Arc<Tunnels>,
    recorder: Arc<Recorder>,
    shutdown: CancellationToken,
}

impl Harness {
    fn new(steps: &[Step], tunnels: Arc<Tunnels>) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            script: Script::new(steps, &shutdown),
            tunnels,
            recorder: Arc::new(Recorder::default()),
            shutdown,
        }
    }

    /// Cancels the shutdown token after `after` of (virtual) time.
    fn interrupt_after(&self, after: Duration) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            time::sleep(after).await;
            token.cancel();
        });
    }

    async fn run(&self, settings: Settings) -> Result<Shutdown, SupervisorError> {
        let sup = Supervisor::builder(settings, Arc::new(ScriptedFactory(self.script.clone())))
            .with_tunnels(self.tunnels.clone())
            .with_subscribers(vec![self.recorder.clone()])
            .build()
            .expect("valid settings");
        sup.run(self.shutdown.clone()).await
    }
}

#[tokio::test(start_paused = true)]
async fn three_failures_back_off_exponentially() {
    use Step::*;
    let h = Harness::new(
        &[LoseTransport, LoseTransport, LoseTransport, HangAndInterrupt],
        Tunnels::none(),
    );
    let start = Instant::now();

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(h.recorder.backoff_secs(), vec![2, 4, 8]);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(14), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(15), "{elapsed:?}");
    assert_eq!(done.cause, ShutdownCause::WhileRunning);
    assert_eq!(done.attempts, 4);
    assert_eq!(done.failure_count, 3);
    assert_eq!(h.script.created(), 4);
    assert_eq!(h.script.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn delay_stabilizes_once_failures_hit_the_cap() {
    use Step::*;
    let h = Harness::new(
        &[
            LoseTransport,
            LoseTransport,
            LoseTransport,
            LoseTransport,
            HangAndInterrupt,
        ],
        Tunnels::none(),
    );

    let done = h.run(settings("2", "3")).await.unwrap();

    assert_eq!(h.recorder.backoff_secs(), vec![3, 9, 9, 9]);
    assert_eq!(done.failure_count, 2);
    assert_eq!(h.script.created(), 5);
}

#[tokio::test(start_paused = true)]
async fn interrupt_while_running_closes_worker_then_tunnel() {
    let h = Harness::new(&[Step::HangAndInterrupt], Tunnels::active());

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(done.cause, ShutdownCause::WhileRunning);
    assert!(done.tunnel_closed);
    assert_eq!(h.script.created(), 1);
    assert_eq!(h.script.closed(), 1);
    assert_eq!(h.tunnels.created(), 1);
    assert_eq!(h.tunnels.closed(), 1);
    assert_eq!(
        h.recorder.kinds(),
        vec![
            EventKind::TunnelOpened,
            EventKind::WorkerStarting,
            EventKind::ShutdownRequested,
            EventKind::WorkerClosed,
            EventKind::TunnelClosed,
            EventKind::ShutdownComplete,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_backoff_abandons_respawn() {
    let h = Harness::new(&[Step::LoseTransport], Tunnels::none());
    h.interrupt_after(Duration::from_millis(500));
    let start = Instant::now();

    let done = h.run(settings("5", "3")).await.unwrap();

    assert_eq!(done.cause, ShutdownCause::DuringBackoff);
    assert!(!done.tunnel_closed);
    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(h.script.created(), 1);
    assert_eq!(h.script.closed(), 0);
    assert_eq!(h.tunnels.closed(), 0);
    assert_eq!(h.recorder.backoff_secs(), vec![3]);
    assert!(!h.recorder.kinds().contains(&EventKind::TunnelClosed));
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_backoff_closes_active_tunnel_once() {
    let h = Harness::new(&[Step::LoseTransport], Tunnels::active());
    h.interrupt_after(Duration::from_secs(1));

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(done.cause, ShutdownCause::DuringBackoff);
    assert!(done.tunnel_closed);
    assert_eq!(h.tunnels.closed(), 1);
    assert_eq!(h.script.closed(), 0);
}

#[tokio::test(start_paused = true)]
async fn clean_runs_do_not_reset_failure_count() {
    use Step::*;
    let h = Harness::new(
        &[
            LoseTransport,
            LoseTransport,
            Complete,
            Complete,
            LoseTransport,
            HangAndInterrupt,
        ],
        Tunnels::none(),
    );

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(h.recorder.backoff_secs(), vec![2, 4, 8]);
    assert_eq!(done.attempts, 6);
    let stopped = h
        .recorder
        .kinds()
        .into_iter()
        .filter(|k| *k == EventKind::WorkerStopped)
        .count();
    assert_eq!(stopped, 2);
}

#[tokio::test(start_paused = true)]
async fn factory_transport_failure_is_retried_like_run_failure() {
    use Step::*;
    let h = Harness::new(
        &[RefuseTransport, LoseTransport, HangAndInterrupt],
        Tunnels::none(),
    );

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(h.recorder.backoff_secs(), vec![2, 4]);
    assert_eq!(done.attempts, 3);
    assert_eq!(h.script.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_worker_is_created_after_interrupt() {
    let h = Harness::new(&[Step::CompleteAndInterrupt, Step::Hang], Tunnels::active());

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(done.cause, ShutdownCause::WhileRunning);
    assert_eq!(h.script.created(), 1);
    assert_eq!(h.script.closed(), 0);
    assert_eq!(h.tunnels.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn interrupt_before_start_creates_nothing() {
    let h = Harness::new(&[Step::Hang], Tunnels::active());
    h.shutdown.cancel();

    let done = h.run(settings("5", "2")).await.unwrap();

    assert_eq!(done.cause, ShutdownCause::BeforeStart);
    assert_eq!(done.attempts, 0);
    assert!(!done.tunnel_closed);
    assert_eq!(h.tunnels.created(), 0);
    assert_eq!(h.script.created(), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_propagates_and_closes_tunnel() {
    use Step::*;
    let h = Harness::new(&[LoseTransport, Fatal, Hang], Tunnels::active());

    let err = h.run(settings("5", "2")).await.unwrap_err();

    assert!(matches!(err, SupervisorError::Worker(WorkerError::Fatal { .. })));
    assert_eq!(h.script.created(), 2);
    assert_eq!(h.script.closed(), 0);
    assert_eq!(h.tunnels.closed(), 1);
    let kinds = h.recorder.kinds();
    assert!(kinds.contains(&EventKind::WorkerFatal));
    assert!(!kinds.contains(&EventKind::ShutdownComplete));
}

#[tokio::test(start_paused = true)]
async fn tunnel_failure_is_fatal_before_any_worker() {
    let h = Harness::new(&[Step::Hang], Tunnels::failing());

    let err = h.run(settings("5", "2")).await.unwrap_err();

    assert_eq!(err.as_label(), "tunnel_exited");
    assert_eq!(h.script.created(), 0);
}

#[tokio::test]
async fn invalid_numbers_fail_at_build_time() {
    let shutdown = CancellationToken::new();
    let script = Script::new(&[], &shutdown);

    for (max_failure, respawn_delay) in [("x", "2"), ("5", "2.5"), ("0", "2"), ("5", "0")] {
        let res = Supervisor::builder(
            settings(max_failure, respawn_delay),
            Arc::new(ScriptedFactory(script.clone())),
        )
        .build();
        assert!(res.is_err(), "{max_failure}/{respawn_delay} accepted");
    }
    assert_eq!(script.created(), 0);
}

struct EagerFactory(AtomicUsize);

#[async_trait]
impl WorkerFactory for EagerFactory {
    async fn create(
        &self,
        _settings: &Settings,
        _tunnel: &Tunnel,
    ) -> Result<Box<dyn Worker>, WorkerError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EagerWorker))
    }
}

/// Returns at once, never yielding to the scheduler.
struct EagerWorker;

#[async_trait]
impl Worker for EagerWorker {
    async fn run(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

#[tokio::test]
async fn interrupt_reaches_a_loop_of_instantly_completing_workers() {
    let workers = Arc::new(EagerFactory(AtomicUsize::new(0)));
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let sup = Supervisor::builder(settings("5", "2"), workers.clone())
        .with_tunnels(Tunnels::none())
        .build()
        .unwrap();
    let done = time::timeout(Duration::from_secs(5), sup.run(shutdown))
        .await
        .expect("interrupt was not observed")
        .unwrap();

    assert_eq!(done.cause, ShutdownCause::WhileRunning);
    assert_eq!(done.failure_count, 0);
    assert!(workers.0.load(Ordering::SeqCst) > 1);
}
