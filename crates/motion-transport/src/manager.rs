/// Multicast manager: socket lifecycle, worker arming and the reconnect
/// supervisor.
///
/// State machine:
///   Idle ──start()──▶ Running ──worker I/O failure──▶ Restarting ──backoff + reopen──▶ Running
///   any ──stop()──▶ Stopped (terminal, no further restarts)
///
/// Each successful open creates a `Session` with its own generation number
/// and cancellation token. Closing the session cancels the token, which
/// unblocks both I/O workers. Worker exits are reported to the supervisor
/// tagged with their generation, so a late report from a torn-down session
/// cannot trigger a second restart.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use motion_protocol::{HeartbeatSink, OutboundPacket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::address::AddressProvider;
use crate::config::MulticastConfig;
use crate::error::{StartError, WorkerExit};
use crate::health::{CountersSnapshot, TransportCounters};
use crate::interfaces::{self, InterfaceCandidate};
use crate::queue::{BoundedQueue, InboundQueue, OutboundQueue};
use crate::scheduler::Scheduler;
use crate::transport::{Transport, TransportFactory};
use crate::{consumer, receiver, sender};

/// Externally visible state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never started, or the last start attempt failed
    Idle,
    /// Socket open, I/O workers armed
    Running,
    /// Socket torn down after a failure, waiting to reopen
    Restarting,
    /// `stop()` was called
    Stopped,
}

// ── Session ─────────────────────────────────────────────────────────────

/// One live socket and the token that closes it.
#[derive(Clone)]
pub(crate) struct Session {
    pub generation: u64,
    pub interface: Ipv4Addr,
    pub transport: Arc<dyn Transport>,
    pub closed: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerKind {
    Send,
    Receive,
    Consume,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Consume => "consume",
        })
    }
}

struct WorkerReport {
    kind: WorkerKind,
    generation: u64,
    exit: WorkerExit,
}

#[derive(Default)]
struct TaskSlots {
    start: Option<JoinHandle<()>>,
    send: Option<JoinHandle<()>>,
    receive: Option<JoinHandle<()>>,
    consume: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

/// A slot needs a new task if it never had one or its task already ended.
fn slot_idle(slot: &Option<JoinHandle<()>>) -> bool {
    slot.as_ref().map_or(true, JoinHandle::is_finished)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Shared state ────────────────────────────────────────────────────────

struct Shared {
    config: MulticastConfig,
    addresses: Arc<dyn AddressProvider>,
    transports: Arc<dyn TransportFactory>,
    sink: Arc<dyn HeartbeatSink>,
    scheduler: Scheduler,
    outbound: Arc<OutboundQueue>,
    inbound: Arc<InboundQueue>,
    counters: Arc<TransportCounters>,
    started: AtomicBool,
    restarting: AtomicBool,
    /// Cancelled once by `stop()`; parent of every session token
    stop: CancellationToken,
    generation: AtomicU64,
    session: Mutex<Option<Session>>,
    /// Serializes opening and tearing down sessions
    lifecycle: tokio::sync::Mutex<()>,
    candidates: Mutex<Vec<InterfaceCandidate>>,
    tasks: Mutex<TaskSlots>,
    exits: mpsc::UnboundedSender<WorkerReport>,
    exit_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerReport>>>,
}

impl Shared {
    fn current_session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    /// Steps 1-5 of a start attempt. On any failure the half-built socket is
    /// dropped; the next attempt opens a fresh one.
    fn open_session(&self) -> Result<Session, StartError> {
        if self.stop.is_cancelled() {
            return Err(StartError::Stopped);
        }

        let Some(primary) = self.addresses.primary_ipv4() else {
            error!("Cannot get primary IPv4 host address");
            self.started.store(false, Ordering::SeqCst);
            return Err(StartError::NoPrimaryAddress);
        };

        let transport = match self.transports.open(primary, &self.config) {
            Ok(transport) => transport,
            Err(e) => {
                error!(interface = %primary, "Error starting multicast: {}", e);
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let session = Session {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            interface: primary,
            transport,
            closed: self.stop.child_token(),
        };

        *lock(&self.session) = Some(session.clone());
        if self.stop.is_cancelled() {
            self.close_session();
            return Err(StartError::Stopped);
        }
        self.started.store(true, Ordering::SeqCst);

        info!(
            interface = %primary,
            bind_port = self.config.bind_port,
            group = %self.config.group,
            generation = session.generation,
            "Multicast started"
        );
        Ok(session)
    }

    fn close_session(&self) {
        if let Some(session) = lock(&self.session).take() {
            session.closed.cancel();
            debug!(generation = session.generation, "Multicast socket closed");
        }
    }

    fn spawn_worker<F>(&self, kind: WorkerKind, generation: u64, worker: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = WorkerExit> + Send + 'static,
    {
        let exits = self.exits.clone();
        self.scheduler.spawn(async move {
            let exit = worker.await;
            let _ = exits.send(WorkerReport {
                kind,
                generation,
                exit,
            });
        })
    }

    /// Arm the send and receive workers for `session`, each only if its slot
    /// is free.
    fn arm_io_workers(&self, session: &Session) {
        let mut tasks = lock(&self.tasks);

        if slot_idle(&tasks.send) {
            let worker = sender::run(
                session.clone(),
                Arc::clone(&self.outbound),
                Arc::clone(&self.counters),
                self.config.target(),
                self.config.repeat_delay,
            );
            tasks.send = Some(self.spawn_worker(WorkerKind::Send, session.generation, worker));
        }

        if slot_idle(&tasks.receive) {
            let worker = receiver::run(
                session.clone(),
                Arc::clone(&self.inbound),
                Arc::clone(&self.counters),
                self.config.receive_buffer_size,
            );
            tasks.receive =
                Some(self.spawn_worker(WorkerKind::Receive, session.generation, worker));
        }
    }

    fn arm_consumer(&self) {
        let mut tasks = lock(&self.tasks);
        if slot_idle(&tasks.consume) {
            let worker = consumer::run(
                Arc::clone(&self.inbound),
                Arc::clone(&self.sink),
                Arc::clone(&self.counters),
                self.stop.clone(),
            );
            tasks.consume = Some(self.spawn_worker(WorkerKind::Consume, 0, worker));
        }
    }

    fn arm_supervisor(self: &Arc<Self>) {
        let mut tasks = lock(&self.tasks);
        if !slot_idle(&tasks.supervisor) {
            return;
        }
        if let Some(exits) = lock(&self.exit_rx).take() {
            tasks.supervisor = Some(self.scheduler.spawn(supervise(Arc::clone(self), exits)));
        }
    }

    /// The delayed start routine scheduled by `start()`.
    async fn run_start(self: Arc<Self>) {
        let _guard = self.lifecycle.lock().await;

        // Already running: only fill in any worker slot that emptied.
        if let Some(session) = self.current_session() {
            self.arm_io_workers(&session);
            return;
        }

        if let Ok(session) = self.open_session() {
            self.arm_io_workers(&session);
        }
    }

    /// A failure report is acted on only for the live session of a started,
    /// not stopped, manager.
    fn should_restart(&self, generation: u64) -> bool {
        !self.stop.is_cancelled()
            && self.started.load(Ordering::SeqCst)
            && self
                .current_session()
                .is_some_and(|s| s.generation == generation)
    }

    async fn join_io_workers(&self) {
        let handles = {
            let mut tasks = lock(&self.tasks);
            [tasks.send.take(), tasks.receive.take()]
        };
        for handle in handles.into_iter().flatten() {
            let _ = handle.await;
        }
    }

    /// Running → Restarting → Running. Retries until a socket opens, a
    /// configuration error makes retrying pointless, or stop is requested.
    async fn restart(&self) {
        let _guard = self.lifecycle.lock().await;

        self.restarting.store(true, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        self.close_session();
        self.join_io_workers().await;

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.restart_backoff) => {}
            }

            match self.open_session() {
                Ok(session) => {
                    self.arm_io_workers(&session);
                    TransportCounters::bump(&self.counters.restarts);
                    info!(generation = session.generation, "Multicast restarted");
                    break;
                }
                Err(StartError::NoPrimaryAddress) => {
                    error!("Reconnect abandoned: no primary IPv4 address; call start() to retry");
                    break;
                }
                Err(StartError::Stopped) => break,
                Err(e) => warn!("Reconnect attempt failed, retrying: {}", e),
            }
        }

        self.restarting.store(false, Ordering::SeqCst);
    }
}

/// Reconnect supervisor. Lives from the first `start()` until `stop()`.
async fn supervise(shared: Arc<Shared>, mut exits: mpsc::UnboundedReceiver<WorkerReport>) {
    debug!("Reconnect supervisor started");

    loop {
        let report = tokio::select! {
            _ = shared.stop.cancelled() => break,
            report = exits.recv() => match report {
                Some(report) => report,
                None => break,
            },
        };

        let reason = match report.exit {
            WorkerExit::Shutdown => {
                debug!(worker = %report.kind, "Worker shut down");
                continue;
            }
            WorkerExit::Fatal(e) => {
                error!(worker = %report.kind, "Worker failed permanently: {}", e);
                continue;
            }
            WorkerExit::Transient(e) => e,
        };

        if !shared.should_restart(report.generation) {
            debug!(
                worker = %report.kind,
                generation = report.generation,
                "Worker exited: {}",
                reason
            );
            continue;
        }

        warn!(worker = %report.kind, "Multicast I/O failed, restarting: {}", reason);
        shared.restart().await;
    }

    debug!("Reconnect supervisor stopped");
}

// ── Public handle ───────────────────────────────────────────────────────

/// Owns the multicast socket and the tasks around it.
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct MulticastManager {
    shared: Arc<Shared>,
}

impl MulticastManager {
    pub fn new(
        config: MulticastConfig,
        addresses: Arc<dyn AddressProvider>,
        transports: Arc<dyn TransportFactory>,
        sink: Arc<dyn HeartbeatSink>,
        scheduler: Scheduler,
    ) -> Self {
        let (exits, exit_rx) = mpsc::unbounded_channel();
        let shared = Shared {
            outbound: Arc::new(BoundedQueue::new(config.outbound_capacity)),
            inbound: Arc::new(BoundedQueue::new(config.inbound_capacity)),
            config,
            addresses,
            transports,
            sink,
            scheduler,
            counters: Arc::new(TransportCounters::new()),
            started: AtomicBool::new(false),
            restarting: AtomicBool::new(false),
            stop: CancellationToken::new(),
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            candidates: Mutex::new(Vec::new()),
            tasks: Mutex::new(TaskSlots::default()),
            exits,
            exit_rx: Mutex::new(Some(exit_rx)),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Schedule the socket start and arm any task that is not running.
    /// Calling it again while running only re-arms missing tasks.
    pub fn start(&self) {
        let shared = &self.shared;
        if shared.stop.is_cancelled() {
            warn!("Start ignored: multicast manager was stopped");
            return;
        }

        let candidates = interfaces::select_candidates();
        debug!(count = candidates.len(), "Network interface candidates");
        *lock(&shared.candidates) = candidates;

        shared.arm_supervisor();
        shared.arm_consumer();

        let mut tasks = lock(&shared.tasks);
        if slot_idle(&tasks.start) {
            let routine = Arc::clone(shared).run_start();
            tasks.start = Some(shared.scheduler.schedule_delayed(shared.config.start_delay, routine));
        }
    }

    /// Close the socket and disable restarts for good.
    pub fn stop(&self) {
        let shared = &self.shared;
        shared.stop.cancel();
        shared.started.store(false, Ordering::SeqCst);
        shared.close_session();
        info!("Multicast stopped");
    }

    /// `stop()`, then wait for every task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let handles = {
            let mut tasks = lock(&self.shared.tasks);
            [
                tasks.start.take(),
                tasks.send.take(),
                tasks.receive.take(),
                tasks.consume.take(),
                tasks.supervisor.take(),
            ]
        };
        for handle in handles.into_iter().flatten() {
            let _ = handle.await;
        }
    }

    /// Queue `payload` with the default repeat count.
    /// Returns false if the outbound queue was full and the packet dropped.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        let repeat = self.shared.config.default_repeat_count;
        self.send_with_repeat(payload, repeat)
    }

    /// Queue `payload` to be sent `repeat_count` times.
    /// Returns false if the outbound queue was full and the packet dropped.
    pub fn send_with_repeat(&self, payload: impl Into<String>, repeat_count: u32) -> bool {
        let packet = OutboundPacket::new(payload, repeat_count);
        if self.shared.outbound.offer(packet) {
            TransportCounters::bump(&self.shared.counters.packets_queued);
            true
        } else {
            TransportCounters::bump(&self.shared.counters.packets_dropped);
            debug!("Outbound queue full, request dropped");
            false
        }
    }

    pub fn state(&self) -> LinkState {
        let shared = &self.shared;
        if shared.stop.is_cancelled() {
            LinkState::Stopped
        } else if shared.restarting.load(Ordering::SeqCst) {
            LinkState::Restarting
        } else if shared.started.load(Ordering::SeqCst) {
            LinkState::Running
        } else {
            LinkState::Idle
        }
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Interfaces found by the last `start()`.
    pub fn candidates(&self) -> Vec<InterfaceCandidate> {
        lock(&self.shared.candidates).clone()
    }

    /// Interface address of the live socket, if one is open.
    pub fn bound_interface(&self) -> Option<Ipv4Addr> {
        self.shared.current_session().map(|s| s.interface)
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.shared.counters.snapshot()
    }

    pub fn outbound_len(&self) -> usize {
        self.shared.outbound.len()
    }

    pub fn config(&self) -> &MulticastConfig {
        &self.shared.config
    }
}
