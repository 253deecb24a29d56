// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The cooperative scheduler.
//!
//! Every component runs on its own OS thread for the lifetime of
//! [`Executor::execute`], with no central dispatch loop popping components
//! off a runnable queue. Instead, each thread's only suspension points are
//! the blocking `send`/`receive` calls on
//! [`crate::core::connection::Connection`], coordinated purely through that
//! connection's own mutex/condvar pair, and a single watchdog — run inline
//! by the thread that called `execute` — periodically samples every
//! component's [`crate::core::component::Activity`] to detect quiescence,
//! drive deadlock detection, and enforce the shutdown grace window. No
//! thread ever touches another component's state directly.

use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::component::{Activity, Component, ComponentId, Lifecycle, WaitKind};
use crate::core::connection::{ConnectionControl, ConnectionId};
use crate::core::error::{DeadlockEntry, FlowError, Result};
use crate::core::graph::Graph;
use crate::core::shell::{ComponentShell, PortContext};

/// How many consecutive watchdog ticks must observe the exact same "every
/// non-terminated component is blocked, on the exact same connections" set
/// before a transient scheduling stall is escalated to `DEADLOCK`. A real
/// deadlock is stable forever; three ticks filters out the microsecond-scale
/// races inherent to condvar wakeups between independently scheduled OS
/// threads (e.g. a capacity-1 producer and consumer momentarily both parked
/// between a send completing and the next receive starting).
const DEADLOCK_STABILITY_TICKS: u32 = 3;

/// Tunable scheduler parameters, grouped the way the host crate groups
/// per-subsystem configuration rather than as scattered constructor
/// arguments.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// FIFO capacity used by [`Graph::connect`] when the caller does not
    /// pin one explicitly via `connect_with_capacity`.
    pub default_capacity: usize,
    /// Window given to components to observe cancellation (closed
    /// connections) before the scheduler marks stragglers `ERROR` and
    /// abandons them.
    pub shutdown_grace: Duration,
    /// Default timeout applied to `receive()` calls that don't specify
    /// their own. `None` means block indefinitely.
    pub receive_timeout: Option<Duration>,
    /// Interval between watchdog samples of component activity. Internal
    /// tuning knob, not a correctness parameter; set purely for how quickly
    /// a genuine deadlock is reported without false-positive churn on
    /// ordinary backpressure stalls.
    pub deadlock_poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_capacity: 4,
            shutdown_grace: Duration::from_secs(2),
            receive_timeout: None,
            deadlock_poll_interval: Duration::from_millis(5),
        }
    }
}

/// A cooperative cancellation flag shared between [`Executor::shutdown`]
/// and the watchdog loop inside [`Executor::execute`].
///
/// Cloning shares the same underlying signal: callers may stash a token
/// (e.g. on a signal handler) before calling `execute`, which itself never
/// needs to see it — `Executor::shutdown` and the watchdog share the one
/// embedded in the `Executor`.
#[derive(Clone)]
pub struct CancellationToken(Arc<TokenState>);

struct TokenState {
    cancelled: AtomicBool,
    escalated: AtomicBool,
}

impl CancellationToken {
    fn new() -> Self {
        Self(Arc::new(TokenState {
            cancelled: AtomicBool::new(false),
            escalated: AtomicBool::new(false),
        }))
    }

    /// First shutdown signal: requests cooperative cancellation.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
    }

    /// Second shutdown signal: collapses the grace window so the watchdog
    /// abandons stragglers on its next tick.
    pub fn escalate(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.escalated.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_escalated(&self) -> bool {
        self.0.escalated.load(Ordering::SeqCst)
    }
}

struct ComponentRuntime {
    id: ComponentId,
    name: String,
    lifecycle: Arc<Mutex<Lifecycle>>,
    activity: Arc<Activity>,
    terminated: Arc<AtomicBool>,
    outcome: Arc<Mutex<Option<Result<()>>>>,
    handle: Option<JoinHandle<()>>,
}

/// Drives a compiled [`Graph`] to completion, failure, or deadlock.
///
/// An `Executor` runs a graph exactly once: `execute` takes the graph out
/// of an internal slot on its first call and returns
/// [`FlowError::AlreadyExecuted`] on any subsequent call — a graph is frozen
/// at execution start, with no structural mutation afterwards.
pub struct Executor {
    graph: Mutex<Option<Graph>>,
    config: ExecutorConfig,
    cancellation: CancellationToken,
    all_controls: Mutex<Vec<Arc<dyn ConnectionControl>>>,
}

impl Executor {
    pub fn new(graph: Graph) -> Self {
        Self::with_config(graph, ExecutorConfig::default())
    }

    pub fn with_config(graph: Graph, config: ExecutorConfig) -> Self {
        Self {
            graph: Mutex::new(Some(graph)),
            config,
            cancellation: CancellationToken::new(),
            all_controls: Mutex::new(Vec::new()),
        }
    }

    /// A clone of this executor's cancellation token, so a caller can wire
    /// it to a signal handler or external deadline before calling
    /// `execute`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Requests cooperative shutdown. The first call closes every
    /// connection in the graph — waking every blocked `send`/`receive`
    /// with `CONNECTION_CLOSED`/`END_OF_STREAM` — and starts the
    /// `shutdown_grace` countdown inside `execute`'s watchdog. A second
    /// call escalates: any component still running when the watchdog next
    /// ticks is marked `ERROR` and abandoned immediately, without waiting
    /// out the remainder of the grace window.
    pub fn shutdown(&self) {
        if self.cancellation.is_cancelled() {
            tracing::warn!("second shutdown signal: escalating to hard termination");
            self.cancellation.escalate();
            return;
        }
        tracing::info!("shutdown requested: closing all connections");
        self.cancellation.cancel();
        for ctrl in self.all_controls.lock().iter() {
            ctrl.close();
        }
    }

    /// Runs every component in the graph to completion on its own thread,
    /// blocking the calling thread until the graph reaches quiescence,
    /// a component fails, a deadlock is detected, or shutdown's grace
    /// window elapses.
    pub fn execute(&self) -> Result<()> {
        let graph = self
            .graph
            .lock()
            .take()
            .ok_or(FlowError::AlreadyExecuted)?;

        let compiled = graph.compile(self.config.default_capacity, self.config.receive_timeout)?;

        let mut runtimes = Vec::with_capacity(compiled.len());
        let mut all_controls = Vec::new();

        for (id, component, shell) in compiled {
            let name = shell.name().to_string();
            let lifecycle = Arc::new(Mutex::new(Lifecycle::NotInitialized));
            let terminated = Arc::new(AtomicBool::new(false));
            let outcome: Arc<Mutex<Option<Result<()>>>> = Arc::new(Mutex::new(None));
            let activity = shell.activity();

            all_controls.extend(shell.output_controls());

            let lifecycle_t = lifecycle.clone();
            let terminated_t = terminated.clone();
            let outcome_t = outcome.clone();
            let name_t = name.clone();

            let handle = std::thread::Builder::new()
                .name(format!("flowmesh/{name}"))
                .spawn(move || {
                    let result = run_component(component, shell, &name_t, &lifecycle_t);
                    *outcome_t.lock() = Some(result);
                    terminated_t.store(true, Ordering::SeqCst);
                })
                .expect("failed to spawn component thread");

            runtimes.push(ComponentRuntime {
                id,
                name,
                lifecycle,
                activity,
                terminated,
                outcome,
                handle: Some(handle),
            });
        }

        *self.all_controls.lock() = all_controls;

        tracing::info!(components = runtimes.len(), "executor started");
        self.watch(&mut runtimes)
    }

    /// The watchdog loop: polls every component's activity on
    /// `deadlock_poll_interval`, detects stable all-blocked configurations as
    /// `DEADLOCK`, and enforces the shutdown grace window once `shutdown`
    /// has been called.
    fn watch(&self, runtimes: &mut [ComponentRuntime]) -> Result<()> {
        let mut last_snapshot: AHashMap<ComponentId, Option<(WaitKind, ConnectionId)>> = AHashMap::new();
        let mut stable_ticks = 0u32;
        let mut grace_deadline: Option<Instant> = None;

        loop {
            std::thread::sleep(self.config.deadlock_poll_interval);

            if runtimes.iter().all(|r| r.terminated.load(Ordering::SeqCst)) {
                break;
            }

            if self.cancellation.is_cancelled() {
                let deadline = if self.cancellation.is_escalated() {
                    Instant::now()
                } else {
                    *grace_deadline.get_or_insert_with(|| Instant::now() + self.config.shutdown_grace)
                };
                if Instant::now() >= deadline {
                    self.abandon_stragglers(runtimes);
                    break;
                }
                continue;
            }

            let mut snapshot = AHashMap::with_capacity(runtimes.len());
            let mut all_blocked = true;
            let mut any_live = false;
            for r in runtimes.iter() {
                if r.terminated.load(Ordering::SeqCst) {
                    continue;
                }
                any_live = true;
                let snap = r.activity.snapshot();
                if snap.is_none() {
                    all_blocked = false;
                }
                snapshot.insert(r.id, snap);
            }

            if any_live && all_blocked && snapshot == last_snapshot {
                stable_ticks += 1;
            } else {
                stable_ticks = 0;
                last_snapshot = snapshot;
            }

            if stable_ticks >= DEADLOCK_STABILITY_TICKS {
                let stuck: Vec<DeadlockEntry> = runtimes
                    .iter()
                    .filter(|r| !r.terminated.load(Ordering::SeqCst))
                    .map(|r| DeadlockEntry {
                        component: r.id,
                        connection: r.activity.snapshot().map(|(_, conn)| conn),
                    })
                    .collect();
                let names: Vec<&str> = runtimes
                    .iter()
                    .filter(|r| !r.terminated.load(Ordering::SeqCst))
                    .map(|r| r.name.as_str())
                    .collect();
                tracing::error!(components = ?names, "deadlock detected");
                // Unstick every thread so it can eventually exit on its own;
                // we don't wait for that to happen before returning.
                self.cancellation.cancel();
                for ctrl in self.all_controls.lock().iter() {
                    ctrl.close();
                }
                return Err(FlowError::Deadlock { stuck });
            }
        }

        self.join_and_collect(runtimes)
    }

    fn abandon_stragglers(&self, runtimes: &mut [ComponentRuntime]) {
        for r in runtimes.iter() {
            if r.terminated.load(Ordering::SeqCst) {
                continue;
            }
            tracing::error!(component = %r.name, "abandoned: did not return within shutdown grace period");
            *r.lifecycle.lock() = Lifecycle::Error;
            let mut slot = r.outcome.lock();
            if slot.is_none() {
                *slot = Some(Err(FlowError::ComponentFailed {
                    component: r.name.clone(),
                    source: anyhow::anyhow!(
                        "component did not return before the shutdown grace period elapsed and was abandoned"
                    ),
                }));
            }
        }
    }

    fn join_and_collect(&self, runtimes: &mut [ComponentRuntime]) -> Result<()> {
        let mut first_err = None;
        for r in runtimes.iter_mut() {
            if r.terminated.load(Ordering::SeqCst) {
                if let Some(handle) = r.handle.take() {
                    let _ = handle.join();
                }
            } else {
                // Abandoned: drop the handle without joining so the thread
                // (now racing a closed connection) finishes in the
                // background rather than blocking executor shutdown.
                r.handle.take();
            }
            if let Some(Err(err)) = r.outcome.lock().take() {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => {
                tracing::info!("executor finished: all components terminated");
                Ok(())
            }
        }
    }
}

/// Runs one component on its own thread: `initialize`, then `run`, then
/// teardown. Panics inside either callback are caught and folded into the
/// same `FlowError::ComponentFailed` path as a returned `Err`, so an
/// uncaught component failure always ends the component in `Error`
/// regardless of how it failed.
fn run_component(
    mut component: Box<dyn Component>,
    mut shell: ComponentShell,
    name: &str,
    lifecycle: &Arc<Mutex<Lifecycle>>,
) -> Result<()> {
    *lifecycle.lock() = Lifecycle::Initialized;

    let init_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut ctx = PortContext::new(&mut shell);
        component.initialize(&mut ctx)
    }));

    let run_outcome = match init_result {
        Ok(Ok(())) => {
            *lifecycle.lock() = Lifecycle::Active;
            tracing::info!(component = %name, "initialized");
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut ctx = PortContext::new(&mut shell);
                component.run(&mut ctx)
            }))
        }
        Ok(Err(err)) => Ok(Err(err)),
        Err(payload) => Err(payload),
    };

    // Outputs close regardless of how the component exited: once-through
    // and long-running components alike hand control back to the
    // scheduler only by returning, at which point their outputs close.
    for ctrl in shell.output_controls() {
        ctrl.close();
    }

    let bracket_failure = shell.take_failure();

    let failure = match run_outcome {
        Ok(Ok(())) => bracket_failure,
        Ok(Err(err)) => Some(bracket_failure.unwrap_or(FlowError::ComponentFailed {
            component: name.to_string(),
            source: err,
        })),
        Err(payload) => {
            let message = panic_message(payload);
            Some(bracket_failure.unwrap_or(FlowError::ComponentFailed {
                component: name.to_string(),
                source: anyhow::anyhow!("component panicked: {message}"),
            }))
        }
    };

    match failure {
        Some(err) => {
            *lifecycle.lock() = Lifecycle::Error;
            tracing::error!(component = %name, error = %err, "component failed");
            Err(err)
        }
        None => {
            *lifecycle.lock() = Lifecycle::Terminated;
            tracing::info!(component = %name, "terminated");
            Ok(())
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
