// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The [`Component`] trait, component identity, and lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::connection::ConnectionId;
use crate::core::packet::DEFAULT_CHANNEL;
use crate::core::shell::PortContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "comp-{}", self.0)
    }
}

/// A component's position in the lifecycle state machine.
///
/// `SuspendedSend`/`SuspendedReceive` are reported by the scheduler while
/// a component's thread is parked inside a blocking `send`/`receive`;
/// the component itself only ever observes `Active` via its own thread
/// of control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotInitialized,
    Initialized,
    Active,
    SuspendedSend,
    SuspendedReceive,
    Terminated,
    Error,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Terminated | Lifecycle::Error)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Lifecycle::SuspendedSend | Lifecycle::SuspendedReceive)
    }
}

/// Whether a component's `run` is a single logical step or an internal
/// loop over its inputs.
///
/// Both modes are dispatched identically: the scheduler invokes `run`
/// exactly once and, when it returns, closes the component's outputs and
/// marks it `Terminated` (or `Error`, if `run` failed). `RunMode` carries
/// no scheduling behavior of its own — it is documentation of intent,
/// read by tracing spans and by component authors deciding whether their
/// `run` should loop on `receive()` until `END_OF_STREAM` (`LongRunning`,
/// the canonical shape for non-trivial components) or perform one step
/// and return (`OnceThrough`, a convenience for stateless mappers and
/// single-shot sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    OnceThrough,
    LongRunning,
}

/// The kind of port operation a component's thread is currently blocked
/// in, recorded in its [`Activity`] for deadlock detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Waiting {
    kind: WaitKind,
    connection: ConnectionId,
}

/// A component's live "am I blocked in a port operation right now" flag.
///
/// `Connection` deliberately knows nothing about the scheduler (see its
/// module doc); instead, `InputPort`/`OutputPort` flip this flag to
/// `Some` immediately before calling a blocking connection operation and
/// back to `None` immediately after. The scheduler's watchdog polls every
/// component's `Activity` to detect deadlock — no component runnable and
/// at least one not yet terminated — without the connection layer having
/// to participate.
#[derive(Debug, Default)]
pub struct Activity(Mutex<Option<Waiting>>);

impl Activity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(None)))
    }

    pub(crate) fn enter(&self, kind: WaitKind, connection: ConnectionId) {
        *self.0.lock() = Some(Waiting { kind, connection });
    }

    pub(crate) fn leave(&self) {
        *self.0.lock() = None;
    }

    /// The connection (and direction) this component is currently blocked
    /// on, if any.
    pub fn snapshot(&self) -> Option<(WaitKind, ConnectionId)> {
        self.0.lock().as_ref().map(|w| (w.kind, w.connection))
    }
}

/// Implemented by the `#[flowmesh::component]` macro: records the input
/// and output port names declared on a component struct so the graph can
/// validate `connect`/`set_initial_packet` calls against them without
/// requiring an instance.
pub trait PortDeclaration {
    const INPUT_PORTS: &'static [&'static str];
    const OUTPUT_PORTS: &'static [&'static str];
}

/// A unit of computation in the flow graph.
///
/// Implementors read from [`crate::core::port::InputPort`]s and write to
/// [`crate::core::port::OutputPort`]s obtained from the `ctx` passed to
/// `initialize`/`run`; they never hold ports across calls, since the
/// shell may rebuild the forwarding/pairing table between them.
pub trait Component: Send {
    /// A human-readable, unique name used in error messages and tracing
    /// spans. Graph construction rejects duplicates.
    fn name(&self) -> &str;

    /// The channel this component subscribes to for bracket control
    /// packets on every port. Defaults to [`DEFAULT_CHANNEL`].
    fn channel(&self) -> &str {
        DEFAULT_CHANNEL
    }

    /// Defaults to [`RunMode::OnceThrough`].
    fn run_mode(&self) -> RunMode {
        RunMode::OnceThrough
    }

    /// Called once before the first `run`, after all ports are wired.
    fn initialize(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// The component's unit of work, invoked exactly once regardless of
    /// [`RunMode`]. A `LongRunning` component loops internally on
    /// `receive()` until `END_OF_STREAM`; a `OnceThrough` component
    /// performs one logical step and returns.
    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()>;
}
