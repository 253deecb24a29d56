// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bounded point-to-point FIFO connecting one output port to one input
//! port.
//!
//! A connection is self-contained and independently testable: it knows
//! nothing about the scheduler, only about enqueue order, capacity, IIP
//! draining, and closure. The [`crate::core::scheduler`] layer additionally
//! records, in its own shared registry, which component is parked in which
//! call — one thread per component, each blocked only on its own send/receive
//! calls — so that deadlock can be detected centrally without this type
//! needing to know about components at all.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::error::{FlowError, Result};
use crate::core::packet::{ControlKind, Packet, Received};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct State<T> {
    queue: VecDeque<Packet<T>>,
    iips: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// A bounded FIFO between exactly one output port and one input port.
///
/// `send` blocks the calling thread while the queue is at capacity;
/// `receive` blocks while the queue is empty and the connection is open.
/// Both wake promptly on the counterpart operation or on `close`.
pub struct Connection<T> {
    id: ConnectionId,
    label: String,
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T: Send + 'static> Connection<T> {
    pub fn new(label: impl Into<String>, capacity: usize) -> Arc<Self> {
        Self::with_iips(label, capacity, Vec::new())
    }

    pub fn with_iips(label: impl Into<String>, capacity: usize, iips: Vec<T>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            label: label.into(),
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity.max(1)),
                iips: iips.into(),
                capacity: capacity.max(1),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    /// A pre-closed connection carrying only IIPs: models an input port
    /// with IIPs configured and no inbound connection — a sink like this
    /// yields all its IIPs, then END_OF_STREAM.
    pub fn closed_with_iips(label: impl Into<String>, iips: Vec<T>) -> Arc<Self> {
        let conn = Self::with_iips(label, 1, iips);
        conn.close();
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// True when the queue currently holds no buffered packets and no
    /// IIPs remain — used by the scheduler to decide whether a blocked
    /// receiver can be woken with a synthesized `END_OF_STREAM`.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.iips.is_empty()
    }

    /// Enqueues `packet`, blocking while the queue is full. Fails with
    /// [`FlowError::ConnectionClosed`] if the connection was already
    /// closed by its sender.
    pub fn send(&self, packet: Packet<T>) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(FlowError::ConnectionClosed(self.id));
            }
            if state.queue.len() < state.capacity {
                state.queue.push_back(packet);
                self.not_empty.notify_all();
                return Ok(());
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Non-blocking best-effort send, used for unconnected-output silent
    /// drop and foreign control-packet forwarding. Returns `Ok(false)`
    /// instead of blocking when the queue is full.
    pub fn try_send(&self, packet: Packet<T>) -> Result<bool> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FlowError::ConnectionClosed(self.id));
        }
        if state.queue.len() < state.capacity {
            state.queue.push_back(packet);
            self.not_empty.notify_all();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Dequeues the next item of interest: an IIP first (in registration
    /// order), then queued packets, then `END_OF_STREAM` once closed and
    /// drained. Blocks indefinitely while empty and open.
    pub fn receive(&self) -> Received<T> {
        self.receive_timeout(None)
    }

    pub fn receive_timeout(&self, timeout: Option<Duration>) -> Received<T> {
        let mut state = self.state.lock();
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if let Some(iip) = state.iips.pop_front() {
                return Received::Packet(Packet::data_default(iip));
            }
            if let Some(packet) = state.queue.pop_front() {
                self.not_full.notify_all();
                return Received::Packet(packet);
            }
            if state.closed {
                return Received::EndOfStream;
            }
            match deadline {
                None => self.not_empty.wait(&mut state),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Received::Timeout;
                    }
                    let timed_out = self.not_empty.wait_for(&mut state, d - now).timed_out();
                    if timed_out
                        && state.queue.is_empty()
                        && state.iips.is_empty()
                        && !state.closed
                    {
                        return Received::Timeout;
                    }
                }
            }
        }
    }

    /// Idempotent. Subsequent sends fail with `CONNECTION_CLOSED`;
    /// buffered packets and IIPs still drain normally before `receive`
    /// starts returning `END_OF_STREAM`.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Type-erased connection control surface, kept alongside the typed
/// `Arc<Connection<T>>` in a component's port tables so the shell can
/// close every output on termination, and forward foreign control
/// packets, without knowing each port's payload type (control packets
/// never carry a payload, so no `T` is needed to move them).
pub trait ConnectionControl: Send + Sync {
    fn id(&self) -> ConnectionId;
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn send_control(&self, kind: ControlKind, channel: String) -> Result<()>;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

impl<T: Send + 'static> ConnectionControl for Connection<T> {
    fn id(&self) -> ConnectionId {
        Connection::id(self)
    }

    fn close(&self) {
        Connection::close(self)
    }

    fn is_closed(&self) -> bool {
        Connection::is_closed(self)
    }

    fn send_control(&self, kind: ControlKind, channel: String) -> Result<()> {
        // Forwarding is itself a port-send operation and may legitimately
        // block (and be deadlock-detected) like any other send — dropping
        // a foreign control packet under backpressure would violate the
        // "forwarded unchanged and in order" guarantee.
        self.send(Packet::control(kind, channel))
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}
