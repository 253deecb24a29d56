// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Typed input/output port handles.
//!
//! These are deliberately cheap, short-lived views fetched fresh from a
//! [`crate::core::shell::ComponentShell`] for each `ctx.input::<T>("name")`
//! / `ctx.output::<T>("name")` call; the shell is the long-lived owner of
//! the underlying connection, bracket stack, and pairing table.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::bracket::BracketStack;
use crate::core::component::{Activity, WaitKind};
use crate::core::connection::{Connection, ConnectionControl};
use crate::core::error::{FlowError, Result};
use crate::core::packet::{ControlKind, Packet, Received};

/// An output port bound to the component's subscribed channel. Sending on
/// an unconnected output silently drops the packet.
pub struct OutputPort<T> {
    name: String,
    channel: String,
    conn: Option<Arc<Connection<T>>>,
    activity: Arc<Activity>,
}

impl<T: Send + 'static> OutputPort<T> {
    pub(crate) fn new(
        name: impl Into<String>,
        channel: impl Into<String>,
        conn: Option<Arc<Connection<T>>>,
        activity: Arc<Activity>,
    ) -> Self {
        Self {
            name: name.into(),
            channel: channel.into(),
            conn,
            activity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Sends a data packet on the component's subscribed channel.
    pub fn send(&self, payload: T) -> Result<()> {
        self.send_packet(Packet::data(payload, self.channel.clone()))
    }

    /// Sends `packet` as-is, preserving whatever channel it already
    /// carries (used by components that operate across channels).
    pub fn send_packet(&self, packet: Packet<T>) -> Result<()> {
        match &self.conn {
            Some(conn) => {
                self.activity.enter(WaitKind::Send, conn.id());
                let result = conn.send(packet);
                self.activity.leave();
                result
            }
            None => {
                tracing::debug!(port = %self.name, "send on unconnected output port dropped");
                Ok(())
            }
        }
    }

    /// Opens a substream bracket on the subscribed channel.
    pub fn open(&self) -> Result<()> {
        self.send_packet(Packet::control(ControlKind::Open, self.channel.clone()))
    }

    /// Closes a substream bracket on the subscribed channel.
    pub fn close_bracket(&self) -> Result<()> {
        self.send_packet(Packet::control(ControlKind::Close, self.channel.clone()))
    }

    pub fn map_open(&self) -> Result<()> {
        self.send_packet(Packet::control(ControlKind::MapOpen, self.channel.clone()))
    }

    pub fn map_close(&self) -> Result<()> {
        self.send_packet(Packet::control(ControlKind::MapClose, self.channel.clone()))
    }

    pub fn switch(&self, namespace: impl Into<String>) -> Result<()> {
        self.send_packet(Packet::control(
            ControlKind::Switch(namespace.into()),
            self.channel.clone(),
        ))
    }
}

/// An input port bound to the component's subscribed channel.
///
/// `receive_packet` implements the channel-filtering rule
/// directly: data packets and subscribed-channel control packets are
/// returned to the caller (the latter after updating the shared bracket
/// stack); foreign-channel control packets are forwarded on the resolved
/// pair output port and the loop continues without surfacing them.
/// `receive` additionally skips subscribed-channel control packets,
/// returning only data (or `END_OF_STREAM`/`TIMEOUT`).
pub struct InputPort<T> {
    name: String,
    component: String,
    channel: String,
    conn: Arc<Connection<T>>,
    bracket: Arc<Mutex<BracketStack>>,
    forward_to: Option<Arc<dyn ConnectionControl>>,
    failure: Arc<Mutex<Option<FlowError>>>,
    activity: Arc<Activity>,
    /// Applied by plain `receive`/`receive_packet` when the call doesn't
    /// name its own timeout, per `ExecutorConfig::receive_timeout`.
    default_timeout: Option<Duration>,
}

impl<T: Send + 'static> InputPort<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: impl Into<String>,
        component: impl Into<String>,
        channel: impl Into<String>,
        conn: Arc<Connection<T>>,
        bracket: Arc<Mutex<BracketStack>>,
        forward_to: Option<Arc<dyn ConnectionControl>>,
        failure: Arc<Mutex<Option<FlowError>>>,
        activity: Arc<Activity>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            component: component.into(),
            channel: channel.into(),
            conn,
            bracket,
            forward_to,
            failure,
            activity,
            default_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        !self.conn.is_closed() || !self.conn.is_drained()
    }

    pub fn receive_packet(&self) -> Received<T> {
        self.receive_packet_inner(None)
    }

    pub fn receive_packet_timeout(&self, timeout: Duration) -> Received<T> {
        self.receive_packet_inner(Some(timeout))
    }

    /// Convenience accessor that skips subscribed-channel control
    /// packets, returning only data, `END_OF_STREAM`, or `TIMEOUT`.
    pub fn receive(&self) -> Received<T> {
        loop {
            match self.receive_packet() {
                Received::Packet(p) if p.is_control() => continue,
                other => return other,
            }
        }
    }

    pub fn receive_timeout(&self, timeout: Duration) -> Received<T> {
        loop {
            match self.receive_packet_timeout(timeout) {
                Received::Packet(p) if p.is_control() => continue,
                other => return other,
            }
        }
    }

    fn receive_packet_inner(&self, timeout: Option<Duration>) -> Received<T> {
        let timeout = timeout.or(self.default_timeout);
        loop {
            self.activity.enter(WaitKind::Receive, self.conn.id());
            let received = match timeout {
                Some(d) => self.conn.receive_timeout(Some(d)),
                None => self.conn.receive(),
            };
            self.activity.leave();
            match received {
                Received::Packet(p) => {
                    if p.is_data() {
                        return Received::Packet(p);
                    }
                    let kind = p.kind().expect("control packet carries a kind").clone();
                    if p.channel() == self.channel {
                        tracing::debug!(
                            component = %self.component,
                            port = %self.name,
                            channel = %self.channel,
                            kind = ?kind,
                            "bracket control packet"
                        );
                        let mut stack = self.bracket.lock();
                        if let Err(err) = stack.apply(&kind, &self.component, &self.channel) {
                            drop(stack);
                            tracing::error!(component = %self.component, error = %err, "bracket violation");
                            self.fail(err);
                            return Received::EndOfStream;
                        }
                        return Received::Packet(p);
                    } else {
                        tracing::debug!(
                            component = %self.component,
                            port = %self.name,
                            foreign_channel = %p.channel(),
                            "forwarding foreign control packet"
                        );
                        match &self.forward_to {
                            Some(out) => {
                                self.activity.enter(WaitKind::Send, out.id());
                                let send_result = out.send_control(kind, p.channel().to_string());
                                self.activity.leave();
                                if let Err(err) = send_result {
                                    tracing::warn!(component = %self.component, error = %err, "foreign control forward failed");
                                    self.fail(err);
                                    return Received::EndOfStream;
                                }
                            }
                            None => {
                                tracing::warn!(
                                    component = %self.component,
                                    port = %self.name,
                                    channel = %p.channel(),
                                    "foreign control packet dropped: no paired output port"
                                );
                            }
                        }
                        continue;
                    }
                }
                Received::EndOfStream => {
                    let stack = self.bracket.lock();
                    if let Err(err) = stack.finish(&self.component, &self.channel) {
                        drop(stack);
                        tracing::error!(component = %self.component, error = %err, "unclosed brackets at end of stream");
                        self.fail(err);
                    }
                    return Received::EndOfStream;
                }
                Received::Timeout => return Received::Timeout,
            }
        }
    }

    fn fail(&self, err: FlowError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}
