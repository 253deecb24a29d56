// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Packets: the immutable envelope carried by every connection.
//!
//! A packet is either a data packet (an opaque payload) or a control packet
//! (one of the bracket/channel markers). `END_OF_STREAM` is deliberately
//! absent from this type: it is never enqueued, only synthesized by the
//! receive path once a connection is closed and drained (see
//! [`crate::core::connection`] and [`Received`]).

pub const DEFAULT_CHANNEL: &str = "default";

/// The kind of a control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Begin a substream.
    Open,
    /// End a substream.
    Close,
    /// Begin a map stream.
    MapOpen,
    /// End a map stream.
    MapClose,
    /// Set the active namespace of the innermost enclosing map.
    Switch(String),
}

#[derive(Debug, Clone)]
enum Body<T> {
    Data(T),
    Control(ControlKind),
}

/// An immutable packet travelling on a connection.
#[derive(Debug, Clone)]
pub struct Packet<T> {
    body: Body<T>,
    channel: String,
}

impl<T> Packet<T> {
    /// Builds a data packet carrying `payload` on `channel`.
    pub fn data(payload: T, channel: impl Into<String>) -> Self {
        Self {
            body: Body::Data(payload),
            channel: channel.into(),
        }
    }

    /// Builds a data packet on the default channel.
    pub fn data_default(payload: T) -> Self {
        Self::data(payload, DEFAULT_CHANNEL)
    }

    /// Builds a control packet of `kind` on `channel`.
    pub fn control(kind: ControlKind, channel: impl Into<String>) -> Self {
        Self {
            body: Body::Control(kind),
            channel: channel.into(),
        }
    }

    /// Builds a control packet of `kind` on the default channel.
    pub fn control_default(kind: ControlKind) -> Self {
        Self::control(kind, DEFAULT_CHANNEL)
    }

    pub fn is_data(&self) -> bool {
        matches!(self.body, Body::Data(_))
    }

    pub fn is_control(&self) -> bool {
        matches!(self.body, Body::Control(_))
    }

    /// The control kind, if this is a control packet.
    pub fn kind(&self) -> Option<&ControlKind> {
        match &self.body {
            Body::Control(kind) => Some(kind),
            Body::Data(_) => None,
        }
    }

    /// The payload, if this is a data packet.
    pub fn payload(&self) -> Option<&T> {
        match &self.body {
            Body::Data(payload) => Some(payload),
            Body::Control(_) => None,
        }
    }

    /// Consumes the packet, returning the payload if it is a data packet.
    pub fn into_payload(self) -> Option<T> {
        match self.body {
            Body::Data(payload) => Some(payload),
            Body::Control(_) => None,
        }
    }

    /// The `SWITCH` argument, if this is a `SWITCH(name)` control packet.
    pub fn arg(&self) -> Option<&str> {
        match &self.body {
            Body::Control(ControlKind::Switch(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// The outcome of a receive operation: a packet, the end-of-stream
/// sentinel, or a timeout. Modeled as a tagged variant of the receive
/// result rather than a magic value carried on the wire.
#[derive(Debug, Clone)]
pub enum Received<T> {
    Packet(Packet<T>),
    /// Synthesized once a connection has been closed and fully drained.
    EndOfStream,
    /// The receive's configured timeout elapsed before anything arrived.
    Timeout,
}

impl<T> Received<T> {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Received::EndOfStream)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Received::Timeout)
    }

    pub fn packet(self) -> Option<Packet<T>> {
        match self {
            Received::Packet(p) => Some(p),
            _ => None,
        }
    }
}
