// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Error types for flowmesh.
//!
//! Defines the core error taxonomy used throughout the runtime: graph
//! construction errors, bracket/channel violations, connection errors, and
//! the terminal scheduler outcomes (`DEADLOCK`, component `ERROR`).

use thiserror::Error;

use crate::core::component::ComponentId;
use crate::core::connection::ConnectionId;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("port '{port}' on component '{component}' is already connected")]
    PortAlreadyConnected { component: String, port: String },

    #[error("component '{component}' has no port named '{port}'")]
    UnknownPort { component: String, port: String },

    #[error("no component named '{0}' in this graph")]
    UnknownComponent(String),

    #[error("port '{port}' on component '{component}' was wired with a different payload type than this call uses")]
    PortTypeMismatch { component: String, port: String },

    #[error("duplicate component name: '{0}'")]
    DuplicateComponentName(String),

    #[error("unbalanced CLOSE on component '{component}' channel '{channel}': stack top is not SUBSTREAM")]
    UnbalancedClose { component: String, channel: String },

    #[error("unbalanced MAP_CLOSE on component '{component}' channel '{channel}': stack top is not MAP")]
    UnbalancedMapClose { component: String, channel: String },

    #[error("SWITCH outside MAP on component '{component}' channel '{channel}'")]
    SwitchOutsideMap { component: String, channel: String },

    #[error("unclosed brackets on component '{component}' channel '{channel}' at end of stream")]
    UnclosedBrackets { component: String, channel: String },

    #[error("send on closed connection {0}")]
    ConnectionClosed(ConnectionId),

    #[error("component '{component}' failed")]
    ComponentFailed {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("deadlock: stuck components {stuck:?}")]
    Deadlock { stuck: Vec<DeadlockEntry> },

    #[error("executor already executed this graph")]
    AlreadyExecuted,
}

/// One entry in a `DEADLOCK` report: a stuck component and the connection
/// it is blocked on, per the naming requirement in the concurrency model.
#[derive(Debug, Clone)]
pub struct DeadlockEntry {
    pub component: ComponentId,
    pub connection: Option<ConnectionId>,
}

/// Result type that uses FlowError
pub type Result<T> = std::result::Result<T, FlowError>;
