// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The core FBP runtime: packets, connections, ports, the component
//! lifecycle, the graph builder, and the cooperative scheduler.

pub mod bracket;
pub mod component;
pub mod connection;
pub mod error;
pub mod graph;
pub mod packet;
pub mod port;
pub mod scheduler;
pub mod shell;

pub use component::{Activity, Component, ComponentId, Lifecycle, PortDeclaration, RunMode, WaitKind};
pub use connection::{Connection, ConnectionControl, ConnectionId};
pub use error::{DeadlockEntry, FlowError, Result};
pub use graph::Graph;
pub use packet::{ControlKind, Packet, Received, DEFAULT_CHANNEL};
pub use port::{InputPort, OutputPort};
pub use scheduler::{CancellationToken, Executor, ExecutorConfig};
pub use shell::{ComponentShell, PortContext};
