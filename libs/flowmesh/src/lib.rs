// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! flowmesh: a cooperative flow-based programming runtime.
//!
//! A [`core::Graph`] describes a static network of [`core::Component`]s
//! wired together by bounded, ordered [`core::Connection`]s carrying
//! [`core::Packet`]s. A [`core::Executor`] drives that graph to
//! completion, failure, or deadlock. [`core::ControlKind`] and the
//! bracket-stack machinery in [`core::bracket`] layer substream and
//! map-stream structure, and named channels, onto the plain data stream.
//!
//! The `#[component]` attribute macro declares a component's port set at
//! compile time from its struct fields, so [`core::Graph::connect`] and
//! [`core::Graph::set_initial_packet`] can validate port names without a
//! live instance.

// Lets `#[flowmesh_macros::component]`'s generated `::flowmesh::PortDeclaration`
// impl resolve from flowmesh's own unit/integration tests, which exercise the
// macro directly rather than through the `flowmesh::component` re-export.
extern crate self as flowmesh;

pub mod core;

/// Declares a component's port set from `#[input]`/`#[output]`-marked
/// struct fields. See [`core::component::PortDeclaration`].
pub use flowmesh_macros::component;
/// Marks a field as an input port inside `#[component]`.
pub use flowmesh_macros::input;
/// Marks a field as an output port inside `#[component]`.
pub use flowmesh_macros::output;

pub use core::{
    Activity, CancellationToken, Component, ComponentId, ComponentShell, Connection,
    ConnectionControl, ConnectionId, ControlKind, DeadlockEntry, Executor, ExecutorConfig,
    FlowError, Graph, InputPort, Lifecycle, OutputPort, Packet, PortContext, PortDeclaration,
    Received, Result, RunMode, WaitKind, DEFAULT_CHANNEL,
};
