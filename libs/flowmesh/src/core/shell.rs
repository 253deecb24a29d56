// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! [`ComponentShell`]: the long-lived per-component state the scheduler
//! builds from a compiled [`crate::core::graph::Graph`], and
//! [`PortContext`]: the handle a [`crate::core::component::Component`]
//! uses to fetch typed ports from it.
//!
//! Ports are heterogeneous across a component (an `InputPort<String>`
//! next to an `OutputPort<Detection>`), but the `#[flowmesh::component]`
//! macro records only port *names*, not their payload types. The shell
//! resolves this by storing each port's connection type-erased behind
//! `Arc<dyn Any + Send + Sync>` and downcasting on `ctx.input::<T>(name)`
//! / `ctx.output::<T>(name)` — the same type that was used to wire the
//! port in `Graph::connect::<T>` or to declare its IIPs in
//! `Graph::set_initial_packet::<T>`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::bracket::BracketStack;
use crate::core::component::Activity;
use crate::core::connection::{Connection, ConnectionControl};
use crate::core::error::FlowError;
use crate::core::port::{InputPort, OutputPort};

/// Per-component state built once by [`crate::core::graph::Graph::compile`]
/// and owned for the lifetime of the component's dispatch thread.
pub struct ComponentShell {
    name: String,
    channel: String,
    bracket: Arc<Mutex<BracketStack>>,
    failure: Arc<Mutex<Option<FlowError>>>,
    activity: Arc<Activity>,
    inputs: HashMap<String, Arc<dyn Any + Send + Sync>>,
    outputs: HashMap<String, Arc<dyn Any + Send + Sync>>,
    outputs_control: HashMap<String, Arc<dyn ConnectionControl>>,
    output_order: Vec<String>,
    pair_override: HashMap<String, String>,
    default_receive_timeout: Option<Duration>,
    terminated: bool,
}

impl ComponentShell {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        channel: String,
        inputs: HashMap<String, Arc<dyn Any + Send + Sync>>,
        outputs: HashMap<String, Arc<dyn Any + Send + Sync>>,
        outputs_control: HashMap<String, Arc<dyn ConnectionControl>>,
        output_order: Vec<String>,
        pair_override: HashMap<String, String>,
        default_receive_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name,
            channel,
            bracket: Arc::new(Mutex::new(BracketStack::new())),
            failure: Arc::new(Mutex::new(None)),
            activity: Activity::new(),
            inputs,
            outputs,
            outputs_control,
            output_order,
            pair_override,
            default_receive_timeout,
            terminated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub(crate) fn activity(&self) -> Arc<Activity> {
        self.activity.clone()
    }

    /// Every output connection's control surface, used by the scheduler to
    /// close this component's outputs on termination or failure.
    pub(crate) fn output_controls(&self) -> Vec<Arc<dyn ConnectionControl>> {
        self.outputs_control.values().cloned().collect()
    }

    /// Takes the first bracket/channel violation recorded by any input
    /// port, if one occurred. Checked by the scheduler after `run` returns:
    /// a bracket violation ends the component in `Error` even if `run`
    /// itself returned `Ok`.
    pub(crate) fn take_failure(&self) -> Option<FlowError> {
        self.failure.lock().take()
    }

    fn get_or_create_input<T: Send + 'static>(&mut self, name: &str) -> Arc<Connection<T>> {
        if let Some(existing) = self.inputs.get(name) {
            return existing
                .clone()
                .downcast::<Connection<T>>()
                .unwrap_or_else(|_| {
                    panic!(
                        "input port '{}' on component '{}' requested with a payload type that doesn't match how it was wired",
                        name, self.name
                    )
                });
        }
        // Declared but neither wired nor seeded with IIPs: an input port
        // with no inbound connection observes end-of-stream immediately.
        let conn: Arc<Connection<T>> = Connection::new(format!("{}.{}", self.name, name), 1);
        conn.close();
        self.inputs
            .insert(name.to_string(), conn.clone() as Arc<dyn Any + Send + Sync>);
        conn
    }

    fn get_output<T: Send + 'static>(&self, name: &str) -> Option<Arc<Connection<T>>> {
        self.outputs.get(name).map(|erased| {
            erased.clone().downcast::<Connection<T>>().unwrap_or_else(|_| {
                panic!(
                    "output port '{}' on component '{}' requested with a payload type that doesn't match how it was wired",
                    name, self.name
                )
            })
        })
    }

    /// Resolves the matching downstream output port for foreign-control
    /// pass-through on `input_name`: an explicit override registered via
    /// `Graph::pair_ports`, else the component's sole output port if it has
    /// exactly one, else `None` (ambiguous — the packet is dropped with a
    /// warning at the point of forwarding).
    fn resolve_pair(&self, input_name: &str) -> Option<Arc<dyn ConnectionControl>> {
        if let Some(out_name) = self.pair_override.get(input_name) {
            return self.outputs_control.get(out_name).cloned();
        }
        if self.output_order.len() == 1 {
            return self.outputs_control.get(&self.output_order[0]).cloned();
        }
        None
    }
}

/// The handle a [`crate::core::component::Component`] uses, inside
/// `initialize`/`run`, to fetch typed ports and to cooperate with the
/// scheduler.
pub struct PortContext<'a> {
    shell: &'a mut ComponentShell,
}

impl<'a> PortContext<'a> {
    pub(crate) fn new(shell: &'a mut ComponentShell) -> Self {
        Self { shell }
    }

    pub fn component_name(&self) -> &str {
        self.shell.name()
    }

    pub fn channel(&self) -> &str {
        self.shell.channel()
    }

    /// Fetches a fresh, cheap [`InputPort`] view bound to `name`. `T` must
    /// match whichever type this port was wired (`Graph::connect::<T>`)
    /// or seeded (`Graph::set_initial_packet::<T>`) with; a mismatch is a
    /// component authoring bug and panics.
    pub fn input<T: Send + 'static>(&mut self, name: &str) -> InputPort<T> {
        let component = self.shell.name.clone();
        let channel = self.shell.channel.clone();
        let conn = self.shell.get_or_create_input::<T>(name);
        let forward_to = self.shell.resolve_pair(name);
        InputPort::new(
            name,
            component,
            channel,
            conn,
            self.shell.bracket.clone(),
            forward_to,
            self.shell.failure.clone(),
            self.shell.activity.clone(),
            self.shell.default_receive_timeout,
        )
    }

    /// Fetches a fresh, cheap [`OutputPort`] view bound to `name`. If the
    /// port was never wired by `Graph::connect`, the returned port is
    /// unconnected: `send` silently drops.
    pub fn output<T: Send + 'static>(&mut self, name: &str) -> OutputPort<T> {
        let channel = self.shell.channel.clone();
        let conn = self.shell.get_output::<T>(name);
        OutputPort::new(name, channel, conn, self.shell.activity.clone())
    }

    /// Voluntary cooperative yield point for a component doing external
    /// I/O that isn't itself a port operation. Does not block.
    pub fn suspend(&self) {
        std::thread::yield_now();
    }

    /// Requests early termination: recorded for diagnostics, but the
    /// scheduler still waits for `run` to return before tearing the
    /// component down — there is no asynchronous interruption of running
    /// component code.
    pub fn terminate(&mut self) {
        self.shell.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.shell.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionControl;

    fn shell(name: &str) -> ComponentShell {
        ComponentShell::new(
            name.to_string(),
            "default".to_string(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            Vec::new(),
            HashMap::new(),
            None,
        )
    }

    #[test]
    fn unwired_input_port_is_immediately_end_of_stream() {
        let mut s = shell("c");
        let mut ctx = PortContext::new(&mut s);
        let input = ctx.input::<i32>("in");
        assert!(input.receive().is_end_of_stream());
    }

    #[test]
    fn unwired_output_port_drops_silently() {
        let mut s = shell("c");
        let mut ctx = PortContext::new(&mut s);
        let output = ctx.output::<i32>("out");
        assert!(!output.is_connected());
        output.send(1).unwrap();
    }

    #[test]
    fn sole_output_port_is_the_default_pairing_target() {
        let conn: Arc<Connection<i32>> = Connection::new("out", 4);
        let mut outputs: HashMap<String, Arc<dyn Any + Send + Sync>> = HashMap::new();
        outputs.insert("out".to_string(), conn.clone() as Arc<dyn Any + Send + Sync>);
        let mut outputs_control: HashMap<String, Arc<dyn ConnectionControl>> = HashMap::new();
        outputs_control.insert("out".to_string(), conn.clone() as Arc<dyn ConnectionControl>);

        let s = ComponentShell::new(
            "c".to_string(),
            "default".to_string(),
            HashMap::new(),
            outputs,
            outputs_control,
            vec!["out".to_string()],
            HashMap::new(),
            None,
        );

        assert!(s.resolve_pair("in").is_some());
    }
}
