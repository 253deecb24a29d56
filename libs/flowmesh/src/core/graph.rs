// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Static graph description.
//!
//! `Graph` collects components, connections, IIPs, and explicit
//! input/output pairings without constructing any [`crate::core::connection::Connection`];
//! construction is deferred to [`Graph::compile`], run once by
//! [`crate::core::scheduler::Executor::execute`], so that `connect` and
//! `set_initial_packet` calls may arrive in either order and the real
//! default capacity (only known once an `ExecutorConfig` exists) can be
//! applied uniformly.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::component::{Component, ComponentId, PortDeclaration};
use crate::core::connection::{Connection, ConnectionControl};
use crate::core::error::{FlowError, Result};
use crate::core::shell::ComponentShell;

/// Type-erased deferred constructor for one connection's backing
/// [`Connection<T>`], carrying whatever IIPs have been registered for it
/// regardless of whether `connect` or `set_initial_packet` was called
/// first. Analogous in spirit to `erased_serde`'s factory pattern: the
/// concrete `T` is known only at the `connect`/`set_initial_packet` call
/// site, so the graph stores a trait object it can still build from
/// later without naming `T` again.
trait ConnFactory: Send {
    fn build(
        self: Box<Self>,
        label: String,
        capacity: usize,
    ) -> (Arc<dyn Any + Send + Sync>, Arc<dyn ConnectionControl>);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedFactory<T> {
    iips: Vec<T>,
    /// True for an IIP registered on a port that turns out to have no
    /// inbound connection: the connection is built pre-closed so `receive`
    /// drains the IIPs and then observes `END_OF_STREAM`.
    closed: bool,
}

impl<T: Send + 'static> ConnFactory for TypedFactory<T> {
    fn build(
        self: Box<Self>,
        label: String,
        capacity: usize,
    ) -> (Arc<dyn Any + Send + Sync>, Arc<dyn ConnectionControl>) {
        let conn = Connection::with_iips(label, capacity, self.iips);
        if self.closed {
            conn.close();
        }
        (
            conn.clone() as Arc<dyn Any + Send + Sync>,
            conn as Arc<dyn ConnectionControl>,
        )
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ComponentEntry {
    id: ComponentId,
    name: String,
    input_ports: &'static [&'static str],
    output_ports: &'static [&'static str],
    component: Box<dyn Component>,
}

type PortKey = (String, String);

struct ConnectionSpec {
    from: PortKey,
    to: PortKey,
    capacity: Option<usize>,
    factory: Box<dyn ConnFactory>,
}

/// Static description of a flow network: components, their wiring, and
/// any initial information packets, validated incrementally as each call
/// is made and assembled into running [`ComponentShell`]s by
/// [`Graph::compile`].
#[derive(Default)]
pub struct Graph {
    components: Vec<ComponentEntry>,
    connections: Vec<ConnectionSpec>,
    pending_iips: HashMap<PortKey, Box<dyn ConnFactory>>,
    /// Explicit `input port -> output port` pass-through pairings
    /// registered via [`Graph::pair_ports`], keyed by
    /// `(component, input_port)`.
    pair_overrides: HashMap<PortKey, String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Result<&ComponentEntry> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FlowError::UnknownComponent(name.to_string()))
    }

    fn validate_output_port(&self, component: &str, port: &str) -> Result<()> {
        let entry = self.entry(component)?;
        if entry.output_ports.contains(&port) {
            Ok(())
        } else {
            Err(FlowError::UnknownPort {
                component: component.to_string(),
                port: port.to_string(),
            })
        }
    }

    fn validate_input_port(&self, component: &str, port: &str) -> Result<()> {
        let entry = self.entry(component)?;
        if entry.input_ports.contains(&port) {
            Ok(())
        } else {
            Err(FlowError::UnknownPort {
                component: component.to_string(),
                port: port.to_string(),
            })
        }
    }

    /// Adds a component, identified by its own `Component::name()`.
    /// Fails with [`FlowError::DuplicateComponentName`] if that name is
    /// already taken in this graph.
    pub fn add_component<C>(&mut self, component: C) -> Result<ComponentId>
    where
        C: Component + PortDeclaration + 'static,
    {
        let name = component.name().to_string();
        if self.components.iter().any(|c| c.name == name) {
            return Err(FlowError::DuplicateComponentName(name));
        }
        let id = ComponentId::new();
        tracing::info!(component = %name, %id, "component added to graph");
        self.components.push(ComponentEntry {
            id,
            name,
            input_ports: C::INPUT_PORTS,
            output_ports: C::OUTPUT_PORTS,
            component: Box::new(component),
        });
        Ok(id)
    }

    /// Connects `from_port` on `from` to `to_port` on `to` with the
    /// graph's (eventual) default capacity. Both ports must be declared
    /// by their respective components and must not already be connected —
    /// no port may be multiply-connected.
    pub fn connect<T: Send + 'static>(
        &mut self,
        from: &str,
        from_port: &str,
        to: &str,
        to_port: &str,
    ) -> Result<()> {
        self.connect_with_capacity::<T>(from, from_port, to, to_port, None)
    }

    /// As [`Graph::connect`], but pins this connection's FIFO capacity
    /// rather than deferring to [`crate::core::scheduler::ExecutorConfig::default_capacity`]
    /// (used by capacity-1 backpressure tests).
    pub fn connect_with_capacity<T: Send + 'static>(
        &mut self,
        from: &str,
        from_port: &str,
        to: &str,
        to_port: &str,
        capacity: Option<usize>,
    ) -> Result<()> {
        self.validate_output_port(from, from_port)?;
        self.validate_input_port(to, to_port)?;

        let from_key = (from.to_string(), from_port.to_string());
        let to_key = (to.to_string(), to_port.to_string());

        if self.connections.iter().any(|c| c.from == from_key) {
            return Err(FlowError::PortAlreadyConnected {
                component: from.to_string(),
                port: from_port.to_string(),
            });
        }
        if self.connections.iter().any(|c| c.to == to_key) {
            return Err(FlowError::PortAlreadyConnected {
                component: to.to_string(),
                port: to_port.to_string(),
            });
        }

        let iips = match self.pending_iips.remove(&to_key) {
            Some(mut boxed) => {
                let typed = boxed
                    .as_any_mut()
                    .downcast_mut::<TypedFactory<T>>()
                    .ok_or_else(|| FlowError::PortTypeMismatch {
                        component: to.to_string(),
                        port: to_port.to_string(),
                    })?;
                std::mem::take(&mut typed.iips)
            }
            None => Vec::new(),
        };

        tracing::info!(%from, from_port, %to, to_port, "connection wired");
        self.connections.push(ConnectionSpec {
            from: from_key,
            to: to_key,
            capacity,
            factory: Box::new(TypedFactory::<T> { iips, closed: false }),
        });
        Ok(())
    }

    /// Registers an initial information packet on `port`, delivered
    /// before any runtime packet. May be called before or after
    /// the corresponding `connect`, and multiple times to queue several
    /// IIPs in registration order.
    pub fn set_initial_packet<T: Send + 'static>(
        &mut self,
        component: &str,
        port: &str,
        value: T,
    ) -> Result<()> {
        self.validate_input_port(component, port)?;
        let key = (component.to_string(), port.to_string());

        if let Some(spec) = self.connections.iter_mut().find(|c| c.to == key) {
            let typed = spec
                .factory
                .as_any_mut()
                .downcast_mut::<TypedFactory<T>>()
                .ok_or_else(|| FlowError::PortTypeMismatch {
                    component: component.to_string(),
                    port: port.to_string(),
                })?;
            typed.iips.push(value);
            return Ok(());
        }

        let entry = self
            .pending_iips
            .entry(key)
            .or_insert_with(|| Box::new(TypedFactory::<T> { iips: Vec::new(), closed: true }));
        let typed = entry
            .as_any_mut()
            .downcast_mut::<TypedFactory<T>>()
            .ok_or_else(|| FlowError::PortTypeMismatch {
                component: component.to_string(),
                port: port.to_string(),
            })?;
        typed.iips.push(value);
        Ok(())
    }

    /// Explicitly registers `input_port -> output_port` as the
    /// pass-through pairing for foreign control packets arriving on
    /// `input_port`, overriding the "sole output port" default.
    pub fn pair_ports(&mut self, component: &str, input_port: &str, output_port: &str) -> Result<()> {
        self.validate_input_port(component, input_port)?;
        self.validate_output_port(component, output_port)?;
        self.pair_overrides.insert(
            (component.to_string(), input_port.to_string()),
            output_port.to_string(),
        );
        Ok(())
    }

    /// Best-effort static check for obviously-undrivable cycles: a cycle
    /// with no component outside it that can inject a first packet. This
    /// never blocks `compile` — it only logs a warning, deferring the hard
    /// guarantee to runtime deadlock detection.
    fn warn_on_obvious_cycles(&self) {
        use petgraph::algo::tarjan_scc;
        use petgraph::graphmap::DiGraphMap;

        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
        for entry in &self.components {
            g.add_node(entry.name.as_str());
        }
        for spec in &self.connections {
            g.add_edge(spec.from.0.as_str(), spec.to.0.as_str(), ());
        }
        for scc in tarjan_scc(&g) {
            if scc.len() > 1 {
                tracing::warn!(
                    components = ?scc,
                    "graph contains a cycle; if no member has an external source of packets this will deadlock at runtime"
                );
            }
        }
    }

    /// Validates and assembles every component's [`ComponentShell`],
    /// constructing all backing connections with `default_capacity` where
    /// the caller didn't pin one. Consumes the graph: a compiled graph is
    /// frozen and cannot be structurally mutated afterwards.
    pub(crate) fn compile(
        mut self,
        default_capacity: usize,
        default_receive_timeout: Option<Duration>,
    ) -> Result<Vec<(ComponentId, Box<dyn Component>, ComponentShell)>> {
        self.warn_on_obvious_cycles();

        let mut inputs: HashMap<String, HashMap<String, Arc<dyn Any + Send + Sync>>> = HashMap::new();
        let mut outputs: HashMap<String, HashMap<String, Arc<dyn Any + Send + Sync>>> = HashMap::new();
        let mut outputs_control: HashMap<String, HashMap<String, Arc<dyn ConnectionControl>>> =
            HashMap::new();

        for ((component, port), factory) in self.pending_iips.drain() {
            let label = format!("{}.{}", component, port);
            let (any, _control) = factory.build(label, 1);
            inputs.entry(component).or_default().insert(port, any);
        }

        for spec in self.connections.drain(..) {
            let (from_comp, from_port) = spec.from;
            let (to_comp, to_port) = spec.to;
            let capacity = spec.capacity.unwrap_or(default_capacity);
            let label = format!("{}.{} -> {}.{}", from_comp, from_port, to_comp, to_port);
            let (any, control) = spec.factory.build(label, capacity);

            outputs
                .entry(from_comp.clone())
                .or_default()
                .insert(from_port.clone(), any.clone());
            outputs_control
                .entry(from_comp)
                .or_default()
                .insert(from_port, control);
            inputs.entry(to_comp).or_default().insert(to_port, any);
        }

        let mut result = Vec::with_capacity(self.components.len());
        for entry in self.components {
            let name = entry.name;
            let channel = entry.component.channel().to_string();
            let comp_inputs = inputs.remove(&name).unwrap_or_default();
            let comp_outputs = outputs.remove(&name).unwrap_or_default();
            let comp_outputs_control = outputs_control.remove(&name).unwrap_or_default();

            let output_order: Vec<String> = entry
                .output_ports
                .iter()
                .map(|p| p.to_string())
                .filter(|p| comp_outputs_control.contains_key(p))
                .collect();

            let pair_override: HashMap<String, String> = self
                .pair_overrides
                .iter()
                .filter(|((c, _), _)| c == &name)
                .map(|((_, input), output)| (input.clone(), output.clone()))
                .collect();

            tracing::info!(component = %name, %channel, "component compiled");
            let shell = ComponentShell::new(
                name,
                channel,
                comp_inputs,
                comp_outputs,
                comp_outputs_control,
                output_order,
                pair_override,
                default_receive_timeout,
            );
            result.push((entry.id, entry.component, shell));
        }

        Ok(result)
    }
}
