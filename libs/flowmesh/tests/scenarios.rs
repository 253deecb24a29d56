// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end bracket, map-stream, channel, and backpressure scenarios,
//! driven through a real `Graph` and `Executor` rather than a single
//! connection or port in isolation (those live in the relevant module's
//! own `#[cfg(test)]` block).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flowmesh::core::component::RunMode;
use flowmesh::core::packet::Received;
use flowmesh::{Component, ControlKind, Executor, Graph, Packet, PortContext};

mod common;

/// A bracket-delimited tree, as reconstructed from `OPEN`/`CLOSE` framing
/// on a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tree {
    Leaf(String),
    Sub(Vec<Tree>),
}

#[flowmesh::component]
struct BracketedSource {
    name: String,
    #[flowmesh::output]
    out: (),
}

impl Component for BracketedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let out = ctx.output::<String>("out");
        out.send("1".to_string())?;
        out.send("2".to_string())?;
        out.open()?;
        out.send("a".to_string())?;
        out.close_bracket()?;
        out.send("3".to_string())?;
        out.open()?;
        out.send("b".to_string())?;
        out.send("c".to_string())?;
        out.close_bracket()?;
        out.send("4".to_string())?;
        out.send("5".to_string())?;
        out.open()?;
        out.send("d".to_string())?;
        out.close_bracket()?;
        Ok(())
    }
}

#[flowmesh::component]
struct TreeSink {
    name: String,
    #[flowmesh::input]
    input: (),
    result: Arc<Mutex<Vec<Tree>>>,
}

impl Component for TreeSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_mode(&self) -> RunMode {
        RunMode::LongRunning
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let input = ctx.input::<String>("input");
        let mut stack: Vec<Vec<Tree>> = vec![Vec::new()];
        loop {
            match input.receive_packet() {
                Received::Packet(p) if p.is_data() => {
                    stack
                        .last_mut()
                        .expect("root level always present")
                        .push(Tree::Leaf(p.into_payload().unwrap()));
                }
                Received::Packet(p) => match p.kind().unwrap() {
                    ControlKind::Open => stack.push(Vec::new()),
                    ControlKind::Close => {
                        let finished = stack.pop().expect("matched by BracketStack already");
                        stack.last_mut().unwrap().push(Tree::Sub(finished));
                    }
                    other => panic!("unexpected control kind in bracketed stream: {other:?}"),
                },
                Received::EndOfStream => break,
                Received::Timeout => unreachable!(),
            }
        }
        assert_eq!(stack.len(), 1, "brackets must be fully closed by end of stream");
        *self.result.lock().unwrap() = stack.into_iter().next().unwrap();
        Ok(())
    }
}

#[test]
fn bracketed_substreams_reconstruct_nested_structure() {
    common::init_tracing();
    let result = Arc::new(Mutex::new(Vec::new()));
    let mut graph = Graph::new();
    graph
        .add_component(BracketedSource { name: "source".into(), out: () })
        .unwrap();
    graph
        .add_component(TreeSink {
            name: "sink".into(),
            input: (),
            result: result.clone(),
        })
        .unwrap();
    graph.connect::<String>("source", "out", "sink", "input").unwrap();

    Executor::new(graph).execute().unwrap();

    let expected = vec![
        Tree::Leaf("1".into()),
        Tree::Leaf("2".into()),
        Tree::Sub(vec![Tree::Leaf("a".into())]),
        Tree::Leaf("3".into()),
        Tree::Sub(vec![Tree::Leaf("b".into()), Tree::Leaf("c".into())]),
        Tree::Leaf("4".into()),
        Tree::Leaf("5".into()),
        Tree::Sub(vec![Tree::Leaf("d".into())]),
    ];
    assert_eq!(*result.lock().unwrap(), expected);
}

#[flowmesh::component]
struct MapSource {
    name: String,
    #[flowmesh::output]
    out: (),
}

impl Component for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let out = ctx.output::<String>("out");
        out.map_open()?;
        out.switch("num")?;
        out.send("1".to_string())?;
        out.send("2".to_string())?;
        out.switch("alpha")?;
        out.send("a".to_string())?;
        out.switch("num")?;
        out.send("3".to_string())?;
        out.switch("alpha")?;
        out.send("b".to_string())?;
        out.send("c".to_string())?;
        out.switch("num")?;
        out.send("4".to_string())?;
        out.send("5".to_string())?;
        out.switch("alpha")?;
        out.send("d".to_string())?;
        out.map_close()?;
        Ok(())
    }
}

#[flowmesh::component]
struct NamespaceSink {
    name: String,
    #[flowmesh::input]
    input: (),
    result: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl Component for NamespaceSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_mode(&self) -> RunMode {
        RunMode::LongRunning
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let input = ctx.input::<String>("input");
        let mut active: Option<String> = None;
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        loop {
            match input.receive_packet() {
                Received::Packet(p) if p.is_data() => {
                    let ns = active.clone().expect("SWITCH always precedes data in this fixture");
                    groups.entry(ns).or_default().push(p.into_payload().unwrap());
                }
                Received::Packet(p) => match p.kind().unwrap() {
                    ControlKind::MapOpen | ControlKind::MapClose => {}
                    ControlKind::Switch(name) => active = Some(name.clone()),
                    other => panic!("unexpected control kind in map stream: {other:?}"),
                },
                Received::EndOfStream => break,
                Received::Timeout => unreachable!(),
            }
        }
        *self.result.lock().unwrap() = groups;
        Ok(())
    }
}

#[test]
fn map_stream_groups_packets_by_active_namespace() {
    common::init_tracing();
    let result = Arc::new(Mutex::new(HashMap::new()));
    let mut graph = Graph::new();
    graph
        .add_component(MapSource { name: "source".into(), out: () })
        .unwrap();
    graph
        .add_component(NamespaceSink {
            name: "sink".into(),
            input: (),
            result: result.clone(),
        })
        .unwrap();
    graph.connect::<String>("source", "out", "sink", "input").unwrap();

    Executor::new(graph).execute().unwrap();

    let got = result.lock().unwrap().clone();
    assert_eq!(got.get("num").cloned(), Some(vec!["1", "2", "3", "4", "5"].into_iter().map(String::from).collect()));
    assert_eq!(got.get("alpha").cloned(), Some(vec!["a", "b", "c", "d"].into_iter().map(String::from).collect()));
}

/// Emits the merged bracketed-substream (default channel) and map-stream
/// (alphanum channel) overlays on the same data stream, for dual-channel
/// passthrough.
#[flowmesh::component]
struct DualChannelSource {
    name: String,
    #[flowmesh::output]
    out: (),
}

impl Component for DualChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let out = ctx.output::<String>("out");
        let alphanum = |kind: ControlKind| Packet::control(kind, "alphanum");

        out.send_packet(alphanum(ControlKind::MapOpen))?;
        out.send_packet(alphanum(ControlKind::Switch("num".into())))?;
        out.send("1".to_string())?;
        out.send("2".to_string())?;
        out.send_packet(alphanum(ControlKind::Switch("alpha".into())))?;
        out.open()?;
        out.send("a".to_string())?;
        out.close_bracket()?;
        out.send_packet(alphanum(ControlKind::Switch("num".into())))?;
        out.send("3".to_string())?;
        out.send_packet(alphanum(ControlKind::Switch("alpha".into())))?;
        out.open()?;
        out.send("b".to_string())?;
        out.send("c".to_string())?;
        out.close_bracket()?;
        out.send_packet(alphanum(ControlKind::Switch("num".into())))?;
        out.send("4".to_string())?;
        out.send("5".to_string())?;
        out.send_packet(alphanum(ControlKind::Switch("alpha".into())))?;
        out.open()?;
        out.send("d".to_string())?;
        out.close_bracket()?;
        out.send_packet(alphanum(ControlKind::MapClose))?;
        Ok(())
    }
}

/// Subscribed to `default`: builds the bracketed-substream tree from its own channel's
/// brackets and transparently relays every data packet (and, via the
/// automatic foreign-control forwarding in `InputPort`, every `alphanum`
/// control packet) to its sole output port, unchanged and in order.
#[flowmesh::component]
struct DefaultChannelRelay {
    name: String,
    #[flowmesh::input]
    input: (),
    #[flowmesh::output]
    output: (),
    tree: Arc<Mutex<Vec<Tree>>>,
}

impl Component for DefaultChannelRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_mode(&self) -> RunMode {
        RunMode::LongRunning
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let input = ctx.input::<String>("input");
        let output = ctx.output::<String>("output");
        let mut stack: Vec<Vec<Tree>> = vec![Vec::new()];
        loop {
            match input.receive_packet() {
                Received::Packet(p) if p.is_data() => {
                    let payload = p.into_payload().unwrap();
                    stack.last_mut().unwrap().push(Tree::Leaf(payload.clone()));
                    output.send(payload)?;
                }
                Received::Packet(p) => match p.kind().unwrap() {
                    ControlKind::Open => stack.push(Vec::new()),
                    ControlKind::Close => {
                        let finished = stack.pop().unwrap();
                        stack.last_mut().unwrap().push(Tree::Sub(finished));
                    }
                    other => panic!("unexpected control kind on default channel: {other:?}"),
                },
                Received::EndOfStream => break,
                Received::Timeout => unreachable!(),
            }
        }
        *self.tree.lock().unwrap() = stack.into_iter().next().unwrap();
        Ok(())
    }
}

#[test]
fn dual_channels_pass_through_foreign_control_unchanged_and_in_order() {
    common::init_tracing();
    let default_tree = Arc::new(Mutex::new(Vec::new()));
    let alphanum_groups = Arc::new(Mutex::new(HashMap::new()));

    let mut graph = Graph::new();
    graph
        .add_component(DualChannelSource { name: "source".into(), out: () })
        .unwrap();
    graph
        .add_component(DefaultChannelRelay {
            name: "relay".into(),
            input: (),
            output: (),
            tree: default_tree.clone(),
        })
        .unwrap();
    graph
        .add_component(NamespaceSink {
            name: "alphanum_sink".into(),
            input: (),
            result: alphanum_groups.clone(),
        })
        .unwrap();
    graph.connect::<String>("source", "out", "relay", "input").unwrap();
    graph.connect::<String>("relay", "output", "alphanum_sink", "input").unwrap();

    Executor::new(graph).execute().unwrap();

    // The relay, subscribed to `default`, reconstructs exactly the same
    // bracketed tree as the single-channel case — it never sees the
    // alphanum overlay as anything but opaque passthrough.
    let expected_tree = vec![
        Tree::Leaf("1".into()),
        Tree::Leaf("2".into()),
        Tree::Sub(vec![Tree::Leaf("a".into())]),
        Tree::Leaf("3".into()),
        Tree::Sub(vec![Tree::Leaf("b".into()), Tree::Leaf("c".into())]),
        Tree::Leaf("4".into()),
        Tree::Leaf("5".into()),
        Tree::Sub(vec![Tree::Leaf("d".into())]),
    ];
    assert_eq!(*default_tree.lock().unwrap(), expected_tree);

    // The downstream sink, subscribed to `alphanum`, only ever receives the
    // map-stream overlay — relayed unchanged through the first component —
    // and reconstructs the same grouping as the single-channel case.
    let got = alphanum_groups.lock().unwrap().clone();
    assert_eq!(
        got.get("num").cloned(),
        Some(vec!["1", "2", "3", "4", "5"].into_iter().map(String::from).collect())
    );
    assert_eq!(
        got.get("alpha").cloned(),
        Some(vec!["a", "b", "c", "d"].into_iter().map(String::from).collect())
    );
}

#[flowmesh::component]
struct CountingSource {
    name: String,
    #[flowmesh::output]
    out: (),
    count: usize,
}

impl Component for CountingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let out = ctx.output::<usize>("out");
        for i in 0..self.count {
            out.send(i)?;
        }
        Ok(())
    }
}

#[flowmesh::component]
struct CountingSink {
    name: String,
    #[flowmesh::input]
    input: (),
    received: Arc<Mutex<Vec<usize>>>,
}

impl Component for CountingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_mode(&self) -> RunMode {
        RunMode::LongRunning
    }

    fn run(&mut self, ctx: &mut PortContext<'_>) -> anyhow::Result<()> {
        let input = ctx.input::<usize>("input");
        loop {
            match input.receive() {
                Received::Packet(p) => self.received.lock().unwrap().push(p.into_payload().unwrap()),
                Received::EndOfStream => break,
                Received::Timeout => unreachable!(),
            }
        }
        Ok(())
    }
}

#[test]
fn backpressure_delivers_every_packet_in_order_at_capacity_one() {
    common::init_tracing();
    let received = Arc::new(Mutex::new(Vec::new()));
    let mut graph = Graph::new();
    graph
        .add_component(CountingSource { name: "source".into(), out: (), count: 1000 })
        .unwrap();
    graph
        .add_component(CountingSink {
            name: "sink".into(),
            input: (),
            received: received.clone(),
        })
        .unwrap();
    graph
        .connect_with_capacity::<usize>("source", "out", "sink", "input", Some(1))
        .unwrap();

    Executor::new(graph).execute().unwrap();

    let got = received.lock().unwrap().clone();
    assert_eq!(got, (0..1000).collect::<Vec<_>>());
}
