// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use flowmesh::PortDeclaration;

#[flowmesh_macros::component]
struct Passthrough {
    #[flowmesh_macros::input]
    input: (),

    #[flowmesh_macros::output]
    output: (),

    label: &'static str,
}

#[flowmesh_macros::component]
struct FanIn {
    #[flowmesh_macros::input]
    left: (),

    #[flowmesh_macros::input]
    right: (),

    #[flowmesh_macros::output]
    merged: (),
}

#[flowmesh_macros::component]
struct Sink {
    #[flowmesh_macros::input]
    input: (),
}

#[test]
fn records_port_names_in_declaration_order() {
    assert_eq!(Passthrough::INPUT_PORTS, &["input"]);
    assert_eq!(Passthrough::OUTPUT_PORTS, &["output"]);
}

#[test]
fn records_multiple_ports_per_direction() {
    assert_eq!(FanIn::INPUT_PORTS, &["left", "right"]);
    assert_eq!(FanIn::OUTPUT_PORTS, &[] as &[&str]);
}

#[test]
fn unmarked_fields_are_untouched() {
    let p = Passthrough {
        input: (),
        output: (),
        label: "stage-1",
    };
    assert_eq!(p.label, "stage-1");
}

#[test]
fn sink_has_no_output_ports() {
    assert_eq!(Sink::OUTPUT_PORTS, &[] as &[&str]);
    assert_eq!(Sink::INPUT_PORTS, &["input"]);
}
