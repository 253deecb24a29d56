// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Procedural macros for flowmesh components.
//!
//! - `#[flowmesh::component]` - declares a component's port set from its fields
//! - `#[flowmesh::input]` - input port marker, used within `#[flowmesh::component]`
//! - `#[flowmesh::output]` - output port marker, used within `#[flowmesh::component]`
//!
//! # Example
//!
//! ```ignore
//! use flowmesh::PortDeclaration;
//!
//! #[flowmesh::component]
//! pub struct DoublerConfig {
//!     #[flowmesh::input]
//!     input: (),
//!
//!     #[flowmesh::output]
//!     output: (),
//! }
//!
//! assert_eq!(DoublerConfig::INPUT_PORTS, &["input"]);
//! assert_eq!(DoublerConfig::OUTPUT_PORTS, &["output"]);
//! ```
//!
//! The macro only records port names at compile time; it does not touch
//! field types or generate wiring code. `Port`/`Connection` instances are
//! still created and owned by the `ComponentShell` at graph-compile time.

mod analysis;
mod codegen;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemStruct};

/// Declares a component's port set.
///
/// Scans the struct for fields marked `#[flowmesh::input]` /
/// `#[flowmesh::output]`, strips those markers, and emits a
/// `flowmesh::PortDeclaration` impl carrying the port names in
/// field-declaration order. The `Graph` builder uses this to validate port
/// names and directions at wiring time without runtime string tables.
#[proc_macro_attribute]
pub fn component(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item_struct = parse_macro_input!(item as ItemStruct);

    let analysis = match analysis::AnalysisResult::analyze(&item_struct) {
        Ok(result) => result,
        Err(err) => return err.to_compile_error().into(),
    };

    TokenStream::from(codegen::generate(item_struct, &analysis))
}

/// Input port marker. Only meaningful inside `#[flowmesh::component]`;
/// stripped during codegen.
#[proc_macro_attribute]
pub fn input(_attr: TokenStream, item: TokenStream) -> TokenStream {
    item
}

/// Output port marker. Only meaningful inside `#[flowmesh::component]`;
/// stripped during codegen.
#[proc_macro_attribute]
pub fn output(_attr: TokenStream, item: TokenStream) -> TokenStream {
    item
}
