// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Field analysis for the `#[flowmesh::component]` attribute macro.

use syn::{Field, Fields, ItemStruct};

/// One field's resolved port direction, if it carries a port marker attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    In,
    Out,
}

pub struct PortField {
    pub name: String,
    pub direction: PortDirection,
}

pub struct AnalysisResult {
    pub ports: Vec<PortField>,
}

impl AnalysisResult {
    /// Scans the struct's fields for `#[flowmesh::input]` / `#[flowmesh::output]`
    /// markers and records the declared port name and direction. Marker
    /// attributes are NOT removed here; `codegen` strips them when it
    /// re-emits the struct so the field keeps its original type and
    /// visibility untouched.
    pub fn analyze(item_struct: &ItemStruct) -> syn::Result<Self> {
        let mut ports = Vec::new();

        let fields = match &item_struct.fields {
            Fields::Named(named) => &named.named,
            Fields::Unit => return Ok(Self { ports }),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    &item_struct.fields,
                    "#[flowmesh::component] requires named fields",
                ))
            }
        };

        for field in fields {
            if let Some(direction) = port_direction(field) {
                let name = field
                    .ident
                    .as_ref()
                    .expect("named field has an ident")
                    .to_string();
                ports.push(PortField { name, direction });
            }
        }

        Ok(Self { ports })
    }
}

fn port_direction(field: &Field) -> Option<PortDirection> {
    field.attrs.iter().find_map(|attr| {
        let last = attr.path().segments.last()?;
        if last.ident == "input" {
            Some(PortDirection::In)
        } else if last.ident == "output" {
            Some(PortDirection::Out)
        } else {
            None
        }
    })
}
