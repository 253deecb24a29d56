// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Code generation for the `#[flowmesh::component]` attribute macro.

use crate::analysis::{AnalysisResult, PortDirection};
use quote::quote;
use syn::{Fields, ItemStruct};

/// Re-emits the struct with port marker attributes stripped, plus a
/// `PortDeclaration` impl listing the declared input/output port names.
pub fn generate(mut item_struct: ItemStruct, analysis: &AnalysisResult) -> proc_macro2::TokenStream {
    if let Fields::Named(named) = &mut item_struct.fields {
        for field in named.named.iter_mut() {
            field.attrs.retain(|attr| {
                !matches!(attr.path().segments.last(), Some(seg) if seg.ident == "input" || seg.ident == "output")
            });
        }
    }

    let struct_name = &item_struct.ident;
    let input_names: Vec<&str> = analysis
        .ports
        .iter()
        .filter(|p| p.direction == PortDirection::In)
        .map(|p| p.name.as_str())
        .collect();
    let output_names: Vec<&str> = analysis
        .ports
        .iter()
        .filter(|p| p.direction == PortDirection::Out)
        .map(|p| p.name.as_str())
        .collect();

    quote! {
        #item_struct

        impl ::flowmesh::PortDeclaration for #struct_name {
            const INPUT_PORTS: &'static [&'static str] = &[ #( #input_names ),* ];
            const OUTPUT_PORTS: &'static [&'static str] = &[ #( #output_names ),* ];
        }
    }
}
