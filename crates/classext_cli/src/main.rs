//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `classext_core` linkage with a fixed Shape-Area resolution.
//! - Keep output deterministic for quick local sanity checks.

use classext_core::{Binding, Extension, ExtensionCatalog, TypeGraph, TypeKey};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct AreaExt {
    binding: Binding,
    formula: &'static str,
}

impl Extension for AreaExt {
    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let graph = Arc::new(TypeGraph::new());
    let polygon = graph.declare_interface("Polygon", &[])?;
    let square = graph.declare_class("Square", None, &[polygon])?;

    let catalog = ExtensionCatalog::new(Arc::clone(&graph));
    let area = catalog.create_registry::<AreaExt>("shape.area")?;
    area.register(
        polygon,
        &AreaExt {
            binding: Binding::unbound(),
            formula: "side * side",
        },
    )?;

    let resolved = area.get(square)?.ok_or("Square did not resolve")?;
    let bound = resolved
        .for_type()
        .and_then(|key| graph.name_of(key))
        .unwrap_or_else(|| "unbound".to_string());
    let memoized = area
        .get(square)?
        .is_some_and(|again| Arc::ptr_eq(&again, &resolved));

    println!("classext_core version={}", classext_core::core_version());
    println!(
        "shape.area Square -> for_type={} formula={} memoized={}",
        bound, resolved.formula, memoized
    );
    println!(
        "shape.area Object -> {}",
        if area.get(TypeKey::OBJECT)?.is_some() {
            "found"
        } else {
            "none"
        }
    );
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("classext_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}
