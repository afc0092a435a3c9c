//! Explicit type graph used for extension dispatch.
//!
//! # Responsibility
//! - Declare classes and interfaces with their direct supertypes.
//! - Answer supertype questions without runtime reflection.
//!
//! # Invariants
//! - Declarations are append-only; a `TypeKey` never changes meaning.
//! - Supertypes are declared before subtypes, so the graph is acyclic.

pub mod graph;
