//! Extension dispatch.
//!
//! A capability family is one `Extension` implementation plus the
//! `ExtensionRegistry` that maps declared types onto bound instances of it.
//! The `ExtensionCatalog` tracks every family of a process.

pub mod capability;
pub mod catalog;
pub mod kernel;
mod mru;
