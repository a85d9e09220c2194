//! Operator running external resource GC for CAPA infrastructure clusters

#![deny(missing_docs)]

/// Reconcile and error policy for infrastructure objects
pub mod controller;
/// Controller construction
pub mod controller_runner;
