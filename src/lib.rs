//! Plotdown — document traversal and configuration cascade.
//!
//! Turns a tree of Markdown and YAML sources into one flat, ordered stream of
//! annotated blocks. Configuration blocks cascade in document order, binding
//! parameters, switching data sources, and attaching SQL query results to the
//! blocks that asked for them.

pub mod cli;
pub mod core;
