//! depscope - transitive dependency graph builder
//!
//! Walks a package's dependencies to a bounded depth through a pluggable
//! metadata source (the npm or NuGet registry, or an offline fixture), then
//! answers questions about the resulting graph: does it contain cycles, and
//! in what order can its packages be loaded.

pub mod compare;
pub mod config;
pub mod export;
pub mod graph;
pub mod parser;
pub mod source;
pub mod ui;
