//! Callflow: call-flow diagrams for Java methods.
//!
//! Point at a method in a Java file and Callflow follows every invocation it
//! makes, transitively, into a [`analysis::CallGraph`] and renders it as a
//! PlantUML sequence diagram, Graphviz, Mermaid or JSON.

pub mod analysis;
pub mod config;
pub mod error;
