// src/analysis/call_graph/mod.rs
//! Call-chain extraction for Callflow
//!
//! Starting from the method under a caret, this module follows outgoing
//! invocations transitively and records them as a [`CallGraph`] that the
//! renderers turn into diagrams. Source structure and symbol resolution are
//! reached through the [`CodeModel`] traits so the traversal can run against
//! the parsed [`SourceIndex`] or an in-memory model.

mod symbols;
mod call_graph;
mod source_index;
mod method_locator;
mod chain_visitor;

pub use symbols::{
    MethodKey, SourceLocation, MethodDeclaration, CallSite, SyntaxProvider, SymbolResolver,
    CodeModel, Resolution, ResolverAdapter,
};
pub use call_graph::{CallGraph, MethodNode, NodeId, CallEdge, EdgeKind, CallGraphStats};
pub use source_index::SourceIndex;
pub use method_locator::MethodLocator;
pub use chain_visitor::{MethodChainVisitor, VisitedSet, VisitorOptions, generate_flow};
