// src/analysis/mod.rs
mod engine;
mod parser;
mod languages;

// Call-chain extraction
mod call_graph;

// Diagram output
mod render;

pub use parser::{
    CodeParser, ParsedFile, CompilationUnit, ImportDecl, TypeKind, TypeDecl, Variable,
    MethodDecl, CallExpr, Receiver, Argument,
};
pub use languages::{JavaParser, LanguageParser};
pub(crate) use languages::simple_name;

pub use call_graph::{
    MethodKey, SourceLocation, MethodDeclaration, CallSite,
    SyntaxProvider, SymbolResolver, CodeModel, Resolution, ResolverAdapter,
    CallGraph, MethodNode, NodeId, CallEdge, EdgeKind, CallGraphStats,
    SourceIndex, MethodLocator, MethodChainVisitor, VisitedSet, VisitorOptions,
    generate_flow,
};

pub use render::{
    DiagramFormat, GraphRenderer, renderer_for,
    PlantUmlRenderer, DotRenderer, MermaidRenderer, JsonRenderer,
    FlowGraphData, FlowNode, FlowEdge, FlowStatistics,
};

// Export the main engine
pub use engine::{Engine, Caret, FlowRequest};
