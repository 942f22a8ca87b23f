// src/analysis/render/mod.rs
//! Diagram renderers
//!
//! Every renderer takes a finished [`CallGraph`] read-only and produces the
//! diagram source as text. The root is always marked, unresolved nodes are
//! styled as dead ends and each node and edge of the graph is emitted once.

mod plantuml;
mod dot;
mod mermaid;
mod json;

pub use plantuml::PlantUmlRenderer;
pub use dot::DotRenderer;
pub use mermaid::MermaidRenderer;
pub use json::{JsonRenderer, FlowGraphData, FlowNode, FlowEdge, FlowStatistics};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::error::Result;
use super::call_graph::{CallGraph, NodeId};

/// Output format of a diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    /// PlantUML sequence diagram
    #[value(name = "plantuml")]
    PlantUml,
    /// Graphviz digraph
    Dot,
    /// Mermaid flowchart
    Mermaid,
    /// Nodes and edges as JSON
    Json,
}

impl DiagramFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DiagramFormat::PlantUml => "puml",
            DiagramFormat::Dot => "dot",
            DiagramFormat::Mermaid => "mmd",
            DiagramFormat::Json => "json",
        }
    }
}

/// Turns a call graph into diagram source
pub trait GraphRenderer {
    fn format(&self) -> DiagramFormat;

    fn render(&self, graph: &CallGraph) -> Result<String>;
}

pub fn renderer_for(format: DiagramFormat, config: &OutputConfig) -> Result<Box<dyn GraphRenderer>> {
    Ok(match format {
        DiagramFormat::PlantUml => Box::new(PlantUmlRenderer::new(config)?),
        DiagramFormat::Dot => Box::new(DotRenderer),
        DiagramFormat::Mermaid => Box::new(MermaidRenderer),
        DiagramFormat::Json => Box::new(JsonRenderer),
    })
}

/// Identifier of a node in the text formats
fn node_ref(id: NodeId) -> String {
    format!("n{}", id.0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use crate::analysis::call_graph::{
        CallEdge, CallGraph, CallSite, MethodDeclaration, MethodKey, MethodNode, SourceLocation,
    };
    use crate::analysis::{CallExpr, Receiver, TypeKind};

    pub fn declaration(owner: &str, name: &str, return_type: &str, docs: Option<&str>) -> MethodDeclaration {
        MethodDeclaration {
            key: MethodKey::new(owner, name, &[]),
            return_type: return_type.to_string(),
            location: SourceLocation::new(Path::new("src/App.java"), 3, 5, 40),
            owner_kind: TypeKind::Class,
            has_body: true,
            is_abstract: false,
            is_constructor: false,
            docs: docs.map(str::to_string),
        }
    }

    pub fn site(caller: &MethodKey, name: &str, receiver: Receiver, line: usize) -> CallSite {
        let mut expr = CallExpr::named(name, line);
        expr.receiver = receiver;
        CallSite {
            caller: caller.clone(),
            location: SourceLocation::new(Path::new("src/App.java"), line, 9, 0),
            expr,
        }
    }

    /// `OrderController.handle` calls `OrderService.place` twice and
    /// `System.out.println`; `place` calls itself and `OrderRepository.save`.
    pub fn sample_graph() -> CallGraph {
        let handle = declaration("shop.OrderController", "handle", "void", Some("Entry point.\n@param none"));
        let place = declaration("shop.OrderService", "place", "Order", None);
        let save = declaration("shop.OrderRepository", "save", "void", None);

        let mut graph = CallGraph::new(MethodNode::from_declaration(&handle));
        let root = graph.root();
        let place_id = graph.ensure_node(MethodNode::from_declaration(&place));
        let save_id = graph.ensure_node(MethodNode::from_declaration(&save));

        let first = site(&handle.key, "place", Receiver::Name("service".into()), 10);
        graph.add_edge(CallEdge::call(root, place_id, &first, false));
        let recursive = site(&place.key, "place", Receiver::Implicit, 20);
        graph.add_edge(CallEdge::call(place_id, place_id, &recursive, true));
        let store = site(&place.key, "save", Receiver::Name("repository".into()), 21);
        graph.add_edge(CallEdge::call(place_id, save_id, &store, false));
        let second = site(&handle.key, "place", Receiver::Name("service".into()), 11);
        graph.add_edge(CallEdge::call(root, place_id, &second, false));

        let print = site(&handle.key, "println", Receiver::Name("System.out".into()), 12);
        let external = graph.ensure_node(MethodNode::external(&print));
        graph.add_edge(CallEdge::call(root, external, &print, false));
        graph
    }
}
