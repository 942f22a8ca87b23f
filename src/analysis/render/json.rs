// src/analysis/render/json.rs
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::analysis::call_graph::{CallGraph, CallGraphStats, EdgeKind};
use super::{node_ref, DiagramFormat, GraphRenderer};

/// Serializable snapshot of a call graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowGraphData {
    /// When the snapshot was taken (RFC 3339)
    pub generated_at: String,
    pub root: String,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub statistics: Option<FlowStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    pub label: String,
    /// `root`, `method`, `abstract` or `external`
    #[serde(rename = "type")]
    pub node_type: String,
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub description: Option<String>,
    pub line_number: Option<usize>,
    pub file_path: Option<String>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    /// Call arguments as written
    pub label: String,
    /// `call` or `implementation`
    pub kind: String,
    pub line_number: Option<usize>,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatistics {
    pub total_methods: usize,
    pub total_calls: usize,
    pub unresolved_methods: usize,
    pub recursive_calls: usize,
    pub max_depth: usize,
    pub fingerprint: String,
}

impl FlowStatistics {
    fn new(stats: CallGraphStats, fingerprint: String) -> Self {
        Self {
            total_methods: stats.total_methods,
            total_calls: stats.total_calls,
            unresolved_methods: stats.unresolved_methods,
            recursive_calls: stats.recursive_calls,
            max_depth: stats.max_depth,
            fingerprint,
        }
    }
}

impl FlowGraphData {
    pub fn from_graph(graph: &CallGraph) -> Self {
        let nodes = graph.nodes()
            .map(|(id, node)| {
                let node_type = if id == graph.root() {
                    "root"
                } else if node.unresolved {
                    "external"
                } else if node.is_abstract {
                    "abstract"
                } else {
                    "method"
                };
                FlowNode {
                    id: node_ref(id),
                    label: node.display_name.clone(),
                    node_type: node_type.to_string(),
                    class_name: node.key.owner.clone(),
                    method_name: node.key.name.clone(),
                    signature: node.key.signature(),
                    description: node.docs.clone(),
                    line_number: node.location.as_ref().map(|l| l.line),
                    file_path: node.location.as_ref().map(|l| l.file.display().to_string()),
                    truncated: node.truncated,
                }
            })
            .collect();

        let edges = graph.edges().iter()
            .map(|edge| FlowEdge {
                source: node_ref(edge.caller),
                target: node_ref(edge.callee),
                label: edge.arguments.clone(),
                kind: match edge.kind {
                    EdgeKind::Call => "call",
                    EdgeKind::Implementation => "implementation",
                }.to_string(),
                line_number: edge.call_site.as_ref().map(|l| l.line),
                recursive: edge.recursive,
            })
            .collect();

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            root: node_ref(graph.root()),
            nodes,
            edges,
            statistics: Some(FlowStatistics::new(graph.statistics(), graph.fingerprint())),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub struct JsonRenderer;

impl GraphRenderer for JsonRenderer {
    fn format(&self) -> DiagramFormat {
        DiagramFormat::Json
    }

    fn render(&self, graph: &CallGraph) -> Result<String> {
        FlowGraphData::from_graph(graph).to_json()
    }
}
