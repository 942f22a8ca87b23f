// src/analysis/render/dot.rs
use crate::error::Result;
use crate::analysis::call_graph::{CallGraph, EdgeKind};
use super::{node_ref, DiagramFormat, GraphRenderer};

/// Graphviz digraph, left to right
pub struct DotRenderer;

impl GraphRenderer for DotRenderer {
    fn format(&self) -> DiagramFormat {
        DiagramFormat::Dot
    }

    fn render(&self, graph: &CallGraph) -> Result<String> {
        let mut lines = vec![
            "digraph callflow {".to_string(),
            "    rankdir=LR;".to_string(),
            "    node [shape=box, fontname=\"Helvetica\", fontsize=11];".to_string(),
            "    edge [fontname=\"Helvetica\", fontsize=9];".to_string(),
            String::new(),
        ];

        for (id, node) in graph.nodes() {
            let mut label = node.label();
            let style = if id == graph.root() {
                "style=\"filled,bold\", fillcolor=\"#a6e3a1\"".to_string()
            } else if node.unresolved {
                "style=\"dashed\", color=\"#6c7086\", fontcolor=\"#6c7086\"".to_string()
            } else if node.truncated {
                label.push_str("\n(not expanded)");
                "style=\"filled\", fillcolor=\"#f9e2af\"".to_string()
            } else if node.is_abstract {
                "style=\"filled,rounded\", fillcolor=\"#cba6f7\"".to_string()
            } else {
                "style=\"filled\", fillcolor=\"#89b4fa\"".to_string()
            };
            lines.push(format!("    {} [label=\"{}\", {}];", node_ref(id), escape_label(&label), style));
        }

        lines.push(String::new());

        for edge in graph.edges() {
            let mut attributes = Vec::new();
            if let Some(site) = &edge.call_site {
                if edge.kind == EdgeKind::Call {
                    attributes.push(format!("label=\"{}\"", site.line));
                }
            }
            if edge.kind == EdgeKind::Implementation {
                attributes.push("style=dashed, arrowhead=empty".to_string());
            }
            if edge.recursive {
                attributes.push("color=\"#d20f39\"".to_string());
            }
            let attributes = if attributes.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attributes.join(", "))
            };
            lines.push(format!("    {} -> {}{};", node_ref(edge.caller), node_ref(edge.callee), attributes));
        }

        lines.push("}".to_string());
        Ok(lines.join("\n") + "\n")
    }
}

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('|', "\\|")
}
