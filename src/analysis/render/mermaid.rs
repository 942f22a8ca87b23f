// src/analysis/render/mermaid.rs
use crate::error::Result;
use crate::analysis::call_graph::{CallGraph, EdgeKind};
use super::{node_ref, DiagramFormat, GraphRenderer};

/// Mermaid flowchart, top down
pub struct MermaidRenderer;

impl GraphRenderer for MermaidRenderer {
    fn format(&self) -> DiagramFormat {
        DiagramFormat::Mermaid
    }

    fn render(&self, graph: &CallGraph) -> Result<String> {
        let mut out = String::from("flowchart TD\n");
        let mut external = Vec::new();
        let mut truncated = Vec::new();

        for (id, node) in graph.nodes() {
            let label = escape_label(&node.label());
            if node.unresolved {
                // Stadium shape for dead ends
                out.push_str(&format!("    {}([\"{}\"])\n", node_ref(id), label));
                external.push(node_ref(id));
            } else {
                out.push_str(&format!("    {}[\"{}\"]\n", node_ref(id), label));
                if node.truncated {
                    truncated.push(node_ref(id));
                }
            }
        }

        for edge in graph.edges() {
            let arrow = match (edge.kind, edge.recursive) {
                (EdgeKind::Implementation, _) => "-.->|implements|".to_string(),
                (EdgeKind::Call, true) => "-.->|recursive|".to_string(),
                (EdgeKind::Call, false) => match &edge.call_site {
                    Some(site) => format!("-->|{}|", site.line),
                    None => "-->".to_string(),
                },
            };
            out.push_str(&format!("    {} {} {}\n", node_ref(edge.caller), arrow, node_ref(edge.callee)));
        }

        out.push_str("    classDef root fill:#a6e3a1,stroke:#40a02b,stroke-width:3px\n");
        out.push_str("    classDef external fill:#eeeeee,stroke:#6c7086,stroke-dasharray:5 5\n");
        out.push_str("    classDef truncated fill:#f9e2af,stroke:#df8e1d\n");
        out.push_str(&format!("    class {} root\n", node_ref(graph.root())));
        if !external.is_empty() {
            out.push_str(&format!("    class {} external\n", external.join(",")));
        }
        if !truncated.is_empty() {
            out.push_str(&format!("    class {} truncated\n", truncated.join(",")));
        }
        Ok(out)
    }
}

fn escape_label(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        match c {
            '"' => result.push('\''),
            '\n' => result.push(' '),
            '\r' => {}
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '#' => result.push_str("#35;"),
            '|' => result.push_str("#124;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::render::test_support::sample_graph;

    #[test]
    fn test_mermaid_output() {
        let graph = sample_graph();
        let mermaid = MermaidRenderer.render(&graph).unwrap();

        assert!(mermaid.starts_with("flowchart TD\n"));
        assert!(mermaid.contains("    n0[\"OrderController.handle()\"]\n"));
        assert!(mermaid.contains("    n3([\"out.println()\"])\n"));
        assert!(mermaid.contains("    n0 -->|10| n1\n"));
        assert!(mermaid.contains("    n1 -.->|recursive| n1\n"));
        assert!(mermaid.contains("    class n0 root\n"));
        assert!(mermaid.contains("    class n3 external\n"));

        let edge_lines = mermaid.lines().filter(|l| l.contains("->")).count();
        assert_eq!(edge_lines, graph.edge_count());
    }

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("List<String> \"a\" #1"), "List&lt;String&gt; 'a' #35;1");
    }
}
