// src/analysis/render/plantuml.rs
use std::collections::{HashMap, HashSet};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::{debug, warn};

use crate::config::OutputConfig;
use crate::error::{CallflowError, Result};
use super::{DiagramFormat, GraphRenderer};
use crate::analysis::call_graph::{CallEdge, CallGraph, EdgeKind, MethodNode, NodeId};

const TEMPLATE_NAME: &str = "sequence.puml";
const DEFAULT_TEMPLATE: &str = include_str!("templates/sequence.puml");
const NOTE_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
struct Participant {
    name: String,
    alias: String,
    color: Option<&'static str>,
}

/// PlantUML sequence diagram: one participant per owner type, one message
/// per edge. A method's own calls are nested under its first message only.
pub struct PlantUmlRenderer {
    tera: Tera,
    show_docs: bool,
    show_legend: bool,
}

impl PlantUmlRenderer {
    /// Uses `sequence.puml` from the configured template directory when it
    /// exists, the built-in template otherwise
    pub fn new(config: &OutputConfig) -> Result<Self> {
        let template = match &config.template_dir {
            Some(dir) if dir.join(TEMPLATE_NAME).is_file() => {
                debug!("Using template {}", dir.join(TEMPLATE_NAME).display());
                std::fs::read_to_string(dir.join(TEMPLATE_NAME))?
            }
            Some(dir) => {
                warn!("No {} in {}, using the built-in template", TEMPLATE_NAME, dir.display());
                DEFAULT_TEMPLATE.to_string()
            }
            None => DEFAULT_TEMPLATE.to_string(),
        };

        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, &template)?;

        Ok(Self {
            tera,
            show_docs: config.show_docs,
            show_legend: config.show_legend,
        })
    }

    fn participants(&self, graph: &CallGraph) -> (Vec<Participant>, HashMap<String, String>) {
        let mut participants = Vec::new();
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::from(["Actor".to_string()]);

        for (_, node) in graph.nodes() {
            if aliases.contains_key(&node.key.owner) {
                continue;
            }
            let base = sanitize_alias(&node.owner);
            let mut alias = base.clone();
            let mut counter = 1;
            while !taken.insert(alias.clone()) {
                counter += 1;
                alias = format!("{}_{}", base, counter);
            }
            participants.push(Participant {
                name: participant_name(&node.owner),
                alias: alias.clone(),
                color: role_color(&node.owner),
            });
            aliases.insert(node.key.owner.clone(), alias);
        }
        (participants, aliases)
    }

    /// Message lines in call order, walked with an explicit stack
    fn messages(&self, graph: &CallGraph, aliases: &HashMap<String, String>) -> Vec<String> {
        enum Item<'g> {
            Edge(&'g CallEdge, usize),
            Close { node: NodeId, caller: String, indent: usize },
        }

        let alias = |id: NodeId| aliases[&graph.node(id).key.owner].clone();
        let mut lines = Vec::new();
        let mut descended: HashSet<NodeId> = HashSet::new();

        let root = graph.root();
        let root_node = graph.root_node();
        lines.push(format!(
            "Actor -> {}: {}({}){}",
            alias(root),
            root_node.key.name,
            root_node.key.params.join(", "),
            return_suffix(root_node)
        ));
        self.push_docs(&mut lines, root_node, 0);
        lines.push(format!("activate {}", alias(root)));
        descended.insert(root);

        let mut stack: Vec<Item> = vec![Item::Close { node: root, caller: "Actor".to_string(), indent: 0 }];
        stack.extend(graph.edges_from(root).collect::<Vec<_>>().into_iter().rev().map(|e| Item::Edge(e, 1)));

        while let Some(item) = stack.pop() {
            match item {
                Item::Edge(edge, indent) => {
                    let pad = "    ".repeat(indent);
                    let (caller, target) = (alias(edge.caller), alias(edge.callee));
                    let callee = graph.node(edge.callee);

                    let label = match edge.kind {
                        EdgeKind::Call => format!("{}({}){}", callee.key.name, one_line(&edge.arguments), return_suffix(callee)),
                        EdgeKind::Implementation => format!("{}({})", callee.key.name, callee.key.params.join(", ")),
                    };
                    let arrow = if edge.kind == EdgeKind::Implementation { "-->>" } else { "->" };
                    lines.push(format!("{}{} {} {}: {}", pad, caller, arrow, target, label));

                    if edge.kind == EdgeKind::Implementation {
                        lines.push(format!("{}note right of {} #LightGreen: implementation", pad, target));
                    }
                    if callee.unresolved {
                        lines.push(format!("{}note right of {} #LightBlue: external", pad, target));
                    }
                    if edge.recursive {
                        lines.push(format!("{}note right of {} #Pink: recursive call", pad, target));
                    }
                    if callee.truncated {
                        lines.push(format!("{}note right of {}: not expanded", pad, target));
                    }

                    if edge.recursive || callee.unresolved || !descended.insert(edge.callee) {
                        continue;
                    }
                    self.push_docs(&mut lines, callee, indent);
                    lines.push(format!("{}activate {}", pad, target));
                    stack.push(Item::Close { node: edge.callee, caller, indent });
                    let children: Vec<&CallEdge> = graph.edges_from(edge.callee).collect();
                    stack.extend(children.into_iter().rev().map(|e| Item::Edge(e, indent + 1)));
                }
                Item::Close { node, caller, indent } => {
                    let pad = "    ".repeat(indent);
                    let target = alias(node);
                    lines.push(format!("{}deactivate {}", pad, target));
                    let method = graph.node(node);
                    if method.returns_value() {
                        if let Some(return_type) = &method.return_type {
                            lines.push(format!("{}{} --> {}: {}", pad, target, caller, return_type));
                        }
                    }
                }
            }
        }
        lines
    }

    fn push_docs(&self, lines: &mut Vec<String>, node: &MethodNode, indent: usize) {
        if !self.show_docs {
            return;
        }
        let Some(note) = node.docs.as_deref().map(clean_docs).filter(|d| !d.is_empty()) else {
            return;
        };
        let pad = "    ".repeat(indent);
        lines.push(format!("{}note right", pad));
        lines.push(format!("{}  {}", pad, note));
        lines.push(format!("{}end note", pad));
    }
}

impl GraphRenderer for PlantUmlRenderer {
    fn format(&self) -> DiagramFormat {
        DiagramFormat::PlantUml
    }

    fn render(&self, graph: &CallGraph) -> Result<String> {
        let (participants, aliases) = self.participants(graph);
        let lines = self.messages(graph, &aliases);

        let mut context = Context::new();
        context.insert("title", &graph.root_node().label());
        context.insert("participants", &participants);
        context.insert("lines", &lines);
        context.insert("show_legend", &self.show_legend);

        self.tera.render(TEMPLATE_NAME, &context)
            .map_err(|e| CallflowError::Render(format!("PlantUML template failed: {}", e)))
    }
}

fn role_color(owner: &str) -> Option<&'static str> {
    if owner.contains("Service") || owner.contains("Manager") {
        Some("#LightBlue")
    } else if owner.contains("Controller") || owner.contains("Api") {
        Some("#LightGreen")
    } else if owner.contains("Repository") || owner.contains("Dao") {
        Some("#LightYellow")
    } else if owner.contains("Impl") {
        Some("#LightGray")
    } else {
        None
    }
}

fn return_suffix(node: &MethodNode) -> String {
    match &node.return_type {
        Some(return_type) if node.returns_value() => format!(" : {}", return_type),
        _ => String::new(),
    }
}

fn sanitize_alias(name: &str) -> String {
    let alias: String = name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if alias.is_empty() || alias.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", alias)
    } else {
        alias
    }
}

/// Display name safe inside a quoted participant declaration
fn participant_name(owner: &str) -> String {
    let name = one_line(owner).replace('"', "'");
    if name.is_empty() {
        "?".to_string()
    } else {
        name
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Javadoc summary: tag lines dropped, joined on one line, capped in length
fn clean_docs(docs: &str) -> String {
    let summary = docs.lines()
        .take_while(|line| !line.trim_start().starts_with('@'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if summary.chars().count() > NOTE_LIMIT {
        let cut: String = summary.chars().take(NOTE_LIMIT - 3).collect();
        format!("{}...", cut)
    } else {
        summary
    }
}
