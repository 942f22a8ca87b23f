// src/analysis/call_graph/call_graph.rs
use std::collections::{HashMap, HashSet, VecDeque};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{CallSite, MethodDeclaration, MethodKey, SourceLocation};

/// Index of a node inside its [`CallGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// Node in the call graph representing a method
#[derive(Debug, Clone, Serialize)]
pub struct MethodNode {
    pub key: MethodKey,
    /// `Owner.method`
    pub display_name: String,
    /// Simple owner type name
    pub owner: String,
    pub return_type: Option<String>,
    pub location: Option<SourceLocation>,
    pub docs: Option<String>,
    /// No declaration available; never expanded
    pub unresolved: bool,
    /// Declared without a body (interface or abstract method)
    pub is_abstract: bool,
    /// Reached, but left unexpanded because of the depth limit
    pub truncated: bool,
}

impl MethodNode {
    pub fn from_declaration(declaration: &MethodDeclaration) -> Self {
        let owner = declaration.key.owner_simple_name().to_string();
        Self {
            display_name: format!("{}.{}", owner, declaration.key.name),
            owner,
            key: declaration.key.clone(),
            return_type: Some(declaration.return_type.clone()),
            location: Some(declaration.location.clone()),
            docs: declaration.docs.clone(),
            unresolved: false,
            is_abstract: declaration.is_abstract,
            truncated: false,
        }
    }

    /// Terminal node for a call nothing could be resolved for
    pub fn external(call: &CallSite) -> Self {
        let key = call.external_key();
        let owner = key.owner_simple_name().to_string();
        Self {
            display_name: format!("{}.{}", owner, key.name),
            owner,
            key,
            return_type: None,
            location: None,
            docs: None,
            unresolved: true,
            is_abstract: false,
            truncated: false,
        }
    }

    /// `Owner.name(P1, P2)`
    pub fn label(&self) -> String {
        format!("{}.{}", self.owner, self.key.signature())
    }

    pub fn returns_value(&self) -> bool {
        self.return_type.as_deref().map_or(false, |t| t != "void")
    }
}

/// How the callee was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// A call site in the caller's body
    Call,
    /// Abstract method to one of its overriding implementations
    Implementation,
}

/// Edge in the call graph: one call site, or one abstract-to-implementation link
#[derive(Debug, Clone, Serialize)]
pub struct CallEdge {
    pub caller: NodeId,
    pub callee: NodeId,
    pub kind: EdgeKind,
    pub call_site: Option<SourceLocation>,
    /// Receiver as written at the call site
    pub receiver: Option<String>,
    /// Argument list as written at the call site
    pub arguments: String,
    /// Callee was already on the expansion path when this call was found
    pub recursive: bool,
}

impl CallEdge {
    pub fn call(caller: NodeId, callee: NodeId, site: &CallSite, recursive: bool) -> Self {
        Self {
            caller,
            callee,
            kind: EdgeKind::Call,
            call_site: Some(site.location.clone()),
            receiver: site.expr.receiver.text(),
            arguments: site.expr.argument_list(),
            recursive,
        }
    }

    pub fn implementation(caller: NodeId, callee: NodeId, implementation: &MethodDeclaration) -> Self {
        Self {
            caller,
            callee,
            kind: EdgeKind::Implementation,
            call_site: Some(implementation.location.clone()),
            receiver: None,
            arguments: String::new(),
            recursive: false,
        }
    }
}

/// Call graph reachable from one root method.
///
/// Nodes live in one table and are referenced by [`NodeId`]; identity is the
/// [`MethodKey`], so two handles to the same declaration share one node.
#[derive(Debug, Clone)]
pub struct CallGraph {
    root: NodeId,
    nodes: Vec<MethodNode>,
    edges: Vec<CallEdge>,
    index: HashMap<MethodKey, NodeId>,
    /// Edge indices per node, in insertion order
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    expanded: HashSet<NodeId>,
}

impl CallGraph {
    pub fn new(root: MethodNode) -> Self {
        let mut graph = Self {
            root: NodeId(0),
            nodes: Vec::new(),
            edges: Vec::new(),
            index: HashMap::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            expanded: HashSet::new(),
        };
        graph.root = graph.ensure_node(root);
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &MethodNode {
        &self.nodes[self.root.0]
    }

    pub fn node(&self, id: NodeId) -> &MethodNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut MethodNode {
        &mut self.nodes[id.0]
    }

    pub fn node_id(&self, key: &MethodKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &MethodNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges in creation order
    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing edges in call-site order
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &CallEdge> {
        self.outgoing[id.0].iter().map(move |&e| &self.edges[e])
    }

    /// Incoming edges in creation order
    pub fn edges_to(&self, id: NodeId) -> impl Iterator<Item = &CallEdge> {
        self.incoming[id.0].iter().map(move |&e| &self.edges[e])
    }

    /// Callees with one entry per edge
    pub fn callees(&self, id: NodeId) -> Vec<NodeId> {
        self.edges_from(id).map(|e| e.callee).collect()
    }

    /// Callees with repeated call sites collapsed, first occurrence order
    pub fn distinct_callees(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.edges_from(id)
            .map(|e| e.callee)
            .filter(|callee| seen.insert(*callee))
            .collect()
    }

    pub fn callers(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.edges_to(id)
            .map(|e| e.caller)
            .filter(|caller| seen.insert(*caller))
            .collect()
    }

    /// Id of the node with this key, creating the node on first sight.
    /// An existing node is never replaced.
    pub fn ensure_node(&mut self, node: MethodNode) -> NodeId {
        if let Some(&id) = self.index.get(&node.key) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(node.key.clone(), id);
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Add an edge between existing nodes. Unresolved nodes never get
    /// outgoing edges; such an edge is refused and `false` returned.
    pub fn add_edge(&mut self, edge: CallEdge) -> bool {
        if self.nodes[edge.caller.0].unresolved {
            return false;
        }
        let index = self.edges.len();
        self.outgoing[edge.caller.0].push(index);
        self.incoming[edge.callee.0].push(index);
        self.edges.push(edge);
        true
    }

    /// Record that a node's body is being scanned. Returns `false` if it
    /// already was.
    pub fn mark_expanded(&mut self, id: NodeId) -> bool {
        self.expanded.insert(id)
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    /// Breadth-first distance of every reachable node from the root
    pub fn depths(&self) -> HashMap<NodeId, usize> {
        let mut depths = HashMap::new();
        let mut queue = VecDeque::new();
        depths.insert(self.root, 0);
        queue.push_back(self.root);

        while let Some(current) = queue.pop_front() {
            let depth = depths[&current];
            for callee in self.distinct_callees(current) {
                if !depths.contains_key(&callee) {
                    depths.insert(callee, depth + 1);
                    queue.push_back(callee);
                }
            }
        }
        depths
    }

    pub fn reachable_from_root(&self) -> HashSet<NodeId> {
        self.depths().into_keys().collect()
    }

    pub fn recursive_edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter().filter(|e| e.recursive)
    }

    pub fn statistics(&self) -> CallGraphStats {
        let depths = self.depths();
        CallGraphStats {
            total_methods: self.nodes.len(),
            total_calls: self.edges.iter().filter(|e| e.kind == EdgeKind::Call).count(),
            implementation_links: self.edges.iter().filter(|e| e.kind == EdgeKind::Implementation).count(),
            unresolved_methods: self.nodes.iter().filter(|n| n.unresolved).count(),
            recursive_calls: self.recursive_edges().count(),
            truncated_methods: self.nodes.iter().filter(|n| n.truncated).count(),
            max_depth: depths.values().copied().max().unwrap_or(0),
            max_out_degree: self.outgoing.iter().map(Vec::len).max().unwrap_or(0),
            max_in_degree: self.incoming.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// SHA-256 over node keys and edges in order. Equal for graphs built from
    /// the same source snapshot.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(node.key.to_string().as_bytes());
            hasher.update([node.unresolved as u8, b'\n']);
        }
        for edge in &self.edges {
            let line = edge.call_site.as_ref().map_or(0, |l| l.line);
            hasher.update(format!("{}>{}@{}:{:?}\n", edge.caller.0, edge.callee.0, line, edge.kind).as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallGraphStats {
    pub total_methods: usize,
    pub total_calls: usize,
    pub implementation_links: usize,
    pub unresolved_methods: usize,
    pub recursive_calls: usize,
    pub truncated_methods: usize,
    pub max_depth: usize,
    pub max_out_degree: usize,
    pub max_in_degree: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::analysis::{CallExpr, TypeKind};

    fn declaration(owner: &str, name: &str) -> MethodDeclaration {
        MethodDeclaration {
            key: MethodKey::new(owner, name, &[]),
            return_type: "void".into(),
            location: SourceLocation::new(Path::new("A.java"), 1, 1, 0),
            owner_kind: TypeKind::Class,
            has_body: true,
            is_abstract: false,
            is_constructor: false,
            docs: None,
        }
    }

    fn site(caller: &str, name: &str, line: usize) -> CallSite {
        CallSite {
            caller: MethodKey::new(caller, "m", &[]),
            location: SourceLocation::new(Path::new("A.java"), line, 1, 0),
            expr: CallExpr::named(name, line),
        }
    }

    #[test]
    fn test_nodes_are_deduplicated_by_key() {
        let mut graph = CallGraph::new(MethodNode::from_declaration(&declaration("p.A", "m")));
        let first = graph.ensure_node(MethodNode::from_declaration(&declaration("p.B", "b")));
        let second = graph.ensure_node(MethodNode::from_declaration(&declaration("p.B", "b")));
        let other_owner = graph.ensure_node(MethodNode::from_declaration(&declaration("q.B", "b")));

        assert_eq!(first, second);
        assert_ne!(first, other_owner);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.node_id(&MethodKey::new("p.B", "b", &[])), Some(first));
        assert_eq!(graph.root_node().display_name, "A.m");
    }

    #[test]
    fn test_edge_queries_keep_order() {
        let mut graph = CallGraph::new(MethodNode::from_declaration(&declaration("p.A", "m")));
        let root = graph.root();
        let b = graph.ensure_node(MethodNode::from_declaration(&declaration("p.A", "b")));
        let c = graph.ensure_node(MethodNode::from_declaration(&declaration("p.A", "c")));

        graph.add_edge(CallEdge::call(root, c, &site("p.A", "c", 2), false));
        graph.add_edge(CallEdge::call(root, b, &site("p.A", "b", 3), false));
        graph.add_edge(CallEdge::call(root, c, &site("p.A", "c", 4), false));
        graph.add_edge(CallEdge::call(b, c, &site("p.A", "c", 9), false));

        assert_eq!(graph.callees(root), vec![c, b, c]);
        assert_eq!(graph.distinct_callees(root), vec![c, b]);
        assert_eq!(graph.callers(c), vec![root, b]);
        assert_eq!(graph.edges_to(c).count(), 3);

        let stats = graph.statistics();
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.max_out_degree, 3);
        assert_eq!(stats.max_depth, 1);
    }

    #[test]
    fn test_unresolved_nodes_refuse_outgoing_edges() {
        let mut graph = CallGraph::new(MethodNode::from_declaration(&declaration("p.A", "m")));
        let root = graph.root();
        let call = site("p.A", "println", 2);
        let external = graph.ensure_node(MethodNode::external(&call));

        assert!(graph.add_edge(CallEdge::call(root, external, &call, false)));
        assert!(!graph.add_edge(CallEdge::call(external, root, &call, false)));
        assert_eq!(graph.edges_from(external).count(), 0);
        assert_eq!(graph.statistics().unresolved_methods, 1);
    }

    #[test]
    fn test_reachability_and_expansion_marks() {
        let mut graph = CallGraph::new(MethodNode::from_declaration(&declaration("p.A", "m")));
        let root = graph.root();
        let b = graph.ensure_node(MethodNode::from_declaration(&declaration("p.A", "b")));
        let orphan = graph.ensure_node(MethodNode::from_declaration(&declaration("p.A", "z")));
        graph.add_edge(CallEdge::call(root, b, &site("p.A", "b", 2), false));

        let reachable = graph.reachable_from_root();
        assert!(reachable.contains(&b));
        assert!(!reachable.contains(&orphan));

        assert!(graph.mark_expanded(b));
        assert!(!graph.mark_expanded(b));
        assert!(graph.is_expanded(b));
    }

    #[test]
    fn test_fingerprint_tracks_edges() {
        let build = |extra: bool| {
            let mut graph = CallGraph::new(MethodNode::from_declaration(&declaration("p.A", "m")));
            let root = graph.root();
            let b = graph.ensure_node(MethodNode::from_declaration(&declaration("p.A", "b")));
            graph.add_edge(CallEdge::call(root, b, &site("p.A", "b", 2), false));
            if extra {
                graph.add_edge(CallEdge::call(root, b, &site("p.A", "b", 3), false));
            }
            graph.fingerprint()
        };
        assert_eq!(build(false), build(false));
        assert_ne!(build(false), build(true));
    }
}
