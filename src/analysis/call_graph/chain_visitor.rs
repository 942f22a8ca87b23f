// src/analysis/call_graph/chain_visitor.rs
use std::collections::HashSet;
use std::path::Path;
use regex::Regex;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::error::{CallflowError, Result};
use super::{
    CallEdge, CallGraph, CallSite, CodeModel, MethodDeclaration, MethodKey, MethodLocator,
    MethodNode, NodeId, Resolution, ResolverAdapter,
};

/// Knobs for one traversal
#[derive(Debug, Clone)]
pub struct VisitorOptions {
    /// Nodes reached at this depth are kept but not expanded
    pub max_depth: Option<usize>,
    /// Add terminal nodes for calls that do not resolve
    pub include_external: bool,
    /// Link abstract methods to their implementations
    pub expand_implementations: bool,
    /// Resolved calls into matching owner types are left out
    pub skip_owner_patterns: Vec<Regex>,
}

impl Default for VisitorOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            include_external: true,
            expand_implementations: true,
            skip_owner_patterns: Vec::new(),
        }
    }
}

impl VisitorOptions {
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let skip_owner_patterns = config.skip_owner_patterns.iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| CallflowError::Config(format!("Invalid skip pattern '{}': {}", pattern, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_depth: config.max_depth,
            include_external: config.include_external,
            expand_implementations: config.expand_implementations,
            skip_owner_patterns,
        })
    }

    fn skips(&self, owner: &str) -> bool {
        self.skip_owner_patterns.iter().any(|p| p.is_match(owner))
    }
}

/// Identities of methods whose bodies have been scanned
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: HashSet<MethodKey>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already present
    pub fn insert(&mut self, key: MethodKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

enum Step {
    Call(CallSite),
    Implementation(MethodDeclaration),
}

/// A method being expanded and the steps still to take from it
struct Frame {
    node: NodeId,
    depth: usize,
    steps: std::vec::IntoIter<Step>,
}

/// Builds the call graph reachable from one method, depth first.
///
/// The walk keeps its own stack of frames instead of recursing, so deep call
/// chains cannot overflow the thread stack. A method body is scanned at most
/// once per visited set, which bounds the walk on cyclic call graphs.
pub struct MethodChainVisitor<'m, M: CodeModel + ?Sized> {
    resolver: ResolverAdapter<'m, M>,
    options: &'m VisitorOptions,
}

impl<'m, M: CodeModel + ?Sized> MethodChainVisitor<'m, M> {
    pub fn new(model: &'m M, options: &'m VisitorOptions) -> Self {
        Self {
            resolver: ResolverAdapter::new(model),
            options,
        }
    }

    /// Graph of everything reachable from `root`. If `root` is already in
    /// `visited` the graph holds only the root node.
    pub fn generate_method_chains(&self, root: &MethodDeclaration, visited: &mut VisitedSet) -> CallGraph {
        let mut graph = CallGraph::new(MethodNode::from_declaration(root));
        let mut stack: Vec<Frame> = Vec::new();
        let mut on_path: HashSet<NodeId> = HashSet::new();

        let root_id = graph.root();
        if let Some(frame) = self.enter(&mut graph, root_id, root, 0, visited) {
            on_path.insert(frame.node);
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let (caller, depth) = (frame.node, frame.depth);
            let Some(step) = frame.steps.next() else {
                on_path.remove(&caller);
                stack.pop();
                continue;
            };

            let entered = match step {
                Step::Call(site) => match self.resolver.resolve(&site) {
                    Resolution::Resolved(target) => {
                        if self.options.skips(&target.key.owner) {
                            debug!("Skipping call to {}", target.key);
                            continue;
                        }
                        let callee = graph.ensure_node(MethodNode::from_declaration(&target));
                        let recursive = on_path.contains(&callee);
                        graph.add_edge(CallEdge::call(caller, callee, &site, recursive));
                        self.enter(&mut graph, callee, &target, depth + 1, visited)
                    }
                    Resolution::Unresolved => {
                        if self.options.include_external {
                            let callee = graph.ensure_node(MethodNode::external(&site));
                            graph.add_edge(CallEdge::call(caller, callee, &site, false));
                        }
                        None
                    }
                },
                Step::Implementation(implementation) => {
                    if self.options.skips(&implementation.key.owner) {
                        continue;
                    }
                    let callee = graph.ensure_node(MethodNode::from_declaration(&implementation));
                    graph.add_edge(CallEdge::implementation(caller, callee, &implementation));
                    self.enter(&mut graph, callee, &implementation, depth + 1, visited)
                }
            };

            if let Some(frame) = entered {
                on_path.insert(frame.node);
                stack.push(frame);
            }
        }

        graph
    }

    /// Start expanding a node unless it was expanded before or lies past the
    /// depth limit
    fn enter(
        &self,
        graph: &mut CallGraph,
        node: NodeId,
        declaration: &MethodDeclaration,
        depth: usize,
        visited: &mut VisitedSet,
    ) -> Option<Frame> {
        if graph.node(node).unresolved || visited.contains(&declaration.key) {
            return None;
        }
        if self.options.max_depth.map_or(false, |max| depth >= max) {
            graph.node_mut(node).truncated = true;
            return None;
        }

        visited.insert(declaration.key.clone());
        graph.mark_expanded(node);
        graph.node_mut(node).truncated = false;
        debug!("Expanding {} at depth {}", declaration.key, depth);

        let mut steps: Vec<Step> = self.resolver.call_sites(declaration)
            .into_iter()
            .map(Step::Call)
            .collect();
        if declaration.is_abstract && self.options.expand_implementations {
            steps.extend(self.resolver.implementations(declaration).into_iter().map(Step::Implementation));
        }

        Some(Frame {
            node,
            depth,
            steps: steps.into_iter(),
        })
    }
}

/// Locate the method at `offset` in `file` and build its call graph.
/// `Ok(None)` when the offset is not inside any method.
pub fn generate_flow<M: CodeModel + ?Sized>(
    model: &M,
    file: &Path,
    offset: usize,
    options: &VisitorOptions,
) -> Result<Option<CallGraph>> {
    let root = match MethodLocator::new(model).locate(file, offset) {
        Ok(root) => root,
        Err(CallflowError::NoEnclosingMethod { file, offset }) => {
            debug!("No method encloses offset {} in {}", offset, file.display());
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let visitor = MethodChainVisitor::new(model, options);
    let mut visited = VisitedSet::new();
    let graph = visitor.generate_method_chains(&root, &mut visited);

    let stats = graph.statistics();
    info!(
        "Call graph for {}: {} methods, {} calls, {} unresolved, {} recursive",
        root.key, stats.total_methods, stats.total_calls, stats.unresolved_methods, stats.recursive_calls
    );
    Ok(Some(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use crate::analysis::call_graph::{EdgeKind, SourceLocation, SymbolResolver, SyntaxProvider};
    use crate::analysis::{CallExpr, TypeKind};

    /// In-memory code model. `"Util.log"` names method `log` of `demo.Util`,
    /// a bare name belongs to `demo.Main`. Callees never declared are external.
    #[derive(Default)]
    struct FakeModel {
        declarations: HashMap<String, MethodDeclaration>,
        bodies: HashMap<MethodKey, Vec<String>>,
        implementations: HashMap<MethodKey, Vec<String>>,
        failing: HashSet<String>,
        /// Fail the first resolution of these names only
        flaky: RefCell<HashSet<String>>,
    }

    fn key(name: &str) -> MethodKey {
        match name.split_once('.') {
            Some((owner, method)) => MethodKey::new(&format!("demo.{}", owner), method, &[]),
            None => MethodKey::new("demo.Main", name, &[]),
        }
    }

    fn external_key(name: &str) -> MethodKey {
        MethodKey { external: true, ..key(name) }
    }

    impl FakeModel {
        fn declare(mut self, name: &str, is_abstract: bool) -> Self {
            let offset = self.declarations.len() * 100;
            let declaration = MethodDeclaration {
                key: key(name),
                return_type: "void".to_string(),
                location: SourceLocation::new(Path::new("Main.java"), offset / 100 + 1, 5, offset),
                owner_kind: TypeKind::Class,
                has_body: !is_abstract,
                is_abstract,
                is_constructor: false,
                docs: None,
            };
            self.declarations.insert(name.to_string(), declaration);
            self
        }

        fn method(self, name: &str, calls: &[&str]) -> Self {
            let mut model = self.declare(name, false);
            model.bodies.insert(key(name), calls.iter().map(|c| c.to_string()).collect());
            model
        }

        fn abstract_method(self, name: &str, implementations: &[&str]) -> Self {
            let mut model = self.declare(name, true);
            model.implementations.insert(key(name), implementations.iter().map(|c| c.to_string()).collect());
            model
        }

        fn failing(mut self, name: &str) -> Self {
            self.failing.insert(name.to_string());
            self
        }

        fn flaky(self, name: &str) -> Self {
            self.flaky.borrow_mut().insert(name.to_string());
            self
        }

        fn declaration(&self, name: &str) -> MethodDeclaration {
            self.declarations[name].clone()
        }
    }

    impl SyntaxProvider for FakeModel {
        fn enclosing_method_at(&self, _file: &Path, offset: usize) -> Result<Option<MethodDeclaration>> {
            Ok(self.declarations.values().find(|d| d.location.offset == offset).cloned())
        }

        fn call_sites(&self, method: &MethodDeclaration) -> Result<Vec<CallSite>> {
            let body = self.bodies.get(&method.key).cloned().unwrap_or_default();
            Ok(body.iter()
                .enumerate()
                .map(|(i, callee)| CallSite {
                    caller: method.key.clone(),
                    location: SourceLocation::new(Path::new("Main.java"), method.location.line * 100 + i, 9, 0),
                    expr: CallExpr::named(callee, i + 1),
                })
                .collect())
        }

        fn implementations(&self, method: &MethodDeclaration) -> Result<Vec<MethodDeclaration>> {
            Ok(self.implementations.get(&method.key)
                .into_iter()
                .flatten()
                .map(|name| self.declaration(name))
                .collect())
        }
    }

    impl SymbolResolver for FakeModel {
        fn resolve(&self, call: &CallSite) -> Result<Option<MethodDeclaration>> {
            let name = &call.expr.method_name;
            if self.failing.contains(name) || self.flaky.borrow_mut().remove(name) {
                return Err(CallflowError::StaleSource {
                    file: PathBuf::from("Main.java"),
                    reason: "modified during analysis".to_string(),
                });
            }
            Ok(self.declarations.get(name).cloned())
        }
    }

    fn build(model: &FakeModel, root: &str, options: &VisitorOptions) -> CallGraph {
        let visitor = MethodChainVisitor::new(model, options);
        let graph = visitor.generate_method_chains(&model.declaration(root), &mut VisitedSet::new());
        assert_reachable(&graph);
        graph
    }

    fn assert_reachable(graph: &CallGraph) {
        let reachable = graph.reachable_from_root();
        for (id, node) in graph.nodes() {
            assert!(reachable.contains(&id), "{} is not reachable from the root", node.key);
            if node.unresolved {
                assert_eq!(graph.edges_from(id).count(), 0);
            }
        }
    }

    fn names(graph: &CallGraph, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| graph.node(*id).key.name.clone()).collect()
    }

    fn edge_names(graph: &CallGraph) -> Vec<(String, String)> {
        graph.edges().iter()
            .map(|e| (graph.node(e.caller).key.name.clone(), graph.node(e.callee).key.name.clone()))
            .collect()
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_method_without_calls_is_a_single_node() {
        let model = FakeModel::default().method("leaf", &[]);
        let graph = build(&model, "leaf", &VisitorOptions::default());

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.root_node().key, key("leaf"));
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let model = FakeModel::default()
            .method("a", &["b"])
            .method("b", &["a"]);
        let graph = build(&model, "a", &VisitorOptions::default());

        assert_eq!(graph.node_count(), 2);
        assert_eq!(edge_names(&graph), pairs(&[("a", "b"), ("b", "a")]));
        assert!(!graph.edges()[0].recursive);
        assert!(graph.edges()[1].recursive);
        assert_eq!(graph.statistics().recursive_calls, 1);
    }

    #[test]
    fn test_self_recursion_is_flagged() {
        let model = FakeModel::default().method("fact", &["fact", "fact"]);
        let graph = build(&model, "fact", &VisitorOptions::default());

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.edges().iter().all(|e| e.recursive));
    }

    #[test]
    fn test_one_edge_per_call_site() {
        let model = FakeModel::default()
            .method("a", &["c", "c", "c"])
            .method("c", &[]);
        let graph = build(&model, "a", &VisitorOptions::default());
        let root = graph.root();

        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.callees(root).len(), 3);
        assert_eq!(names(&graph, &graph.distinct_callees(root)), vec!["c"]);
        let lines: Vec<usize> = graph.edges_from(root).map(|e| e.call_site.as_ref().unwrap().line).collect();
        assert_eq!(lines, vec![100, 101, 102]);
    }

    #[test]
    fn test_external_call_is_a_dead_end() {
        let model = FakeModel::default().method("main", &["println"]);
        let graph = build(&model, "main", &VisitorOptions::default());

        let external = graph.node_id(&MethodKey::external("demo.Main", "println", &[])).unwrap();
        assert!(graph.node(external).unresolved);
        assert_eq!(graph.edges_to(external).count(), 1);
        assert_eq!(graph.edges_from(external).count(), 0);
    }

    #[test]
    fn test_example_chain() {
        // m() calls a(), b(), a(); a() calls the external c()
        let model = FakeModel::default()
            .method("m", &["a", "b", "a"])
            .method("a", &["c"])
            .method("b", &[]);
        let graph = build(&model, "m", &VisitorOptions::default());

        let mut node_names: Vec<String> = graph.nodes().map(|(_, n)| n.key.name.clone()).collect();
        node_names.sort();
        assert_eq!(node_names, vec!["a", "b", "c", "m"]);
        assert_eq!(names(&graph, &graph.callees(graph.root())), vec!["a", "b", "a"]);
        assert_eq!(
            edge_names(&graph),
            pairs(&[("m", "a"), ("a", "c"), ("m", "b"), ("m", "a")])
        );

        let c = graph.node_id(&external_key("c")).unwrap();
        assert!(graph.node(c).unresolved);
        assert_eq!(graph.root_node().display_name, "Main.m");
    }

    #[test]
    fn test_diamond_expands_shared_callee_once() {
        let model = FakeModel::default()
            .method("top", &["left", "right"])
            .method("left", &["shared"])
            .method("right", &["shared"])
            .method("shared", &["println"]);
        let graph = build(&model, "top", &VisitorOptions::default());

        let shared = graph.node_id(&key("shared")).unwrap();
        assert_eq!(graph.edges_to(shared).count(), 2);
        assert_eq!(graph.edges_from(shared).count(), 1);
        assert!(graph.is_expanded(shared));
        assert!(graph.edges().iter().all(|e| !e.recursive));
    }

    #[test]
    fn test_same_snapshot_gives_same_graph() {
        let model = FakeModel::default()
            .method("m", &["a", "b", "x", "a"])
            .method("a", &["b", "y"])
            .method("b", &["a", "m"]);
        let first = build(&model, "m", &VisitorOptions::default());
        let second = build(&model, "m", &VisitorOptions::default());

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(edge_names(&first), edge_names(&second));
    }

    #[test]
    fn test_failing_resolution_degrades_to_external() {
        let model = FakeModel::default()
            .method("run", &["broken", "ok"])
            .method("broken", &["never"])
            .method("ok", &[])
            .failing("broken");
        let graph = build(&model, "run", &VisitorOptions::default());

        assert_eq!(edge_names(&graph), pairs(&[("run", "broken"), ("run", "ok")]));
        let broken = graph.node_id(&external_key("broken")).unwrap();
        assert!(graph.node(broken).unresolved);
        assert!(!graph.node(graph.node_id(&key("ok")).unwrap()).unresolved);
    }

    #[test]
    fn test_failure_on_one_site_leaves_later_sites_resolved() {
        let model = FakeModel::default()
            .method("run", &["helper", "helper"])
            .method("helper", &["leaf"])
            .method("leaf", &[])
            .flaky("helper");
        let graph = build(&model, "run", &VisitorOptions::default());

        let failed = graph.node_id(&external_key("helper")).unwrap();
        let helper = graph.node_id(&key("helper")).unwrap();
        assert_ne!(failed, helper);
        assert!(graph.node(failed).unresolved);
        assert!(!graph.is_expanded(failed));
        assert!(!graph.node(helper).unresolved);
        assert!(graph.is_expanded(helper));
        assert_eq!(
            edge_names(&graph),
            pairs(&[("run", "helper"), ("run", "helper"), ("helper", "leaf")])
        );
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn test_max_depth_truncates() {
        let model = FakeModel::default()
            .method("a", &["b"])
            .method("b", &["c"])
            .method("c", &["d"])
            .method("d", &[]);
        let options = VisitorOptions { max_depth: Some(2), ..VisitorOptions::default() };
        let graph = build(&model, "a", &options);

        assert_eq!(edge_names(&graph), pairs(&[("a", "b"), ("b", "c")]));
        let c = graph.node_id(&key("c")).unwrap();
        assert!(graph.node(c).truncated);
        assert!(!graph.is_expanded(c));
        assert!(graph.node_id(&key("d")).is_none());
        assert_eq!(graph.statistics().truncated_methods, 1);
    }

    #[test]
    fn test_truncated_node_expands_on_shallower_path() {
        let model = FakeModel::default()
            .method("a", &["b", "c"])
            .method("b", &["c"])
            .method("c", &["d"])
            .method("d", &[]);
        let options = VisitorOptions { max_depth: Some(2), ..VisitorOptions::default() };
        let graph = build(&model, "a", &options);

        // c is first reached at depth 2, then directly from a at depth 1
        let c = graph.node_id(&key("c")).unwrap();
        assert!(!graph.node(c).truncated);
        assert!(graph.is_expanded(c));
        assert!(graph.node(graph.node_id(&key("d")).unwrap()).truncated);
    }

    #[test]
    fn test_node_expanded_deep_keeps_its_truncation() {
        let model = FakeModel::default()
            .method("a", &["b", "c"])
            .method("b", &["c"])
            .method("c", &["d"])
            .method("d", &["e"])
            .method("e", &[]);
        let options = VisitorOptions { max_depth: Some(3), ..VisitorOptions::default() };
        let graph = build(&model, "a", &options);

        // c is expanded at depth 2 first; reaching it again at depth 1 does not rescan it
        let c = graph.node_id(&key("c")).unwrap();
        assert_eq!(graph.edges_to(c).count(), 2);
        assert_eq!(graph.edges_from(c).count(), 1);
        let d = graph.node_id(&key("d")).unwrap();
        assert!(graph.node(d).truncated);
        assert!(!graph.is_expanded(d));
        assert!(graph.node_id(&key("e")).is_none());
    }

    #[test]
    fn test_abstract_methods_link_to_implementations() {
        let model = FakeModel::default()
            .abstract_method("save", &["DbStore.save", "FileStore.save"])
            .method("DbStore.save", &["log"])
            .method("FileStore.save", &[]);
        let graph = build(&model, "save", &VisitorOptions::default());

        let kinds: Vec<EdgeKind> = graph.edges().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EdgeKind::Implementation, EdgeKind::Call, EdgeKind::Implementation]);
        let owners: Vec<&str> = graph.edges_from(graph.root())
            .map(|e| graph.node(e.callee).owner.as_str())
            .collect();
        assert_eq!(owners, vec!["DbStore", "FileStore"]);
        assert_eq!(graph.statistics().implementation_links, 2);

        let options = VisitorOptions { expand_implementations: false, ..VisitorOptions::default() };
        assert_eq!(build(&model, "save", &options).node_count(), 1);
    }

    #[test]
    fn test_skip_patterns_and_external_filter() {
        let model = FakeModel::default()
            .method("main", &["Util.log", "helper", "println"])
            .method("Util.log", &[])
            .method("helper", &[]);
        let options = VisitorOptions {
            include_external: false,
            skip_owner_patterns: vec![Regex::new(r"\.Util$").unwrap()],
            ..VisitorOptions::default()
        };

        let graph = build(&model, "main", &options);
        assert_eq!(edge_names(&graph), pairs(&[("main", "helper")]));
    }

    #[test]
    fn test_visited_root_is_not_expanded() {
        let model = FakeModel::default().method("a", &["b"]).method("b", &[]);
        let options = VisitorOptions::default();
        let mut visited = VisitedSet::new();
        visited.insert(key("a"));

        let graph = MethodChainVisitor::new(&model, &options)
            .generate_method_chains(&model.declaration("a"), &mut visited);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(visited.len(), 1);
    }

    #[test]
    fn test_deep_chain_does_not_exhaust_the_stack() {
        let depth = 10_000;
        let mut model = FakeModel::default();
        for i in 0..depth {
            let name = format!("m{}", i);
            let next = format!("m{}", i + 1);
            let calls: Vec<&str> = if i + 1 < depth { vec![next.as_str()] } else { vec![] };
            model = model.method(&name, &calls);
        }

        let graph = build(&model, "m0", &VisitorOptions::default());
        assert_eq!(graph.node_count(), depth);
        assert_eq!(graph.statistics().max_depth, depth - 1);
    }

    #[test]
    fn test_generate_flow_from_offset() {
        let model = FakeModel::default()
            .method("first", &["second"])
            .method("second", &[]);
        let options = VisitorOptions::default();

        let graph = generate_flow(&model, Path::new("Main.java"), 100, &options).unwrap().unwrap();
        assert_eq!(graph.root_node().key, key("second"));

        assert!(generate_flow(&model, Path::new("Main.java"), 42, &options).unwrap().is_none());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = crate::config::Config::default().analysis;
        config.max_depth = Some(4);
        config.skip_owner_patterns = vec!["^java\\.".to_string()];
        let options = VisitorOptions::from_config(&config).unwrap();
        assert_eq!(options.max_depth, Some(4));
        assert!(options.skips("java.util.List"));

        config.skip_owner_patterns = vec!["(".to_string()];
        assert!(matches!(VisitorOptions::from_config(&config), Err(CallflowError::Config(_))));
    }
}
