// src/analysis/languages/java.rs - Java structure and call-site extraction
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use regex::Regex;
use tree_sitter::{Node, Parser};

use crate::error::{CallflowError, Result};
use super::LanguageParser;
use super::super::{
    Argument, CallExpr, CompilationUnit, ImportDecl, MethodDecl, Receiver, TypeDecl, TypeKind,
    Variable,
};

/// Java parser using Tree-sitter
pub struct JavaParser {
    parser: Parser,
}

impl JavaParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let java_language = tree_sitter_java::language();
        parser.set_language(&java_language)
            .map_err(|e| CallflowError::Parser(format!("Failed to set Java language: {}", e)))?;

        Ok(Self { parser })
    }
}

impl LanguageParser for JavaParser {
    fn parse(&mut self, content: &str, file_path: &Path) -> Result<CompilationUnit> {
        let tree = self.parser.parse(content, None)
            .ok_or_else(|| CallflowError::Parser(format!("Failed to parse {}", file_path.display())))?;

        let mut extractor = Extractor::new(content);
        extractor.extract_program(tree.root_node());
        Ok(extractor.finish())
    }

    fn file_extensions(&self) -> &[&str] {
        &["java"]
    }

    fn language_name(&self) -> &str {
        "java"
    }
}

/// Strip annotations, generic arguments and whitespace from a type as written.
/// Varargs become arrays.
pub(crate) fn normalize_type(raw: &str) -> String {
    static ANNOTATION: OnceLock<Regex> = OnceLock::new();
    let annotation = ANNOTATION.get_or_init(|| {
        Regex::new(r"@[\w.]+(\([^)]*\))?").expect("annotation regex is valid")
    });

    let raw = raw.trim();
    let raw = raw.strip_prefix("final ").unwrap_or(raw);
    let cleaned = annotation.replace_all(raw, "");

    let mut out = String::with_capacity(cleaned.len());
    let mut depth = 0usize;
    for ch in cleaned.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out.replace("...", "[]")
}

/// Last segment of a dotted name
pub(crate) fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Walks a Java tree-sitter CST and collects types, methods and call sites.
struct Extractor<'a> {
    source: &'a str,
    package: Option<String>,
    imports: Vec<ImportDecl>,
    types: Vec<TypeDecl>,
    /// Anonymous class counter per enclosing type
    anonymous_counters: HashMap<String, usize>,
}

/// Accumulates what one method body contributes
#[derive(Default)]
struct BodyScan {
    locals: Vec<Variable>,
    calls: Vec<CallExpr>,
}

impl<'a> Extractor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            package: None,
            imports: Vec::new(),
            types: Vec::new(),
            anonymous_counters: HashMap::new(),
        }
    }

    fn finish(self) -> CompilationUnit {
        CompilationUnit {
            package: self.package,
            imports: self.imports,
            types: self.types,
        }
    }

    fn text(&self, node: Node) -> &'a str {
        &self.source[node.byte_range()]
    }

    fn extract_program(&mut self, root: Node) {
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "package_declaration" => {
                    let text = self.text(child);
                    let name = text.trim_start_matches("package").trim().trim_end_matches(';');
                    self.package = Some(name.split_whitespace().collect());
                }
                "import_declaration" => {
                    self.imports.push(self.parse_import(child));
                }
                kind if is_type_declaration(kind) => {
                    self.extract_type(child, None);
                }
                _ => {}
            }
        }
    }

    fn parse_import(&self, node: Node) -> ImportDecl {
        let text: String = self.text(node)
            .trim_start_matches("import")
            .trim_end_matches(';')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let (is_static, path) = match text.strip_prefix("static ") {
            Some(rest) => (true, rest.replace(' ', "")),
            None => (false, text.replace(' ', "")),
        };
        let is_wildcard = path.ends_with(".*");
        ImportDecl {
            path: path.trim_end_matches(".*").to_string(),
            is_static,
            is_wildcard,
        }
    }

    /// Named class, interface, enum or record declaration
    fn extract_type(&mut self, node: Node, outer: Option<&str>) {
        let kind = match node.kind() {
            "class_declaration" => TypeKind::Class,
            "interface_declaration" => TypeKind::Interface,
            "enum_declaration" => TypeKind::Enum,
            "record_declaration" => TypeKind::Record,
            _ => return,
        };
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified_name = match (outer, &self.package) {
            (Some(outer), _) => format!("{}.{}", outer, name),
            (None, Some(package)) => format!("{}.{}", package, name),
            (None, None) => name.clone(),
        };

        let modifiers = find_child_by_kind(node, "modifiers")
            .map(|m| self.text(m))
            .unwrap_or("");
        let is_abstract = kind == TypeKind::Interface || contains_word(modifiers, "abstract");

        let superclass = node.child_by_field_name("superclass")
            .map(|s| normalize_type(self.text(s).trim_start().trim_start_matches("extends")));
        let interfaces = ["super_interfaces", "extends_interfaces"]
            .iter()
            .filter_map(|k| find_child_by_kind(node, k))
            .flat_map(|list| self.type_list(list))
            .collect();

        let mut decl = TypeDecl {
            name,
            qualified_name,
            kind,
            is_abstract,
            outer: outer.map(str::to_string),
            superclass,
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            byte_range: (node.start_byte(), node.end_byte()),
        };

        if kind == TypeKind::Record {
            if let Some(params) = node.child_by_field_name("parameters") {
                let (components, _) = self.parameters(params);
                decl.fields.extend(components);
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.extract_members(body, &mut decl);
        }
        self.types.push(decl);
    }

    fn type_list(&self, node: Node) -> Vec<String> {
        let Some(list) = find_child_by_kind(node, "type_list") else {
            return Vec::new();
        };
        let mut cursor = list.walk();
        list.named_children(&mut cursor)
            .map(|t| normalize_type(self.text(t)))
            .collect()
    }

    /// Members of a class, interface, enum or anonymous class body
    fn extract_members(&mut self, body: Node, decl: &mut TypeDecl) {
        let mut cursor = body.walk();
        let children: Vec<Node> = body.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "method_declaration" | "constructor_declaration" => {
                    let method = self.extract_method(child, decl);
                    decl.methods.push(method);
                }
                "field_declaration" | "constant_declaration" => {
                    self.extract_field(child, decl);
                }
                "enum_body_declarations" => {
                    self.extract_members(child, decl);
                }
                "enum_constant" => {
                    if let Some(class_body) = find_child_by_kind(child, "class_body") {
                        self.extract_anonymous(class_body, &decl.qualified_name.clone());
                    }
                }
                "static_initializer" | "block" => {
                    // Initializers never belong to a method; only their nested types matter
                    let mut scan = BodyScan::default();
                    self.scan_body(child, &decl.qualified_name.clone(), &mut scan);
                }
                kind if is_type_declaration(kind) => {
                    self.extract_type(child, Some(&decl.qualified_name.clone()));
                }
                _ => {}
            }
        }
    }

    fn extract_field(&mut self, node: Node, decl: &mut TypeDecl) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let type_name = normalize_type(self.text(type_node));
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            if let Some(name) = declarator.child_by_field_name("name") {
                decl.fields.push(Variable {
                    name: self.text(name).to_string(),
                    type_name: type_name.clone(),
                });
            }
            if let Some(value) = declarator.child_by_field_name("value") {
                let mut scan = BodyScan::default();
                self.scan_body(value, &decl.qualified_name.clone(), &mut scan);
            }
        }
    }

    fn extract_method(&mut self, node: Node, owner: &TypeDecl) -> MethodDecl {
        let is_constructor = node.kind() == "constructor_declaration";
        let name_node = node.child_by_field_name("name");
        let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
        let (params, is_varargs) = node.child_by_field_name("parameters")
            .map(|p| self.parameters(p))
            .unwrap_or_default();

        let return_type = if is_constructor {
            "void".to_string()
        } else {
            let base = node.child_by_field_name("type")
                .map(|t| normalize_type(self.text(t)))
                .unwrap_or_else(|| "void".to_string());
            // `int foo()[]` legacy array syntax
            match node.child_by_field_name("dimensions") {
                Some(dims) => format!("{}{}", base, self.text(dims).replace(char::is_whitespace, "")),
                None => base,
            }
        };

        let modifiers = find_child_by_kind(node, "modifiers")
            .map(|m| self.text(m))
            .unwrap_or("");
        let body = node.child_by_field_name("body");

        let mut scan = BodyScan::default();
        if let Some(body) = body {
            self.scan_body(body, &owner.qualified_name, &mut scan);
        }

        let anchor = name_node.unwrap_or(node);
        let start = anchor.start_position();

        MethodDecl {
            name,
            params,
            is_varargs,
            return_type,
            is_constructor,
            is_static: contains_word(modifiers, "static"),
            has_body: body.is_some(),
            docs: self.javadoc_before(node),
            byte_range: (node.start_byte(), node.end_byte()),
            offset: anchor.start_byte(),
            line: start.row + 1,
            column: start.column + 1,
            locals: scan.locals,
            calls: scan.calls,
        }
    }

    /// Formal parameters, and whether the last one is variadic
    fn parameters(&self, node: Node) -> (Vec<Variable>, bool) {
        let mut params = Vec::new();
        let mut is_varargs = false;
        let mut cursor = node.walk();
        for param in node.named_children(&mut cursor) {
            match param.kind() {
                "formal_parameter" => {
                    let type_name = param.child_by_field_name("type")
                        .map(|t| normalize_type(self.text(t)))
                        .unwrap_or_default();
                    let name = param.child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let dims = param.child_by_field_name("dimensions")
                        .map(|d| self.text(d).replace(char::is_whitespace, ""))
                        .unwrap_or_default();
                    params.push(Variable { name, type_name: format!("{}{}", type_name, dims) });
                }
                "spread_parameter" => {
                    let mut inner = param.walk();
                    let mut type_name = String::new();
                    let mut name = String::new();
                    for part in param.named_children(&mut inner) {
                        match part.kind() {
                            "modifiers" => {}
                            "variable_declarator" => {
                                name = part.child_by_field_name("name")
                                    .map(|n| self.text(n).to_string())
                                    .unwrap_or_default();
                            }
                            _ if type_name.is_empty() => type_name = normalize_type(self.text(part)),
                            _ => {}
                        }
                    }
                    is_varargs = true;
                    params.push(Variable { name, type_name: format!("{}[]", type_name) });
                }
                _ => {}
            }
        }
        (params, is_varargs)
    }

    /// Javadoc comment directly before a declaration
    fn javadoc_before(&self, node: Node) -> Option<String> {
        let previous = node.prev_sibling()?;
        if previous.kind() != "block_comment" {
            return None;
        }
        let text = self.text(previous);
        if !text.starts_with("/**") {
            return None;
        }
        let cleaned: Vec<&str> = text
            .trim_start_matches("/**")
            .trim_end_matches("*/")
            .lines()
            .map(|line| line.trim().trim_start_matches('*').trim())
            .filter(|line| !line.is_empty())
            .collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.join("\n"))
        }
    }

    /// Post-order walk collecting locals and calls. Anonymous class bodies and
    /// lambdas count as part of the enclosing body, local classes do not.
    fn scan_body(&mut self, node: Node, owner: &str, scan: &mut BodyScan) {
        match node.kind() {
            kind if is_type_declaration(kind) => {
                self.extract_type(node, Some(owner));
                return;
            }
            "object_creation_expression" => {
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                for child in &children {
                    if child.kind() != "class_body" {
                        self.scan_body(*child, owner, scan);
                    }
                }
                if let Some(class_body) = children.iter().find(|c| c.kind() == "class_body") {
                    let calls = self.extract_anonymous(*class_body, owner);
                    scan.calls.extend(calls);
                }
                return;
            }
            "local_variable_declaration" => self.record_locals(node, scan),
            "enhanced_for_statement" | "resource" | "catch_formal_parameter" => {
                self.record_single_local(node, scan);
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.scan_body(child, owner, scan);
        }

        if node.kind() == "method_invocation" {
            if let Some(call) = self.call_expr(node) {
                scan.calls.push(call);
            }
        }
    }

    /// Registers an anonymous class and returns the calls of all its methods
    fn extract_anonymous(&mut self, class_body: Node, owner: &str) -> Vec<CallExpr> {
        let counter = self.anonymous_counters.entry(owner.to_string()).or_insert(0);
        *counter += 1;
        let index = *counter;

        let base_type = class_body.parent()
            .and_then(|creation| creation.child_by_field_name("type"))
            .map(|t| normalize_type(self.text(t)));

        let owner_simple = simple_name(owner).to_string();
        let mut decl = TypeDecl {
            name: format!("{}${}", owner_simple, index),
            qualified_name: format!("{}${}", owner, index),
            kind: TypeKind::Anonymous,
            is_abstract: false,
            outer: Some(owner.to_string()),
            superclass: base_type,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            byte_range: (class_body.start_byte(), class_body.end_byte()),
        };
        self.extract_members(class_body, &mut decl);
        let calls = decl.methods.iter().flat_map(|m| m.calls.iter().cloned()).collect();
        self.types.push(decl);
        calls
    }

    fn record_locals(&self, node: Node, scan: &mut BodyScan) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let declared = normalize_type(self.text(type_node));
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            let type_name = if declared == "var" {
                declarator.child_by_field_name("value")
                    .and_then(|value| self.expression_type(value))
                    .unwrap_or(declared.clone())
            } else {
                declared.clone()
            };
            scan.locals.push(Variable { name: self.text(name).to_string(), type_name });
        }
    }

    fn record_single_local(&self, node: Node, scan: &mut BodyScan) {
        let type_node = node.child_by_field_name("type")
            .or_else(|| find_child_by_kind(node, "catch_type"));
        let (Some(type_node), Some(name)) = (type_node, node.child_by_field_name("name")) else {
            return;
        };
        // `catch (A | B e)` binds the first alternative
        let type_text = self.text(type_node).split('|').next().unwrap_or("");
        scan.locals.push(Variable {
            name: self.text(name).to_string(),
            type_name: normalize_type(type_text),
        });
    }

    fn call_expr(&self, node: Node) -> Option<CallExpr> {
        let name_node = node.child_by_field_name("name")?;
        let receiver = match node.child_by_field_name("object") {
            None => Receiver::Implicit,
            Some(object) => self.receiver(object),
        };
        let arguments = node.child_by_field_name("arguments")
            .map(|args| self.arguments(args))
            .unwrap_or_default();
        let start = name_node.start_position();

        Some(CallExpr {
            method_name: self.text(name_node).to_string(),
            receiver,
            arguments,
            offset: name_node.start_byte(),
            line: start.row + 1,
            column: start.column + 1,
            text: self.text(node).to_string(),
        })
    }

    fn receiver(&self, object: Node) -> Receiver {
        match object.kind() {
            "this" => Receiver::This,
            "super" => Receiver::Super,
            "identifier" => Receiver::Name(self.text(object).to_string()),
            "field_access" => {
                let target = object.child_by_field_name("object");
                let field = object.child_by_field_name("field");
                match (target, field) {
                    (Some(t), Some(f)) if t.kind() == "this" => {
                        Receiver::ThisField(self.text(f).to_string())
                    }
                    _ => {
                        let text = self.text(object);
                        if text.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$') {
                            Receiver::Name(text.to_string())
                        } else {
                            Receiver::Other(text.to_string())
                        }
                    }
                }
            }
            "method_invocation" => match self.call_expr(object) {
                Some(call) => Receiver::Call(Box::new(call)),
                None => Receiver::Other(self.text(object).to_string()),
            },
            "object_creation_expression" => match object.child_by_field_name("type") {
                Some(t) => Receiver::New(normalize_type(self.text(t))),
                None => Receiver::Other(self.text(object).to_string()),
            },
            "parenthesized_expression" => match object.named_child(0) {
                Some(inner) if inner.kind() != "cast_expression" => self.receiver(inner),
                _ => Receiver::Other(self.text(object).to_string()),
            },
            _ => Receiver::Other(self.text(object).to_string()),
        }
    }

    fn arguments(&self, node: Node) -> Vec<Argument> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|arg| !arg.kind().ends_with("comment"))
            .map(|arg| Argument {
                text: self.text(arg).to_string(),
                known_type: self.expression_type(arg),
                is_identifier: arg.kind() == "identifier",
            })
            .collect()
    }

    /// Type of an expression when syntax alone determines it
    fn expression_type(&self, node: Node) -> Option<String> {
        let kind = node.kind();
        let text = self.text(node);
        match kind {
            "string_literal" | "text_block" => Some("String".to_string()),
            "character_literal" => Some("char".to_string()),
            "true" | "false" => Some("boolean".to_string()),
            "decimal_integer_literal" | "hex_integer_literal" | "octal_integer_literal"
            | "binary_integer_literal" => {
                if text.ends_with('l') || text.ends_with('L') {
                    Some("long".to_string())
                } else {
                    Some("int".to_string())
                }
            }
            "decimal_floating_point_literal" | "hex_floating_point_literal" => {
                if text.ends_with('f') || text.ends_with('F') {
                    Some("float".to_string())
                } else {
                    Some("double".to_string())
                }
            }
            "object_creation_expression" | "cast_expression" => node
                .child_by_field_name("type")
                .map(|t| normalize_type(self.text(t))),
            "parenthesized_expression" => node.named_child(0).and_then(|n| self.expression_type(n)),
            _ => None,
        }
    }
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
    )
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

/// Find a child node by its kind
fn find_child_by_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|child| child.kind() == kind);
    found
}
