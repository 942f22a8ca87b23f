// src/analysis/call_graph/source_index.rs
//! Symbol capability backed by parsed Java sources.
//!
//! Resolution is static and best effort. Anything whose type cannot be found
//! among the indexed files resolves to `None` and becomes an external node.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CallflowError, Result};
use super::super::{simple_name, Argument, CallExpr, MethodDecl, ParsedFile, Receiver, TypeDecl, TypeKind, Variable};
use super::{CallSite, MethodDeclaration, MethodKey, SourceLocation, SymbolResolver, SyntaxProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TypeRef {
    file: usize,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MethodRef {
    ty: TypeRef,
    index: usize,
}

/// What is visible at a call site
struct Scope<'i> {
    /// Innermost type around the call
    type_ref: TypeRef,
    /// Locals and parameters of every method around the call, innermost first
    variables: Vec<&'i Variable>,
}

/// Index over a snapshot of parsed files
pub struct SourceIndex {
    files: Vec<ParsedFile>,
    by_path: HashMap<PathBuf, usize>,
    types: HashMap<String, TypeRef>,
    by_simple_name: HashMap<String, Vec<String>>,
    /// Direct subtypes per qualified supertype
    subtypes: HashMap<String, Vec<String>>,
}

impl SourceIndex {
    pub fn new(files: Vec<ParsedFile>) -> Self {
        let mut index = Self {
            files,
            by_path: HashMap::new(),
            types: HashMap::new(),
            by_simple_name: HashMap::new(),
            subtypes: HashMap::new(),
        };

        for (file_idx, file) in index.files.iter().enumerate() {
            index.by_path.entry(file.path.clone()).or_insert(file_idx);
            for (type_idx, decl) in file.unit.types.iter().enumerate() {
                if index.types.contains_key(&decl.qualified_name) {
                    debug!("Duplicate type {} in {}, keeping the first", decl.qualified_name, file.path.display());
                    continue;
                }
                index.types.insert(decl.qualified_name.clone(), TypeRef { file: file_idx, index: type_idx });
                index.by_simple_name.entry(decl.name.clone()).or_default().push(decl.qualified_name.clone());
            }
        }

        let mut subtypes: HashMap<String, Vec<String>> = HashMap::new();
        for file_idx in 0..index.files.len() {
            for type_idx in 0..index.files[file_idx].unit.types.len() {
                let type_ref = TypeRef { file: file_idx, index: type_idx };
                let decl = index.type_decl(type_ref);
                if index.types.get(&decl.qualified_name) != Some(&type_ref) {
                    continue;
                }
                for supertype in decl.supertypes() {
                    if let Some(resolved) = index.resolve_type_name(supertype, type_ref) {
                        subtypes.entry(resolved).or_default().push(decl.qualified_name.clone());
                    }
                }
            }
        }
        index.subtypes = subtypes;

        debug!("Indexed {} types from {} files", index.types.len(), index.files.len());
        index
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn file(&self, path: &Path) -> Option<&ParsedFile> {
        self.by_path.get(path).map(|&i| &self.files[i])
    }

    /// Declaration for a key, if the index has it
    pub fn method(&self, key: &MethodKey) -> Option<MethodDeclaration> {
        self.find_method(key).map(|m| self.declaration(m))
    }

    /// All methods and constructors declared in a file, in source order
    pub fn methods_in(&self, path: &Path) -> Result<Vec<MethodDeclaration>> {
        let file = self.file_index(path)?;
        let mut methods: Vec<MethodDeclaration> = self.files[file].unit.types.iter()
            .enumerate()
            .flat_map(|(type_idx, decl)| {
                (0..decl.methods.len()).map(move |index| MethodRef { ty: TypeRef { file, index: type_idx }, index })
            })
            .map(|m| self.declaration(m))
            .collect();
        methods.sort_by_key(|m| m.location.offset);
        Ok(methods)
    }

    fn file_index(&self, path: &Path) -> Result<usize> {
        self.by_path.get(path).copied().ok_or_else(|| CallflowError::StaleSource {
            file: path.to_path_buf(),
            reason: "file is not part of the index".to_string(),
        })
    }

    fn type_decl(&self, type_ref: TypeRef) -> &TypeDecl {
        &self.files[type_ref.file].unit.types[type_ref.index]
    }

    fn method_decl(&self, method: MethodRef) -> &MethodDecl {
        &self.type_decl(method.ty).methods[method.index]
    }

    fn find_method(&self, key: &MethodKey) -> Option<MethodRef> {
        let ty = *self.types.get(&key.owner)?;
        let index = self.type_decl(ty).methods.iter()
            .position(|m| m.name == key.name && m.param_types() == key.params)?;
        Some(MethodRef { ty, index })
    }

    fn declaration(&self, method: MethodRef) -> MethodDeclaration {
        let owner = self.type_decl(method.ty);
        let decl = &owner.methods[method.index];
        let file = &self.files[method.ty.file];
        MethodDeclaration {
            key: MethodKey {
                owner: owner.qualified_name.clone(),
                name: decl.name.clone(),
                params: decl.param_types(),
                external: false,
            },
            return_type: decl.return_type.clone(),
            location: SourceLocation::new(&file.path, decl.line, decl.column, decl.offset),
            owner_kind: owner.kind,
            has_body: decl.has_body,
            is_abstract: !decl.has_body,
            is_constructor: decl.is_constructor,
            docs: decl.docs.clone().or_else(|| self.inherited_docs(method)),
        }
    }

    /// Javadoc of the nearest overridden declaration in the supertypes
    fn inherited_docs(&self, method: MethodRef) -> Option<String> {
        let decl = self.method_decl(method);
        if decl.is_constructor {
            return None;
        }
        let params = decl.param_types();
        self.hierarchy(method.ty).into_iter()
            .skip(1)
            .find_map(|ty| {
                self.type_decl(ty).methods.iter()
                    .find(|m| !m.is_constructor && m.name == decl.name && m.param_types() == params)
                    .and_then(|m| m.docs.clone())
            })
    }

    /// Qualified name of a type as written inside `context`. Lookup order:
    /// nested in the context or an enclosing type, same package, single-type
    /// imports, wildcard imports, then a simple name unique in the index.
    fn resolve_type_name(&self, name: &str, context: TypeRef) -> Option<String> {
        let name = name.trim();
        if name.is_empty() || name.ends_with("[]") {
            return None;
        }
        if let Some((head, rest)) = name.split_once('.') {
            if self.types.contains_key(name) {
                return Some(name.to_string());
            }
            return self.resolve_type_name(head, context)
                .map(|outer| format!("{}.{}", outer, rest))
                .filter(|qualified| self.types.contains_key(qualified));
        }

        for scope in self.enclosing_types(context) {
            let decl = self.type_decl(scope);
            if decl.name == name {
                return Some(decl.qualified_name.clone());
            }
            let nested = format!("{}.{}", decl.qualified_name, name);
            if self.types.contains_key(&nested) {
                return Some(nested);
            }
        }

        let unit = &self.files[context.file].unit;
        let same_package = match &unit.package {
            Some(package) => format!("{}.{}", package, name),
            None => name.to_string(),
        };
        if self.types.contains_key(&same_package) {
            return Some(same_package);
        }

        for import in unit.imports.iter().filter(|i| !i.is_static && !i.is_wildcard) {
            if simple_name(&import.path) == name {
                // Imported from outside the index
                return self.types.contains_key(&import.path).then(|| import.path.clone());
            }
        }
        for import in unit.imports.iter().filter(|i| !i.is_static && i.is_wildcard) {
            let candidate = format!("{}.{}", import.path, name);
            if self.types.contains_key(&candidate) {
                return Some(candidate);
            }
        }

        match self.by_simple_name.get(name).map(Vec::as_slice) {
            Some([only]) => Some(only.clone()),
            _ => None,
        }
    }

    fn lookup_type(&self, name: &str, context: TypeRef) -> Option<TypeRef> {
        self.resolve_type_name(name, context)
            .and_then(|qualified| self.types.get(&qualified).copied())
    }

    /// The type itself, then its lexically enclosing types, innermost first
    fn enclosing_types(&self, start: TypeRef) -> Vec<TypeRef> {
        let mut chain = vec![start];
        let mut current = start;
        while let Some(outer) = self.type_decl(current).outer.as_ref().and_then(|o| self.types.get(o)) {
            if chain.contains(outer) {
                break;
            }
            chain.push(*outer);
            current = *outer;
        }
        chain
    }

    /// The type followed by its indexed supertypes, breadth first
    fn hierarchy(&self, start: TypeRef) -> Vec<TypeRef> {
        let mut order = vec![start];
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for supertype in self.type_decl(current).supertypes() {
                if let Some(found) = self.lookup_type(supertype, current) {
                    if seen.insert(found) {
                        order.push(found);
                        queue.push_back(found);
                    }
                }
            }
        }
        order
    }

    fn is_subtype(&self, sub: TypeRef, sup: TypeRef) -> bool {
        self.hierarchy(sub).contains(&sup)
    }

    /// Every indexed type extending or implementing `qualified`, transitively
    fn all_subtypes(&self, qualified: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([qualified.to_string()]);
        while let Some(current) = queue.pop_front() {
            for sub in self.subtypes.get(&current).into_iter().flatten() {
                if seen.insert(sub.clone()) {
                    found.push(sub.clone());
                    queue.push_back(sub.clone());
                }
            }
        }
        found
    }

    /// Overriding methods with a body, ordered by key
    fn overrides(&self, method: MethodRef) -> Vec<MethodDeclaration> {
        let decl = self.method_decl(method);
        let params = decl.param_types();
        let owner = &self.type_decl(method.ty).qualified_name;

        let mut found: Vec<MethodDeclaration> = self.all_subtypes(owner).iter()
            .filter_map(|sub| self.types.get(sub).copied())
            .filter_map(|ty| {
                self.type_decl(ty).methods.iter()
                    .position(|m| m.has_body && m.name == decl.name && m.param_types() == params)
                    .map(|index| self.declaration(MethodRef { ty, index }))
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        found
    }

    /// An abstract target with exactly one implementation binds to it
    fn effective_target(&self, method: MethodRef) -> MethodDeclaration {
        let declaration = self.declaration(method);
        if !declaration.is_abstract {
            return declaration;
        }
        let mut implementations = self.overrides(method);
        if implementations.len() == 1 {
            debug!("{} has a single implementation {}", declaration.key, implementations[0].key);
            return implementations.remove(0);
        }
        declaration
    }

    fn scope_at(&self, file: usize, byte: usize, fallback: TypeRef) -> Scope<'_> {
        let types = &self.files[file].unit.types;
        let type_ref = types.iter()
            .enumerate()
            .filter(|(_, t)| t.byte_range.0 <= byte && byte < t.byte_range.1)
            .min_by_key(|(_, t)| t.byte_range.1 - t.byte_range.0)
            .map(|(index, _)| TypeRef { file, index })
            .unwrap_or(fallback);

        let mut methods: Vec<&MethodDecl> = types.iter()
            .flat_map(|t| t.methods.iter())
            .filter(|m| m.contains(byte))
            .collect();
        methods.sort_by_key(|m| m.byte_range.1 - m.byte_range.0);

        let variables = methods.into_iter()
            .flat_map(|m| m.locals.iter().chain(m.params.iter()))
            .collect();
        Scope { type_ref, variables }
    }

    /// Declared type of a variable or field visible in `scope`, with the type
    /// it must be resolved in
    fn variable_declared_type(&self, name: &str, scope: &Scope) -> Option<(String, TypeRef)> {
        if let Some(variable) = scope.variables.iter().find(|v| v.name == name) {
            return Some((variable.type_name.clone(), scope.type_ref));
        }
        self.field_declared_type(name, scope.type_ref)
    }

    /// Own and inherited fields first, then those of enclosing types
    fn field_declared_type(&self, name: &str, context: TypeRef) -> Option<(String, TypeRef)> {
        for enclosing in self.enclosing_types(context) {
            for ty in self.hierarchy(enclosing) {
                if let Some(field) = self.type_decl(ty).fields.iter().find(|f| f.name == name) {
                    return Some((field.type_name.clone(), ty));
                }
            }
        }
        None
    }

    /// Type of a possibly dotted name: variable, field chain or type reference
    fn name_type(&self, name: &str, scope: &Scope) -> Option<TypeRef> {
        let mut segments = name.split('.');
        let head = segments.next()?;
        let rest: Vec<&str> = segments.collect();

        let mut current = match self.variable_declared_type(head, scope) {
            Some((declared, context)) => self.lookup_type(&declared, context)?,
            None => {
                // Longest prefix naming a type, e.g. `Outer.Inner.CONSTANT`
                let mut found = None;
                for split in (0..=rest.len()).rev() {
                    let prefix = std::iter::once(head).chain(rest[..split].iter().copied())
                        .collect::<Vec<_>>()
                        .join(".");
                    if let Some(ty) = self.lookup_type(&prefix, scope.type_ref) {
                        found = Some((ty, split));
                        break;
                    }
                }
                let (ty, consumed) = found?;
                return self.field_chain(ty, &rest[consumed..]);
            }
        };
        for segment in rest {
            current = self.field_chain(current, &[segment])?;
        }
        Some(current)
    }

    fn field_chain(&self, start: TypeRef, fields: &[&str]) -> Option<TypeRef> {
        let mut current = start;
        for field in fields {
            current = match self.field_declared_type(field, current) {
                Some((declared, context)) => self.lookup_type(&declared, context)?,
                // Enum constants are not recorded as fields; they have the enum's type
                None if self.type_decl(current).kind == TypeKind::Enum => current,
                None => return None,
            };
        }
        Some(current)
    }

    /// Types to search for the invoked method, in priority order
    fn search_roots(&self, call: &CallExpr, scope: &Scope) -> Result<Vec<TypeRef>> {
        let roots = match &call.receiver {
            Receiver::Implicit => {
                let mut roots = self.enclosing_types(scope.type_ref);
                roots.extend(self.static_import_owners(scope.type_ref.file, &call.method_name));
                roots
            }
            Receiver::This => vec![scope.type_ref],
            Receiver::Super => self.type_decl(scope.type_ref).superclass.as_ref()
                .and_then(|s| self.lookup_type(s, scope.type_ref))
                .into_iter()
                .collect(),
            Receiver::Name(name) => self.name_type(name, scope).into_iter().collect(),
            Receiver::ThisField(field) => self.field_declared_type(field, scope.type_ref)
                .and_then(|(declared, context)| self.lookup_type(&declared, context))
                .into_iter()
                .collect(),
            Receiver::Call(inner) => match self.resolve_call(inner, scope)? {
                Some(target) => {
                    let return_type = &self.method_decl(target).return_type;
                    self.lookup_type(return_type, target.ty).into_iter().collect()
                }
                None => Vec::new(),
            },
            Receiver::New(type_name) => self.lookup_type(type_name, scope.type_ref).into_iter().collect(),
            Receiver::Other(_) => Vec::new(),
        };
        Ok(roots)
    }

    fn static_import_owners(&self, file: usize, method_name: &str) -> Vec<TypeRef> {
        self.files[file].unit.imports.iter()
            .filter(|i| i.is_static)
            .filter_map(|import| {
                if import.is_wildcard {
                    Some(import.path.as_str())
                } else {
                    import.path.rsplit_once('.')
                        .filter(|(_, member)| *member == method_name)
                        .map(|(owner, _)| owner)
                }
            })
            .filter_map(|owner| self.types.get(owner).copied())
            .collect()
    }

    /// Methods with this name visible through a type's hierarchy. An override
    /// hides the declarations it overrides.
    fn methods_named(&self, root: TypeRef, name: &str) -> Vec<MethodRef> {
        let mut signatures = HashSet::new();
        let mut found = Vec::new();
        for ty in self.hierarchy(root) {
            for (index, method) in self.type_decl(ty).methods.iter().enumerate() {
                if method.name == name && !method.is_constructor && signatures.insert(method.param_types()) {
                    found.push(MethodRef { ty, index });
                }
            }
        }
        found
    }

    fn resolve_call(&self, call: &CallExpr, scope: &Scope) -> Result<Option<MethodRef>> {
        for root in self.search_roots(call, scope)? {
            let candidates = self.methods_named(root, &call.method_name);
            if !candidates.is_empty() {
                return self.select_overload(candidates, call, scope);
            }
        }
        Ok(None)
    }

    fn select_overload(&self, candidates: Vec<MethodRef>, call: &CallExpr, scope: &Scope) -> Result<Option<MethodRef>> {
        let argument_types: Vec<Option<String>> = call.arguments.iter()
            .map(|a| self.argument_type(a, scope))
            .collect();

        let mut best: Vec<MethodRef> = Vec::new();
        let mut best_rank = None;
        for candidate in candidates {
            let Some(rank) = self.applicability(self.method_decl(candidate), &argument_types, scope.type_ref) else {
                continue;
            };
            match best_rank {
                Some(top) if rank < top => {}
                Some(top) if rank == top => best.push(candidate),
                _ => {
                    best = vec![candidate];
                    best_rank = Some(rank);
                }
            }
        }

        match best.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            tied => Err(CallflowError::AmbiguousCall {
                name: call.method_name.clone(),
                candidates: tied.iter().map(|m| self.declaration(*m).key.to_string()).collect(),
            }),
        }
    }

    fn argument_type(&self, argument: &Argument, scope: &Scope) -> Option<String> {
        if let Some(known) = &argument.known_type {
            return Some(known.clone());
        }
        if argument.is_identifier {
            return self.variable_declared_type(&argument.text, scope).map(|(declared, _)| declared);
        }
        None
    }

    /// `None` when the method cannot take these arguments; otherwise a rank
    /// where fixed-arity methods beat varargs and closer argument types win.
    fn applicability(&self, method: &MethodDecl, arguments: &[Option<String>], context: TypeRef) -> Option<(bool, i32)> {
        let params = method.param_types();
        let fixed = if method.is_varargs { params.len().saturating_sub(1) } else { params.len() };
        let exact_arity = arguments.len() == params.len();
        if method.is_varargs {
            if arguments.len() < fixed {
                return None;
            }
        } else if !exact_arity {
            return None;
        }

        let mut score = 0;
        for (position, argument) in arguments.iter().enumerate() {
            let param = if position < fixed {
                params[position].as_str()
            } else {
                let last = params[params.len() - 1].as_str();
                match argument {
                    Some(arg) if exact_arity && arg.ends_with("[]") => last,
                    _ => last.strip_suffix("[]").unwrap_or(last),
                }
            };
            if let Some(argument) = argument {
                score += self.argument_fit(argument, param, context)?;
            }
        }
        Some((!method.is_varargs, score))
    }

    fn argument_fit(&self, argument: &str, param: &str, context: TypeRef) -> Option<i32> {
        let (arg, param) = (simple_name(argument), simple_name(param));
        if arg == param {
            return Some(3);
        }
        if boxed(arg) == Some(param) || boxed(param) == Some(arg) {
            return Some(2);
        }
        if let (Some(from), Some(to)) = (numeric_rank(arg), numeric_rank(param)) {
            return (from < to).then_some(2);
        }
        if param == "Object" {
            return Some(1);
        }
        if is_builtin(arg) && is_builtin(param) {
            return None;
        }
        match (self.lookup_type(argument, context), self.lookup_type(param, context)) {
            (Some(sub), Some(sup)) if self.is_subtype(sub, sup) => Some(2),
            _ => Some(0),
        }
    }
}

fn boxed(primitive: &str) -> Option<&'static str> {
    Some(match primitive {
        "boolean" => "Boolean",
        "byte" => "Byte",
        "short" => "Short",
        "char" => "Character",
        "int" => "Integer",
        "long" => "Long",
        "float" => "Float",
        "double" => "Double",
        _ => return None,
    })
}

fn numeric_rank(primitive: &str) -> Option<u8> {
    match primitive {
        "byte" => Some(0),
        "short" | "char" => Some(1),
        "int" => Some(2),
        "long" => Some(3),
        "float" => Some(4),
        "double" => Some(5),
        _ => None,
    }
}

/// Primitives, their boxes and `String`
fn is_builtin(name: &str) -> bool {
    const BOXES: [&str; 8] = ["Boolean", "Byte", "Short", "Character", "Integer", "Long", "Float", "Double"];
    name == "String" || boxed(name).is_some() || BOXES.contains(&name)
}

impl SyntaxProvider for SourceIndex {
    fn enclosing_method_at(&self, file: &Path, offset: usize) -> Result<Option<MethodDeclaration>> {
        let file_idx = self.file_index(file)?;
        let Some(byte) = self.files[file_idx].byte_offset(offset) else {
            return Ok(None);
        };

        let innermost = self.files[file_idx].unit.types.iter()
            .enumerate()
            .flat_map(|(type_idx, decl)| {
                decl.methods.iter().enumerate().map(move |(index, method)| {
                    (MethodRef { ty: TypeRef { file: file_idx, index: type_idx }, index }, method)
                })
            })
            .filter(|(_, method)| method.contains(byte))
            .min_by_key(|(_, method)| method.byte_range.1 - method.byte_range.0)
            .map(|(m, _)| self.declaration(m));
        Ok(innermost)
    }

    fn call_sites(&self, method: &MethodDeclaration) -> Result<Vec<CallSite>> {
        let found = self.find_method(&method.key).ok_or_else(|| CallflowError::StaleSource {
            file: method.location.file.clone(),
            reason: format!("{} is no longer declared", method.key),
        })?;
        let path = &self.files[found.ty.file].path;
        Ok(self.method_decl(found).calls.iter()
            .map(|call| CallSite {
                caller: method.key.clone(),
                location: SourceLocation::new(path, call.line, call.column, call.offset),
                expr: call.clone(),
            })
            .collect())
    }

    fn implementations(&self, method: &MethodDeclaration) -> Result<Vec<MethodDeclaration>> {
        let found = self.find_method(&method.key).ok_or_else(|| CallflowError::StaleSource {
            file: method.location.file.clone(),
            reason: format!("{} is no longer declared", method.key),
        })?;
        Ok(self.overrides(found))
    }
}

impl SymbolResolver for SourceIndex {
    fn resolve(&self, call: &CallSite) -> Result<Option<MethodDeclaration>> {
        let file = self.file_index(&call.location.file)?;
        let caller = self.find_method(&call.caller).ok_or_else(|| CallflowError::StaleSource {
            file: call.location.file.clone(),
            reason: format!("caller {} is no longer declared", call.caller),
        })?;
        let scope = self.scope_at(file, call.expr.offset, caller.ty);
        Ok(self.resolve_call(&call.expr, &scope)?.map(|target| self.effective_target(target)))
    }
}
