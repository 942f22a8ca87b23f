// src/analysis/call_graph/symbols.rs
//! The code model the chain visitor queries.
//!
//! Syntax and symbol information is an injected capability: anything that
//! implements [`SyntaxProvider`] and [`SymbolResolver`] can drive a traversal,
//! whether it is the tree-sitter backed [`super::SourceIndex`] or an in-memory
//! fake in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::error::Result;
use super::super::{simple_name, CallExpr, Receiver, TypeKind};

/// Stable identity of a method: owning type plus signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    /// Qualified owner type name
    pub owner: String,
    pub name: String,
    /// Parameter types in declaration order
    pub params: Vec<String>,
    /// Key of a call that did not resolve. Never equal to a declared method's key.
    #[serde(default)]
    pub external: bool,
}

impl MethodKey {
    pub fn new(owner: &str, name: &str, params: &[&str]) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            external: false,
        }
    }

    pub fn external(owner: &str, name: &str, params: &[&str]) -> Self {
        Self { external: true, ..Self::new(owner, name, params) }
    }

    /// `name(P1, P2)`
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.params.join(", "))
    }

    pub fn owner_simple_name(&self) -> &str {
        simple_name(&self.owner)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.signature())?;
        if self.external {
            write!(f, " [external]")?;
        }
        Ok(())
    }
}

/// Where something sits in source, for navigation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    /// Byte offset
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(file: &Path, line: usize, column: usize, offset: usize) -> Self {
        Self { file: file.to_path_buf(), line, column, offset }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A resolved method declaration, detached from any syntax tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDeclaration {
    pub key: MethodKey,
    pub return_type: String,
    pub location: SourceLocation,
    pub owner_kind: TypeKind,
    /// Whether source for a body is available to scan
    pub has_body: bool,
    pub is_abstract: bool,
    pub is_constructor: bool,
    pub docs: Option<String>,
}

/// One call expression found in a method body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    /// Method whose body holds the call
    pub caller: MethodKey,
    pub location: SourceLocation,
    pub expr: CallExpr,
}

impl CallSite {
    /// Best-effort identity for a call nothing could be resolved for:
    /// the receiver as written (the caller's own type for implicit calls)
    /// and one `?` per argument.
    pub fn external_key(&self) -> MethodKey {
        let owner = match &self.expr.receiver {
            Receiver::Implicit | Receiver::This => self.caller.owner.clone(),
            other => other.text().unwrap_or_default(),
        };
        MethodKey {
            owner,
            name: self.expr.method_name.clone(),
            params: vec!["?".to_string(); self.expr.arguments.len()],
            external: true,
        }
    }
}

/// Access to method structure: where methods are and what they call
pub trait SyntaxProvider {
    /// Innermost method whose declaration contains the zero-based character offset
    fn enclosing_method_at(&self, file: &Path, offset: usize) -> Result<Option<MethodDeclaration>>;

    /// Call sites of a method body in evaluation order. Calls inside lambdas and
    /// anonymous class bodies are included.
    fn call_sites(&self, method: &MethodDeclaration) -> Result<Vec<CallSite>>;

    /// Overrides with a body of an abstract or interface method
    fn implementations(&self, method: &MethodDeclaration) -> Result<Vec<MethodDeclaration>>;
}

/// Binds call sites to declarations
pub trait SymbolResolver {
    /// `Ok(None)` when the target has no source available to the resolver
    fn resolve(&self, call: &CallSite) -> Result<Option<MethodDeclaration>>;
}

/// Everything a traversal needs from the host
pub trait CodeModel: SyntaxProvider + SymbolResolver {}

impl<T: SyntaxProvider + SymbolResolver + ?Sized> CodeModel for T {}

/// Outcome of resolving one call site
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(MethodDeclaration),
    Unresolved,
}

/// Wraps a [`CodeModel`] so that per-call-site failures never escape:
/// errors become [`Resolution::Unresolved`] and traversal goes on.
pub struct ResolverAdapter<'m, M: CodeModel + ?Sized> {
    model: &'m M,
}

impl<'m, M: CodeModel + ?Sized> ResolverAdapter<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self { model }
    }

    pub fn resolve(&self, call: &CallSite) -> Resolution {
        match self.model.resolve(call) {
            Ok(Some(declaration)) => Resolution::Resolved(declaration),
            Ok(None) => {
                debug!("Unresolved call {} at {}", call.expr.text, call.location);
                Resolution::Unresolved
            }
            Err(e) => {
                warn!("Treating call {} at {} as unresolved: {}", call.expr.method_name, call.location, e);
                Resolution::Unresolved
            }
        }
    }

    pub fn call_sites(&self, method: &MethodDeclaration) -> Vec<CallSite> {
        self.model.call_sites(method).unwrap_or_else(|e| {
            warn!("Cannot scan body of {}: {}", method.key, e);
            Vec::new()
        })
    }

    pub fn implementations(&self, method: &MethodDeclaration) -> Vec<MethodDeclaration> {
        self.model.implementations(method).unwrap_or_else(|e| {
            warn!("Cannot look up implementations of {}: {}", method.key, e);
            Vec::new()
        })
    }
}
