//! Language-specific parsers
//!
//! Each language gets its own module that turns source text into the owned
//! structural model in [`super::parser`]: types, methods, locals and call
//! expressions.

mod java;

pub use java::JavaParser;
pub(crate) use java::simple_name;

use crate::error::Result;
use super::CompilationUnit;

/// Trait that all language parsers must implement
pub trait LanguageParser {
    /// Parse source code and extract the structural model
    fn parse(&mut self, content: &str, file_path: &std::path::Path) -> Result<CompilationUnit>;

    /// Get the file extensions this parser handles
    fn file_extensions(&self) -> &[&str];

    /// Get the language name
    fn language_name(&self) -> &str;
}
