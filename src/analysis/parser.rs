use std::path::{Path, PathBuf};
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use tracing::{debug, warn};

use crate::config::ParsingConfig;
use crate::error::{CallflowError, Result};
use super::languages::{LanguageParser, JavaParser};

/// Represents a parsed source file with its extracted structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    /// File path as handed to the parser
    pub path: PathBuf,

    /// Programming language detected
    pub language: String,

    /// Content hash for change detection
    pub content_hash: String,

    /// Raw source content
    pub source_content: String,

    /// Extracted package, imports and types
    pub unit: CompilationUnit,
}

/// Everything a language parser extracts from one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub package: Option<String>,
    pub imports: Vec<ImportDecl>,
    /// All types of the file, nested, local and anonymous ones included
    pub types: Vec<TypeDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Imported path without the trailing `.*`
    pub path: String,
    pub is_static: bool,
    pub is_wildcard: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Anonymous,
}

/// A class-like declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    /// Simple name (`Outer$1` for anonymous classes)
    pub name: String,
    /// Package-qualified, dot-separated name
    pub qualified_name: String,
    pub kind: TypeKind,
    pub is_abstract: bool,
    /// Qualified name of the lexically enclosing type
    pub outer: Option<String>,
    /// Supertype names as written in source, generics stripped
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Variable>,
    pub methods: Vec<MethodDecl>,
    pub byte_range: (usize, usize),
}

impl TypeDecl {
    pub fn is_interface_like(&self) -> bool {
        self.kind == TypeKind::Interface || self.is_abstract
    }

    /// Declared supertypes, superclass first
    pub fn supertypes(&self) -> impl Iterator<Item = &String> {
        self.superclass.iter().chain(self.interfaces.iter())
    }
}

/// A named, typed slot: parameter, field or local variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
}

/// A method or constructor declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Variable>,
    pub is_varargs: bool,
    pub return_type: String,
    pub is_constructor: bool,
    pub is_static: bool,
    pub has_body: bool,
    pub docs: Option<String>,
    /// Whole declaration, modifiers included
    pub byte_range: (usize, usize),
    /// Byte offset, line and column (1-based) of the method name
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub locals: Vec<Variable>,
    /// Call expressions of the body in evaluation order
    pub calls: Vec<CallExpr>,
}

impl MethodDecl {
    pub fn param_types(&self) -> Vec<String> {
        self.params.iter().map(|p| p.type_name.clone()).collect()
    }

    pub fn contains(&self, byte_offset: usize) -> bool {
        self.byte_range.0 <= byte_offset && byte_offset < self.byte_range.1
    }
}

/// A method invocation as it appears in source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExpr {
    pub method_name: String,
    pub receiver: Receiver,
    pub arguments: Vec<Argument>,
    /// Position of the invoked name
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    /// Full invocation text
    pub text: String,
}

impl CallExpr {
    /// Unqualified call without arguments, positioned at `line`
    pub fn named(method_name: &str, line: usize) -> Self {
        Self {
            method_name: method_name.to_string(),
            receiver: Receiver::Implicit,
            arguments: Vec::new(),
            offset: 0,
            line,
            column: 1,
            text: format!("{}()", method_name),
        }
    }

    pub fn argument_list(&self) -> String {
        self.arguments.iter().map(|a| a.text.as_str()).collect::<Vec<_>>().join(", ")
    }
}

/// What a call is invoked on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Receiver {
    /// `foo()`
    Implicit,
    /// `this.foo()`
    This,
    /// `super.foo()`
    Super,
    /// `name.foo()` where `name` is a variable, field or (possibly dotted) type
    Name(String),
    /// `this.field.foo()`
    ThisField(String),
    /// `bar().foo()`
    Call(Box<CallExpr>),
    /// `new T(..).foo()`
    New(String),
    /// Anything else, kept as text
    Other(String),
}

impl Receiver {
    pub fn text(&self) -> Option<String> {
        match self {
            Receiver::Implicit => None,
            Receiver::This => Some("this".to_string()),
            Receiver::Super => Some("super".to_string()),
            Receiver::Name(name) => Some(name.clone()),
            Receiver::ThisField(field) => Some(format!("this.{}", field)),
            Receiver::Call(call) => Some(call.text.clone()),
            Receiver::New(type_name) => Some(format!("new {}()", type_name)),
            Receiver::Other(text) => Some(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub text: String,
    /// Static type when the syntax alone decides it (literals, `new`, casts)
    pub known_type: Option<String>,
    pub is_identifier: bool,
}

impl ParsedFile {
    /// Byte offset of a zero-based character offset. The end of file is valid.
    pub fn byte_offset(&self, char_offset: usize) -> Option<usize> {
        let mut chars = self.source_content.char_indices();
        match chars.nth(char_offset) {
            Some((byte, _)) => Some(byte),
            None if self.source_content.chars().count() == char_offset => Some(self.source_content.len()),
            None => None,
        }
    }

    /// Zero-based character offset of a 1-based line and column
    pub fn char_offset(&self, line: usize, column: usize) -> Option<usize> {
        if line == 0 || column == 0 {
            return None;
        }
        let mut offset = 0;
        for (index, text) in self.source_content.split('\n').enumerate() {
            let width = text.chars().count();
            if index + 1 == line {
                return (column <= width + 1).then(|| offset + column - 1);
            }
            offset += width + 1;
        }
        None
    }

    /// 1-based line and column of a byte offset
    pub fn position(&self, byte_offset: usize) -> (usize, usize) {
        let prefix = &self.source_content[..byte_offset.min(self.source_content.len())];
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
        (line, prefix[line_start..].chars().count() + 1)
    }
}

/// Multi-language code parser that delegates to language-specific parsers
pub struct CodeParser {
    config: ParsingConfig,
    ignore_patterns: Vec<String>,
    language_parsers: HashMap<String, Box<dyn LanguageParser>>,
}

impl CodeParser {
    pub fn new(config: &ParsingConfig) -> Result<Self> {
        let mut language_parsers: HashMap<String, Box<dyn LanguageParser>> = HashMap::new();

        for language in config.file_extensions.keys() {
            match language.as_str() {
                "java" => {
                    let java_parser = JavaParser::new()?;
                    language_parsers.insert("java".to_string(), Box::new(java_parser));
                }
                other => {
                    warn!("No parser available for language '{}', skipping", other);
                }
            }
        }

        Ok(Self {
            config: config.clone(),
            ignore_patterns: Vec::new(),
            language_parsers,
        })
    }

    /// Skip paths matching these gitignore-style patterns when walking directories
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Parse all files in a directory
    pub async fn parse_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<Vec<ParsedFile>> {
        let dir = dir.as_ref();
        let mut parsed_files = Vec::new();

        let mut overrides = OverrideBuilder::new(dir);
        for pattern in &self.ignore_patterns {
            overrides.add(&format!("!{}", pattern))
                .map_err(|e| CallflowError::FileSystem(e.to_string()))?;
        }
        let overrides = overrides.build()
            .map_err(|e| CallflowError::FileSystem(e.to_string()))?;

        // Use ignore crate to respect .gitignore and custom patterns
        let walker = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(true)
            .overrides(overrides)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| CallflowError::FileSystem(e.to_string()))?;
            let path = entry.path();

            if path.is_file() && self.should_parse_file(path) {
                match self.parse_file(path).await {
                    Ok(parsed) => parsed_files.push(parsed),
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        debug!("Parsed {} files under {}", parsed_files.len(), dir.display());
        Ok(parsed_files)
    }

    /// Parse a single source file
    pub async fn parse_file<P: AsRef<Path>>(&mut self, file_path: P) -> Result<ParsedFile> {
        let path = file_path.as_ref();
        let source_content = tokio::fs::read_to_string(path).await?;
        self.parse_source(path, source_content)
    }

    /// Parse source text that is already in memory
    pub fn parse_source<P: AsRef<Path>>(&mut self, path: P, source_content: String) -> Result<ParsedFile> {
        let path = path.as_ref();
        let language = self.detect_language(path)?;

        if source_content.len() > self.config.max_file_size {
            return Err(CallflowError::Parser(
                format!("File {} exceeds maximum size limit", path.display())
            ));
        }

        let content_hash = self.calculate_hash(&source_content);

        let parser = self.language_parsers.get_mut(&language)
            .ok_or_else(|| CallflowError::Parser(format!("No parser registered for {}", language)))?;
        let unit = parser.parse(&source_content, path)?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            language,
            content_hash,
            source_content,
            unit,
        })
    }

    /// Determine if a file should be parsed based on configuration
    fn should_parse_file(&self, path: &Path) -> bool {
        self.detect_language(path).is_ok()
    }

    /// Detect programming language from file path
    fn detect_language(&self, path: &Path) -> Result<String> {
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            for (lang, parser) in &self.language_parsers {
                let configured = self.config.file_extensions.get(lang)
                    .map_or(false, |ext| ext == extension);
                if configured || parser.file_extensions().contains(&extension) {
                    return Ok(lang.clone());
                }
            }
        }

        Err(CallflowError::Parser(
            format!("Could not detect language for file: {}", path.display())
        ))
    }

    /// Calculate SHA256 hash of content
    fn calculate_hash(&self, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn parser() -> CodeParser {
        CodeParser::new(&Config::default().parsing).unwrap()
    }

    #[test]
    fn test_offset_conversions() {
        let mut parser = parser();
        let file = parser
            .parse_source("A.java", "class A {\n  // é\n  void a() {}\n}\n".to_string())
            .unwrap();

        assert_eq!(file.char_offset(1, 1), Some(0));
        assert_eq!(file.char_offset(3, 1), Some(17));
        assert_eq!(file.char_offset(3, 3), Some(19));
        assert_eq!(file.char_offset(3, 99), None);
        assert_eq!(file.char_offset(0, 1), None);

        // 'é' is two bytes, so every later char offset shifts by one byte
        assert_eq!(file.byte_offset(19), Some(20));
        assert_eq!(file.position(20), (3, 3));
        assert_eq!(file.byte_offset(10_000), None);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let mut parser = parser();
        let result = parser.parse_source("notes.txt", "hello".to_string());
        assert!(matches!(result, Err(CallflowError::Parser(_))));
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let mut config = Config::default().parsing;
        config.max_file_size = 8;
        let mut parser = CodeParser::new(&config).unwrap();
        let result = parser.parse_source("A.java", "class A { void a() {} }".to_string());
        assert!(matches!(result, Err(CallflowError::Parser(_))));
    }

    #[tokio::test]
    async fn test_parse_directory_respects_ignore_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        std::fs::write(dir.path().join("src/A.java"), "class A { void a() {} }").unwrap();
        std::fs::write(dir.path().join("build/B.java"), "class B { void b() {} }").unwrap();
        std::fs::write(dir.path().join("src/readme.md"), "# nothing").unwrap();

        let mut parser = parser().with_ignore_patterns(vec!["build/".to_string()]);
        let files = parser.parse_directory(dir.path()).await.unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("src/A.java"));
        assert_eq!(files[0].content_hash.len(), 64);
        assert_eq!(files[0].unit.types[0].name, "A");
    }
}
