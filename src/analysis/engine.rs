// src/analysis/engine.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::CallflowError;
use super::{
    generate_flow, renderer_for, CodeParser, DiagramFormat, MethodDeclaration, ParsedFile,
    SourceIndex, VisitorOptions,
};

/// Where in the file the caret sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caret {
    /// Zero-based character offset
    Offset(usize),
    /// 1-based line and column
    Position { line: usize, column: usize },
}

/// One `flow` invocation
#[derive(Debug, Clone)]
pub struct FlowRequest {
    pub file: PathBuf,
    pub caret: Caret,
    /// Directories indexed for resolution. Falls back to the configured source dirs.
    pub sources: Vec<PathBuf>,
    pub format: Option<DiagramFormat>,
    pub output: Option<PathBuf>,
    pub max_depth: Option<usize>,
}

impl FlowRequest {
    pub fn new(file: impl Into<PathBuf>, caret: Caret) -> Self {
        Self {
            file: file.into(),
            caret,
            sources: Vec::new(),
            format: None,
            output: None,
            max_depth: None,
        }
    }
}

/// Orchestrates parsing, traversal and rendering
pub struct Engine {
    config: Config,
    parser: CodeParser,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let parser = CodeParser::new(&config.parsing)?
            .with_ignore_patterns(config.project.ignore_patterns.clone());
        Ok(Self { config, parser })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Renders the call flow of the method under the caret. `None` when the
    /// caret is outside every method.
    pub async fn render_flow(&mut self, request: &FlowRequest) -> Result<Option<String>> {
        let file = tokio::fs::canonicalize(&request.file).await
            .map_err(|e| anyhow::anyhow!("Cannot open {}: {}", request.file.display(), e))?;

        info!("🔍 Indexing sources for {}", file.display());
        let index = self.build_index(&file, &request.sources).await?;
        info!("Indexed {} types from {} files", index.type_count(), index.file_count());

        let parsed = index.file(&file)
            .ok_or_else(|| CallflowError::StaleSource {
                file: file.clone(),
                reason: "file is not part of the index".to_string(),
            })?;
        let offset = match request.caret {
            Caret::Offset(offset) => offset,
            Caret::Position { line, column } => parsed.char_offset(line, column)
                .ok_or_else(|| anyhow::anyhow!(
                    "Position {}:{} is outside {}", line, column, file.display()
                ))?,
        };

        let mut options = VisitorOptions::from_config(&self.config.analysis)?;
        if request.max_depth.is_some() {
            options.max_depth = request.max_depth;
        }

        let graph = match generate_flow(&index, &file, offset, &options)? {
            Some(graph) => graph,
            None => {
                info!("No method at offset {} in {}, nothing to draw", offset, file.display());
                return Ok(None);
            }
        };

        let format = request.format.unwrap_or(self.config.output.format);
        let renderer = renderer_for(format, &self.config.output)?;
        Ok(Some(renderer.render(&graph)?))
    }

    /// Renders and writes the diagram to `request.output`, or stdout
    pub async fn flow(&mut self, request: FlowRequest) -> Result<()> {
        let diagram = match self.render_flow(&request).await? {
            Some(diagram) => diagram,
            None => return Ok(()),
        };

        match &request.output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, diagram).await?;
                info!("✅ Diagram written to {}", path.display());
            }
            None => print!("{}", diagram),
        }
        Ok(())
    }

    /// Methods and constructors of one file, in source order
    pub async fn methods(&mut self, file: &Path) -> Result<Vec<MethodDeclaration>> {
        let parsed = self.parser.parse_file(file).await?;
        let path = parsed.path.clone();
        let index = SourceIndex::new(vec![parsed]);
        Ok(index.methods_in(&path)?)
    }

    /// Writes a default `Callflow.toml` into `path` (or the working directory)
    pub async fn init(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        tokio::fs::create_dir_all(&target_dir).await?;

        let config_path = target_dir.join("Callflow.toml");
        if config_path.exists() {
            warn!("{} already exists, leaving it untouched", config_path.display());
            return Ok(config_path);
        }

        Config::default().save(&config_path)?;
        info!("Initialized Callflow in: {}", target_dir.display());
        Ok(config_path)
    }

    /// Parses the source directories plus the caret file itself
    async fn build_index(&mut self, file: &Path, sources: &[PathBuf]) -> Result<SourceIndex> {
        let source_dirs = if sources.is_empty() {
            self.config.project.source_dirs.clone()
        } else {
            sources.to_vec()
        };

        let mut files: Vec<ParsedFile> = Vec::new();
        let mut seen = HashSet::new();
        for dir in &source_dirs {
            let dir = match tokio::fs::canonicalize(dir).await {
                Ok(dir) => dir,
                Err(e) => {
                    warn!("Skipping source directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            for parsed in self.parser.parse_directory(&dir).await? {
                if seen.insert(parsed.path.clone()) {
                    files.push(parsed);
                }
            }
        }

        if !seen.contains(file) {
            debug!("{} is outside the source directories, parsing it on its own", file.display());
            files.push(self.parser.parse_file(file).await?);
        }

        Ok(SourceIndex::new(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SERVICE: &str = r#"package shop;

public class OrderService {
    private final OrderRepository repository = new OrderRepository();

    public void place(String id) {
        repository.save(id);
        System.out.println(id);
    }
}
"#;

    const REPOSITORY: &str = r#"package shop;

public class OrderRepository {
    public void save(String id) {
    }
}
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let shop = dir.path().join("src").join("shop");
        fs::create_dir_all(&shop).unwrap();
        fs::write(shop.join("OrderService.java"), SERVICE).unwrap();
        fs::write(shop.join("OrderRepository.java"), REPOSITORY).unwrap();
        dir
    }

    fn request(dir: &tempfile::TempDir, caret: Caret, format: DiagramFormat) -> FlowRequest {
        let mut request = FlowRequest::new(dir.path().join("src/shop/OrderService.java"), caret);
        request.sources = vec![dir.path().join("src")];
        request.format = Some(format);
        request
    }

    #[tokio::test]
    async fn test_flow_by_line_and_column() {
        let dir = project();
        let mut engine = Engine::with_config(Config::default()).unwrap();

        let diagram = engine
            .render_flow(&request(&dir, Caret::Position { line: 7, column: 9 }, DiagramFormat::Json))
            .await
            .unwrap()
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&diagram).unwrap();
        let classes: Vec<&str> = value["nodes"].as_array().unwrap().iter()
            .map(|n| n["className"].as_str().unwrap())
            .collect();
        assert_eq!(classes, vec!["shop.OrderService", "shop.OrderRepository", "System.out"]);
        assert_eq!(value["edges"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_flow_outside_any_method_is_none() {
        let dir = project();
        let mut engine = Engine::with_config(Config::default()).unwrap();

        let result = engine
            .render_flow(&request(&dir, Caret::Offset(0), DiagramFormat::PlantUml))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_position_past_end_is_error() {
        let dir = project();
        let mut engine = Engine::with_config(Config::default()).unwrap();

        let result = engine
            .render_flow(&request(&dir, Caret::Position { line: 400, column: 1 }, DiagramFormat::Dot))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_methods_listing() {
        let dir = project();
        let mut engine = Engine::with_config(Config::default()).unwrap();

        let methods = engine.methods(&dir.path().join("src/shop/OrderService.java")).await.unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].key.to_string(), "shop.OrderService#place(String)");
        assert_eq!(methods[0].location.line, 6);
    }

    #[tokio::test]
    async fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::with_config(Config::default()).unwrap();

        let path = engine.init(Some(dir.path().to_path_buf())).await.unwrap();
        assert!(path.ends_with("Callflow.toml"));
        let config = Config::load(&path).unwrap();
        assert!(config.analysis.include_external);
    }
}
