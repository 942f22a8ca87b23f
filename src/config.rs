use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::collections::HashMap;

use crate::analysis::DiagramFormat;
use crate::error::{CallflowError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Call-chain traversal settings
    pub analysis: AnalysisConfig,

    /// Diagram output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Source directories indexed for symbol resolution
    pub source_dirs: Vec<PathBuf>,

    /// Directories to ignore
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,

    /// File extensions to parse, keyed by language
    pub file_extensions: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum call depth to expand. Unlimited when absent.
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Keep calls that cannot be resolved as external nodes
    pub include_external: bool,

    /// Follow abstract and interface methods into their implementations
    pub expand_implementations: bool,

    /// Regexes on owner type names whose methods are left out of the graph
    pub skip_owner_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default diagram format
    pub format: DiagramFormat,

    /// Directory holding a custom `sequence.puml` template
    pub template_dir: Option<PathBuf>,

    /// Attach cleaned Javadoc as notes
    pub show_docs: bool,

    /// Append the participant legend
    pub show_legend: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut file_extensions = HashMap::new();
        file_extensions.insert("java".to_string(), "java".to_string());

        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                source_dirs: vec![PathBuf::from("src")],
                ignore_patterns: vec![
                    "target/".to_string(),
                    "build/".to_string(),
                    ".git/".to_string(),
                    "*.tmp".to_string(),
                ],
            },
            parsing: ParsingConfig {
                max_file_size: 1024 * 1024, // 1MB
                file_extensions,
            },
            analysis: AnalysisConfig {
                max_depth: None,
                include_external: true,
                expand_implementations: true,
                skip_owner_patterns: Vec::new(),
            },
            output: OutputConfig {
                format: DiagramFormat::PlantUml,
                template_dir: None,
                show_docs: true,
                show_legend: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CallflowError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CallflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Callflow.toml",
                    "callflow.toml",
                    ".callflow.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
