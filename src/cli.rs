use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use callflow::analysis::{Caret, DiagramFormat, Engine, FlowRequest};

#[derive(Parser)]
#[command(name = "callflow")]
#[command(about = "Call-flow diagrams for the Java method under your caret")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default Callflow.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Draw the call flow of the method enclosing a caret
    #[command(group(ArgGroup::new("caret").required(true).args(["offset", "line"])))]
    Flow {
        /// Java source file holding the caret
        #[arg(short, long)]
        file: PathBuf,

        /// Zero-based character offset of the caret
        #[arg(long)]
        offset: Option<usize>,

        /// 1-based caret line
        #[arg(long)]
        line: Option<usize>,

        /// 1-based caret column
        #[arg(long, requires = "line", default_value_t = 1)]
        column: usize,

        /// Source directory to index (repeatable; defaults to the configured ones)
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,

        /// Diagram format (defaults to the configured one)
        #[arg(long, value_enum)]
        format: Option<DiagramFormat>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop expanding calls below this depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// List the methods of a file with their line and column
    Methods {
        /// Java source file
        #[arg(short, long)]
        file: PathBuf,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                let config_path = engine.init(path).await?;
                println!("{}", config_path.display());
                Ok(())
            }
            Commands::Flow { file, offset, line, column, sources, format, output, max_depth } => {
                let caret = match (offset, line) {
                    (Some(offset), _) => Caret::Offset(offset),
                    (None, Some(line)) => Caret::Position { line, column },
                    (None, None) => anyhow::bail!("Either --offset or --line is required"),
                };
                let mut request = FlowRequest::new(file, caret);
                request.sources = sources;
                request.format = format;
                request.output = output;
                request.max_depth = max_depth;
                engine.flow(request).await
            }
            Commands::Methods { file } => {
                for method in engine.methods(&file).await? {
                    println!("{}:{}\t{}", method.location.line, method.location.column, method.key);
                }
                Ok(())
            }
        }
    }
}
