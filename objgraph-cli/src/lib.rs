//! Standard command line tools, used by the objgraph binary.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use objgraph::GraphError;
use thiserror::Error;

pub mod describe;
pub mod document;
pub mod graph_io;
pub mod roundtrip;
pub mod split;

use document::DocumentError;

/// CLI arguments.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Object graph CLI tools.")]
#[group(id = "objgraph")]
#[non_exhaustive]
pub enum CliArgs {
    /// Print the descriptor and leaf table of a graph document.
    Describe(describe::DescribeArgs),
    /// Split the leaves of a graph document by variable kind.
    Split(split::SplitArgs),
    /// Check that a graph document survives a flatten/rebuild cycle.
    Roundtrip(roundtrip::RoundtripArgs),
}

impl CliArgs {
    /// The verbosity requested for the chosen subcommand.
    pub fn verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            CliArgs::Describe(args) => &args.input_args.verbose,
            CliArgs::Split(args) => &args.input_args.verbose,
            CliArgs::Roundtrip(args) => &args.input_args.verbose,
        }
    }
}

/// Error type for the CLI.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    /// Error reading input or writing output.
    #[error("Error reading from path: {0}")]
    InputFile(#[from] std::io::Error),
    /// Error parsing input.
    #[error("Error parsing input: {0}")]
    Parse(#[from] serde_json::Error),
    /// The input is not a well-formed graph document.
    #[error("Invalid graph document: {0}")]
    Document(#[from] DocumentError),
    /// The graph engine rejected the graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Rebuilding the graph did not reproduce it.
    #[error("Rebuilt graph has a different {0}")]
    RoundTrip(&'static str),
}
