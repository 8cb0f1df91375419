//! Describe the structure and leaves of a graph document.
use clap::Parser;
use clio::Output;
use objgraph::{GraphDef, State, graph};

use crate::CliError;
use crate::graph_io::{GraphInputArgs, write_json};

/// Print the descriptor and leaf table of a graph document.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Describe the structure and leaves of a graph document.")]
#[group(id = "objgraph")]
#[non_exhaustive]
pub struct DescribeArgs {
    /// Graph input.
    #[command(flatten)]
    pub input_args: GraphInputArgs,

    /// Output file. Use '-' for stdout.
    #[clap(short, long, value_parser, default_value = "-")]
    pub output: Output,
}

/// The JSON written by `describe`.
#[derive(Debug, serde::Serialize)]
struct Description<'a> {
    graphdef: &'a GraphDef,
    state: &'a State,
}

impl DescribeArgs {
    /// Load the graph document and describe it.
    pub fn run_describe(&mut self) -> Result<(), CliError> {
        let (registry, root) = self.input_args.get_graph()?;
        let (graphdef, states) = graph::split(&registry, &root, &[])?;
        let state = State::merge(states);
        tracing::info!(leaves = state.flat_state().len(), "described graph");
        write_json(
            &mut self.output,
            &Description {
                graphdef: &graphdef,
                state: &state,
            },
        )
    }
}
