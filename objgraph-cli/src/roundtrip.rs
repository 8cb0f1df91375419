//! Check that a graph document survives being flattened and rebuilt.
use std::io::Write;

use clap::Parser;
use clio::Output;
use objgraph::graph;

use crate::CliError;
use crate::graph_io::GraphInputArgs;

/// Message printed when the round trip reproduces the graph.
pub const ROUNDTRIP_PRINT: &str = "Round trip reproduced the graph.";

/// Flatten a graph document, rebuild it and flatten the copy again.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Check that a graph document survives a flatten/rebuild cycle.")]
#[group(id = "objgraph")]
#[non_exhaustive]
pub struct RoundtripArgs {
    /// Graph input.
    #[command(flatten)]
    pub input_args: GraphInputArgs,

    /// Output file. Use '-' for stdout.
    #[clap(short, long, value_parser, default_value = "-")]
    pub output: Output,
}

impl RoundtripArgs {
    /// Run the round trip, failing if the copy flattens differently.
    pub fn run_roundtrip(&mut self) -> Result<(), CliError> {
        let (registry, root) = self.input_args.get_graph()?;
        let (graphdef, states) = graph::split(&registry, &root, &[])?;
        let copy = graph::merge(&registry, &graphdef, states.clone())?;
        let (graphdef2, states2) = graph::split(&registry, &copy, &[])?;

        if graphdef2 != graphdef {
            return Err(CliError::RoundTrip("descriptor"));
        }
        if states2 != states {
            return Err(CliError::RoundTrip("state"));
        }
        let nodes = graph::iter_nodes(&registry, &copy)?.len();
        tracing::info!(nodes, "round trip succeeded");
        writeln!(self.output, "{ROUNDTRIP_PRINT}")?;
        Ok(())
    }
}
