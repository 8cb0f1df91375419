//! Split the leaves of a graph document by variable kind.
use clap::Parser;
use clio::Output;
use objgraph::VariableKind;
use objgraph::graph;
use objgraph::state::{Everything, OfKind, Predicate};

use crate::CliError;
use crate::graph_io::{GraphInputArgs, write_json};

/// Split the leaves of a graph document into one state per kind.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Split the leaves of a graph document by variable kind.")]
#[group(id = "objgraph")]
#[non_exhaustive]
pub struct SplitArgs {
    /// Graph input.
    #[command(flatten)]
    pub input_args: GraphInputArgs,

    /// Variable kinds to split out, in order. Leaves matching none of them
    /// go to a final state.
    #[arg(long = "kind", value_name = "KIND", help_heading = "Filter")]
    pub kinds: Vec<String>,

    /// Output file. Use '-' for stdout.
    #[clap(short, long, value_parser, default_value = "-")]
    pub output: Output,
}

impl SplitArgs {
    /// Load the graph document and write the states as a JSON array.
    pub fn run_split(&mut self) -> Result<(), CliError> {
        let (registry, root) = self.input_args.get_graph()?;
        let kinds: Vec<OfKind> = self
            .kinds
            .iter()
            .map(|kind| OfKind(VariableKind::new(kind.as_str())))
            .collect();
        let mut filters: Vec<&dyn Predicate> = kinds.iter().map(|k| k as &dyn Predicate).collect();
        filters.push(&Everything);

        let (_, states) = graph::split(&registry, &root, &filters)?;
        for (kind, state) in self.kinds.iter().zip(&states) {
            tracing::debug!(kind = kind.as_str(), leaves = state.flat_state().len(), "split state");
        }
        write_json(&mut self.output, &states)
    }
}
