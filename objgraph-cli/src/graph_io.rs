//! Input/output arguments for the objgraph CLI.

use std::io::Write;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use clio::{Input, Output};
use objgraph::{Registry, Value};

use crate::CliError;
use crate::document::GraphDocument;

/// Arguments for reading a graph document.
#[derive(Debug, clap::Args)]
pub struct GraphInputArgs {
    /// Input file. Defaults to `-` for stdin.
    #[arg(value_parser, default_value = "-", help_heading = "Input")]
    pub input: Input,

    /// Verbosity.
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl GraphInputArgs {
    /// Read the graph document from the input.
    pub fn get_document(&mut self) -> Result<GraphDocument, CliError> {
        let document: GraphDocument = serde_json::from_reader(&mut self.input)?;
        tracing::debug!(
            objects = document.objects.len(),
            variables = document.variables.len(),
            "read graph document"
        );
        Ok(document)
    }

    /// Read the graph document and build its live graph.
    ///
    /// The nodes are plain [`objgraph::Object`]s, so the default registry is
    /// returned alongside.
    pub fn get_graph(&mut self) -> Result<(Registry, Value), CliError> {
        let graph = self.get_document()?.build()?;
        Ok((Registry::new(), graph))
    }
}

/// Write `value` as pretty JSON followed by a newline.
pub(crate) fn write_json(
    output: &mut Output,
    value: &impl serde::Serialize,
) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *output, value)?;
    writeln!(output)?;
    Ok(())
}
