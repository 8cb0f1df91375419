//! Flatten and inspect object graphs on the command line

use clap::Parser as _;
use objgraph_cli::CliArgs;

fn main() {
    let args = CliArgs::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(args.verbosity().tracing_level_filter())
        .init();

    if let Err(e) = run(args) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    match args {
        CliArgs::Describe(mut args) => args.run_describe()?,
        CliArgs::Split(mut args) => args.run_split()?,
        CliArgs::Roundtrip(mut args) => args.run_roundtrip()?,
        _ => anyhow::bail!("Unknown command"),
    }
    Ok(())
}
