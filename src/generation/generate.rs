// Writes a batch file for one of the named benchmark configurations.
//
// Usage:
//   generate <configuration> <batchFile> [--host NAME]... [--hosts-file PATH] [--config PATH]
//
// Built-in configurations: demo, mpi. More can be defined in a JSON file
// passed with --config.

use std::path::PathBuf;
use std::process::ExitCode;

use bench_batch::execution::HostPool;
use bench_batch::generation::Catalog;
use bench_batch::{logging, Result};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "generate", about = "Generate a batch of benchmark invocations")]
struct Cli {
    /// Name of the configuration to expand.
    configuration: String,

    /// Where to write the batch.
    batch_file: PathBuf,

    /// Host added to the pool (repeatable).
    #[arg(long = "host", value_name = "NAME")]
    hosts: Vec<String>,

    /// File listing pool hosts, one per line.
    #[arg(long, value_name = "PATH")]
    hosts_file: Option<PathBuf>,

    /// JSON file with additional configurations.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn generate(cli: &Cli) -> Result<()> {
    let mut catalog = Catalog::builtin();
    if let Some(path) = &cli.config {
        catalog.load(path)?;
    }
    let configuration = catalog.get(&cli.configuration)?;

    let mut hosts = cli.hosts.clone();
    if let Some(path) = &cli.hosts_file {
        hosts.extend_from_slice(HostPool::read(path)?.hosts());
    }

    configuration.generate(&cli.batch_file, &hosts)?;
    Ok(())
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match generate(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            error.exit_code()
        }
    }
}
