// Executes a batch file produced by `generate`, one case at a time.
//
// Usage:
//   run <batchFile> [--timeout SECS] [--output-root DIR] [--log PATH]
//                   [--host-file-dir DIR] [--seed N]
//
// Elapsed times land in <output-root>/<batchFile name>/<case name>, commands
// and program output in the log file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bench_batch::execution::{Runner, RunnerConfig, DEFAULT_TIMEOUT};
use bench_batch::logging;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "run", about = "Run a batch of benchmark invocations")]
struct Cli {
    /// Batch file written by `generate`.
    batch_file: PathBuf,

    /// Wall clock limit per case, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Directory that receives the per-batch result directory.
    #[arg(long, value_name = "DIR", default_value = "..")]
    output_root: PathBuf,

    /// Shared log of commands and their output.
    #[arg(long, value_name = "PATH", default_value = "log.txt")]
    log: PathBuf,

    /// Where transient host files are created.
    #[arg(long, value_name = "DIR", default_value = ".")]
    host_file_dir: PathBuf,

    /// Seed for host sampling.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let config = RunnerConfig {
        timeout: Duration::from_secs(cli.timeout),
        output_root: cli.output_root,
        log_path: cli.log,
        host_file_dir: cli.host_file_dir,
        seed: cli.seed,
    };

    match Runner::new(config).run(&cli.batch_file) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            error.exit_code()
        }
    }
}
