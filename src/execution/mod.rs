// Batch execution: runs every case of a batch file in order, one at a time,
// and records how long each took.
//
// For a batch file `b` the elapsed seconds of each case are appended to
// `<output root>/b/<pretty name>`, while the command line and whatever the
// program printed go to a shared log file.

pub mod hosts;
pub mod process;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::batch::{Batch, Case};
use crate::error::{Error, Result};

pub use hosts::{HostFile, HostPool};
pub use process::{execute, Execution, Outcome};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub timeout: Duration,
    /// Parent of the per-batch result directory.
    pub output_root: PathBuf,
    pub log_path: PathBuf,
    /// Where transient host files are created.
    pub host_file_dir: PathBuf,
    /// Fixes host sampling, mostly useful for reproducing a batch.
    pub seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            output_root: PathBuf::from(".."),
            log_path: PathBuf::from("log.txt"),
            host_file_dir: PathBuf::from("."),
            seed: None,
        }
    }
}

/// What happened to one case.
#[derive(Debug)]
pub struct CaseReport {
    pub case: Case,
    pub result_file: PathBuf,
    pub execution: Execution,
}

#[derive(Debug)]
pub struct Runner {
    config: RunnerConfig,
    rng: StdRng,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// Runs every case of the batch file at `batch_path`. The batch is parsed
    /// completely before the first case starts; after that no case can stop
    /// the batch, only I/O errors on the result and log files do.
    pub fn run(&mut self, batch_path: &Path) -> Result<Vec<CaseReport>> {
        let batch = Batch::read(batch_path)?;
        if batch
            .cases
            .iter()
            .any(|case| case.host_count > 0 && case.command.has_host_file())
        {
            self.check_host_file_dir()?;
        }
        let results_dir = self.results_dir(batch_path)?;
        fs::create_dir_all(&results_dir)
            .map_err(|e| Error::io(format!("cannot create {}", results_dir.display()), e))?;

        let pool = HostPool::new(batch.host_pool);
        info!(
            batch = %batch_path.display(),
            cases = batch.cases.len(),
            hosts = pool.len(),
            "starting batch"
        );

        let mut reports = Vec::with_capacity(batch.cases.len());
        for case in batch.cases {
            reports.push(self.run_case(case, &pool, &results_dir)?);
        }

        let failed = reports
            .iter()
            .filter(|r| !r.execution.outcome.is_success())
            .count();
        info!(cases = reports.len(), failed, "batch finished");
        Ok(reports)
    }

    /// Host files must be creatable before the first case runs.
    fn check_host_file_dir(&self) -> Result<()> {
        HostFile::create(&self.config.host_file_dir, &[])
            .and_then(HostFile::remove)
            .map_err(|e| self.host_file_error(e))
    }

    fn host_file_error(&self, error: io::Error) -> Error {
        Error::io(
            format!("cannot create host file in {}", self.config.host_file_dir.display()),
            error,
        )
    }

    fn results_dir(&self, batch_path: &Path) -> Result<PathBuf> {
        let name = batch_path.file_name().ok_or_else(|| {
            Error::io(
                format!("batch path {} has no file name", batch_path.display()),
                io::Error::from(io::ErrorKind::InvalidInput),
            )
        })?;
        Ok(self.config.output_root.join(name))
    }

    fn run_case(&mut self, case: Case, pool: &HostPool, results_dir: &Path) -> Result<CaseReport> {
        info!(hosts = case.host_count, "{}", case.command);

        let host_file = if case.host_count > 0 && case.command.has_host_file() {
            let hosts = pool.sample(case.host_count, &mut self.rng);
            let file = HostFile::create(&self.config.host_file_dir, &hosts)
                .map_err(|e| self.host_file_error(e))?;
            Some(file)
        } else {
            None
        };

        let argv = case.command.argv(host_file.as_ref().map(HostFile::path));
        let execution = execute(&argv, self.config.timeout);

        if let Some(file) = host_file {
            let path = file.path().to_path_buf();
            if let Err(error) = file.remove() {
                warn!(%error, path = %path.display(), "cannot remove host file");
            }
        }

        let elapsed = execution.elapsed.as_secs_f64();
        match &execution.outcome {
            Outcome::Success { .. } => info!("finished in {elapsed:.2}s"),
            outcome => warn!("{outcome} after {elapsed:.2}s"),
        }

        let result_file = results_dir.join(case.command.pretty_name(case.host_count));
        append(&result_file, &format!("{elapsed:.2}\n"))?;
        append(&self.config.log_path, &log_entry(&case, &execution))?;

        Ok(CaseReport {
            case,
            result_file,
            execution,
        })
    }
}

fn log_entry(case: &Case, execution: &Execution) -> String {
    let mut entry = format!("{}\n", case.command);
    match &execution.outcome {
        Outcome::Success { output } => {
            let text = String::from_utf8_lossy(output);
            for line in text.lines() {
                entry.push('\t');
                entry.push_str(line);
                entry.push('\n');
            }
        }
        Outcome::TimedOut => {
            entry.push_str(&format!(
                "\t# timed out after {:.2}s\n",
                execution.elapsed.as_secs_f64()
            ));
        }
        outcome => entry.push_str(&format!("\t# {outcome}\n")),
    }
    entry
}

fn append(path: &Path, text: &str) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(text.as_bytes()))
        .map_err(|e| Error::io(format!("cannot append to {}", path.display()), e))
}
