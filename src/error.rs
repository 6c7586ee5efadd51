// Error types shared by the generator and the runner.

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown configuration '{0}' (known: {1})")]
    UnknownConfiguration(String, String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid batch file {path}: {source}")]
    Batch {
        path: PathBuf,
        #[source]
        source: BatchError,
    },

    #[error("cannot parse configuration file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit status reported by the binaries. Usage errors never get
    /// here, clap exits with 2 on its own.
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::UnknownConfiguration(..) => 3,
            Self::Config(_) | Self::Batch { .. } | Self::ConfigFile { .. } | Self::Io { .. } => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

/// Problems with an axis specification. All of them are detected before a
/// single line is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("axis '{0}' has no candidate values")]
    EmptyAxis(String),

    #[error("'runs' must be a positive integer, got '{0}'")]
    InvalidRuns(String),

    #[error("axis '{0}' appears more than once")]
    DuplicateAxis(String),

    #[error("'program' must have exactly one value, got {0}")]
    ProgramNotSingle(usize),

    #[error("host count must be a positive integer, got '{0}'")]
    InvalidHostCount(String),

    #[error("host count {requested} exceeds the host pool of {available}")]
    HostPoolTooSmall { requested: usize, available: usize },

    #[error("configuration '{0}' names neither a kind nor a program")]
    MissingProgram(String),
}

/// Problems found while parsing a batch file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("line {line}: expected '<hostCount> <program> [args...]', got '{text}'")]
    MalformedLine { line: usize, text: String },

    #[error("line {line}: host count {requested} exceeds the host pool of {available}")]
    HostPoolTooSmall {
        line: usize,
        requested: usize,
        available: usize,
    },
}
