// Batch file format shared by the generator and the runner.
//
//   line 1:    space separated host pool (may be empty)
//   line 2..:  <hostCount> <program> [<flag> <value>]...
//
// A token that is exactly `hosts` marks where the runner puts the path of the
// host file it materialises for the case. Blank lines are ignored.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{BatchError, Error, Result};

pub const HOSTS_PLACEHOLDER: &str = "hosts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// Replaced by the transient host file path at run time.
    HostFile,
}

impl Token {
    pub fn literal(text: impl Into<String>) -> Self {
        Token::Literal(text.into())
    }

    fn from_word(word: &str) -> Self {
        if word == HOSTS_PLACEHOLDER {
            Token::HostFile
        } else {
            Token::Literal(word.to_string())
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => f.write_str(text),
            Token::HostFile => f.write_str(HOSTS_PLACEHOLDER),
        }
    }
}

/// A program followed by its argument tokens, before host file substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<Token>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<Token>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[Token] {
        &self.args
    }

    pub fn has_host_file(&self) -> bool {
        self.args.contains(&Token::HostFile)
    }

    /// Argument vector handed to the operating system. Every placeholder
    /// becomes `host_file`; without one the placeholder is passed through as
    /// the literal word `hosts`. Literal tokens are split on whitespace the
    /// same way they are once written to a batch file.
    pub fn argv(&self, host_file: Option<&Path>) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        for token in &self.args {
            match (token, host_file) {
                (Token::Literal(text), _) => {
                    argv.extend(text.split_whitespace().map(str::to_string));
                }
                (Token::HostFile, Some(path)) => argv.push(path.display().to_string()),
                (Token::HostFile, None) => argv.push(HOSTS_PLACEHOLDER.to_string()),
            }
        }
        argv
    }

    /// Result file name for this command: flags are dropped, the host file
    /// placeholder becomes the host count, paths are cut to their base name
    /// and what remains is joined with `-`.
    ///
    /// A flag is a word starting with `-` that is not a number, so `-n` goes
    /// away while a value such as `-5` is kept.
    pub fn pretty_name(&self, host_count: usize) -> String {
        let mut parts: Vec<String> = Vec::new();
        for token in &self.args {
            match token {
                Token::HostFile if host_count > 0 => parts.push(host_count.to_string()),
                Token::HostFile => parts.push(HOSTS_PLACEHOLDER.to_string()),
                Token::Literal(text) => {
                    for word in text.split_whitespace() {
                        if is_flag(word) {
                            continue;
                        }
                        parts.push(base_name(word).to_string());
                    }
                }
            }
        }

        if parts.is_empty() {
            return base_name(&self.program).to_string();
        }
        parts.join("-")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for token in &self.args {
            write!(f, " {token}")?;
        }
        Ok(())
    }
}

fn is_flag(word: &str) -> bool {
    word.starts_with('-') && word.parse::<f64>().is_err()
}

fn base_name(word: &str) -> &str {
    if !word.contains('/') {
        return word;
    }
    Path::new(word)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(word)
}

/// One line of a batch: how many hosts to sample and what to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub host_count: usize,
    pub command: CommandLine,
}

impl Case {
    pub fn new(host_count: usize, command: CommandLine) -> Self {
        Self {
            host_count,
            command,
        }
    }

    fn parse(line: usize, text: &str) -> std::result::Result<Self, BatchError> {
        let malformed = || BatchError::MalformedLine {
            line,
            text: text.to_string(),
        };

        let mut words = text.split_whitespace();
        let host_count = words
            .next()
            .and_then(|word| word.parse::<usize>().ok())
            .ok_or_else(malformed)?;
        let program = words.next().ok_or_else(malformed)?;
        let args = words.map(Token::from_word).collect();

        Ok(Case::new(host_count, CommandLine::new(program, args)))
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host_count, self.command)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub host_pool: Vec<String>,
    pub cases: Vec<Case>,
}

impl Batch {
    pub fn parse(text: &str) -> std::result::Result<Self, BatchError> {
        let mut lines = text.lines().enumerate();
        let host_pool = match lines.next() {
            Some((_, first)) => first.split_whitespace().map(str::to_string).collect(),
            None => Vec::new(),
        };

        let mut cases = Vec::new();
        for (index, line) in lines {
            let line_number = index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let case = Case::parse(line_number, line)?;
            if case.host_count > host_pool.len() {
                return Err(BatchError::HostPoolTooSmall {
                    line: line_number,
                    requested: case.host_count,
                    available: host_pool.len(),
                });
            }
            cases.push(case);
        }

        Ok(Batch { host_pool, cases })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read batch file {}", path.display()), e))?;
        Batch::parse(&text).map_err(|source| Error::Batch {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn render(&self) -> String {
        let mut text = self.host_pool.join(" ");
        text.push('\n');
        for case in &self.cases {
            text.push_str(&case.to_string());
            text.push('\n');
        }
        text
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())
            .map_err(|e| Error::io(format!("cannot write batch file {}", path.display()), e))
    }
}
