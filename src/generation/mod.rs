// Batch generation: expands an ordered list of parameter axes into one case
// per combination of candidate values.
//
// Axes are expanded depth first in declaration order, values in list order.
// `runs` is lifted out and repeats every leaf, `program` inserts a bare token,
// `hosts` inserts the host switch and a placeholder and branches once per
// requested host count. Every other axis inserts its flag (if it has one)
// followed by the value.

pub mod configurations;

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::batch::{Batch, Case, CommandLine, Token};
use crate::error::{ConfigError, Result};

pub use configurations::{Catalog, Configuration, Kind};

/// One parameter dimension: a name from the axis vocabulary and its
/// candidate values, already rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: String,
    pub values: Vec<String>,
}

impl Axis {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn single(name: impl Into<String>, value: impl ToString) -> Self {
        Self::new(name, [value])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Runs,
    Program,
    Hosts,
    Flagged(&'static str),
    Positional,
}

pub fn axis_kind(name: &str) -> AxisKind {
    match name {
        "runs" => AxisKind::Runs,
        "program" => AxisKind::Program,
        "hosts" => AxisKind::Hosts,
        "threads" => AxisKind::Flagged("-n"),
        "workLoad" => AxisKind::Flagged("-w"),
        "selection" => AxisKind::Flagged("-s"),
        "hostfile" => AxisKind::Flagged("-hostfile"),
        _ => AxisKind::Positional,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Program(String),
    Hosts { counts: Vec<usize> },
    Values {
        flag: Option<&'static str>,
        values: Vec<String>,
    },
}

/// Validated form of an axis list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    repeat: usize,
    levels: Vec<Level>,
}

impl Plan {
    fn new(axes: &[Axis]) -> std::result::Result<Self, ConfigError> {
        let mut repeat = None;
        let mut seen_hosts = false;
        let mut levels = Vec::with_capacity(axes.len());

        for axis in axes {
            if axis.values.is_empty() {
                return Err(ConfigError::EmptyAxis(axis.name.clone()));
            }

            match axis_kind(&axis.name) {
                AxisKind::Runs => {
                    if repeat.is_some() {
                        return Err(ConfigError::DuplicateAxis(axis.name.clone()));
                    }
                    repeat = Some(parse_runs(&axis.values)?);
                }
                AxisKind::Program => {
                    if axis.values.len() != 1 {
                        return Err(ConfigError::ProgramNotSingle(axis.values.len()));
                    }
                    levels.push(Level::Program(axis.values[0].clone()));
                }
                AxisKind::Hosts => {
                    if seen_hosts {
                        return Err(ConfigError::DuplicateAxis(axis.name.clone()));
                    }
                    seen_hosts = true;
                    let counts = axis
                        .values
                        .iter()
                        .map(|v| parse_host_count(v))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    levels.push(Level::Hosts { counts });
                }
                AxisKind::Flagged(flag) => levels.push(Level::Values {
                    flag: Some(flag),
                    values: axis.values.clone(),
                }),
                AxisKind::Positional => levels.push(Level::Values {
                    flag: None,
                    values: axis.values.clone(),
                }),
            }
        }

        Ok(Plan {
            repeat: repeat.unwrap_or(1),
            levels,
        })
    }

    fn max_host_count(&self) -> usize {
        self.levels
            .iter()
            .filter_map(|level| match level {
                Level::Hosts { counts } => counts.iter().copied().max(),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

fn parse_runs(values: &[String]) -> std::result::Result<usize, ConfigError> {
    match values {
        [single] => match single.parse::<usize>() {
            Ok(runs) if runs > 0 => Ok(runs),
            _ => Err(ConfigError::InvalidRuns(single.clone())),
        },
        _ => Err(ConfigError::InvalidRuns(values.join(" "))),
    }
}

fn parse_host_count(value: &str) -> std::result::Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(ConfigError::InvalidHostCount(value.to_string())),
    }
}

/// Expands `axes` into cases for `program`. `host_switch` is the flag placed
/// in front of the host file placeholder (empty for none).
pub fn expand(
    program: &str,
    axes: &[Axis],
    host_switch: &str,
) -> std::result::Result<Vec<Case>, ConfigError> {
    let plan = Plan::new(axes)?;
    Ok(expand_levels(program, host_switch, &plan, &plan.levels, &[], 0))
}

fn expand_levels(
    program: &str,
    host_switch: &str,
    plan: &Plan,
    levels: &[Level],
    prefix: &[Token],
    host_count: usize,
) -> Vec<Case> {
    let Some((level, rest)) = levels.split_first() else {
        let case = Case::new(host_count, CommandLine::new(program, prefix.to_vec()));
        return vec![case; plan.repeat];
    };

    match level {
        Level::Program(value) => {
            let mut tokens = prefix.to_vec();
            tokens.push(Token::literal(value.clone()));
            expand_levels(program, host_switch, plan, rest, &tokens, host_count)
        }
        Level::Hosts { counts } => {
            let mut tokens = prefix.to_vec();
            if !host_switch.is_empty() {
                tokens.push(Token::literal(host_switch));
            }
            tokens.push(Token::HostFile);
            counts
                .par_iter()
                .map(|&count| expand_levels(program, host_switch, plan, rest, &tokens, count))
                .collect::<Vec<_>>()
                .concat()
        }
        Level::Values { flag, values } => values
            .par_iter()
            .map(|value| {
                let mut tokens = prefix.to_vec();
                if let Some(flag) = flag {
                    tokens.push(Token::literal(*flag));
                }
                tokens.push(Token::literal(value.clone()));
                expand_levels(program, host_switch, plan, rest, &tokens, host_count)
            })
            .collect::<Vec<_>>()
            .concat(),
    }
}

/// Expands the axes and writes the batch (host pool line first) to `output`.
pub fn generate(
    output: &Path,
    program: &str,
    axes: &[Axis],
    host_list: &[String],
    host_switch: &str,
) -> Result<Batch> {
    let plan = Plan::new(axes)?;
    let requested = plan.max_host_count();
    if requested > host_list.len() {
        return Err(ConfigError::HostPoolTooSmall {
            requested,
            available: host_list.len(),
        }
        .into());
    }

    debug!(levels = plan.levels.len(), repeat = plan.repeat, "expanding axes");
    let batch = Batch {
        host_pool: host_list.to_vec(),
        cases: expand_levels(program, host_switch, &plan, &plan.levels, &[], 0),
    };
    batch.write(output)?;

    info!(
        cases = batch.cases.len(),
        hosts = host_list.len(),
        output = %output.display(),
        "batch written"
    );
    Ok(batch)
}
