// Named benchmark configurations.
//
// A `Kind` describes a benchmark program: what to launch, which switch takes
// the host file and the default axes. A `Configuration` picks a kind, adds a
// host list and may override some of the kind's axes.
//
// Extra configurations can be loaded from JSON:
//
//   { "configurations": [
//       { "name": "demo-small", "kind": "demo", "hosts": ["a", "b"],
//         "axes": [ { "name": "threads", "values": [1, 2] } ] },
//       { "name": "echo", "program": "echo", "switch": "-h",
//         "axes": [ { "name": "runs", "values": 2 },
//                   { "name": "mode", "values": ["fast", "slow"] } ] }
//   ] }

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{expand, generate, Axis};
use crate::batch::{Batch, Case};
use crate::error::{ConfigError, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kind {
    pub program: String,
    pub host_switch: String,
    pub axes: Vec<Axis>,
}

impl Kind {
    pub fn demo() -> Self {
        Kind {
            program: "./demo".to_string(),
            host_switch: "-h".to_string(),
            axes: vec![
                Axis::new("algorithms", ["load shared", "load dedicated"]),
                Axis::new("threads", [1, 2, 3, 4]),
                Axis::new("workLoad", [1000]),
                Axis::new("selection", [1, 20, 25]),
                Axis::new("hosts", [1, 2, 4, 8]),
                Axis::single("runs", 10),
            ],
        }
    }

    pub fn mpi() -> Self {
        Kind {
            program: "mpiexec".to_string(),
            host_switch: "-hostfile".to_string(),
            axes: vec![
                Axis::new("hosts", [1, 2, 4, 8, 16]),
                Axis::single("program", "./mpi"),
                Axis::new("threads", [1, 2, 3, 4]),
                Axis::new("workLoad", [1000]),
                Axis::new("selection", [1, 25]),
                Axis::single("runs", 6),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub name: String,
    pub kind: Kind,
    pub hosts: Vec<String>,
    pub overrides: Vec<Axis>,
}

impl Configuration {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            hosts: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// The kind's axes with the overrides applied. An override keeps the
    /// position of the axis it replaces; unknown ones are appended.
    pub fn axes(&self) -> Vec<Axis> {
        let mut axes = self.kind.axes.clone();
        for axis in &self.overrides {
            match axes.iter_mut().find(|a| a.name == axis.name) {
                Some(existing) => existing.values = axis.values.clone(),
                None => axes.push(axis.clone()),
            }
        }
        axes
    }

    pub fn expand(&self) -> std::result::Result<Vec<Case>, ConfigError> {
        expand(&self.kind.program, &self.axes(), &self.kind.host_switch)
    }

    /// Writes the batch for this configuration. `extra_hosts` are appended to
    /// the configuration's own host list.
    pub fn generate(&self, output: &Path, extra_hosts: &[String]) -> Result<Batch> {
        let mut hosts = self.hosts.clone();
        hosts.extend_from_slice(extra_hosts);
        generate(
            output,
            &self.kind.program,
            &self.axes(),
            &hosts,
            &self.kind.host_switch,
        )
    }
}

/// Every configuration the generator knows about, looked up by name.
#[derive(Debug, Clone)]
pub struct Catalog {
    configurations: Vec<Configuration>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    pub fn builtin() -> Self {
        Catalog {
            configurations: vec![
                Configuration::new("demo", Kind::demo()),
                Configuration::new("mpi", Kind::mpi()),
            ],
        }
    }

    /// Adds a configuration, replacing any with the same name.
    pub fn insert(&mut self, configuration: Configuration) {
        match self
            .configurations
            .iter_mut()
            .find(|c| c.name == configuration.name)
        {
            Some(existing) => *existing = configuration,
            None => self.configurations.push(configuration),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Configuration> {
        self.configurations
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownConfiguration(name.to_string(), self.names().join(", ")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.configurations.iter().map(|c| c.name.as_str()).collect()
    }

    /// Loads configurations from a JSON file on top of the current ones.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read {}", path.display()), e))?;
        self.load_str(&text, path)
    }

    fn load_str(&mut self, text: &str, path: &Path) -> Result<()> {
        let file: ConfigFile = serde_json::from_str(text).map_err(|source| Error::ConfigFile {
            path: PathBuf::from(path),
            source,
        })?;

        for raw in file.configurations {
            let configuration = raw.resolve(self)?;
            debug!(name = %configuration.name, "loaded configuration");
            self.insert(configuration);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    configurations: Vec<RawConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfiguration {
    name: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    switch: Option<String>,
    #[serde(default)]
    hosts: Vec<String>,
    #[serde(default)]
    axes: Vec<RawAxis>,
}

#[derive(Debug, Deserialize)]
struct RawAxis {
    name: String,
    values: RawValues,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Integer(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValues {
    One(RawScalar),
    Many(Vec<RawScalar>),
}

impl RawScalar {
    fn render(&self) -> String {
        match self {
            RawScalar::Integer(value) => value.to_string(),
            RawScalar::Text(value) => value.clone(),
        }
    }
}

impl From<RawAxis> for Axis {
    fn from(raw: RawAxis) -> Self {
        let values = match raw.values {
            RawValues::One(scalar) => vec![scalar.render()],
            RawValues::Many(scalars) => scalars.iter().map(RawScalar::render).collect(),
        };
        Axis {
            name: raw.name,
            values,
        }
    }
}

impl RawConfiguration {
    fn resolve(self, catalog: &Catalog) -> Result<Configuration> {
        let overrides: Vec<Axis> = self.axes.into_iter().map(Axis::from).collect();

        let (kind, overrides) = match self.kind {
            Some(kind_name) => {
                let mut kind = catalog.get(&kind_name)?.kind.clone();
                if let Some(program) = self.program {
                    kind.program = program;
                }
                if let Some(switch) = self.switch {
                    kind.host_switch = switch;
                }
                (kind, overrides)
            }
            None => {
                let program = self
                    .program
                    .ok_or_else(|| ConfigError::MissingProgram(self.name.clone()))?;
                let kind = Kind {
                    program,
                    host_switch: self.switch.unwrap_or_default(),
                    axes: overrides,
                };
                (kind, Vec::new())
            }
        };

        Ok(Configuration {
            name: self.name,
            kind,
            hosts: self.hosts,
            overrides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_demo_produces_full_product() {
        let catalog = Catalog::builtin();
        let cases = catalog.get("demo").unwrap().expand().unwrap();
        // algorithms * threads * workLoad * selection * hosts * runs
        assert_eq!(cases.len(), 2 * 4 * 1 * 3 * 4 * 10);
        assert_eq!(
            cases[0].to_string(),
            "1 ./demo load shared -n 1 -w 1000 -s 1 -h hosts"
        );
    }

    #[test]
    fn builtin_mpi_places_program_after_hostfile() {
        let catalog = Catalog::builtin();
        let cases = catalog.get("mpi").unwrap().expand().unwrap();
        assert_eq!(cases.len(), 5 * 4 * 1 * 2 * 6);
        assert_eq!(
            cases[0].to_string(),
            "1 mpiexec -hostfile hosts ./mpi -n 1 -w 1000 -s 1"
        );
        assert_eq!(cases.last().map(|c| c.host_count), Some(16));
    }

    #[test]
    fn unknown_name_lists_known_ones() {
        let catalog = Catalog::builtin();
        let error = catalog.get("nope").unwrap_err();
        assert_eq!(error.exit_status(), 3);
        assert_eq!(
            error.to_string(),
            "unknown configuration 'nope' (known: demo, mpi)"
        );
    }

    #[test]
    fn overrides_keep_axis_position() {
        let mut configuration = Configuration::new("small", Kind::demo());
        configuration.overrides = vec![
            Axis::new("threads", [8]),
            Axis::single("extra", "x"),
        ];
        let names: Vec<_> = configuration.axes().into_iter().map(|a| a.name).collect();
        assert_eq!(
            names,
            ["algorithms", "threads", "workLoad", "selection", "hosts", "runs", "extra"]
        );
        assert_eq!(configuration.axes()[1].values, ["8"]);
    }

    #[test]
    fn loads_configurations_from_json() {
        let json = r#"{
            "configurations": [
                { "name": "demo-small", "kind": "demo", "hosts": ["a", "b"],
                  "axes": [ { "name": "threads", "values": [1, 2] },
                            { "name": "hosts", "values": [2] },
                            { "name": "runs", "values": 1 } ] },
                { "name": "echo", "program": "echo", "switch": "-h",
                  "axes": [ { "name": "runs", "values": 2 },
                            { "name": "mode", "values": ["fast", "slow"] } ] }
            ]
        }"#;
        let mut catalog = Catalog::builtin();
        catalog.load_str(json, Path::new("test.json")).unwrap();
        assert_eq!(catalog.names(), ["demo", "mpi", "demo-small", "echo"]);

        let small = catalog.get("demo-small").unwrap();
        assert_eq!(small.hosts, ["a", "b"]);
        assert_eq!(small.expand().unwrap().len(), 2 * 2 * 3);

        let echo = catalog.get("echo").unwrap().expand().unwrap();
        let lines: Vec<_> = echo.iter().map(ToString::to_string).collect();
        assert_eq!(lines, ["0 echo fast", "0 echo fast", "0 echo slow", "0 echo slow"]);
    }

    #[test]
    fn file_configurations_shadow_builtins() {
        let json = r#"{ "configurations": [ { "name": "mpi", "program": "true" } ] }"#;
        let mut catalog = Catalog::builtin();
        catalog.load_str(json, Path::new("test.json")).unwrap();
        assert_eq!(catalog.names(), ["demo", "mpi"]);
        assert_eq!(catalog.get("mpi").unwrap().kind.program, "true");
    }

    #[test]
    fn configuration_without_program_or_kind_is_rejected() {
        let json = r#"{ "configurations": [ { "name": "broken" } ] }"#;
        let mut catalog = Catalog::builtin();
        let error = catalog.load_str(json, Path::new("test.json")).unwrap_err();
        assert!(matches!(
            error,
            Error::Config(ConfigError::MissingProgram(ref name)) if name == "broken"
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut catalog = Catalog::builtin();
        let error = catalog.load_str("{", Path::new("bad.json")).unwrap_err();
        assert!(matches!(error, Error::ConfigFile { .. }));
    }
}
