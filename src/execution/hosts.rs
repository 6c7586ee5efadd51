// Host pools and the transient host files handed to benchmark programs.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use tempfile::{Builder, NamedTempFile};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPool {
    hosts: Vec<String>,
}

impl HostPool {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    /// Reads a host file: one host per line, blank lines ignored.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read host list {}", path.display()), e))?;
        Ok(Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Uniformly random subset of `count` distinct hosts in random order.
    /// Asking for more than the pool holds yields the whole pool.
    pub fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<&str> {
        let mut chosen: Vec<&str> = self
            .hosts
            .choose_multiple(rng, count)
            .map(String::as_str)
            .collect();
        chosen.shuffle(rng);
        chosen
    }
}

/// A randomly named file listing the hosts of one case. The file is removed
/// when this value is dropped.
#[derive(Debug)]
pub struct HostFile {
    file: NamedTempFile,
}

impl HostFile {
    pub fn create(dir: &Path, hosts: &[&str]) -> io::Result<Self> {
        let mut file = Builder::new().prefix(".hosts-").tempfile_in(dir)?;
        for host in hosts {
            writeln!(file, "{host}")?;
        }
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn remove(self) -> io::Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool() -> HostPool {
        HostPool::new((1..=8).map(|i| format!("node{i:02}")).collect())
    }

    #[test]
    fn sample_is_distinct_subset_of_pool() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(7);
        for count in 0..=pool.len() {
            let chosen = pool.sample(count, &mut rng);
            assert_eq!(chosen.len(), count);
            let unique: HashSet<_> = chosen.iter().collect();
            assert_eq!(unique.len(), count);
            assert!(chosen.iter().all(|h| pool.hosts().iter().any(|p| p == h)));
        }
    }

    #[test]
    fn sample_eventually_covers_every_host() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(pool.sample(1, &mut rng));
        }
        assert_eq!(seen.len(), pool.len());
    }

    #[test]
    fn host_file_lists_hosts_and_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let file = HostFile::create(dir.path(), &["a", "b"]).unwrap();
        let path = file.path().to_path_buf();
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(".hosts-")));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");

        file.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn host_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let file = HostFile::create(dir.path(), &["a"]).unwrap();
            file.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn read_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool");
        fs::write(&path, "a\n\n  b  \n").unwrap();
        assert_eq!(HostPool::read(&path).unwrap().hosts(), ["a", "b"]);
    }
}
