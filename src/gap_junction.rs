use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapJunctionOffsets {
    offsets: HashMap<usize, usize>,
    total: usize,
}

impl GapJunctionOffsets {
    // pairs of (gid, junction count), every worker must pass them in the same order
    pub fn from_counts(counts: impl IntoIterator<Item = (usize, usize)>) -> Result<Self> {
        let mut offsets = HashMap::default();
        let mut running = 0usize;

        for (nid, count) in counts {
            if offsets.insert(nid, running).is_some() {
                return Err(Error::Configuration(format!(
                    "gap junction offsets list gid {} twice",
                    nid
                )));
            }
            running += count;
        }

        Ok(Self {
            offsets,
            total: running,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::Configuration(format!(
                "cannot read gap junction offsets {}: {}",
                path.display(),
                err
            ))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut counts = Vec::new();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let parsed = match fields.as_slice() {
                [nid, count] => nid.parse::<usize>().ok().zip(count.parse::<usize>().ok()),
                _ => None,
            };

            match parsed {
                Some(pair) => counts.push(pair),
                None => {
                    return Err(Error::Configuration(format!(
                        "gap junction offsets line {}: expected 'gid count'",
                        idx + 1
                    )))
                }
            }
        }

        Self::from_counts(counts)
    }

    pub fn get(&self, nid: usize) -> Option<usize> {
        self.offsets.get(&nid).copied()
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
