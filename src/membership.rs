use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::HashMap;

pub trait TargetSpec {
    fn name(&self) -> &str;
    fn contains(&self, nid: usize) -> bool;
    // sorted ascending, no duplicates
    fn gids(&self) -> &[usize];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GidSet {
    name: String,
    gids: Vec<usize>,
}

impl GidSet {
    pub fn new(name: &str, gids: impl IntoIterator<Item = usize>) -> Self {
        let mut gids: Vec<usize> = gids.into_iter().collect();
        gids.sort_unstable();
        gids.dedup();
        Self {
            name: name.to_string(),
            gids,
        }
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }
}

impl TargetSpec for GidSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, nid: usize) -> bool {
        self.gids.binary_search(&nid).is_ok()
    }

    fn gids(&self) -> &[usize] {
        &self.gids
    }
}

pub fn intersects(a: &dyn TargetSpec, b: &dyn TargetSpec) -> bool {
    let (a, b) = (a.gids(), b.gids());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }

    false
}

pub fn same_members(a: &dyn TargetSpec, b: &dyn TargetSpec) -> bool {
    a.gids() == b.gids()
}

#[derive(Debug, Clone, Default)]
pub struct Memberships {
    sets: HashMap<String, GidSet>,
}

impl Memberships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, set: GidSet) {
        self.sets.insert(set.name.clone(), set);
    }

    pub fn with(mut self, name: &str, gids: impl IntoIterator<Item = usize>) -> Self {
        self.insert(GidSet::new(name, gids));
        self
    }

    pub fn get(&self, name: &str) -> Option<&GidSet> {
        self.sets.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&GidSet> {
        self.get(name)
            .ok_or_else(|| Error::Configuration(format!("unknown membership {}", name)))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<usize>> = serde_yaml::from_str(yaml)
            .map_err(|err| Error::Configuration(format!("cannot parse memberships: {}", err)))?;

        let mut memberships = Self::new();
        for (name, gids) in raw {
            memberships.insert(GidSet::new(&name, gids));
        }

        Ok(memberships)
    }
}
