mod columnar;
mod flat_file;
mod memory;

use std::path::PathBuf;

use crate::{error::Result, synapse::SynapseRecord, types::HashSet};

pub use columnar::{ColumnarDocument, ColumnarStore, SynapseColumns};
pub use flat_file::FlatFileStore;
pub use memory::MemoryStore;

pub const PROP_U_HILL_COEFFICIENT: &str = "u_hill_coefficient";
pub const PROP_CONDUCTANCE_RATIO: &str = "conductance_ratio";

pub trait SynapseStore {
    fn name(&self) -> &str;
    fn capabilities(&self) -> &Capabilities;
    fn read(&mut self, post_nid: usize) -> Result<Vec<SynapseRecord>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_release_count: bool,
    properties: Vec<String>,
}

impl Capabilities {
    pub fn new(has_release_count: bool) -> Self {
        Self {
            has_release_count,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: &str) -> Self {
        if !self.has_property(name) {
            self.properties.push(name.to_string());
        }
        self
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|property| property == name)
    }

    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        let present: HashSet<&str> = self.properties.iter().map(String::as_str).collect();
        required
            .iter()
            .copied()
            .filter(|name| !present.contains(name))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum StoreSource {
    Columnar {
        path: PathBuf,
        population: Option<String>,
    },
    FlatFile {
        path: PathBuf,
    },
    Memory(MemoryStore),
}

impl StoreSource {
    pub fn describe(&self) -> String {
        match self {
            StoreSource::Columnar { path, .. } => format!("columnar:{}", path.display()),
            StoreSource::FlatFile { path } => format!("flat:{}", path.display()),
            StoreSource::Memory(store) => format!("memory:{}", store.name()),
        }
    }
}

pub fn open(source: &StoreSource) -> Result<Box<dyn SynapseStore>> {
    match source {
        StoreSource::Columnar { path, population } => {
            Ok(Box::new(ColumnarStore::open(path, population.as_deref())?))
        }
        StoreSource::FlatFile { path } => Ok(Box::new(FlatFileStore::open(path)?)),
        StoreSource::Memory(store) => Ok(Box::new(store.open()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_properties() {
        let sut = Capabilities::new(true)
            .with_property(PROP_U_HILL_COEFFICIENT)
            .with_property(PROP_U_HILL_COEFFICIENT);

        assert!(sut.has_release_count);
        assert!(sut.has_property(PROP_U_HILL_COEFFICIENT));
        assert!(!sut.has_property(PROP_CONDUCTANCE_RATIO));
        assert_eq!(
            sut.missing(&[PROP_U_HILL_COEFFICIENT, PROP_CONDUCTANCE_RATIO]),
            [PROP_CONDUCTANCE_RATIO]
        );
    }

    #[test]
    fn open_dispatches_on_source() {
        let store = MemoryStore::new("mem").with_target(3, vec![SynapseRecord::new(1, 0.5, 1.0, 110)]);
        let mut opened = open(&StoreSource::Memory(store)).unwrap();
        assert_eq!(opened.name(), "mem");
        assert_eq!(opened.read(3).unwrap().len(), 1);

        let missing = StoreSource::FlatFile {
            path: PathBuf::from("/nonexistent/edges.txt"),
        };
        assert!(matches!(
            open(&missing),
            Err(crate::error::Error::BackendUnavailable { .. })
        ));
    }
}
