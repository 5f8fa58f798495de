use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Capabilities, SynapseStore};
use crate::error::{Error, Result};
use crate::synapse::SynapseRecord;
use crate::types::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    targets: Arc<HashMap<usize, Vec<SynapseRecord>>>,
    capabilities: Capabilities,
    reads: Arc<AtomicUsize>,
    unavailable_reason: Option<String>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, post_nid: usize, records: Vec<SynapseRecord>) -> Self {
        Arc::make_mut(&mut self.targets).insert(post_nid, records);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable_reason = Some(reason.to_string());
        self
    }

    // shared between clones, so a test can keep a handle after the store is boxed
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub(super) fn open(&self) -> Result<Self> {
        match &self.unavailable_reason {
            Some(reason) => Err(Error::backend_unavailable(&self.name, reason)),
            None => Ok(self.clone()),
        }
    }
}

impl SynapseStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn read(&mut self, post_nid: usize) -> Result<Vec<SynapseRecord>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.targets
            .get(&post_nid)
            .cloned()
            .ok_or(Error::RecordNotFound(post_nid))
    }
}
