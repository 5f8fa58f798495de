use crate::error::{Error, Result};
use crate::params::ReaderParams;
use crate::storage::{self, StoreSource, SynapseStore, PROP_U_HILL_COEFFICIENT};
use crate::synapse::SynapseRecord;
use crate::types::HashMap;
use crate::util::{constrained_hill, quantize_delay};

struct CachedTarget {
    records: Vec<SynapseRecord>,
    release_override: Option<f64>,
}

pub struct SynapseParameterReader {
    store: Box<dyn SynapseStore>,
    params: ReaderParams,
    cache: HashMap<usize, CachedTarget>,
    hill_warned: bool,
}

impl SynapseParameterReader {
    pub fn new(store: Box<dyn SynapseStore>, params: ReaderParams) -> Self {
        Self {
            store,
            params,
            cache: HashMap::default(),
            hill_warned: false,
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn params(&self) -> &ReaderParams {
        &self.params
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn get_synapse_parameters(
        &mut self,
        post_nid: usize,
        release_override: Option<f64>,
    ) -> Result<&[SynapseRecord]> {
        if self.cache.contains_key(&post_nid) {
            let cached = &self.cache[&post_nid];
            if release_override.is_some() && release_override != cached.release_override {
                log::warn!(
                    "records of target {} are cached with calcium {:?}, ignoring {:?}",
                    post_nid,
                    cached.release_override,
                    release_override
                );
            }
            return Ok(&cached.records);
        }

        let mut records = match self.store.read(post_nid) {
            Ok(records) => records,
            Err(Error::RecordNotFound(_)) => {
                log::debug!("{}: no records for target {}", self.store.name(), post_nid);
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let dt = self.params.dt;
        for record in records.iter_mut() {
            record.delay = quantize_delay(record.delay, dt);
        }

        if let Some(concentration) = release_override.or(self.params.extracellular_calcium) {
            self.scale_release_probability(&mut records, concentration);
        }

        let cached = self.cache.entry(post_nid).or_insert(CachedTarget {
            records,
            release_override,
        });
        Ok(&cached.records)
    }

    fn scale_release_probability(&mut self, records: &mut [SynapseRecord], concentration: f64) {
        if !self
            .store
            .capabilities()
            .has_property(PROP_U_HILL_COEFFICIENT)
        {
            if !self.hill_warned {
                log::warn!(
                    "{}: no {} column, release probability not scaled for calcium {}",
                    self.store.name(),
                    PROP_U_HILL_COEFFICIENT,
                    concentration
                );
                self.hill_warned = true;
            }
            return;
        }

        for record in records.iter_mut() {
            if let Some(k_half) = record.u_hill_coefficient {
                record.u *= constrained_hill(k_half, concentration);
            }
        }
    }
}

// tries each source once, in order
pub fn open_reader(
    sources: &[StoreSource],
    params: ReaderParams,
    required_properties: &[&str],
) -> Result<SynapseParameterReader> {
    for source in sources {
        let store = match storage::open(source) {
            Ok(store) => store,
            Err(err) => {
                log::warn!("skipping synapse store {}: {}", source.describe(), err);
                continue;
            }
        };

        let missing = store.capabilities().missing(required_properties);
        if !missing.is_empty() {
            log::warn!(
                "skipping synapse store {}: missing {}",
                source.describe(),
                missing.join(", ")
            );
            continue;
        }

        log::info!("reading synapses from {}", source.describe());
        return Ok(SynapseParameterReader::new(store, params));
    }

    Err(Error::backend_unavailable(
        sources
            .iter()
            .map(StoreSource::describe)
            .collect::<Vec<_>>()
            .join(", "),
        "no usable synapse store",
    ))
}
