use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Capabilities, SynapseStore, PROP_CONDUCTANCE_RATIO, PROP_U_HILL_COEFFICIENT};
use crate::error::{Error, Result};
use crate::synapse::SynapseRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnarDocument {
    pub population: String,
    pub targets: BTreeMap<usize, SynapseColumns>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynapseColumns {
    pub pre_nid: Vec<usize>,
    pub delay: Vec<f64>,
    pub section_id: Vec<u32>,
    pub segment_id: Vec<u32>,
    pub offset: Vec<f64>,
    pub weight: Vec<f64>,
    pub u: Vec<f64>,
    pub d: Vec<f64>,
    pub f: Vec<f64>,
    pub dtc: Vec<f64>,
    pub syn_type: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release_sites: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub u_hill_coefficient: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conductance_ratio: Vec<f64>,
}

impl SynapseColumns {
    pub fn from_records(records: &[SynapseRecord]) -> Self {
        let mut columns = Self::default();
        for record in records {
            columns.push(record);
        }

        if records.iter().any(|record| record.release_sites.is_none()) {
            columns.release_sites.clear();
        }
        if records.iter().any(|record| record.u_hill_coefficient.is_none()) {
            columns.u_hill_coefficient.clear();
        }
        if records.iter().any(|record| record.conductance_ratio.is_none()) {
            columns.conductance_ratio.clear();
        }

        columns
    }

    fn push(&mut self, record: &SynapseRecord) {
        self.pre_nid.push(record.pre_nid);
        self.delay.push(record.delay);
        self.section_id.push(record.section_id);
        self.segment_id.push(record.segment_id);
        self.offset.push(record.offset);
        self.weight.push(record.weight);
        self.u.push(record.u);
        self.d.push(record.d);
        self.f.push(record.f);
        self.dtc.push(record.dtc);
        self.syn_type.push(record.syn_type);
        self.release_sites.extend(record.release_sites);
        self.u_hill_coefficient.extend(record.u_hill_coefficient);
        self.conductance_ratio.extend(record.conductance_ratio);
    }

    pub fn len(&self) -> usize {
        self.pre_nid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pre_nid.is_empty()
    }

    fn check_shape(&self) -> std::result::Result<(), String> {
        let len = self.len();
        let mandatory = [
            ("delay", self.delay.len()),
            ("section_id", self.section_id.len()),
            ("segment_id", self.segment_id.len()),
            ("offset", self.offset.len()),
            ("weight", self.weight.len()),
            ("u", self.u.len()),
            ("d", self.d.len()),
            ("f", self.f.len()),
            ("dtc", self.dtc.len()),
            ("syn_type", self.syn_type.len()),
        ];
        let optional = [
            ("release_sites", self.release_sites.len()),
            ("u_hill_coefficient", self.u_hill_coefficient.len()),
            ("conductance_ratio", self.conductance_ratio.len()),
        ];

        for (column, column_len) in mandatory {
            if column_len != len {
                return Err(format!(
                    "column {} has {} rows, expected {}",
                    column, column_len, len
                ));
            }
        }

        for (column, column_len) in optional {
            if column_len != 0 && column_len != len {
                return Err(format!(
                    "optional column {} has {} rows, expected 0 or {}",
                    column, column_len, len
                ));
            }
        }

        Ok(())
    }

    fn row(&self, idx: usize) -> SynapseRecord {
        SynapseRecord {
            pre_nid: self.pre_nid[idx],
            delay: self.delay[idx],
            section_id: self.section_id[idx],
            segment_id: self.segment_id[idx],
            offset: self.offset[idx],
            weight: self.weight[idx],
            u: self.u[idx],
            d: self.d[idx],
            f: self.f[idx],
            dtc: self.dtc[idx],
            syn_type: self.syn_type[idx],
            release_sites: self.release_sites.get(idx).copied(),
            u_hill_coefficient: self.u_hill_coefficient.get(idx).copied(),
            conductance_ratio: self.conductance_ratio.get(idx).copied(),
            location: self.offset[idx],
        }
    }
}

impl ColumnarDocument {
    pub fn new(population: &str) -> Self {
        Self {
            population: population.to_string(),
            targets: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, post_nid: usize, records: &[SynapseRecord]) {
        self.targets
            .insert(post_nid, SynapseColumns::from_records(records));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|err| Error::InvalidInput(format!("cannot encode columnar store: {}", err)))?;
        fs::write(path, json)
            .map_err(|err| Error::InvalidInput(format!("cannot write {}: {}", path.display(), err)))
    }
}

pub struct ColumnarStore {
    name: String,
    document: ColumnarDocument,
    capabilities: Capabilities,
}

impl ColumnarStore {
    pub fn open(path: &Path, population: Option<&str>) -> Result<Self> {
        let name = path.display().to_string();

        let contents =
            fs::read_to_string(path).map_err(|err| Error::backend_unavailable(&name, err))?;

        let document: ColumnarDocument =
            serde_json::from_str(&contents).map_err(|err| Error::backend_unavailable(&name, err))?;

        Self::from_document(name, document, population)
    }

    pub fn from_document(
        name: String,
        document: ColumnarDocument,
        population: Option<&str>,
    ) -> Result<Self> {
        if let Some(population) = population {
            if population != document.population {
                return Err(Error::backend_unavailable(
                    &name,
                    format!(
                        "population {} not found (store holds {})",
                        population, document.population
                    ),
                ));
            }
        }

        for (post_nid, columns) in &document.targets {
            columns.check_shape().map_err(|reason| {
                Error::backend_unavailable(&name, format!("target {}: {}", post_nid, reason))
            })?;
        }

        let capabilities = derive_capabilities(&document);

        log::debug!(
            "opened columnar store {} with {} targets",
            name,
            document.targets.len()
        );

        Ok(Self {
            name,
            document,
            capabilities,
        })
    }
}

fn derive_capabilities(document: &ColumnarDocument) -> Capabilities {
    let mut non_empty = document
        .targets
        .values()
        .filter(|columns| !columns.is_empty())
        .peekable();

    if non_empty.peek().is_none() {
        return Capabilities::new(false);
    }

    let targets: Vec<&SynapseColumns> = non_empty.collect();
    let has_column =
        |column: fn(&SynapseColumns) -> usize| targets.iter().all(|columns| column(columns) > 0);

    let mut capabilities = Capabilities::new(has_column(|columns| columns.release_sites.len()));

    if has_column(|columns| columns.u_hill_coefficient.len()) {
        capabilities = capabilities.with_property(PROP_U_HILL_COEFFICIENT);
    }
    if has_column(|columns| columns.conductance_ratio.len()) {
        capabilities = capabilities.with_property(PROP_CONDUCTANCE_RATIO);
    }

    capabilities
}

impl SynapseStore for ColumnarStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn read(&mut self, post_nid: usize) -> Result<Vec<SynapseRecord>> {
        let columns = self
            .document
            .targets
            .get(&post_nid)
            .ok_or(Error::RecordNotFound(post_nid))?;

        Ok((0..columns.len()).map(|idx| columns.row(idx)).collect())
    }
}
