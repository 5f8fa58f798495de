use itertools::Itertools;
use simple_error::try_with;

use crate::connection::{Connection, ConnectionOptions, FinalizeContext, ReplayMode};
use crate::engine::{SectionLocator, SimulationEngine};
use crate::error::{Error, Result};
use crate::gap_junction::GapJunctionOffsets;
use crate::membership::TargetSpec;
use crate::params::{
    self, ConnectionKind, ConnectionUpdate, FinalizeOrder, GroupConnect, ManagerParams,
};
use crate::process_group::{ProcessGroup, ReduceOp};
use crate::reader::{self, SynapseParameterReader};
use crate::registry::ConnectionRegistry;
use crate::storage::StoreSource;
use crate::synapse::SynapseRecord;
use crate::types::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupConnectStats {
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub local_connections: usize,
    pub local_synapses: usize,
    pub total_connections: usize,
}

// None matches every id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub post_ids: Option<Vec<usize>>,
    pub pre_ids: Option<Vec<usize>>,
}

impl ConnectionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_post_ids(mut self, post_ids: impl IntoIterator<Item = usize>) -> Self {
        self.post_ids = Some(post_ids.into_iter().collect());
        self
    }

    pub fn with_pre_ids(mut self, pre_ids: impl IntoIterator<Item = usize>) -> Self {
        self.pre_ids = Some(pre_ids.into_iter().collect());
        self
    }

    pub fn matches(&self, pre_nid: usize, post_nid: usize) -> bool {
        let post_ok = self
            .post_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&post_nid));
        let pre_ok = self
            .pre_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&pre_nid));
        post_ok && pre_ok
    }
}

pub struct ConnectionManager {
    params: ManagerParams,
    reader: SynapseParameterReader,
    registry: ConnectionRegistry,
    gap_junction_offsets: Option<GapJunctionOffsets>,
    finalized: bool,
}

impl ConnectionManager {
    pub fn new(params: ManagerParams, reader: SynapseParameterReader) -> Result<Self> {
        try_with!(
            params::validate_manager_params(&params),
            "invalid manager parameters"
        );

        Ok(Self {
            params,
            reader,
            registry: ConnectionRegistry::new(),
            gap_junction_offsets: None,
            finalized: false,
        })
    }

    pub fn open(
        params: ManagerParams,
        sources: &[StoreSource],
        required_properties: &[&str],
    ) -> Result<Self> {
        let reader = reader::open_reader(sources, params.reader_params(), required_properties)?;
        Self::new(params, reader)
    }

    pub fn params(&self) -> &ManagerParams {
        &self.params
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn reader(&self) -> &SynapseParameterReader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut SynapseParameterReader {
        &mut self.reader
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn set_gap_junction_offsets(&mut self, offsets: GapJunctionOffsets) {
        self.gap_junction_offsets = Some(offsets);
    }

    fn ensure_building(&self, operation: &str) -> Result<()> {
        if self.finalized {
            return Err(Error::InvalidState(format!(
                "{} after the manager was finalized",
                operation
            )));
        }
        Ok(())
    }

    pub fn connect_all(
        &mut self,
        locator: &dyn SectionLocator,
        target_ids: &[usize],
        weight_factor: f64,
    ) -> Result<usize> {
        self.ensure_building("connect_all")?;

        let options = ConnectionOptions {
            weight_factor,
            ..ConnectionOptions::default()
        };
        let mut created = 0;

        for &post_nid in target_ids {
            let records = self.reader.get_synapse_parameters(post_nid, None)?;
            let connections =
                group_by_source(post_nid, records.iter().enumerate(), locator, &options)?;

            // sources created from this target's records so far
            let mut fresh = HashSet::default();
            for conn in connections {
                let pre_nid = conn.pre_nid();
                if fresh.contains(&pre_nid) {
                    self.merge_run(conn)?;
                } else if self.registry.store(conn) {
                    fresh.insert(pre_nid);
                    created += 1;
                }
            }
        }

        log::info!(
            "created {} connections for {} targets",
            created,
            target_ids.len()
        );

        Ok(created)
    }

    fn merge_run(&mut self, conn: Connection) -> Result<()> {
        let (pre_nid, post_nid) = conn.key();
        match self.registry.get_mut(pre_nid, post_nid) {
            Some(existing) => {
                log::debug!(
                    "records of {} -> {} are not contiguous, merging placements",
                    pre_nid,
                    post_nid
                );
                existing.absorb(conn)
            }
            None => Err(Error::InvalidState(format!(
                "connection {} -> {} vanished while connecting",
                pre_nid, post_nid
            ))),
        }
    }

    pub fn group_connect(
        &mut self,
        locator: &dyn SectionLocator,
        source: &dyn TargetSpec,
        dest: &dyn TargetSpec,
        target_ids: &[usize],
        group: &GroupConnect,
    ) -> Result<GroupConnectStats> {
        self.ensure_building("group_connect")?;

        let options = ConnectionOptions {
            weight_factor: if group.creation_mode {
                creation_weight(group.weight, source, dest)
            } else {
                1.0
            },
            configurations: group.configuration.iter().cloned().collect(),
            plasticity_mode: group.plasticity_mode.clone(),
            minis_rate: group.minis_rate,
            synapse_override: group.synapse_override.clone(),
        };
        let mut stats = GroupConnectStats::default();

        for &post_nid in target_ids.iter().filter(|post_nid| dest.contains(**post_nid)) {
            let records = self.reader.get_synapse_parameters(post_nid, None)?;
            let selected = records.iter().enumerate().filter(|(_, record)| {
                source.contains(record.pre_nid)
                    && group
                        .kind_restrict
                        .map_or(true, |class| record.class() == class)
            });
            let connections = group_by_source(post_nid, selected, locator, &options)?;

            let mut fresh = HashSet::default();
            for conn in connections {
                let pre_nid = conn.pre_nid();
                if fresh.contains(&pre_nid) {
                    self.merge_run(conn)?;
                    continue;
                }

                match self.registry.get_mut(pre_nid, post_nid) {
                    Some(existing) => {
                        apply_group_update(existing, group)?;
                        stats.updated += 1;
                    }
                    None if group.creation_mode => {
                        if self.registry.store(conn) {
                            fresh.insert(pre_nid);
                            stats.created += 1;
                        }
                    }
                    None => {}
                }
            }
        }

        log::debug!(
            "{} -> {}: created {}, updated {}",
            source.name(),
            dest.name(),
            stats.created,
            stats.updated
        );

        Ok(stats)
    }

    // connections of an inert pathway are parked so they are never materialized,
    // pairs for which `keep` holds stay active
    pub fn deactivate_pathway(
        &mut self,
        source: &dyn TargetSpec,
        dest: &dyn TargetSpec,
        target_ids: &[usize],
        keep: &dyn Fn(usize, usize) -> bool,
    ) -> Result<usize> {
        self.ensure_building("deactivate_pathway")?;

        let keys: Vec<(usize, usize)> = target_ids
            .iter()
            .filter(|post_nid| dest.contains(**post_nid))
            .flat_map(|post_nid| self.registry.target_connections(*post_nid))
            .filter(|conn| source.contains(conn.pre_nid()))
            .map(Connection::key)
            .filter(|(pre_nid, post_nid)| !keep(*pre_nid, *post_nid))
            .collect();

        Ok(keys
            .into_iter()
            .filter(|(pre_nid, post_nid)| self.registry.move_to_disabled(*pre_nid, *post_nid))
            .count())
    }

    pub fn configure(
        &mut self,
        engine: &mut dyn SimulationEngine,
        source: &dyn TargetSpec,
        dest: &dyn TargetSpec,
        target_ids: &[usize],
        update: &ConnectionUpdate,
    ) -> Result<usize> {
        if update.is_empty() {
            log::warn!(
                "{} -> {}: empty connection update",
                source.name(),
                dest.name()
            );
            return Ok(0);
        }

        let mut matched = 0;

        for &post_nid in target_ids.iter().filter(|post_nid| dest.contains(**post_nid)) {
            let connections = self.registry.active_mut().target_connections_mut(post_nid);
            for conn in connections
                .iter_mut()
                .filter(|conn| source.contains(conn.pre_nid()))
            {
                apply_update(conn, engine, update)?;
                matched += 1;
            }
        }

        if matched == 0 {
            log::warn!(
                "{} -> {}: update matched no connection",
                source.name(),
                dest.name()
            );
        }

        Ok(matched)
    }

    pub fn finalize(
        &mut self,
        engine: &mut dyn SimulationEngine,
        group: &mut dyn ProcessGroup,
        base_seed: u64,
    ) -> Result<FinalizeSummary> {
        self.ensure_building("finalize")?;

        let offsets = match self.params.kind {
            ConnectionKind::Chemical => None,
            ConnectionKind::GapJunction => {
                Some(self.gap_junction_offsets.as_ref().ok_or_else(|| {
                    Error::Configuration("gap junction manager has no junction offsets".into())
                })?)
            }
        };

        self.finalized = true;

        let ctx = FinalizeContext {
            base_seed,
            minis_seed: self.params.minis_seed,
            dt: self.params.dt,
        };
        let mut finalize_one = |conn: &mut Connection| match offsets {
            Some(offsets) => conn.finalize_gap_junctions(engine, offsets),
            None => conn.finalize(engine, &ctx),
        };

        let mut local_synapses = 0;
        for bucket in self.registry.active_mut().buckets_mut() {
            let connections = bucket.connections_mut();
            match self.params.finalize_order {
                FinalizeOrder::Insertion => {
                    for conn in connections.iter_mut() {
                        local_synapses += finalize_one(conn)?;
                    }
                }
                FinalizeOrder::ReverseInsertion => {
                    for conn in connections.iter_mut().rev() {
                        local_synapses += finalize_one(conn)?;
                    }
                }
            }
        }

        let local_connections = self.registry.len();
        let total_connections = group.reduce(local_connections as f64, ReduceOp::Sum)?;

        log::info!(
            "rank {}: materialized {} synapses in {} connections, {} connections in total",
            group.rank(),
            local_synapses,
            local_connections,
            total_connections
        );

        Ok(FinalizeSummary {
            local_connections,
            local_synapses,
            total_connections: total_connections.round() as usize,
        })
    }

    pub fn replay(
        &mut self,
        engine: &mut dyn SimulationEngine,
        target: &dyn TargetSpec,
        spike_map: &HashMap<usize, Vec<f64>>,
        mode: ReplayMode,
    ) -> Result<usize> {
        if self.params.kind == ConnectionKind::GapJunction {
            return Err(Error::InvalidState(
                "replay is not supported on gap junctions".into(),
            ));
        }

        let mut replayed = 0;

        for conn in self
            .registry
            .all_mut()
            .filter(|conn| target.contains(conn.post_nid()))
        {
            if let Some(event_times) = spike_map.get(&conn.pre_nid()) {
                conn.replay(engine, event_times, mode)?;
                replayed += 1;
            }
        }

        Ok(replayed)
    }

    pub fn disable(
        &mut self,
        engine: &mut dyn SimulationEngine,
        pre_nid: usize,
        post_nid: usize,
        zero_conductance: bool,
    ) -> Result<bool> {
        let conn = match self.registry.get_mut(pre_nid, post_nid) {
            Some(conn) => conn,
            None => {
                log::warn!("no active connection {} -> {} to disable", pre_nid, post_nid);
                return Ok(false);
            }
        };

        if conn.is_finalized() {
            conn.disable(engine, zero_conductance)?;
        }

        Ok(self.registry.move_to_disabled(pre_nid, post_nid))
    }

    pub fn enable(
        &mut self,
        engine: &mut dyn SimulationEngine,
        pre_nid: usize,
        post_nid: usize,
    ) -> Result<bool> {
        let conn = match self.registry.get_disabled_mut(pre_nid, post_nid) {
            Some(conn) => conn,
            None => {
                log::warn!("no disabled connection {} -> {} to enable", pre_nid, post_nid);
                return Ok(false);
            }
        };

        if conn.is_finalized() {
            conn.enable(engine)?;
        } else if self.finalized {
            log::warn!(
                "connection {} -> {} was never materialized, it stays inert",
                pre_nid,
                post_nid
            );
        }

        Ok(self.registry.move_to_active(pre_nid, post_nid))
    }

    pub fn delete(
        &mut self,
        engine: &mut dyn SimulationEngine,
        pre_nid: usize,
        post_nid: usize,
    ) -> Result<bool> {
        match self.registry.delete(pre_nid, post_nid) {
            Some(mut conn) => {
                if conn.is_finalized() && conn.is_enabled() {
                    conn.disable(engine, false)?;
                }
                Ok(true)
            }
            None => {
                log::warn!("no connection {} -> {} to delete", pre_nid, post_nid);
                Ok(false)
            }
        }
    }

    pub fn disable_group(
        &mut self,
        engine: &mut dyn SimulationEngine,
        filter: &ConnectionFilter,
        zero_conductance: bool,
    ) -> Result<usize> {
        let keys = matching_keys(self.registry.all(), filter);
        let mut count = 0;
        for (pre_nid, post_nid) in keys {
            if self.disable(engine, pre_nid, post_nid, zero_conductance)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn enable_group(
        &mut self,
        engine: &mut dyn SimulationEngine,
        filter: &ConnectionFilter,
    ) -> Result<usize> {
        let keys = matching_keys(self.registry.all_disabled(), filter);
        let mut count = 0;
        for (pre_nid, post_nid) in keys {
            if self.enable(engine, pre_nid, post_nid)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn delete_group(
        &mut self,
        engine: &mut dyn SimulationEngine,
        filter: &ConnectionFilter,
    ) -> Result<usize> {
        let keys = matching_keys(
            self.registry.all().chain(self.registry.all_disabled()),
            filter,
        );
        let mut count = 0;
        for (pre_nid, post_nid) in keys {
            if self.delete(engine, pre_nid, post_nid)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn matching_keys<'a>(
    connections: impl Iterator<Item = &'a Connection>,
    filter: &ConnectionFilter,
) -> Vec<(usize, usize)> {
    connections
        .map(Connection::key)
        .filter(|(pre_nid, post_nid)| filter.matches(*pre_nid, *post_nid))
        .collect()
}

// records arrive sorted by source, so every contiguous run is one connection
fn group_by_source<'a>(
    post_nid: usize,
    records: impl Iterator<Item = (usize, &'a SynapseRecord)>,
    locator: &dyn SectionLocator,
    options: &ConnectionOptions,
) -> Result<Vec<Connection>> {
    let mut connections = Vec::new();

    for (pre_nid, run) in &records.group_by(|(_, record)| record.pre_nid) {
        let mut conn = Connection::new(pre_nid, post_nid, options.clone());
        for (syn_id, record) in run {
            conn.add_synapse(locator.locate(post_nid, record), *record, Some(syn_id))?;
        }
        connections.push(conn);
    }

    Ok(connections)
}

fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight >= 0.0
}

fn creation_weight(weight: Option<f64>, source: &dyn TargetSpec, dest: &dyn TargetSpec) -> f64 {
    match weight {
        None => 1.0,
        Some(weight) if is_valid_weight(weight) => weight,
        Some(weight) => {
            log::warn!(
                "{} -> {}: invalid weight {}, using 1.0",
                source.name(),
                dest.name(),
                weight
            );
            1.0
        }
    }
}

fn update_weight(conn: &Connection, weight: Option<f64>) -> Option<f64> {
    match weight {
        Some(weight) if !is_valid_weight(weight) => {
            log::warn!(
                "connection {} -> {}: ignoring invalid weight {}",
                conn.pre_nid(),
                conn.post_nid(),
                weight
            );
            None
        }
        weight => weight,
    }
}

fn apply_group_update(conn: &mut Connection, group: &GroupConnect) -> Result<()> {
    if let Some(weight) = update_weight(conn, group.weight) {
        conn.set_weight_factor(weight)?;
    }
    if let Some(configuration) = &group.configuration {
        conn.add_configuration(configuration)?;
    }
    if let Some(mode) = &group.plasticity_mode {
        conn.set_plasticity_mode(Some(mode.clone()))?;
    }
    if let Some(rate) = group.minis_rate {
        conn.set_minis_rate(Some(rate))?;
    }
    if let Some(helper) = &group.synapse_override {
        conn.set_synapse_override(Some(helper.clone()))?;
    }
    Ok(())
}

fn apply_update(
    conn: &mut Connection,
    engine: &mut dyn SimulationEngine,
    update: &ConnectionUpdate,
) -> Result<()> {
    let weight = update_weight(conn, update.weight);

    if conn.is_finalized() {
        if let Some(weight) = weight {
            conn.update_weight(engine, weight)?;
        }
        if let Some(configuration) = &update.configuration {
            conn.apply_configuration(engine, configuration)?;
        }
        if !update.params.is_empty() {
            conn.update_params(engine, &update.params)?;
        }
        return Ok(());
    }

    if let Some(weight) = weight {
        conn.set_weight_factor(weight)?;
    }
    if let Some(configuration) = &update.configuration {
        conn.add_configuration(configuration)?;
    }
    for (name, value) in &update.params {
        conn.add_configuration(&format!("%s.{} = {}", name, value))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DirectLocator, RecordingEngine, CONDUCTANCE};
    use crate::membership::GidSet;
    use crate::params::ReaderParams;
    use crate::process_group::SingleProcess;
    use crate::storage::MemoryStore;
    use crate::synapse::SynapseClass;
    use float_cmp::assert_approx_eq;
    use itertools::assert_equal;

    const READER_PARAMS: ReaderParams = ReaderParams {
        dt: 0.025,
        extracellular_calcium: None,
    };

    fn store() -> MemoryStore {
        MemoryStore::new("mem")
            .with_target(
                10,
                vec![
                    SynapseRecord::new(5, 1.0, 0.5, 113),
                    SynapseRecord::new(5, 1.5, 0.6, 113),
                    SynapseRecord::new(7, 2.0, 0.7, 6),
                ],
            )
            .with_target(
                12,
                vec![
                    SynapseRecord::new(3, 1.0, 0.5, 113),
                    SynapseRecord::new(5, 1.0, 0.5, 113),
                ],
            )
    }

    fn manager_with(params: ManagerParams, store: MemoryStore) -> ConnectionManager {
        let reader = SynapseParameterReader::new(Box::new(store), READER_PARAMS);
        ConnectionManager::new(params, reader).unwrap()
    }

    fn manager() -> ConnectionManager {
        manager_with(ManagerParams::default(), store())
    }

    fn weight_of(sut: &ConnectionManager, pre_nid: usize, post_nid: usize) -> f64 {
        sut.registry().get(pre_nid, post_nid).unwrap().weight_factor()
    }

    #[test]
    fn connect_all_groups_contiguous_sources() {
        let mut sut = manager();
        let created = sut.connect_all(&DirectLocator::new(), &[10, 11], 1.0).unwrap();

        assert_eq!(created, 2);
        assert_eq!(sut.registry().get(5, 10).unwrap().synapse_count(), 2);
        assert_eq!(sut.registry().get(7, 10).unwrap().synapse_count(), 1);
        assert!(sut.registry().target_connections(11).is_empty());
        assert_eq!(sut.registry().len(), 2);
    }

    #[test]
    fn connect_all_merges_repeated_sources() {
        let store = MemoryStore::new("unsorted").with_target(
            10,
            vec![
                SynapseRecord::new(5, 1.0, 0.5, 113),
                SynapseRecord::new(7, 1.0, 0.5, 113),
                SynapseRecord::new(5, 1.0, 0.5, 113),
            ],
        );
        let mut sut = manager_with(ManagerParams::default(), store);

        assert_eq!(sut.connect_all(&DirectLocator::new(), &[10], 1.0).unwrap(), 2);
        let merged = sut.registry().get(5, 10).unwrap();
        assert_equal(merged.synapses().iter().map(|syn| syn.syn_id), [0, 2]);
    }

    #[test]
    fn connect_all_twice_keeps_placements() {
        let store = MemoryStore::new("unsorted").with_target(
            10,
            vec![
                SynapseRecord::new(5, 1.0, 0.5, 113),
                SynapseRecord::new(7, 1.0, 0.5, 113),
                SynapseRecord::new(5, 1.0, 0.5, 113),
            ],
        );
        let mut sut = manager_with(ManagerParams::default(), store);
        let locator = DirectLocator::new();

        assert_eq!(sut.connect_all(&locator, &[10], 1.0).unwrap(), 2);
        assert_eq!(sut.connect_all(&locator, &[10], 1.0).unwrap(), 0);

        assert_eq!(sut.registry().len(), 2);
        assert_eq!(sut.registry().get(5, 10).unwrap().synapse_count(), 2);
        assert_eq!(sut.registry().get(7, 10).unwrap().synapse_count(), 1);
    }

    #[test]
    fn group_connect_merges_repeated_sources() {
        let store = MemoryStore::new("unsorted").with_target(
            10,
            vec![
                SynapseRecord::new(5, 1.0, 0.5, 113),
                SynapseRecord::new(7, 1.0, 0.5, 113),
                SynapseRecord::new(5, 1.0, 0.5, 113),
            ],
        );
        let mut sut = manager_with(ManagerParams::default(), store);
        let create = GroupConnect {
            creation_mode: true,
            ..GroupConnect::default()
        };

        let stats = sut
            .group_connect(
                &DirectLocator::new(),
                &GidSet::new("pre", [5, 7]),
                &GidSet::new("post", [10]),
                &[10],
                &create,
            )
            .unwrap();

        assert_eq!(stats, GroupConnectStats { created: 2, updated: 0 });
        assert_equal(
            sut.registry().get(5, 10).unwrap().synapses().iter().map(|syn| syn.syn_id),
            [0, 2],
        );
    }

    #[test]
    fn group_connect_creates_then_updates() {
        let mut sut = manager();
        let source = GidSet::new("pre", [5, 7]);
        let dest = GidSet::new("post", [10]);
        let locator = DirectLocator::new();

        let create = GroupConnect {
            weight: Some(4.0),
            creation_mode: true,
            ..GroupConnect::default()
        };
        let stats = sut
            .group_connect(&locator, &source, &dest, &[10, 12], &create)
            .unwrap();
        assert_eq!(stats, GroupConnectStats { created: 2, updated: 0 });
        assert_approx_eq!(f64, weight_of(&sut, 5, 10), 4.0);
        assert_approx_eq!(f64, weight_of(&sut, 7, 10), 4.0);

        let update = GroupConnect {
            weight: Some(9.0),
            creation_mode: false,
            ..GroupConnect::default()
        };
        let stats = sut
            .group_connect(&locator, &source, &dest, &[10, 12], &update)
            .unwrap();
        assert_eq!(stats, GroupConnectStats { created: 0, updated: 2 });
        assert_approx_eq!(f64, weight_of(&sut, 5, 10), 9.0);
        assert_approx_eq!(f64, weight_of(&sut, 7, 10), 9.0);
        assert_eq!(sut.registry().len(), 2);
    }

    #[test]
    fn group_connect_without_creation_mode_skips_missing() {
        let mut sut = manager();
        let group = GroupConnect {
            weight: Some(2.0),
            ..GroupConnect::default()
        };
        let stats = sut
            .group_connect(
                &DirectLocator::new(),
                &GidSet::new("pre", [5]),
                &GidSet::new("post", [10]),
                &[10],
                &group,
            )
            .unwrap();
        assert_eq!(stats, GroupConnectStats::default());
        assert!(sut.registry().is_empty());
    }

    #[test]
    fn group_connect_kind_restriction_and_invalid_weight() {
        let mut sut = manager();
        let group = GroupConnect {
            weight: Some(f64::NAN),
            kind_restrict: Some(SynapseClass::Inhibitory),
            creation_mode: true,
            ..GroupConnect::default()
        };
        let stats = sut
            .group_connect(
                &DirectLocator::new(),
                &GidSet::new("pre", [5, 7]),
                &GidSet::new("post", [10]),
                &[10],
                &group,
            )
            .unwrap();

        assert_eq!(stats.created, 1);
        assert!(sut.registry().get(5, 10).is_none());
        assert_approx_eq!(f64, weight_of(&sut, 7, 10), 1.0);
    }

    #[test]
    fn group_connect_updates_carry_options() {
        let mut sut = manager();
        let locator = DirectLocator::new();
        sut.connect_all(&locator, &[10], 1.0).unwrap();

        let group = GroupConnect {
            configuration: Some("%s.Use *= 0.5".to_string()),
            plasticity_mode: Some("StdpWeightAdjuster".to_string()),
            minis_rate: Some(0.01),
            synapse_override: Some("GluSynapse".to_string()),
            ..GroupConnect::default()
        };
        sut.group_connect(
            &locator,
            &GidSet::new("pre", [5]),
            &GidSet::new("post", [10]),
            &[10],
            &group,
        )
        .unwrap();

        let conn = sut.registry().get(5, 10).unwrap();
        assert_eq!(conn.configurations(), ["%s.Use *= 0.5"]);
        assert_eq!(conn.plasticity_mode(), Some("StdpWeightAdjuster"));
        assert_eq!(conn.minis_rate(), Some(0.01));
        assert_eq!(conn.synapse_override(), Some("GluSynapse"));
        assert_eq!(sut.registry().get(7, 10).unwrap().plasticity_mode(), None);
    }

    #[test]
    fn finalize_materializes_in_policy_order() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        sut.connect_all(&DirectLocator::new(), &[10, 12], 1.0).unwrap();

        let summary = sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();
        assert_eq!(
            summary,
            FinalizeSummary {
                local_connections: 4,
                local_synapses: 5,
                total_connections: 4,
            }
        );

        // reverse within each bucket, buckets in insertion order
        assert_equal(
            engine.wires.iter().map(|wire| wire.source),
            [7, 5, 5, 5, 3].map(crate::engine::EventSource::Cell),
        );
        assert!(matches!(
            sut.finalize(&mut engine, &mut SingleProcess, 1),
            Err(Error::InvalidState(_))
        ));
        assert!(sut.connect_all(&DirectLocator::new(), &[10], 1.0).is_err());
    }

    #[test]
    fn finalize_in_insertion_order() {
        let mut engine = RecordingEngine::new();
        let params = ManagerParams {
            finalize_order: FinalizeOrder::Insertion,
            ..ManagerParams::default()
        };
        let mut sut = manager_with(params, store());
        sut.connect_all(&DirectLocator::new(), &[10], 1.0).unwrap();
        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();

        assert_equal(
            engine.wires.iter().map(|wire| wire.source),
            [5, 5, 7].map(crate::engine::EventSource::Cell),
        );
    }

    #[test]
    fn disable_enable_round_trip() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        sut.connect_all(&DirectLocator::new(), &[10], 1.0).unwrap();
        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();

        let before = sut.registry().get(5, 10).unwrap().synapses().to_vec();
        let handles = sut.registry().get(5, 10).unwrap().synapse_handles();
        engine.set_synapse_param(handles[0], CONDUCTANCE, 0.42).unwrap();

        assert!(sut.disable(&mut engine, 5, 10, true).unwrap());
        assert!(sut.registry().get(5, 10).is_none());
        assert!(sut.registry().get_disabled(5, 10).is_some());
        assert_eq!(engine.synapse_param(handles[0], CONDUCTANCE), Some(0.0));

        assert!(sut.enable(&mut engine, 5, 10).unwrap());
        let conn = sut.registry().get(5, 10).unwrap();
        assert_eq!(conn.synapses(), before.as_slice());
        assert!(conn.is_enabled());
        assert_eq!(engine.synapse_param(handles[0], CONDUCTANCE), Some(0.42));
        assert_eq!(engine.active_wire_count(), 3);
    }

    #[test]
    fn missing_connection_is_a_no_op() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        assert!(!sut.disable(&mut engine, 1, 2, false).unwrap());
        assert!(!sut.enable(&mut engine, 1, 2).unwrap());
        assert!(!sut.delete(&mut engine, 1, 2).unwrap());
    }

    #[test]
    fn delete_silences_materialized_connection() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        sut.connect_all(&DirectLocator::new(), &[10], 1.0).unwrap();
        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();

        assert!(sut.delete(&mut engine, 7, 10).unwrap());
        assert_eq!(sut.registry().find(7, 10, true), None);
        assert_eq!(sut.registry().find(7, 10, false), Some(1));
        assert_eq!(engine.active_wire_count(), 2);
    }

    #[test]
    fn group_filters() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        sut.connect_all(&DirectLocator::new(), &[10, 12], 1.0).unwrap();
        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();

        let by_source = ConnectionFilter::all().with_pre_ids([5]);
        assert_eq!(sut.disable_group(&mut engine, &by_source, false).unwrap(), 2);
        assert_eq!(sut.registry().len(), 2);

        let by_target = ConnectionFilter::all().with_post_ids([12]);
        assert_eq!(sut.enable_group(&mut engine, &by_target).unwrap(), 1);
        assert_eq!(sut.registry().len(), 3);

        assert_eq!(sut.delete_group(&mut engine, &by_target).unwrap(), 2);
        assert_eq!(sut.registry().len(), 1);
        assert_eq!(sut.registry().all_disabled().count(), 1);
    }

    #[test]
    fn configure_building_and_finalized() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        let locator = DirectLocator::new();
        sut.connect_all(&locator, &[10], 1.0).unwrap();

        let source = GidSet::new("pre", [5]);
        let dest = GidSet::new("post", [10]);
        let update = ConnectionUpdate {
            weight: Some(2.0),
            configuration: None,
            params: vec![("tau_d".to_string(), 4.0)],
        };
        assert_eq!(
            sut.configure(&mut engine, &source, &dest, &[10], &update).unwrap(),
            1
        );
        let conn = sut.registry().get(5, 10).unwrap();
        assert_approx_eq!(f64, conn.weight_factor(), 2.0);
        assert_eq!(conn.configurations(), ["%s.tau_d = 4"]);

        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();
        let update = ConnectionUpdate {
            weight: Some(3.0),
            ..ConnectionUpdate::default()
        };
        sut.configure(&mut engine, &source, &dest, &[10], &update)
            .unwrap();
        for wire in sut.registry().get(5, 10).unwrap().primary_wires() {
            assert!(engine.wire(wire).weight > 1.4);
        }

        assert_eq!(
            sut.configure(&mut engine, &source, &dest, &[10], &ConnectionUpdate::default())
                .unwrap(),
            0
        );
    }

    #[test]
    fn configure_ignores_invalid_weight() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        let source = GidSet::new("pre", [5, 7]);
        let dest = GidSet::new("post", [10]);
        sut.connect_all(&DirectLocator::new(), &[10], 1.5).unwrap();

        let update = ConnectionUpdate {
            weight: Some(-1.0),
            ..ConnectionUpdate::default()
        };
        sut.configure(&mut engine, &source, &dest, &[10], &update)
            .unwrap();
        assert_approx_eq!(f64, weight_of(&sut, 5, 10), 1.5);

        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();
        let update = ConnectionUpdate {
            weight: Some(f64::NAN),
            ..ConnectionUpdate::default()
        };
        assert_eq!(
            sut.configure(&mut engine, &source, &dest, &[10], &update)
                .unwrap(),
            2
        );

        assert_approx_eq!(f64, weight_of(&sut, 7, 10), 1.5);
        assert!(engine.wires.iter().all(|wire| wire.weight.is_finite()));
    }

    #[test]
    fn replay_by_source() {
        let mut engine = RecordingEngine::new();
        let mut sut = manager();
        sut.connect_all(&DirectLocator::new(), &[10, 12], 1.0).unwrap();
        sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();

        let mut spike_map = HashMap::default();
        spike_map.insert(5, vec![1.0, 3.0]);
        let replayed = sut
            .replay(
                &mut engine,
                &GidSet::new("post", [10]),
                &spike_map,
                ReplayMode::Additional,
            )
            .unwrap();

        assert_eq!(replayed, 1);
        assert_eq!(engine.sources.len(), 1);
        assert_eq!(engine.wires.len(), 5 + 2);
    }

    #[test]
    fn replay_is_refused_on_gap_junction_manager() {
        let mut engine = RecordingEngine::new();
        let params = ManagerParams {
            kind: ConnectionKind::GapJunction,
            ..ManagerParams::default()
        };
        let mut sut = manager_with(params, store());
        sut.connect_all(&DirectLocator::new(), &[10], 1.0).unwrap();

        let mut spike_map = HashMap::default();
        spike_map.insert(5, vec![1.0, 3.0]);
        assert!(matches!(
            sut.replay(
                &mut engine,
                &GidSet::new("post", [10]),
                &spike_map,
                ReplayMode::Additional,
            ),
            Err(Error::InvalidState(_))
        ));
        assert!(engine.sources.is_empty());
    }

    #[test]
    fn gap_junction_manager_needs_offsets() {
        let mut engine = RecordingEngine::new();
        let params = ManagerParams {
            kind: ConnectionKind::GapJunction,
            ..ManagerParams::default()
        };
        let mut sut = manager_with(params, store());
        sut.connect_all(&DirectLocator::new(), &[10], 1.0).unwrap();

        assert!(matches!(
            sut.finalize(&mut engine, &mut SingleProcess, 1),
            Err(Error::Configuration(_))
        ));
        assert!(!sut.is_finalized());

        let offsets = GapJunctionOffsets::from_counts([(5, 4), (7, 2), (10, 3)]).unwrap();
        sut.set_gap_junction_offsets(offsets);
        let summary = sut.finalize(&mut engine, &mut SingleProcess, 1).unwrap();
        assert_eq!(summary.local_synapses, 3);
        assert!(engine.wires.is_empty());
        assert_eq!(engine.target_vars.len(), 3);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = ManagerParams {
            dt: 0.0,
            ..ManagerParams::default()
        };
        let reader = SynapseParameterReader::new(Box::new(store()), READER_PARAMS);
        assert!(matches!(
            ConnectionManager::new(params, reader),
            Err(Error::Params(_))
        ));
    }
}
