use crate::engine::{
    AdjusterHandle, EventSource, Placement, SimulationEngine, SourceHandle, SynapseHandle,
    SynapseKind, WireHandle, WireTarget, CONDUCTANCE, GAP_WEIGHT,
};
use crate::error::{Error, Result};
use crate::gap_junction::GapJunctionOffsets;
use crate::minis::{MinisGenerator, MinisKey};
use crate::synapse::SynapseRecord;
use crate::util;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub weight_factor: f64,
    pub configurations: Vec<String>,
    pub plasticity_mode: Option<String>,
    pub minis_rate: Option<f64>,
    pub synapse_override: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            weight_factor: 1.0,
            configurations: Vec::new(),
            plasticity_mode: None,
            minis_rate: None,
            synapse_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalizeContext {
    pub base_seed: u64,
    pub minis_seed: u64,
    pub dt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Additional,
    InsteadOfSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSynapse {
    pub syn_id: usize,
    pub placement: Option<Placement>,
    pub record: SynapseRecord,
}

#[derive(Debug)]
struct MaterializedSynapse {
    placed_idx: usize,
    synapse: SynapseHandle,
    primary: Option<WireHandle>,
    primary_replaced: bool,
    adjuster: Option<AdjusterHandle>,
    monitors: Vec<WireHandle>,
    minis: Option<WireHandle>,
    replay: Vec<WireHandle>,
    saved_conductance: Option<f64>,
}

impl MaterializedSynapse {
    fn new(placed_idx: usize, synapse: SynapseHandle, primary: Option<WireHandle>) -> Self {
        Self {
            placed_idx,
            synapse,
            primary,
            primary_replaced: false,
            adjuster: None,
            monitors: Vec::new(),
            minis: None,
            replay: Vec::new(),
            saved_conductance: None,
        }
    }

    fn secondary_wires(&self) -> impl Iterator<Item = WireHandle> + '_ {
        self.monitors
            .iter()
            .copied()
            .chain(self.minis)
            .chain(self.replay.iter().copied())
    }
}

#[derive(Debug)]
struct Materialized {
    synapses: Vec<MaterializedSynapse>,
    gap_junction: bool,
    enabled: bool,
}

#[derive(Debug)]
enum ConnectionState {
    Building,
    Finalized(Materialized),
}

#[derive(Debug)]
pub struct Connection {
    pre_nid: usize,
    post_nid: usize,
    weight_factor: f64,
    configurations: Vec<String>,
    plasticity_mode: Option<String>,
    minis_rate: Option<f64>,
    synapse_override: Option<String>,
    synapses: Vec<PlacedSynapse>,
    pending_replay: Option<(Vec<f64>, ReplayMode)>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(pre_nid: usize, post_nid: usize, options: ConnectionOptions) -> Self {
        Self {
            pre_nid,
            post_nid,
            weight_factor: options.weight_factor,
            configurations: options.configurations,
            plasticity_mode: options.plasticity_mode,
            minis_rate: options.minis_rate,
            synapse_override: options.synapse_override,
            synapses: Vec::new(),
            pending_replay: None,
            state: ConnectionState::Building,
        }
    }

    pub fn pre_nid(&self) -> usize {
        self.pre_nid
    }

    pub fn post_nid(&self) -> usize {
        self.post_nid
    }

    pub fn key(&self) -> (usize, usize) {
        (self.pre_nid, self.post_nid)
    }

    pub fn weight_factor(&self) -> f64 {
        self.weight_factor
    }

    pub fn configurations(&self) -> &[String] {
        &self.configurations
    }

    pub fn plasticity_mode(&self) -> Option<&str> {
        self.plasticity_mode.as_deref()
    }

    pub fn minis_rate(&self) -> Option<f64> {
        self.minis_rate
    }

    pub fn synapse_override(&self) -> Option<&str> {
        self.synapse_override.as_deref()
    }

    pub fn synapses(&self) -> &[PlacedSynapse] {
        &self.synapses
    }

    pub fn synapse_count(&self) -> usize {
        self.synapses.len()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, ConnectionState::Finalized(_))
    }

    pub fn is_enabled(&self) -> bool {
        match &self.state {
            ConnectionState::Building => true,
            ConnectionState::Finalized(materialized) => materialized.enabled,
        }
    }

    pub fn materialized_count(&self) -> usize {
        match &self.state {
            ConnectionState::Building => 0,
            ConnectionState::Finalized(materialized) => materialized.synapses.len(),
        }
    }

    pub fn synapse_handles(&self) -> Vec<SynapseHandle> {
        self.materialized()
            .map(|materialized| materialized.synapses.iter().map(|syn| syn.synapse).collect())
            .unwrap_or_default()
    }

    pub fn primary_wires(&self) -> Vec<WireHandle> {
        self.materialized()
            .map(|materialized| {
                materialized
                    .synapses
                    .iter()
                    .filter_map(|syn| syn.primary)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn materialized(&self) -> Option<&Materialized> {
        match &self.state {
            ConnectionState::Building => None,
            ConnectionState::Finalized(materialized) => Some(materialized),
        }
    }

    fn ensure_building(&self, operation: &str) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::InvalidState(format!(
                "{} on finalized connection {} -> {}",
                operation, self.pre_nid, self.post_nid
            )));
        }
        Ok(())
    }

    pub fn add_synapse(
        &mut self,
        placement: Option<Placement>,
        mut record: SynapseRecord,
        syn_id: Option<usize>,
    ) -> Result<()> {
        self.ensure_building("add_synapse")?;

        if let Some(placement) = placement {
            record.location = placement.position;
        }

        let syn_id = syn_id.unwrap_or(self.synapses.len());
        self.synapses.push(PlacedSynapse {
            syn_id,
            placement,
            record,
        });

        Ok(())
    }

    pub fn add_configuration(&mut self, directive: &str) -> Result<()> {
        self.ensure_building("add_configuration")?;
        self.configurations.push(directive.to_string());
        Ok(())
    }

    pub fn set_weight_factor(&mut self, weight_factor: f64) -> Result<()> {
        self.ensure_building("set_weight_factor")?;
        self.weight_factor = weight_factor;
        Ok(())
    }

    pub fn set_plasticity_mode(&mut self, mode: Option<String>) -> Result<()> {
        self.ensure_building("set_plasticity_mode")?;
        self.plasticity_mode = mode;
        Ok(())
    }

    pub fn set_minis_rate(&mut self, rate: Option<f64>) -> Result<()> {
        self.ensure_building("set_minis_rate")?;
        self.minis_rate = rate;
        Ok(())
    }

    pub fn set_synapse_override(&mut self, helper: Option<String>) -> Result<()> {
        self.ensure_building("set_synapse_override")?;
        self.synapse_override = helper;
        Ok(())
    }

    // merges placements of a second record run for the same key
    pub(crate) fn absorb(&mut self, other: Connection) -> Result<()> {
        self.ensure_building("absorb")?;
        self.synapses.extend(other.synapses);
        Ok(())
    }

    fn synapse_kind(&self, record: &SynapseRecord) -> SynapseKind {
        match &self.synapse_override {
            Some(helper) => SynapseKind::Override(helper.clone()),
            None if record.is_excitatory() => SynapseKind::Excitatory,
            None => SynapseKind::Inhibitory,
        }
    }

    pub fn finalize(
        &mut self,
        engine: &mut dyn SimulationEngine,
        ctx: &FinalizeContext,
    ) -> Result<usize> {
        self.ensure_building("finalize")?;

        let mut materialized = Vec::new();
        let result = self.materialize_chemical(engine, ctx, &mut materialized);

        // keep whatever was created reachable for disable/enable, even on failure
        let count = materialized.len();
        self.state = ConnectionState::Finalized(Materialized {
            synapses: materialized,
            gap_junction: false,
            enabled: true,
        });
        self.pending_replay = None;

        result.map(|_| count)
    }

    fn materialize_chemical(
        &self,
        engine: &mut dyn SimulationEngine,
        ctx: &FinalizeContext,
        materialized: &mut Vec<MaterializedSynapse>,
    ) -> Result<()> {
        let replay = match &self.pending_replay {
            Some((event_times, mode)) => Some((engine.create_virtual_source(event_times)?, *mode)),
            None => None,
        };

        for (placed_idx, placed) in self.synapses.iter().enumerate() {
            let placement = match placed.placement {
                Some(placement) => placement,
                None => continue,
            };
            let record = &placed.record;

            let synapse = engine.create_synapse(
                &self.synapse_kind(record),
                self.post_nid,
                placement.section,
                placement.position,
            )?;

            push_record_params(engine, synapse, record)?;

            for directive in &self.configurations {
                engine.configure_synapse(synapse, directive)?;
            }

            let weight = record.weight * self.weight_factor;
            let primary = engine.connect(
                EventSource::Cell(self.pre_nid),
                self.post_nid,
                WireTarget::Synapse(synapse),
                weight,
                record.delay,
            )?;

            let mut current = MaterializedSynapse::new(placed_idx, synapse, Some(primary));
            let wired =
                self.wire_extras(engine, ctx, placed, placement, weight, replay, &mut current);
            materialized.push(current);
            wired?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn wire_extras(
        &self,
        engine: &mut dyn SimulationEngine,
        ctx: &FinalizeContext,
        placed: &PlacedSynapse,
        placement: Placement,
        weight: f64,
        replay: Option<(SourceHandle, ReplayMode)>,
        current: &mut MaterializedSynapse,
    ) -> Result<()> {
        let record = &placed.record;
        let synapse = current.synapse;

        if let Some(mode) = &self.plasticity_mode {
            let adjuster = engine.create_weight_adjuster(
                mode,
                self.post_nid,
                placement.section,
                placement.position,
            )?;
            current.adjuster = Some(adjuster);

            current.monitors.push(engine.connect(
                EventSource::Cell(self.pre_nid),
                self.post_nid,
                WireTarget::Adjuster(adjuster),
                1.0,
                record.delay,
            )?);
            current.monitors.push(engine.connect(
                EventSource::Cell(self.post_nid),
                self.post_nid,
                WireTarget::Adjuster(adjuster),
                -1.0,
                0.0,
            )?);

            if let Some(primary) = current.primary {
                engine.link_weight(primary, adjuster)?;
            }
        }

        if let Some(rate) = self.minis_rate.filter(|rate| *rate > 0.0) {
            let key = MinisKey {
                syn_id: placed.syn_id,
                post_nid: self.post_nid,
                minis_seed: ctx.minis_seed,
                base_seed: ctx.base_seed,
            };
            let source = engine.create_spont_source(MinisGenerator::new(key, rate)?)?;
            current.minis = Some(engine.connect(
                EventSource::Virtual(source),
                self.post_nid,
                WireTarget::Synapse(synapse),
                weight,
                ctx.dt,
            )?);
        }

        if let Some((source, mode)) = replay {
            current.replay.push(engine.connect(
                EventSource::Virtual(source),
                self.post_nid,
                WireTarget::Synapse(synapse),
                weight,
                record.delay,
            )?);

            if mode == ReplayMode::InsteadOfSource {
                if let Some(primary) = current.primary {
                    engine.set_wire_active(primary, false);
                    current.primary_replaced = true;
                }
            }
        }

        Ok(())
    }

    pub fn finalize_gap_junctions(
        &mut self,
        engine: &mut dyn SimulationEngine,
        offsets: &GapJunctionOffsets,
    ) -> Result<usize> {
        self.ensure_building("finalize_gap_junctions")?;

        if self.pending_replay.is_some() {
            return Err(Error::InvalidState(format!(
                "replay on gap junction {} -> {}",
                self.pre_nid, self.post_nid
            )));
        }

        let pre_offset = offsets.get(self.pre_nid).ok_or_else(|| {
            Error::Configuration(format!("no gap junction offset for gid {}", self.pre_nid))
        })?;
        let post_offset = offsets.get(self.post_nid).ok_or_else(|| {
            Error::Configuration(format!("no gap junction offset for gid {}", self.post_nid))
        })?;

        let mut materialized = Vec::new();
        let result =
            self.materialize_gap_junctions(engine, pre_offset, post_offset, &mut materialized);

        let count = materialized.len();
        self.state = ConnectionState::Finalized(Materialized {
            synapses: materialized,
            gap_junction: true,
            enabled: true,
        });

        result.map(|_| count)
    }

    fn materialize_gap_junctions(
        &self,
        engine: &mut dyn SimulationEngine,
        pre_offset: usize,
        post_offset: usize,
        materialized: &mut Vec<MaterializedSynapse>,
    ) -> Result<()> {
        for (placed_idx, placed) in self.synapses.iter().enumerate() {
            let placement = match placed.placement {
                Some(placement) => placement,
                None => continue,
            };
            let record = &placed.record;

            let gap_junction = engine.create_synapse(
                &SynapseKind::GapJunction,
                self.post_nid,
                placement.section,
                placement.position,
            )?;
            materialized.push(MaterializedSynapse::new(placed_idx, gap_junction, None));

            engine.set_synapse_param(
                gap_junction,
                GAP_WEIGHT,
                record.weight * self.weight_factor,
            )?;
            engine.target_var(gap_junction, pre_offset + record.efferent_junction_id())?;
            engine.source_var(
                self.post_nid,
                placement.section,
                placement.position,
                post_offset + record.afferent_junction_id(),
            )?;
        }

        Ok(())
    }

    pub fn disable(
        &mut self,
        engine: &mut dyn SimulationEngine,
        zero_conductance: bool,
    ) -> Result<()> {
        let (pre_nid, post_nid) = self.key();
        let materialized = self.materialized_mut("disable")?;
        let conductance_param = conductance_param(materialized.gap_junction);
        let zero_conductance = zero_conductance || materialized.gap_junction;

        for syn in materialized.synapses.iter_mut() {
            if let Some(primary) = syn.primary {
                engine.set_wire_active(primary, false);
            }
            for wire in syn.secondary_wires() {
                engine.set_wire_active(wire, false);
            }

            if zero_conductance && syn.saved_conductance.is_none() {
                match engine.synapse_param(syn.synapse, conductance_param) {
                    Some(value) => {
                        engine.set_synapse_param(syn.synapse, conductance_param, 0.0)?;
                        syn.saved_conductance = Some(value);
                    }
                    None => log::warn!(
                        "connection {} -> {}: synapse exposes no {}, not zeroed",
                        pre_nid,
                        post_nid,
                        conductance_param
                    ),
                }
            }
        }

        materialized.enabled = false;
        Ok(())
    }

    pub fn enable(&mut self, engine: &mut dyn SimulationEngine) -> Result<()> {
        let materialized = self.materialized_mut("enable")?;
        let conductance_param = conductance_param(materialized.gap_junction);

        for syn in materialized.synapses.iter_mut() {
            if let Some(primary) = syn.primary {
                engine.set_wire_active(primary, !syn.primary_replaced);
            }
            for wire in syn.secondary_wires() {
                engine.set_wire_active(wire, true);
            }

            if let Some(value) = syn.saved_conductance.take() {
                engine.set_synapse_param(syn.synapse, conductance_param, value)?;
            }
        }

        materialized.enabled = true;
        Ok(())
    }

    fn materialized_mut(&mut self, operation: &str) -> Result<&mut Materialized> {
        match &mut self.state {
            ConnectionState::Finalized(materialized) => Ok(materialized),
            ConnectionState::Building => Err(Error::InvalidState(format!(
                "{} on connection {} -> {} before finalize",
                operation, self.pre_nid, self.post_nid
            ))),
        }
    }

    pub fn replay(
        &mut self,
        engine: &mut dyn SimulationEngine,
        event_times: &[f64],
        mode: ReplayMode,
    ) -> Result<usize> {
        if event_times.iter().any(|t| !t.is_finite()) || !util::is_sorted_ascending(event_times)
        {
            return Err(Error::InvalidInput(format!(
                "replay times for {} -> {} must be finite and sorted",
                self.pre_nid, self.post_nid
            )));
        }

        let materialized = match &mut self.state {
            ConnectionState::Building => {
                self.pending_replay = Some((event_times.to_vec(), mode));
                return Ok(0);
            }
            ConnectionState::Finalized(materialized) => materialized,
        };

        if materialized.gap_junction {
            return Err(Error::InvalidState(format!(
                "replay on gap junction {} -> {}",
                self.pre_nid, self.post_nid
            )));
        }

        let source = engine.create_virtual_source(event_times)?;

        for syn in materialized.synapses.iter_mut() {
            let record = &self.synapses[syn.placed_idx].record;
            let wire = engine.connect(
                EventSource::Virtual(source),
                self.post_nid,
                WireTarget::Synapse(syn.synapse),
                record.weight * self.weight_factor,
                record.delay,
            )?;
            if !materialized.enabled {
                engine.set_wire_active(wire, false);
            }
            syn.replay.push(wire);

            if mode == ReplayMode::InsteadOfSource {
                if let Some(primary) = syn.primary {
                    engine.set_wire_active(primary, false);
                    syn.primary_replaced = true;
                }
            }
        }

        Ok(materialized.synapses.len())
    }

    pub fn update_weight(&mut self, engine: &mut dyn SimulationEngine, value: f64) -> Result<()> {
        self.weight_factor = value;

        let materialized = match &mut self.state {
            ConnectionState::Building => return Ok(()),
            ConnectionState::Finalized(materialized) => materialized,
        };

        for syn in materialized.synapses.iter_mut() {
            let weight = self.synapses[syn.placed_idx].record.weight * value;

            if materialized.gap_junction {
                match syn.saved_conductance.as_mut() {
                    Some(saved) => *saved = weight,
                    None => engine.set_synapse_param(syn.synapse, GAP_WEIGHT, weight)?,
                }
                continue;
            }

            for wire in syn
                .primary
                .into_iter()
                .chain(syn.minis)
                .chain(syn.replay.iter().copied())
            {
                engine.set_wire_weight(wire, weight);
            }
        }

        Ok(())
    }

    pub fn update_params(
        &mut self,
        engine: &mut dyn SimulationEngine,
        params: &[(String, f64)],
    ) -> Result<()> {
        let materialized = self.materialized_mut("update_params")?;

        for syn in materialized.synapses.iter() {
            for (name, value) in params {
                engine.set_synapse_param(syn.synapse, name, *value)?;
            }
        }

        Ok(())
    }

    pub fn apply_configuration(
        &mut self,
        engine: &mut dyn SimulationEngine,
        directive: &str,
    ) -> Result<()> {
        if let ConnectionState::Finalized(materialized) = &self.state {
            for syn in materialized.synapses.iter() {
                engine.configure_synapse(syn.synapse, directive)?;
            }
        }

        self.configurations.push(directive.to_string());
        Ok(())
    }
}

fn conductance_param(gap_junction: bool) -> &'static str {
    if gap_junction {
        GAP_WEIGHT
    } else {
        CONDUCTANCE
    }
}

fn push_record_params(
    engine: &mut dyn SimulationEngine,
    synapse: SynapseHandle,
    record: &SynapseRecord,
) -> Result<()> {
    engine.set_synapse_param(synapse, "u", record.u)?;
    engine.set_synapse_param(synapse, "d", record.d)?;
    engine.set_synapse_param(synapse, "f", record.f)?;
    engine.set_synapse_param(synapse, "dtc", record.dtc)?;

    if let Some(release_sites) = record.release_sites {
        engine.set_synapse_param(synapse, "release_sites", release_sites as f64)?;
    }
    if let Some(conductance_ratio) = record.conductance_ratio {
        engine.set_synapse_param(synapse, "conductance_ratio", conductance_ratio)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RecordedSource, RecordingEngine, SectionRef};
    use float_cmp::assert_approx_eq;
    use itertools::assert_equal;

    const CTX: FinalizeContext = FinalizeContext {
        base_seed: 11,
        minis_seed: 5,
        dt: 0.025,
    };

    fn placement(post_nid: usize, position: f64) -> Option<Placement> {
        Some(Placement {
            section: SectionRef {
                post_nid,
                section_id: 2,
            },
            position,
        })
    }

    fn two_synapse_connection(options: ConnectionOptions) -> Connection {
        let mut sut = Connection::new(5, 10, options);
        sut.add_synapse(placement(10, 0.25), SynapseRecord::new(5, 1.5, 0.8, 113), None)
            .unwrap();
        sut.add_synapse(placement(10, 0.75), SynapseRecord::new(5, 2.0, 0.4, 6), None)
            .unwrap();
        sut
    }

    #[test]
    fn add_synapse_records_location_and_ids() {
        let sut = two_synapse_connection(ConnectionOptions::default());
        assert_equal(sut.synapses().iter().map(|syn| syn.syn_id), [0, 1]);
        assert_approx_eq!(f64, sut.synapses()[0].record.location, 0.25);
        assert_approx_eq!(f64, sut.synapses()[1].record.location, 0.75);
    }

    #[test]
    fn finalize_wires_every_placement() {
        let mut engine = RecordingEngine::new();
        let mut options = ConnectionOptions::default();
        options.weight_factor = 2.0;
        options.configurations.push("%s.Use *= 0.5".to_string());
        let mut sut = two_synapse_connection(options);
        sut.add_synapse(None, SynapseRecord::new(5, 1.0, 1.0, 113), Some(7))
            .unwrap();

        assert_eq!(sut.finalize(&mut engine, &CTX).unwrap(), 2);
        assert!(sut.is_finalized());
        assert_eq!(sut.materialized_count(), 2);

        assert_eq!(engine.synapses[0].kind, SynapseKind::Excitatory);
        assert_eq!(engine.synapses[1].kind, SynapseKind::Inhibitory);
        assert_eq!(engine.synapses[0].directives, ["%s.Use *= 0.5"]);
        assert_eq!(engine.synapses[0].params["u"], 0.5);

        assert_eq!(engine.wires.len(), 2);
        assert_eq!(engine.wires[0].source, EventSource::Cell(5));
        assert_approx_eq!(f64, engine.wires[0].weight, 1.6);
        assert_approx_eq!(f64, engine.wires[0].delay, 1.5);
        assert_approx_eq!(f64, engine.wires[1].weight, 0.8);
    }

    #[test]
    fn finalize_is_irreversible() {
        let mut engine = RecordingEngine::new();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        sut.finalize(&mut engine, &CTX).unwrap();

        assert!(matches!(
            sut.finalize(&mut engine, &CTX),
            Err(Error::InvalidState(_))
        ));
        assert!(sut
            .add_synapse(placement(10, 0.5), SynapseRecord::new(5, 1.0, 1.0, 113), None)
            .is_err());
        assert!(sut.add_configuration("%s.Dep = 1").is_err());
    }

    #[test]
    fn override_helper_selects_synapse_kind() {
        let mut engine = RecordingEngine::new();
        let mut options = ConnectionOptions::default();
        options.synapse_override = Some("GluSynapse".to_string());
        let mut sut = two_synapse_connection(options);
        sut.finalize(&mut engine, &CTX).unwrap();

        assert!(engine
            .synapses
            .iter()
            .all(|syn| syn.kind == SynapseKind::Override("GluSynapse".to_string())));
    }

    #[test]
    fn plasticity_wires_three_points() {
        let mut engine = RecordingEngine::new();
        let mut options = ConnectionOptions::default();
        options.plasticity_mode = Some("StdpWeightAdjuster".to_string());
        let mut sut = two_synapse_connection(options);
        sut.finalize(&mut engine, &CTX).unwrap();

        assert_eq!(engine.adjusters.len(), 2);
        // primary, pre monitor, post monitor per synapse
        assert_eq!(engine.wires.len(), 6);

        let primary = &engine.wires[0];
        assert_eq!(primary.weight_link, Some(AdjusterHandle(0)));

        let pre_monitor = &engine.wires[1];
        assert_eq!(pre_monitor.source, EventSource::Cell(5));
        assert_eq!(pre_monitor.target, WireTarget::Adjuster(AdjusterHandle(0)));
        assert_approx_eq!(f64, pre_monitor.weight, 1.0);

        let post_monitor = &engine.wires[2];
        assert_eq!(post_monitor.source, EventSource::Cell(10));
        assert_approx_eq!(f64, post_monitor.weight, -1.0);
    }

    #[test]
    fn minis_are_seeded_per_synapse() {
        let mut options = ConnectionOptions::default();
        options.minis_rate = Some(2.0);

        let mut first_engine = RecordingEngine::new();
        let mut first = two_synapse_connection(options.clone());
        first.finalize(&mut first_engine, &CTX).unwrap();

        let mut second_engine = RecordingEngine::new();
        let mut second = two_synapse_connection(options);
        second.finalize(&mut second_engine, &CTX).unwrap();

        let events = |engine: &RecordingEngine, idx: usize| match &engine.sources[idx] {
            RecordedSource::Spontaneous(generator) => {
                generator.clone().take(10).collect::<Vec<_>>()
            }
            RecordedSource::Replay(_) => panic!("expected spontaneous source"),
        };

        assert_eq!(first_engine.sources.len(), 2);
        assert_eq!(events(&first_engine, 0), events(&second_engine, 0));
        assert_ne!(events(&first_engine, 0), events(&first_engine, 1));

        let minis_wire = &first_engine.wires[1];
        assert_eq!(minis_wire.source, EventSource::Virtual(crate::engine::SourceHandle(0)));
        assert_approx_eq!(f64, minis_wire.delay, CTX.dt);
    }

    #[test]
    fn zero_minis_rate_creates_no_source() {
        let mut engine = RecordingEngine::new();
        let mut options = ConnectionOptions::default();
        options.minis_rate = Some(0.0);
        let mut sut = two_synapse_connection(options);
        sut.finalize(&mut engine, &CTX).unwrap();
        assert!(engine.sources.is_empty());
    }

    #[test]
    fn disable_enable_restores_conductance() {
        let mut engine = RecordingEngine::new();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        sut.finalize(&mut engine, &CTX).unwrap();

        let synapse = sut.synapse_handles()[0];
        engine.set_synapse_param(synapse, CONDUCTANCE, 0.37).unwrap();

        sut.disable(&mut engine, true).unwrap();
        assert!(!sut.is_enabled());
        assert_eq!(engine.active_wire_count(), 0);
        assert_eq!(engine.synapse_param(synapse, CONDUCTANCE), Some(0.0));

        sut.enable(&mut engine).unwrap();
        assert!(sut.is_enabled());
        assert_eq!(engine.active_wire_count(), 2);
        assert_eq!(engine.synapse_param(synapse, CONDUCTANCE), Some(0.37));
    }

    #[test]
    fn disable_before_finalize_is_invalid() {
        let mut engine = RecordingEngine::new();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        assert!(matches!(
            sut.disable(&mut engine, false),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn replay_after_finalize() {
        let mut engine = RecordingEngine::new();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        sut.finalize(&mut engine, &CTX).unwrap();

        assert_eq!(
            sut.replay(&mut engine, &[5.0, 10.0, 12.5], ReplayMode::InsteadOfSource)
                .unwrap(),
            2
        );

        assert!(matches!(
            &engine.sources[0],
            RecordedSource::Replay(times) if times == &[5.0, 10.0, 12.5]
        ));
        assert_eq!(engine.wires.len(), 4);
        assert!(!engine.wires[0].active);
        assert!(engine.wires[2].active);
        assert_eq!(engine.wires[2].source, EventSource::Virtual(crate::engine::SourceHandle(0)));

        // the replaced source stays off after a disable/enable cycle
        sut.disable(&mut engine, false).unwrap();
        sut.enable(&mut engine).unwrap();
        assert!(!engine.wires[0].active);
        assert!(engine.wires[2].active);
    }

    #[test]
    fn replay_before_finalize_is_wired_at_finalize() {
        let mut engine = RecordingEngine::new();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        assert_eq!(
            sut.replay(&mut engine, &[1.0, 2.0], ReplayMode::Additional).unwrap(),
            0
        );
        sut.finalize(&mut engine, &CTX).unwrap();

        assert_eq!(engine.sources.len(), 1);
        assert_eq!(engine.wires.len(), 4);
        assert_eq!(engine.active_wire_count(), 4);
    }

    #[test]
    fn unsorted_replay_is_rejected() {
        let mut engine = RecordingEngine::new();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        assert!(matches!(
            sut.replay(&mut engine, &[3.0, 1.0], ReplayMode::Additional),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn live_updates() {
        let mut engine = RecordingEngine::new();
        let mut options = ConnectionOptions::default();
        options.minis_rate = Some(1.0);
        let mut sut = two_synapse_connection(options);
        sut.finalize(&mut engine, &CTX).unwrap();

        sut.update_weight(&mut engine, 3.0).unwrap();
        assert_approx_eq!(f64, sut.weight_factor(), 3.0);
        assert_approx_eq!(f64, engine.wire(sut.primary_wires()[0]).weight, 2.4);
        assert_approx_eq!(f64, engine.wire(sut.primary_wires()[1]).weight, 1.2);
        assert_approx_eq!(f64, engine.wires[1].weight, 2.4);

        sut.update_params(&mut engine, &[("tau_d".to_string(), 3.5)])
            .unwrap();
        assert!(sut
            .synapse_handles()
            .iter()
            .all(|syn| engine.synapse_param(*syn, "tau_d") == Some(3.5)));

        sut.apply_configuration(&mut engine, "%s.Fac = 0").unwrap();
        assert_eq!(engine.synapses[1].directives, ["%s.Fac = 0"]);
        assert_eq!(sut.configurations(), ["%s.Fac = 0"]);
    }

    #[test]
    fn gap_junctions_use_offsets() {
        let mut engine = RecordingEngine::new();
        let offsets = GapJunctionOffsets::from_counts([(5, 4), (10, 3)]).unwrap();

        let mut record = SynapseRecord::new(5, 0.0, 0.2, 0);
        record.d = 2.0;
        record.f = 1.0;
        let mut sut = Connection::new(5, 10, ConnectionOptions::default());
        sut.add_synapse(placement(10, 0.5), record, None).unwrap();

        assert_eq!(sut.finalize_gap_junctions(&mut engine, &offsets).unwrap(), 1);
        assert_eq!(engine.synapses[0].kind, SynapseKind::GapJunction);
        assert_eq!(engine.synapse_param(SynapseHandle(0), GAP_WEIGHT), Some(0.2));
        assert_eq!(engine.target_vars, [(SynapseHandle(0), 2)]);
        assert_eq!(engine.source_vars[0].id, 4 + 1);
        assert!(engine.wires.is_empty());

        sut.disable(&mut engine, false).unwrap();
        assert_eq!(engine.synapse_param(SynapseHandle(0), GAP_WEIGHT), Some(0.0));
        sut.enable(&mut engine).unwrap();
        assert_eq!(engine.synapse_param(SynapseHandle(0), GAP_WEIGHT), Some(0.2));
    }

    #[test]
    fn gap_junction_without_offset_is_configuration_error() {
        let mut engine = RecordingEngine::new();
        let offsets = GapJunctionOffsets::from_counts([(10, 3)]).unwrap();
        let mut sut = two_synapse_connection(ConnectionOptions::default());
        assert!(matches!(
            sut.finalize_gap_junctions(&mut engine, &offsets),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn pending_replay_blocks_gap_junctions() {
        let mut engine = RecordingEngine::new();
        let offsets = GapJunctionOffsets::from_counts([(5, 2), (10, 3)]).unwrap();
        let mut sut = two_synapse_connection(ConnectionOptions::default());

        sut.replay(&mut engine, &[1.0, 2.0], ReplayMode::Additional)
            .unwrap();
        assert!(matches!(
            sut.finalize_gap_junctions(&mut engine, &offsets),
            Err(Error::InvalidState(_))
        ));
        assert!(engine.synapses.is_empty());
    }
}
