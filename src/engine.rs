use crate::error::{Error, Result};
use crate::minis::MinisGenerator;
use crate::synapse::SynapseRecord;
use crate::types::HashMap;

pub const CONDUCTANCE: &str = "conductance";
pub const GAP_WEIGHT: &str = "weight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SynapseHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdjusterHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionRef {
    pub post_nid: usize,
    pub section_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub section: SectionRef,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynapseKind {
    Excitatory,
    Inhibitory,
    Override(String),
    GapJunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Cell(usize),
    Virtual(SourceHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTarget {
    Synapse(SynapseHandle),
    Adjuster(AdjusterHandle),
}

pub trait SimulationEngine {
    fn create_synapse(
        &mut self,
        kind: &SynapseKind,
        post_nid: usize,
        section: SectionRef,
        position: f64,
    ) -> Result<SynapseHandle>;

    fn set_synapse_param(&mut self, synapse: SynapseHandle, name: &str, value: f64) -> Result<()>;

    fn synapse_param(&self, synapse: SynapseHandle, name: &str) -> Option<f64>;

    fn configure_synapse(&mut self, synapse: SynapseHandle, directive: &str) -> Result<()>;

    fn connect(
        &mut self,
        source: EventSource,
        post_nid: usize,
        target: WireTarget,
        weight: f64,
        delay: f64,
    ) -> Result<WireHandle>;

    fn set_wire_active(&mut self, wire: WireHandle, active: bool);

    fn set_wire_weight(&mut self, wire: WireHandle, weight: f64);

    fn create_virtual_source(&mut self, event_times: &[f64]) -> Result<SourceHandle>;

    fn create_spont_source(&mut self, generator: MinisGenerator) -> Result<SourceHandle>;

    fn create_weight_adjuster(
        &mut self,
        mode: &str,
        post_nid: usize,
        section: SectionRef,
        position: f64,
    ) -> Result<AdjusterHandle>;

    fn link_weight(&mut self, wire: WireHandle, adjuster: AdjusterHandle) -> Result<()>;

    fn source_var(&mut self, post_nid: usize, section: SectionRef, position: f64, id: usize)
        -> Result<()>;

    fn target_var(&mut self, gap_junction: SynapseHandle, id: usize) -> Result<()>;
}

pub trait SectionLocator {
    fn locate(&self, post_nid: usize, record: &SynapseRecord) -> Option<Placement>;
}

// maps section ids one to one and clamps the offset into the section
pub struct DirectLocator {
    num_sections: Option<u32>,
}

impl DirectLocator {
    pub fn new() -> Self {
        Self { num_sections: None }
    }

    pub fn with_num_sections(num_sections: u32) -> Self {
        Self {
            num_sections: Some(num_sections),
        }
    }
}

impl Default for DirectLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionLocator for DirectLocator {
    fn locate(&self, post_nid: usize, record: &SynapseRecord) -> Option<Placement> {
        if let Some(num_sections) = self.num_sections {
            if record.section_id >= num_sections {
                return None;
            }
        }

        Some(Placement {
            section: SectionRef {
                post_nid,
                section_id: record.section_id,
            },
            position: record.offset.clamp(0.0, 1.0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSynapse {
    pub kind: SynapseKind,
    pub post_nid: usize,
    pub section: SectionRef,
    pub position: f64,
    pub params: HashMap<String, f64>,
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWire {
    pub source: EventSource,
    pub post_nid: usize,
    pub target: WireTarget,
    pub weight: f64,
    pub delay: f64,
    pub active: bool,
    pub weight_link: Option<AdjusterHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAdjuster {
    pub mode: String,
    pub post_nid: usize,
    pub section: SectionRef,
    pub position: f64,
}

#[derive(Debug, Clone)]
pub enum RecordedSource {
    Replay(Vec<f64>),
    Spontaneous(MinisGenerator),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarLink {
    pub post_nid: usize,
    pub section: SectionRef,
    pub position: f64,
    pub id: usize,
}

// keeps every created object in creation order, used for dry runs and tests
#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub synapses: Vec<RecordedSynapse>,
    pub wires: Vec<RecordedWire>,
    pub sources: Vec<RecordedSource>,
    pub adjusters: Vec<RecordedAdjuster>,
    pub source_vars: Vec<VarLink>,
    pub target_vars: Vec<(SynapseHandle, usize)>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synapse(&self, synapse: SynapseHandle) -> &RecordedSynapse {
        &self.synapses[synapse.0]
    }

    pub fn wire(&self, wire: WireHandle) -> &RecordedWire {
        &self.wires[wire.0]
    }

    pub fn active_wire_count(&self) -> usize {
        self.wires.iter().filter(|wire| wire.active).count()
    }

    fn synapse_mut(&mut self, synapse: SynapseHandle) -> Result<&mut RecordedSynapse> {
        self.synapses
            .get_mut(synapse.0)
            .ok_or_else(|| Error::Engine(format!("unknown synapse handle {}", synapse.0)))
    }
}

impl SimulationEngine for RecordingEngine {
    fn create_synapse(
        &mut self,
        kind: &SynapseKind,
        post_nid: usize,
        section: SectionRef,
        position: f64,
    ) -> Result<SynapseHandle> {
        if !(0.0..=1.0).contains(&position) {
            return Err(Error::Engine(format!(
                "synapse position {} outside of section",
                position
            )));
        }

        let mut params = HashMap::default();
        params.insert(CONDUCTANCE.to_string(), 1.0);

        self.synapses.push(RecordedSynapse {
            kind: kind.clone(),
            post_nid,
            section,
            position,
            params,
            directives: Vec::new(),
        });

        Ok(SynapseHandle(self.synapses.len() - 1))
    }

    fn set_synapse_param(&mut self, synapse: SynapseHandle, name: &str, value: f64) -> Result<()> {
        self.synapse_mut(synapse)?
            .params
            .insert(name.to_string(), value);
        Ok(())
    }

    fn synapse_param(&self, synapse: SynapseHandle, name: &str) -> Option<f64> {
        self.synapses
            .get(synapse.0)
            .and_then(|recorded| recorded.params.get(name).copied())
    }

    fn configure_synapse(&mut self, synapse: SynapseHandle, directive: &str) -> Result<()> {
        self.synapse_mut(synapse)?
            .directives
            .push(directive.to_string());
        Ok(())
    }

    fn connect(
        &mut self,
        source: EventSource,
        post_nid: usize,
        target: WireTarget,
        weight: f64,
        delay: f64,
    ) -> Result<WireHandle> {
        if delay < 0.0 {
            return Err(Error::Engine(format!("negative wire delay {}", delay)));
        }

        self.wires.push(RecordedWire {
            source,
            post_nid,
            target,
            weight,
            delay,
            active: true,
            weight_link: None,
        });

        Ok(WireHandle(self.wires.len() - 1))
    }

    fn set_wire_active(&mut self, wire: WireHandle, active: bool) {
        if let Some(recorded) = self.wires.get_mut(wire.0) {
            recorded.active = active;
        }
    }

    fn set_wire_weight(&mut self, wire: WireHandle, weight: f64) {
        if let Some(recorded) = self.wires.get_mut(wire.0) {
            recorded.weight = weight;
        }
    }

    fn create_virtual_source(&mut self, event_times: &[f64]) -> Result<SourceHandle> {
        self.sources.push(RecordedSource::Replay(event_times.to_vec()));
        Ok(SourceHandle(self.sources.len() - 1))
    }

    fn create_spont_source(&mut self, generator: MinisGenerator) -> Result<SourceHandle> {
        self.sources.push(RecordedSource::Spontaneous(generator));
        Ok(SourceHandle(self.sources.len() - 1))
    }

    fn create_weight_adjuster(
        &mut self,
        mode: &str,
        post_nid: usize,
        section: SectionRef,
        position: f64,
    ) -> Result<AdjusterHandle> {
        self.adjusters.push(RecordedAdjuster {
            mode: mode.to_string(),
            post_nid,
            section,
            position,
        });
        Ok(AdjusterHandle(self.adjusters.len() - 1))
    }

    fn link_weight(&mut self, wire: WireHandle, adjuster: AdjusterHandle) -> Result<()> {
        if adjuster.0 >= self.adjusters.len() {
            return Err(Error::Engine(format!(
                "unknown weight adjuster {}",
                adjuster.0
            )));
        }

        let recorded = self
            .wires
            .get_mut(wire.0)
            .ok_or_else(|| Error::Engine(format!("unknown wire handle {}", wire.0)))?;
        recorded.weight_link = Some(adjuster);
        Ok(())
    }

    fn source_var(
        &mut self,
        post_nid: usize,
        section: SectionRef,
        position: f64,
        id: usize,
    ) -> Result<()> {
        self.source_vars.push(VarLink {
            post_nid,
            section,
            position,
            id,
        });
        Ok(())
    }

    fn target_var(&mut self, gap_junction: SynapseHandle, id: usize) -> Result<()> {
        self.synapse_mut(gap_junction)?;
        self.target_vars.push((gap_junction, id));
        Ok(())
    }
}
