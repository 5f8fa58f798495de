use serde::{Deserialize, Serialize};

pub const EXCITATORY_SYN_TYPE_MIN: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynapseRecord {
    pub pre_nid: usize,
    pub delay: f64,
    pub section_id: u32,
    pub segment_id: u32,
    pub offset: f64,
    pub weight: f64,
    pub u: f64,
    pub d: f64,
    pub f: f64,
    pub dtc: f64,
    pub syn_type: i32,
    pub release_sites: Option<u32>,
    pub u_hill_coefficient: Option<f64>,
    pub conductance_ratio: Option<f64>,
    pub location: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynapseClass {
    Excitatory,
    Inhibitory,
}

impl SynapseRecord {
    pub fn new(pre_nid: usize, delay: f64, weight: f64, syn_type: i32) -> Self {
        Self {
            pre_nid,
            delay,
            section_id: 0,
            segment_id: 0,
            offset: 0.5,
            weight,
            u: 0.5,
            d: 670.0,
            f: 17.0,
            dtc: 1.7,
            syn_type,
            release_sites: None,
            u_hill_coefficient: None,
            conductance_ratio: None,
            location: 0.5,
        }
    }

    pub fn class(&self) -> SynapseClass {
        if self.syn_type >= EXCITATORY_SYN_TYPE_MIN {
            SynapseClass::Excitatory
        } else {
            SynapseClass::Inhibitory
        }
    }

    pub fn is_excitatory(&self) -> bool {
        self.class() == SynapseClass::Excitatory
    }

    // gap junction stores keep the junction ids in the release constant columns
    pub fn efferent_junction_id(&self) -> usize {
        self.d as usize
    }

    pub fn afferent_junction_id(&self) -> usize {
        self.f as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_from_syn_type() {
        assert_eq!(SynapseRecord::new(1, 1.0, 1.0, 5).class(), SynapseClass::Inhibitory);
        assert_eq!(SynapseRecord::new(1, 1.0, 1.0, 99).class(), SynapseClass::Inhibitory);
        assert!(SynapseRecord::new(1, 1.0, 1.0, 100).is_excitatory());
        assert!(SynapseRecord::new(1, 1.0, 1.0, 113).is_excitatory());
    }

    #[test]
    fn junction_ids() {
        let mut sut = SynapseRecord::new(4, 0.0, 0.2, 0);
        sut.d = 3.0;
        sut.f = 7.0;
        assert_eq!(sut.efferent_junction_id(), 3);
        assert_eq!(sut.afferent_junction_id(), 7);
    }
}
