use std::collections::BTreeMap;

use rand::{prelude::Distribution, rngs::StdRng, Rng, SeedableRng};
use statrs::distribution::Poisson;
use synconnect::{
    membership::Memberships,
    params::{self, GroupParams, ManagerParams, PathwayRule},
    storage::{Capabilities, MemoryStore, PROP_U_HILL_COEFFICIENT},
    synapse::SynapseRecord,
};

pub const NUM_EXCITATORY: usize = 800;
pub const NUM_INHIBITORY: usize = 200;
pub const MEAN_IN_DEGREE: f64 = 40.0;
pub const BASE_SEED: u64 = 1;

pub fn get_manager_params() -> ManagerParams {
    let params_yaml_str = r#"
dt: 0.025
minis_seed: 7
extracellular_calcium: 1.2
finalize_order: ReverseInsertion
kind: Chemical
"#;

    params::load_manager_params_yaml(params_yaml_str).unwrap()
}

pub fn get_group_params(num_workers: usize) -> GroupParams {
    GroupParams {
        num_workers: Some(num_workers),
        pin_threads: false,
    }
}

pub fn get_rules() -> Vec<PathwayRule> {
    let rules_yaml_str = r#"
- source: Excitatory
  destination: All
  weight: 1.0
  synapse_configure: "%s.NMDA_ratio = 0.8"
- source: Excitatory
  destination: Inhibitory
  weight: 2.5
  spont_minis: 0.01
- source: Inhibitory
  destination: Excitatory
  weight: 0.0
- source: Inhibitory
  destination: Excitatory
  weight: 1.5
  delay: 200.0
  synapse_configure: "%s.tau_d_GABAA *= 1.2"
- source: Excitatory
  destination: Excitatory
  plasticity_mode: StdpWeightAdjuster
  kind_restrict: Excitatory
"#;

    params::load_rules_yaml(rules_yaml_str).unwrap()
}

pub fn get_memberships() -> Memberships {
    let num_cells = NUM_EXCITATORY + NUM_INHIBITORY;
    Memberships::new()
        .with("All", 0..num_cells)
        .with("Excitatory", 0..NUM_EXCITATORY)
        .with("Inhibitory", NUM_EXCITATORY..num_cells)
}

pub fn get_target_ids() -> Vec<usize> {
    (0..NUM_EXCITATORY + NUM_INHIBITORY).collect()
}

// in-degrees are Poisson, records of each target are sorted by source
pub fn get_synthetic_records() -> BTreeMap<usize, Vec<SynapseRecord>> {
    let num_cells = NUM_EXCITATORY + NUM_INHIBITORY;
    let mut rng = StdRng::seed_from_u64(0);
    let in_degree_dist = Poisson::new(MEAN_IN_DEGREE).unwrap();
    let mut targets = BTreeMap::new();

    for post_nid in 0..num_cells {
        let in_degree = in_degree_dist.sample(&mut rng) as usize;
        let mut records: Vec<SynapseRecord> = (0..in_degree)
            .map(|_| {
                let pre_nid = rng.gen_range(0..num_cells);
                let syn_type = if pre_nid < NUM_EXCITATORY { 113 } else { 6 };
                let mut record = SynapseRecord::new(
                    pre_nid,
                    rng.gen_range(0.1..5.0),
                    rng.gen_range(0.1..2.0),
                    syn_type,
                );
                record.section_id = rng.gen_range(0..50);
                record.offset = rng.gen_range(0.0..1.0);
                record.u_hill_coefficient = Some(rng.gen_range(1.0..3.0));
                record
            })
            .collect();
        records.sort_by_key(|record| record.pre_nid);
        targets.insert(post_nid, records);
    }

    targets
}

pub fn get_synthetic_store() -> MemoryStore {
    let capabilities = Capabilities::new(false).with_property(PROP_U_HILL_COEFFICIENT);
    get_synthetic_records().into_iter().fold(
        MemoryStore::new("synthetic").with_capabilities(capabilities),
        |store, (post_nid, records)| store.with_target(post_nid, records),
    )
}
