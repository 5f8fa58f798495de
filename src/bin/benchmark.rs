use std::time::Instant;

use synconnect::{
    engine::{DirectLocator, RecordingEngine},
    manager::ConnectionManager,
    pathway::PathwayRuleResolver,
    process_group::SingleProcess,
    storage::StoreSource,
};

#[path = "../scenario_params.rs"]
mod scenario_params;

fn main() {
    env_logger::init();

    let target_ids = scenario_params::get_target_ids();
    let store = scenario_params::get_synthetic_store();
    let memberships = scenario_params::get_memberships();
    let locator = DirectLocator::new();
    let num_rounds = 20;

    let mut num_connections = 0usize;
    let mut num_synapses = 0usize;

    let wall_start = Instant::now();

    for _ in 0..num_rounds {
        let mut engine = RecordingEngine::new();
        let mut manager = ConnectionManager::open(
            scenario_params::get_manager_params(),
            &[StoreSource::Memory(store.clone())],
            &[],
        )
        .unwrap();
        let resolver =
            PathwayRuleResolver::new(scenario_params::get_rules(), &memberships).unwrap();

        manager.connect_all(&locator, &target_ids, 1.0).unwrap();
        resolver
            .apply_initial(&mut manager, &locator, &target_ids, false)
            .unwrap();
        let summary = manager
            .finalize(&mut engine, &mut SingleProcess, scenario_params::BASE_SEED)
            .unwrap();

        num_connections += summary.local_connections;
        num_synapses += summary.local_synapses;
    }

    let wall_time = wall_start.elapsed();
    let synapse_throughput = num_synapses as f64 / wall_time.as_secs_f64();

    eprintln!(
        "Connections per round: {}",
        num_connections as f64 / num_rounds as f64
    );
    eprintln!(
        "Synapse materialization throughput: {:.3e} ({:.3} ns per synapse)",
        synapse_throughput,
        1e9 / synapse_throughput
    );
}
