use synconnect::{
    engine::{DirectLocator, EventSource, RecordedSource, RecordingEngine},
    manager::ConnectionManager,
    pathway::PathwayRuleResolver,
    process_group::{self, ProcessGroup, ReduceOp},
    storage::StoreSource,
    util,
};

#[path = "../scenario_params.rs"]
mod scenario_params;

const NUM_WORKERS: usize = 4;
const T_MINIS_STOP: f64 = 1000.0;

fn wire_checksum(engine: &RecordingEngine) -> f64 {
    engine
        .wires
        .iter()
        .filter(|wire| wire.active)
        .map(|wire| {
            let source = match wire.source {
                EventSource::Cell(nid) => nid as f64,
                EventSource::Virtual(handle) => -(handle.0 as f64),
            };
            (source + 1.0) * wire.weight * (wire.delay + 1.0)
        })
        .sum()
}

fn synapse_checksum(engine: &RecordingEngine) -> f64 {
    engine
        .synapses
        .iter()
        .map(|synapse| {
            synapse.post_nid as f64 * synapse.position
                + synapse.params.get("u").copied().unwrap_or(0.0)
        })
        .sum()
}

fn minis_checksum(engine: &RecordingEngine) -> f64 {
    engine
        .sources
        .iter()
        .filter_map(|source| match source {
            RecordedSource::Spontaneous(generator) => Some(generator.clone()),
            RecordedSource::Replay(_) => None,
        })
        .map(|mut generator| {
            generator
                .events_until(T_MINIS_STOP)
                .iter()
                .map(|event| event.t * event.amplitude_rank)
                .sum::<f64>()
        })
        .sum()
}

fn main() {
    env_logger::init();

    let manager_params = scenario_params::get_manager_params();
    let rules = scenario_params::get_rules();
    let memberships = scenario_params::get_memberships();
    let target_ids = scenario_params::get_target_ids();
    let store = scenario_params::get_synthetic_store();

    let results = process_group::run_local_group(
        &scenario_params::get_group_params(NUM_WORKERS),
        |member| {
            let owned = util::owned_targets(&target_ids, member.rank(), member.size());
            let locator = DirectLocator::new();
            let mut engine = RecordingEngine::new();

            let mut manager = ConnectionManager::open(
                manager_params.clone(),
                &[StoreSource::Memory(store.clone())],
                &[],
            )?;
            let resolver = PathwayRuleResolver::new(rules.clone(), &memberships)?;

            manager.connect_all(&locator, &owned, 1.0)?;
            let resolution = resolver.apply_initial(&mut manager, &locator, &owned, false)?;
            let summary =
                manager.finalize(&mut engine, &mut *member, scenario_params::BASE_SEED)?;

            for rule_index in resolution.delayed() {
                resolver.apply_delayed(&mut manager, &mut engine, &owned, rule_index)?;
            }

            let wires = member.reduce(wire_checksum(&engine), ReduceOp::Sum)?;
            let synapses = member.reduce(synapse_checksum(&engine), ReduceOp::Sum)?;
            let minis = member.reduce(minis_checksum(&engine), ReduceOp::Sum)?;
            let num_synapses = member.reduce(summary.local_synapses as f64, ReduceOp::Sum)?;

            Ok((
                resolution.to_string(),
                summary.total_connections,
                num_synapses,
                wires,
                synapses,
                minis,
            ))
        },
    )
    .unwrap();

    let mut results = results.into_iter();
    let (resolution, num_connections, num_synapses, wires, synapses, minis) =
        results.next().unwrap().unwrap();
    for result in results {
        result.unwrap();
    }

    println!("pathway resolution:");
    print!("{}", resolution);
    println!("group result:");
    println!("...connection count: {}", num_connections);
    println!("...synapse count: {}", num_synapses);
    println!("...wire checksum: {}", wires);
    println!("...synapse checksum: {}", synapses);
    println!("...minis checksum: {}", minis);
}
