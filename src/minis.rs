use rand::{distributions::Uniform, prelude::Distribution, rngs::StdRng, SeedableRng};
use statrs::distribution::Exp;

use crate::error::{Error, Result};
use crate::util::calculate_hash;

const INTERVAL_STREAM: u64 = 0;
const AMPLITUDE_STREAM: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MinisKey {
    pub syn_id: usize,
    pub post_nid: usize,
    pub minis_seed: u64,
    pub base_seed: u64,
}

#[derive(Debug, Clone)]
pub struct MinisGenerator {
    key: MinisKey,
    rate: f64,
    interval_dist: Exp,
    rank_dist: Uniform<f64>,
    interval_rng: StdRng,
    amplitude_rng: StdRng,
    t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiniEvent {
    pub t: f64,
    pub amplitude_rank: f64,
}

impl MinisGenerator {
    // rate is in events per second, event times are in ms
    pub fn new(key: MinisKey, rate: f64) -> Result<Self> {
        let interval_dist = Exp::new(rate / 1000.0)
            .map_err(|err| Error::InvalidInput(format!("minis rate {}: {}", rate, err)))?;

        Ok(Self {
            key,
            rate,
            interval_dist,
            rank_dist: Uniform::new(0.0, 1.0),
            interval_rng: StdRng::seed_from_u64(calculate_hash(&(key, INTERVAL_STREAM))),
            amplitude_rng: StdRng::seed_from_u64(calculate_hash(&(key, AMPLITUDE_STREAM))),
            t: 0.0,
        })
    }

    pub fn key(&self) -> MinisKey {
        self.key
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn next_event(&mut self) -> MiniEvent {
        self.t += self.interval_dist.sample(&mut self.interval_rng);
        MiniEvent {
            t: self.t,
            amplitude_rank: self.rank_dist.sample(&mut self.amplitude_rng),
        }
    }

    pub fn events_until(&mut self, t_stop: f64) -> Vec<MiniEvent> {
        let mut events = Vec::new();
        loop {
            let event = self.next_event();
            if event.t > t_stop {
                return events;
            }
            events.push(event);
        }
    }
}

impl Iterator for MinisGenerator {
    type Item = MiniEvent;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_event())
    }
}
