use std::hash::{Hash, Hasher};
use std::ops::Range;

use rustc_hash::FxHasher;

const DELAY_EPSILON: f64 = 1e-5;

pub fn get_partition_range(num_workers: usize, rank: usize, num_items: usize) -> Range<usize> {
    let min_partition_size = num_items / num_workers;
    let remainder = num_items % num_workers;

    if rank < remainder {
        let partition_size = min_partition_size + 1;
        let start = partition_size * rank;
        let end = start + partition_size;
        Range { start, end }
    } else {
        let start = (min_partition_size + 1) * remainder + min_partition_size * (rank - remainder);
        let end = start + min_partition_size;
        Range { start, end }
    }
}

// targets must be sorted so that every worker derives the same blocks
pub fn owned_targets(sorted_targets: &[usize], rank: usize, num_workers: usize) -> Vec<usize> {
    sorted_targets[get_partition_range(num_workers, rank, sorted_targets.len())].to_vec()
}

// FxHasher is platform independent for a fixed pointer width, DefaultHasher is not stable
// across toolchains
pub fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = FxHasher::default();
    t.hash(&mut s);
    s.finish()
}

pub fn quantize_delay(delay: f64, dt: f64) -> f64 {
    (delay / dt + DELAY_EPSILON).floor() * dt
}

pub fn constrained_hill(k_half: f64, concentration: f64) -> f64 {
    let k_half_fourth = k_half.powi(4);
    let conc_fourth = concentration.powi(4);
    let y_max = (k_half_fourth + 16.0) / 16.0;
    y_max * conc_fourth / (k_half_fourth + conc_fourth)
}

pub fn is_sorted_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] <= pair[1])
}
