// src/utils/shuffle.rs

//! Seeded, pure shuffles. Every order shown to a student is a function of
//! the attempt seed and, for options, the quiz's position in the attempt.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::models::shuffled_quiz_set::Seed;

/// Key for the option shuffle of the quiz at `position` (1-based).
pub fn subseed(seed: Seed, position: i64) -> i64 {
    seed.value().wrapping_add(position)
}

/// Fisher-Yates permutation of `0..n` driven by `key`.
pub fn permutation(key: i64, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha20Rng::seed_from_u64(key as u64);
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }
    order
}

/// Returns `items` rearranged by `permutation(key, items.len())`.
pub fn shuffled<T: Clone>(items: &[T], key: i64) -> Vec<T> {
    permutation(key, items.len())
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

pub fn shuffle_external_ids(ids: &[String], seed: Seed) -> Vec<String> {
    shuffled(ids, seed.value())
}

/// Display order of a quiz's options.
pub fn shuffle_options<T: Clone>(options: &[T], seed: Seed, position: i64) -> Vec<T> {
    shuffled(options, subseed(seed, position))
}

/// True when the option order at `position` differs from the authored one.
pub fn reorders_options(seed: Seed, position: i64, n: usize) -> bool {
    permutation(subseed(seed, position), n)
        .iter()
        .enumerate()
        .any(|(i, &p)| i != p)
}
