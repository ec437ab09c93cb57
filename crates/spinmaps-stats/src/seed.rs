// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-map seed derivation.
//!
//! Each null generation gets its own generator seeded from the run's base
//! seed and the map name, so results do not depend on processing order.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use xxhash_rust::xxh64::xxh64;

/// Generator used for every null draw
pub type NullRng = ChaCha8Rng;

/// Derive the seed for one target map from the base seed
pub fn derive_seed(base_seed: u64, map_name: &str) -> u64 {
    xxh64(map_name.as_bytes(), base_seed)
}

/// Fresh generator for an already-derived seed
pub fn rng_from_seed(seed: u64) -> NullRng {
    ChaCha8Rng::seed_from_u64(seed)
}
