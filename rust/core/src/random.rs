// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Seeded pseudo-random numbers.
//!
//! Seeds are feature or building identifiers so repeated builds of the same
//! tile pick the same templates and prop offsets on every platform.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Deterministic generator seeded from an identifier
#[derive(Debug, Clone)]
pub struct Prng {
    rng: Xoshiro256Plus,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256Plus::seed_from_u64(seed),
        }
    }

    /// Uniform value in [0, 1)
    #[inline]
    pub fn next(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform index in [0, n); returns 0 when `n` is 0
    #[inline]
    pub fn next_index(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            self.rng.random_range(0..n)
        }
    }
}
