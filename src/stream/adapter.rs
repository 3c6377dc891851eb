//! # Integrity Adapter — Per-Chunk Verification With Timing
//!
//! Wraps [`checksum::extract`] in a form the orchestrator's batch
//! verification can run over many chunks: one [`ChunkVerification`] per
//! input value, carrying its index, timing, and either the recovered core
//! factorization or the error that prevented recovering it.

use std::time::Instant;

use rug::Integer;
use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::registry::PrimeRegistry;

/// Outcome of verifying a single encoded value.
#[derive(Debug, Clone)]
pub struct ChunkVerification {
    pub index: usize,
    pub valid: bool,
    pub checksum: Option<Integer>,
    pub core_factors: Option<Vec<(Integer, u32)>>,
    pub errors: Vec<String>,
    pub elapsed_micros: u64,
}

/// Running totals over a sequence of [`ChunkVerification`] results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterStats {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    pub total_elapsed_micros: u64,
}

impl AdapterStats {
    pub fn record(&mut self, v: &ChunkVerification) {
        self.total += 1;
        if v.valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }
        self.total_elapsed_micros += v.elapsed_micros;
    }

    pub fn mean_elapsed_micros(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_elapsed_micros as f64 / self.total as f64
        }
    }
}

/// Verifies a single value's checksum integrity, timing the attempt and
/// translating [`CodecError`](crate::error::CodecError) into a message
/// list rather than aborting the caller's loop.
pub fn verify_one(index: usize, value: &Integer, registry: &PrimeRegistry, k: u32) -> ChunkVerification {
    let started = Instant::now();
    match checksum::extract(value, registry, k) {
        Ok(extracted) => ChunkVerification {
            index,
            valid: extracted.valid,
            checksum: Some(extracted.checksum_prime),
            core_factors: Some(extracted.core),
            errors: Vec::new(),
            elapsed_micros: started.elapsed().as_micros() as u64,
        },
        Err(e) => ChunkVerification {
            index,
            valid: false,
            checksum: None,
            core_factors: None,
            errors: vec![e.to_string()],
            elapsed_micros: started.elapsed().as_micros() as u64,
        },
    }
}

/// Verifies a whole slice, optionally stopping at the first invalid entry.
/// Always returns at least one result when `values` is non-empty.
pub fn verify_batch(
    values: &[Integer],
    registry: &PrimeRegistry,
    k: u32,
    fail_fast: bool,
) -> (Vec<ChunkVerification>, AdapterStats) {
    let mut results = Vec::with_capacity(values.len());
    let mut stats = AdapterStats::default();

    for (i, v) in values.iter().enumerate() {
        let outcome = verify_one(i, v, registry, k);
        stats.record(&outcome);
        let invalid = !outcome.valid;
        results.push(outcome);
        if invalid && fail_fast {
            break;
        }
    }

    (results, stats)
}
