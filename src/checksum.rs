//! # Checksum — XOR-Based Prime-Index Checksum Layer
//!
//! Derives a single "checksum prime" from a factorization by XOR-folding
//! `index(p) * e` over its factors, then attaches it to a raw value as a
//! high-power factor (`raw * checksumPrime^k`). Extraction reverses this:
//! it finds the dominant high-exponent factor, subtracts `k`, and
//! re-derives the expected checksum prime from what's left to detect
//! tampering.
//!
//! This is a structural integrity tag, not a cryptographic MAC — the
//! non-goal is explicit and the 32-bit XOR fold is not collision-resistant
//! against an adversary, only against accidental corruption.

use std::fmt::Write as _;

use parking_lot::Mutex;
use rug::Integer;
use tracing::warn;

use crate::cache::{CacheStats, LruCache};
use crate::error::{CodecError, CodecResult};
use crate::registry::PrimeRegistry;

/// Default checksum power. MUST exceed the maximum payload exponent used
/// by `encoding` (see that module's doc comment) and be at least 2.
pub const DEFAULT_K: u32 = 6;

/// Folds `index(p) * e` over `factors` in order, XORing into a fixed-width
/// `u32` accumulator. When `registry` is `None`, a deterministic fallback
/// hash over each prime's decimal string stands in for `index(p)` — its
/// output is only ever comparable to other fallback-mode computations,
/// never to a registry-derived sum.
pub fn xor_sum(factors: &[(Integer, u32)], registry: Option<&PrimeRegistry>) -> CodecResult<u32> {
    let mut acc: u32 = 0;
    for (p, e) in factors {
        let idx: u32 = match registry {
            Some(r) => r.get_index(p, true)? as u32,
            None => fallback_hash(p),
        };
        acc ^= idx.wrapping_mul(*e);
    }
    Ok(acc)
}

fn fallback_hash(p: &Integer) -> u32 {
    let s = p.to_string();
    let mut h: u32 = 2166136261; // FNV-1a offset basis
    for b in s.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    h
}

/// Derives the checksum prime for `factors`. The empty factorization (the
/// value 1) derives to `P₀ = 2`.
pub fn derive(factors: &[(Integer, u32)], registry: &PrimeRegistry) -> CodecResult<Integer> {
    if factors.is_empty() {
        return Ok(registry.get_prime(0));
    }
    let sum = xor_sum(factors, Some(registry))?;
    Ok(registry.get_prime(sum as usize))
}

/// Formats a factor-signature cache key `"p1^e1,p2^e2,..."` into `buf`
/// without building an intermediate `String` per factor.
fn write_signature(buf: &mut String, factors: &[(Integer, u32)]) {
    buf.clear();
    for (i, (p, e)) in factors.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        let _ = write!(buf, "{p}^{e}");
    }
}

/// The checksum prime cache: a factor-signature string to its derived
/// prime, with hit/miss/eviction counters exposed through `stats()`.
pub struct ChecksumCache {
    cache: Mutex<LruCache<String, Integer>>,
}

impl Default for ChecksumCache {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl ChecksumCache {
    pub fn new(capacity: usize) -> Self {
        ChecksumCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Derives the checksum prime for `factors`, consulting (and
    /// populating) the cache.
    pub fn derive(
        &self,
        factors: &[(Integer, u32)],
        registry: &PrimeRegistry,
    ) -> CodecResult<Integer> {
        let mut key = String::new();
        write_signature(&mut key, factors);

        {
            let mut cache = self.cache.lock();
            if let Some(hit) = cache.get(&key) {
                return Ok(hit);
            }
        }

        let derived = derive(factors, registry)?;
        self.cache.lock().put(key, derived.clone());
        Ok(derived)
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }
}

/// Attaches a checksum to `raw` by multiplying in `derive(factors)^k`.
/// When `verify_on_attach` is set, the result is immediately
/// round-tripped through [`extract`] to self-verify before returning.
pub fn attach(
    raw: &Integer,
    factors: &[(Integer, u32)],
    registry: &PrimeRegistry,
    k: u32,
    verify_on_attach: bool,
) -> CodecResult<Integer> {
    let cp = derive(factors, registry)?;
    let attached = Integer::from(raw * Integer::from(cp.pow(k)));
    if verify_on_attach {
        let extracted = extract(&attached, registry, k)?;
        if !extracted.valid {
            return Err(CodecError::ChecksumMismatch {
                expected: cp,
                actual: extracted.checksum_prime,
            });
        }
    }
    Ok(attached)
}

/// The outcome of extracting and verifying a checksum from an attached
/// value's factorization.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub core: Vec<(Integer, u32)>,
    pub checksum_prime: Integer,
    pub k: u32,
    pub valid: bool,
}

/// Factors `v`, locates the checksum factor (the factor with the largest
/// exponent `>= k`, ties broken by the larger prime), subtracts `k` from
/// its exponent to recover the core factorization, and verifies that
/// re-deriving the checksum from the core reproduces it.
pub fn extract(v: &Integer, registry: &PrimeRegistry, k: u32) -> CodecResult<Extracted> {
    let factors = registry.factor(v)?;

    let checksum_idx = factors
        .iter()
        .enumerate()
        .filter(|(_, (_, e))| *e >= k)
        .max_by(|(_, (p1, e1)), (_, (p2, e2))| e1.cmp(e2).then_with(|| p1.cmp(p2)))
        .map(|(i, _)| i);

    let Some(idx) = checksum_idx else {
        return Err(CodecError::NoChecksum { k });
    };

    let (cp, cp_exp) = factors[idx].clone();
    let mut core = factors.clone();
    let remaining_exp = cp_exp - k;
    if remaining_exp == 0 {
        core.remove(idx);
    } else {
        core[idx].1 = remaining_exp;
    }

    let expected = derive(&core, registry)?;
    let valid = expected == cp;
    if !valid {
        warn!(
            target: "primechunk::checksum",
            expected = %expected,
            actual = %cp,
            "checksum mismatch"
        );
        return Err(CodecError::ChecksumMismatch {
            expected,
            actual: cp,
        });
    }

    Ok(Extracted {
        core,
        checksum_prime: cp,
        k,
        valid,
    })
}

/// XORs `index(extract(v).checksumPrime)` across a batch; values that
/// fail to extract contribute a fixed sentinel plus a per-value
/// distinguishing hash (`v mod 0xFFFF XOR 0xAAAA`) so two different
/// unextractable values don't collapse to the same contribution. Returns
/// `P₀` for an empty or all-invalid batch.
pub fn batch_checksum(values: &[Integer], registry: &PrimeRegistry) -> CodecResult<Integer> {
    const SENTINEL: u32 = 0xDEAD_BEEF;
    let mut acc: u32 = 0;
    let mut any_valid = false;

    for v in values {
        match extract(v, registry, DEFAULT_K) {
            Ok(extracted) => {
                any_valid = true;
                let idx = registry.get_index(&extracted.checksum_prime, true)? as u32;
                acc ^= idx;
            }
            Err(_) => {
                let rem: u32 = Integer::from(v % 0xFFFFu32).to_u32().unwrap_or(0);
                acc ^= SENTINEL ^ (rem ^ 0xAAAA);
            }
        }
    }

    if !any_valid {
        return Ok(registry.get_prime(0));
    }
    Ok(registry.get_prime(acc as usize))
}

/// Incrementally-foldable equivalent of [`batch_checksum`]: `update`
/// folds one more value in; an invalid value leaves the state unchanged
/// (per spec, only valid extractions contribute to the running fold).
#[derive(Debug, Clone, Copy, Default)]
pub struct XorHashState {
    pub xor_sum: u32,
    pub count: u64,
}

impl XorHashState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, v: &Integer, registry: &PrimeRegistry) {
        if let Ok(extracted) = extract(v, registry, DEFAULT_K) {
            if let Ok(idx) = registry.get_index(&extracted.checksum_prime, true) {
                self.xor_sum ^= idx as u32;
                self.count += 1;
            }
        }
    }

    pub fn finalize(&self, registry: &PrimeRegistry) -> Integer {
        if self.count == 0 {
            registry.get_prime(0)
        } else {
            registry.get_prime(self.xor_sum as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn derive_of_empty_is_p0() {
        let r = PrimeRegistry::new();
        assert_eq!(derive(&[], &r).unwrap(), Integer::from(2));
    }

    #[test]
    fn derive_is_deterministic() {
        let r = PrimeRegistry::new();
        let f = vec![(Integer::from(2), 1), (Integer::from(3), 1)];
        let a = derive(&f, &r).unwrap();
        let b = derive(&f, &r).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn attach_result_divisible_by_raw() {
        let r = PrimeRegistry::new();
        let n = Integer::from(42);
        let factors = r.factor(&n).unwrap();
        let attached = attach(&n, &factors, &r, DEFAULT_K, false).unwrap();
        assert!(attached.is_divisible(&n));
    }

    proptest! {
        #[test]
        fn prop_checksum_round_trip_extract_matches_attach(n in 1u32..5000) {
            let r = PrimeRegistry::new();
            let raw = Integer::from(n);
            let factors = r.factor(&raw).unwrap();
            let attached = attach(&raw, &factors, &r, DEFAULT_K, false).unwrap();
            let extracted = extract(&attached, &r, DEFAULT_K).unwrap();
            prop_assert_eq!(extracted.core, factors);
            prop_assert!(extracted.valid);
        }

        #[test]
        fn prop_tamper_detection_nonzero_delta_fails(n in 2u32..5000, delta in 1i64..1000) {
            let r = PrimeRegistry::new();
            let raw = Integer::from(n);
            let factors = r.factor(&raw).unwrap();
            let attached = attach(&raw, &factors, &r, DEFAULT_K, false).unwrap();
            let tampered = Integer::from(&attached + delta);
            prop_assume!(tampered != attached);
            let result = extract(&tampered, &r, DEFAULT_K);
            prop_assert!(matches!(
                result,
                Err(CodecError::ChecksumMismatch { .. }) | Err(CodecError::NoChecksum { .. })
            ));
        }
    }

    #[test]
    fn extract_without_checksum_fails() {
        let r = PrimeRegistry::new();
        let result = extract(&Integer::from(30), &r, DEFAULT_K);
        assert!(matches!(result, Err(CodecError::NoChecksum { .. })));
    }

    #[test]
    fn batch_checksum_changes_on_tamper() {
        let r = PrimeRegistry::new();
        let values: Vec<Integer> = [42u32, 60, 1000]
            .iter()
            .map(|&n| {
                let raw = Integer::from(n);
                let factors = r.factor(&raw).unwrap();
                attach(&raw, &factors, &r, DEFAULT_K, false).unwrap()
            })
            .collect();
        let original = batch_checksum(&values, &r).unwrap();

        let mut tampered = values.clone();
        tampered[1] = Integer::from(&tampered[1] + 1);
        let after = batch_checksum(&tampered, &r).unwrap();

        assert_ne!(original, after);
    }

    proptest! {
        #[test]
        fn prop_batch_consistency_xor_hash_state_matches_batch_checksum(
            ns in prop::collection::vec(1u32..2000, 1..12)
        ) {
            let r = PrimeRegistry::new();
            let values: Vec<Integer> = ns
                .iter()
                .map(|&n| {
                    let raw = Integer::from(n);
                    let factors = r.factor(&raw).unwrap();
                    attach(&raw, &factors, &r, DEFAULT_K, false).unwrap()
                })
                .collect();

            let batch = batch_checksum(&values, &r).unwrap();

            let mut state = XorHashState::new();
            for v in &values {
                state.update(v, &r);
            }
            let folded = state.finalize(&r);

            prop_assert_eq!(batch, folded);
        }
    }

    #[test]
    fn checksum_cache_hits_on_repeat_signature() {
        let r = PrimeRegistry::new();
        let cache = ChecksumCache::new(16);
        let f = vec![(Integer::from(2), 1), (Integer::from(3), 1)];
        cache.derive(&f, &r).unwrap();
        cache.derive(&f, &r).unwrap();
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }
}
