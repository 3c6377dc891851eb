//! # Registry — The Prime Registry
//!
//! An append-only, indexed table of primes `P₀=2, P₁=3, P₂=5, …`, grown
//! monotonically on demand. The growth strategy generalizes the wheel-30
//! sieve this lineage uses for bounded ranges of `u64` primes: once a
//! candidate outgrows `u64`, the same odd-divisor trial-division test is
//! applied directly to `rug::Integer`, so the registry has no ceiling.
//!
//! Many readers may consult the table concurrently; extension takes the
//! write lock for as long as it takes to append the next few primes, never
//! for the lifetime of a factorization.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rug::Integer;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::arith::integer_sqrt;
use crate::error::{CodecError, CodecResult};
use crate::wire;

/// Snapshot generations kept on disk (current + this many backups), the
/// same rotation depth this lineage's checkpoint persistence uses.
const SNAPSHOT_GENERATIONS: usize = 3;

/// Wheel-30 residues coprime to 2, 3, 5 — the same candidate-skipping
/// pattern the bounded sieve uses, applied here to an unbounded candidate
/// walk instead of a fixed-size bit array.
const WHEEL30: [u64; 8] = [1, 7, 11, 13, 17, 19, 23, 29];

/// Gap from each `WHEEL30` residue to the next, cyclically: `1->7` is 6,
/// `7->11` is 4, ..., `29->31` (i.e. `29->1` of the next block of 30) is 2.
const WHEEL30_GAPS: [u64; 8] = [6, 4, 2, 4, 2, 4, 6, 2];

/// Advances `candidate` up to the nearest residue in `WHEEL30` (never
/// backwards), returning that residue's index into `WHEEL30`/`WHEEL30_GAPS`
/// so the caller can keep stepping by the cyclic gap from there.
fn align_to_wheel(candidate: &mut Integer) -> usize {
    let rem = Integer::from(&*candidate % 30u32).to_u32().unwrap_or(0) as u64;
    match WHEEL30.iter().position(|&r| r >= rem) {
        Some(i) => {
            *candidate += WHEEL30[i] - rem;
            i
        }
        None => {
            *candidate += 30 - rem + WHEEL30[0];
            0
        }
    }
}

/// Trial-division primality test, exactly as specified: `n<2` is false,
/// `n==2` is true, even `n>2` is false, and odd `n>=3` is tested against
/// odd divisors `d` with `d*d <= n`.
pub fn is_prime(n: &Integer) -> bool {
    if n.cmp0().is_lt() || *n < 2 {
        return false;
    }
    if *n == 2 {
        return true;
    }
    if n.is_even() {
        return false;
    }
    let mut d = Integer::from(3);
    loop {
        let d_sq = Integer::from(&d * &d);
        if d_sq > *n {
            return true;
        }
        if n.is_divisible(&d) {
            return false;
        }
        d += 2;
    }
}

fn next_prime_after(prev: &Integer) -> Integer {
    if *prev < 2 {
        return Integer::from(2);
    }
    let mut candidate = Integer::from(prev + 1);
    if candidate <= 2 {
        return Integer::from(2);
    }
    if candidate <= 3 {
        return Integer::from(3);
    }
    if candidate <= 5 {
        return Integer::from(5);
    }
    let mut wheel_idx = align_to_wheel(&mut candidate);
    while !is_prime(&candidate) {
        candidate += WHEEL30_GAPS[wheel_idx];
        wheel_idx = (wheel_idx + 1) % WHEEL30_GAPS.len();
    }
    candidate
}

struct RegistryInner {
    primes: Vec<Integer>,
    index: HashMap<Integer, usize>,
}

impl RegistryInner {
    fn new() -> Self {
        RegistryInner {
            primes: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn extend_to(&mut self, i: usize) {
        if self.primes.len() > i {
            return;
        }
        let mut last = self.primes.last().cloned();
        while self.primes.len() <= i {
            let next = match &last {
                Some(p) => next_prime_after(p),
                None => Integer::from(2),
            };
            let idx = self.primes.len();
            self.index.insert(next.clone(), idx);
            self.primes.push(next.clone());
            last = Some(next);
        }
    }

    /// Grows the table until it contains `p`, assuming `p` is prime.
    /// Because growth is strictly ascending, this walks every prime up
    /// to `p` — acceptable since the registry never shrinks and the cost
    /// is amortized across future lookups.
    fn extend_through(&mut self, p: &Integer) {
        loop {
            let last = self.primes.last();
            if let Some(last) = last {
                if last >= p {
                    return;
                }
            }
            let next = match self.primes.last() {
                Some(l) => next_prime_after(l),
                None => Integer::from(2),
            };
            let idx = self.primes.len();
            self.index.insert(next.clone(), idx);
            self.primes.push(next);
        }
    }
}

/// The append-only indexed prime table. Cheap to clone (an `Arc`-free
/// handle is not provided — share a `&PrimeRegistry` or wrap it in an
/// `Arc` at the call site, matching how this lineage threads shared
/// read-mostly state through its workers).
pub struct PrimeRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for PrimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimeRegistry {
    pub fn new() -> Self {
        PrimeRegistry {
            inner: RwLock::new(RegistryInner::new()),
        }
    }

    /// Guarantees the table holds indices `0..=i`, growing it if needed.
    pub fn extend_to(&self, i: usize) {
        let needs_growth = self.inner.read().primes.len() <= i;
        if needs_growth {
            let mut inner = self.inner.write();
            inner.extend_to(i);
            info!(target: "primechunk::registry", up_to = i, "registry extended");
        }
    }

    /// Returns `Pᵢ`, extending the table as needed.
    pub fn get_prime(&self, i: usize) -> Integer {
        self.extend_to(i);
        self.inner.read().primes[i].clone()
    }

    /// Returns the index of `p`. If `p` isn't known and `insert_if_prime`
    /// is set and `p` is prime, the table is grown through `p` first.
    pub fn get_index(&self, p: &Integer, insert_if_prime: bool) -> CodecResult<usize> {
        if let Some(idx) = self.inner.read().index.get(p) {
            return Ok(*idx);
        }
        if insert_if_prime && is_prime(p) {
            let mut inner = self.inner.write();
            inner.extend_through(p);
            if let Some(idx) = inner.index.get(p) {
                return Ok(*idx);
            }
        }
        Err(CodecError::NotInRegistry { prime: p.clone() })
    }

    /// Trial-divides `n` by registry primes in ascending order until the
    /// quotient reaches 1 or the smallest untried prime exceeds
    /// `isqrt(remaining)`; a residual factor greater than 1 is appended
    /// with exponent 1.
    pub fn factor(&self, n: &Integer) -> CodecResult<Vec<(Integer, u32)>> {
        if n.cmp0().is_le() {
            return Err(CodecError::NonPositive { value: n.clone() });
        }
        if *n == 1 {
            return Ok(Vec::new());
        }

        let mut remaining = n.clone();
        let mut factors: Vec<(Integer, u32)> = Vec::new();
        let mut i = 0usize;

        loop {
            let p = self.get_prime(i);
            let p_sq = Integer::from(&p * &p);
            if p_sq > remaining {
                break;
            }
            if remaining.is_divisible(&p) {
                let mut exp = 0u32;
                while remaining.is_divisible(&p) {
                    remaining = Integer::from(&remaining / &p);
                    exp += 1;
                }
                factors.push((p, exp));
            }
            i += 1;
        }

        if remaining > 1 {
            factors.push((remaining, 1));
        }

        Ok(factors)
    }

    pub fn integer_sqrt(&self, n: &Integer) -> CodecResult<Integer> {
        integer_sqrt(n).ok_or_else(|| CodecError::NonPositive { value: n.clone() })
    }

    pub fn is_prime(&self, n: &Integer) -> bool {
        is_prime(n)
    }

    /// Number of primes currently materialized (not an upper bound on
    /// what the registry can produce — only on what it has produced).
    pub fn len(&self) -> usize {
        self.inner.read().primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the materialized prime table to `path`: the spec's
    /// length-prefixed varint body, trailed by a SHA-256 digest over that
    /// body for tamper detection on load. Writes atomically (temp file
    /// then rename) and rotates up to [`SNAPSHOT_GENERATIONS`] backups
    /// before doing so, the same discipline this lineage's checkpoint
    /// persistence uses for JSON state.
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        for gen in (1..SNAPSHOT_GENERATIONS).rev() {
            let src = generation_path(path, gen - 1);
            let dst = generation_path(path, gen);
            if src.exists() {
                let _ = fs::rename(&src, &dst);
            }
        }

        let primes = self.inner.read().primes.clone();
        let mut body = Vec::new();
        wire::write_snapshot_body(&mut body, &primes)?;
        let digest = Sha256::digest(&body);

        let mut out = Vec::with_capacity(body.len() + digest.len());
        out.extend_from_slice(&body);
        out.extend_from_slice(&digest);

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &out)?;
        fs::rename(&tmp, path)?;
        info!(target: "primechunk::registry", count = primes.len(), path = %path.display(), "registry snapshot saved");
        Ok(())
    }

    /// Loads a snapshot written by [`Self::save_to`], verifying its
    /// SHA-256 trailer and rebuilding the index map. Falls back through
    /// older generations on a corrupted current file, mirroring
    /// `save_to`'s rotation.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        for gen in 0..SNAPSHOT_GENERATIONS {
            let p = generation_path(path, gen);
            if let Ok(registry) = Self::load_single(&p) {
                if gen > 0 {
                    info!(target: "primechunk::registry", generation = gen, path = %p.display(), "recovered registry snapshot from backup generation");
                }
                return Ok(registry);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "no valid registry snapshot generation found",
        ))
    }

    fn load_single(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < 32 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "snapshot too short"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 32);
        let expected = Sha256::digest(body);
        if expected.as_slice() != trailer {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "registry snapshot checksum mismatch",
            ));
        }

        let mut cursor = io::Cursor::new(body);
        let primes = wire::read_snapshot_body(&mut cursor)?;

        let mut index = HashMap::with_capacity(primes.len());
        for (i, p) in primes.iter().enumerate() {
            index.insert(p.clone(), i);
        }

        Ok(PrimeRegistry {
            inner: RwLock::new(RegistryInner { primes, index }),
        })
    }
}

/// Returns the path for backup generation `gen` (0 = current, 1 = `.1`,
/// 2 = `.2`, …), matching this lineage's checkpoint generation naming.
fn generation_path(base: &Path, gen: usize) -> PathBuf {
    if gen == 0 {
        base.to_path_buf()
    } else {
        let mut p = base.as_os_str().to_os_string();
        p.push(format!(".{gen}"));
        PathBuf::from(p)
    }
}
