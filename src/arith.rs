//! # Arith — Modular and Arbitrary-Precision Arithmetic Helpers
//!
//! Small number-theoretic primitives shared by [`crate::registry`] and
//! [`crate::ntt`]: an arbitrary-precision integer square root via Newton's
//! method, and u64 modular exponentiation / Montgomery multiplication for
//! the hot paths that don't need GMP's bignum machinery.
//!
//! The Montgomery context is the same shape used elsewhere in this lineage
//! for fixed-modulus modular arithmetic — multiply+shift instead of u128
//! division — reused here for NTT's repeated `ω^jk mod M` evaluations.

use rug::Integer;

/// Floor square root of a non-negative bigint via Newton's method.
///
/// `⌊√n⌋`, computed by the classical Newton iteration `x_{k+1} = (x_k +
/// n/x_k) / 2` starting from a bit-length-based estimate, until the
/// iterate stops decreasing. Returns `None` for negative `n`.
pub fn integer_sqrt(n: &Integer) -> Option<Integer> {
    if n.cmp0().is_lt() {
        return None;
    }
    if n.is_zero() {
        return Some(Integer::new());
    }

    // Initial estimate: 2^ceil(bits/2), always >= the true root.
    let bits = n.significant_bits();
    let mut x = Integer::from(Integer::u_pow_u(2, bits.div_ceil(2)));

    loop {
        let y = (Integer::from(&x) + Integer::from(n / &x)) / 2;
        if y >= x {
            break;
        }
        x = y;
    }
    Some(x)
}

/// Modular exponentiation for u64 operands, using u128 intermediates to
/// avoid overflow for moduli up to ~2^63.
pub fn pow_mod_u64(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result: u64 = 1;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result as u128 * base as u128 % modulus as u128) as u64;
        }
        exp >>= 1;
        base = (base as u128 * base as u128 % modulus as u128) as u64;
    }
    result
}

/// Montgomery multiplication context for a fixed odd modulus.
///
/// Replaces u128 division with multiply+shift for repeated modular
/// arithmetic against the same modulus (NTT evaluates `ω^jk mod M` for
/// every `(j,k)` pair, so the fixed-modulus assumption pays for itself).
#[derive(Clone, Copy, Debug)]
pub struct MontgomeryCtx {
    pub n: u64,
    n_prime: u64,
    r_mod_n: u64,
    r2_mod_n: u64,
}

impl MontgomeryCtx {
    pub fn new(n: u64) -> Self {
        debug_assert!(n > 1 && n & 1 == 1, "Montgomery requires odd modulus > 1");

        let mut inv: u64 = 1;
        for _ in 0..6 {
            inv = inv.wrapping_mul(2u64.wrapping_sub(n.wrapping_mul(inv)));
        }
        let n_prime = inv.wrapping_neg();

        let r_mod_n = ((1u128 << 64) % n as u128) as u64;
        let r2_mod_n = ((r_mod_n as u128 * r_mod_n as u128) % n as u128) as u64;

        MontgomeryCtx {
            n,
            n_prime,
            r_mod_n,
            r2_mod_n,
        }
    }

    #[inline]
    pub fn to_mont(&self, a: u64) -> u64 {
        self.mul(a % self.n, self.r2_mod_n)
    }

    #[inline]
    pub fn from_mont(&self, a: u64) -> u64 {
        self.reduce(a as u128)
    }

    #[inline]
    fn reduce(&self, t: u128) -> u64 {
        let m = (t as u64).wrapping_mul(self.n_prime);
        let u = t + (m as u128) * (self.n as u128);
        let result = (u >> 64) as u64;
        if result >= self.n {
            result - self.n
        } else {
            result
        }
    }

    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        self.reduce((a as u128) * (b as u128))
    }

    pub fn pow_mod(&self, base: u64, mut exp: u64) -> u64 {
        let mut result = self.r_mod_n;
        let mut b = base;
        while exp > 0 {
            if exp & 1 == 1 {
                result = self.mul(result, b);
            }
            exp >>= 1;
            if exp > 0 {
                b = self.mul(b, b);
            }
        }
        result
    }

    /// Modular inverse via Fermat's little theorem (requires `n` prime).
    pub fn mod_inverse(&self, a_mont: u64) -> Option<u64> {
        if a_mont == 0 {
            return None;
        }
        Some(self.pow_mod(a_mont, self.n - 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sqrt_perfect_squares() {
        for k in 0u32..200 {
            let n = Integer::from(k) * Integer::from(k);
            assert_eq!(integer_sqrt(&n), Some(Integer::from(k)), "k={k}");
        }
    }

    #[test]
    fn integer_sqrt_floor_behavior() {
        assert_eq!(integer_sqrt(&Integer::from(8)), Some(Integer::from(2)));
        assert_eq!(integer_sqrt(&Integer::from(9)), Some(Integer::from(3)));
        assert_eq!(integer_sqrt(&Integer::from(10)), Some(Integer::from(3)));
    }

    #[test]
    fn integer_sqrt_negative_is_none() {
        assert_eq!(integer_sqrt(&Integer::from(-1)), None);
    }

    #[test]
    fn integer_sqrt_large() {
        let n = Integer::from(10).pow(40);
        let root = integer_sqrt(&n).unwrap();
        let root_sq = Integer::from(&root * &root);
        let next_sq = Integer::from(&(root.clone() + 1) * &(root.clone() + 1));
        assert!(root_sq <= n, "root^2 should not exceed n");
        assert!(next_sq > n, "(root+1)^2 should exceed n");
    }

    #[test]
    fn pow_mod_matches_known_values() {
        assert_eq!(pow_mod_u64(2, 10, 1000), 24);
        assert_eq!(pow_mod_u64(3, 4, 100), 81);
        assert_eq!(pow_mod_u64(5, 0, 7), 1);
    }

    #[test]
    fn montgomery_matches_naive_pow_mod() {
        for &p in &[97u64, 1009, 100003] {
            let ctx = MontgomeryCtx::new(p);
            for base in 1..20u64 {
                for exp in 0..30u64 {
                    let expected = pow_mod_u64(base, exp, p);
                    let got = ctx.from_mont(ctx.pow_mod(ctx.to_mont(base), exp));
                    assert_eq!(got, expected, "p={p} base={base} exp={exp}");
                }
            }
        }
    }
}
