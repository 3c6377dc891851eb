//! # NTT — Number-Theoretic Transform
//!
//! Forward and inverse DFT over ℤ/Mℤ using a primitive `n`-th root of
//! unity, built on the Montgomery modular arithmetic in [`crate::arith`].
//! Peripheral to the codec proper (§2.5's share of the whole is smallest),
//! but a first-class module: disabled entirely by configuration, and
//! strict about its domain (transform length must divide `M-1`, every
//! entry must be `< M`).

use crate::arith::MontgomeryCtx;
use crate::error::{CodecError, CodecResult};

/// Forward/inverse NTT evaluator. `enabled` mirrors `CodecConfig`'s NTT
/// flag — when clear, every operation fails `NTTDisabled` rather than
/// silently computing over a supposedly-off feature.
#[derive(Debug, Clone, Copy)]
pub struct Ntt {
    enabled: bool,
}

impl Default for Ntt {
    fn default() -> Self {
        Ntt { enabled: true }
    }
}

impl Ntt {
    pub fn new(enabled: bool) -> Self {
        Ntt { enabled }
    }

    fn check_enabled(&self) -> CodecResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(CodecError::NTTDisabled)
        }
    }

    fn validate_domain(modulus: u64, x: &[u64]) -> CodecResult<()> {
        let n = x.len() as u64;
        if n == 0 {
            return Err(CodecError::NTTDomainError {
                reason: "transform length must be nonzero".to_string(),
            });
        }
        if modulus < 2 || (modulus - 1) % n != 0 {
            return Err(CodecError::NTTDomainError {
                reason: format!("transform length {n} does not divide modulus-1 ({})", modulus - 1),
            });
        }
        if let Some(&bad) = x.iter().find(|&&v| v >= modulus) {
            return Err(CodecError::NTTDomainError {
                reason: format!("entry {bad} is not less than modulus {modulus}"),
            });
        }
        Ok(())
    }

    /// `X[k] = Σⱼ x[j] · ω^(jk) mod M`.
    pub fn forward(&self, modulus: u64, primitive_root: u64, x: &[u64]) -> CodecResult<Vec<u64>> {
        self.check_enabled()?;
        Self::validate_domain(modulus, x)?;

        let n = x.len();
        let ctx = MontgomeryCtx::new(modulus);
        let omega_mont = ctx.to_mont(primitive_root % modulus);
        let x_mont: Vec<u64> = x.iter().map(|&v| ctx.to_mont(v)).collect();

        let mut result = Vec::with_capacity(n);
        for k in 0..n {
            let mut acc_mont: u64 = 0;
            for (j, &xj_mont) in x_mont.iter().enumerate() {
                let exp = (j * k) as u64;
                let w_pow_mont = ctx.pow_mod(omega_mont, exp);
                let term_mont = ctx.mul(xj_mont, w_pow_mont);
                acc_mont = mont_add(acc_mont, term_mont, modulus);
            }
            result.push(ctx.from_mont(acc_mont));
        }
        Ok(result)
    }

    /// `x[j] = n⁻¹ · Σₖ X[k] · ω^(−jk) mod M`.
    pub fn inverse(&self, modulus: u64, primitive_root: u64, big_x: &[u64]) -> CodecResult<Vec<u64>> {
        self.check_enabled()?;
        Self::validate_domain(modulus, big_x)?;

        let n = big_x.len();
        let ctx = MontgomeryCtx::new(modulus);
        let omega_mont = ctx.to_mont(primitive_root % modulus);
        let omega_inv_mont = ctx.mod_inverse(omega_mont).ok_or_else(|| {
            CodecError::NTTDomainError {
                reason: "primitive root has no inverse modulo the modulus".to_string(),
            }
        })?;
        let n_mont = ctx.to_mont((n as u64) % modulus);
        let n_inv_mont = ctx.mod_inverse(n_mont).ok_or_else(|| CodecError::NTTDomainError {
            reason: "transform length has no inverse modulo the modulus".to_string(),
        })?;
        let x_mont: Vec<u64> = big_x.iter().map(|&v| ctx.to_mont(v)).collect();

        let mut result = Vec::with_capacity(n);
        for j in 0..n {
            let mut acc_mont: u64 = 0;
            for (k, &xk_mont) in x_mont.iter().enumerate() {
                let exp = (j * k) as u64;
                let w_pow_mont = ctx.pow_mod(omega_inv_mont, exp);
                let term_mont = ctx.mul(xk_mont, w_pow_mont);
                acc_mont = mont_add(acc_mont, term_mont, modulus);
            }
            let scaled_mont = ctx.mul(acc_mont, n_inv_mont);
            result.push(ctx.from_mont(scaled_mont));
        }
        Ok(result)
    }

    /// `inverse(forward(x)) == x`.
    pub fn verify_round_trip(
        &self,
        modulus: u64,
        primitive_root: u64,
        x: &[u64],
    ) -> CodecResult<bool> {
        let forwarded = self.forward(modulus, primitive_root, x)?;
        let inverted = self.inverse(modulus, primitive_root, &forwarded)?;
        Ok(inverted == x)
    }
}

/// Adds two values already in Montgomery form. Montgomery representation
/// scales both operands by the same constant `R`, so ordinary modular
/// addition on the representations is still correct — only multiplication
/// needs the REDC reduction.
fn mont_add(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 + b as u128) % modulus as u128) as u64
}

/// Finds the smallest transform length `>= min_length` that divides
/// `modulus - 1`, for callers picking an admissible `(modulus, n)` pair
/// rather than discovering `NTTDomainError` after the fact.
pub fn next_power_satisfying_modulus(modulus: u64, min_length: u64) -> Option<u64> {
    if modulus < 2 || min_length == 0 {
        return None;
    }
    let m_minus_1 = modulus - 1;
    (min_length..=m_minus_1).find(|&n| m_minus_1 % n == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // modulus=17 is prime, 17-1=16; 3 is a primitive root of 17, and
    // 3^(16/4) mod 17 = 13 is a primitive 4th root of unity.
    const M: u64 = 17;
    const OMEGA4: u64 = 13;

    #[test]
    fn prop_round_trip() {
        let ntt = Ntt::new(true);
        let x = vec![1u64, 2, 3, 4];
        assert!(ntt.verify_round_trip(M, OMEGA4, &x).unwrap());
    }

    proptest! {
        #[test]
        fn prop_round_trip_inverse_of_forward_is_identity(x in prop::collection::vec(0u64..M, 4..=4)) {
            let ntt = Ntt::new(true);
            prop_assert!(ntt.verify_round_trip(M, OMEGA4, &x).unwrap());
        }
    }

    #[test]
    fn forward_then_inverse_recovers_input() {
        let ntt = Ntt::new(true);
        let x = vec![5u64, 0, 16, 8];
        let forwarded = ntt.forward(M, OMEGA4, &x).unwrap();
        let inverted = ntt.inverse(M, OMEGA4, &forwarded).unwrap();
        assert_eq!(inverted, x);
    }

    #[test]
    fn disabled_fails_all_three_operations() {
        let ntt = Ntt::new(false);
        let x = vec![1u64, 2, 3, 4];
        assert!(matches!(ntt.forward(M, OMEGA4, &x), Err(CodecError::NTTDisabled)));
        assert!(matches!(ntt.inverse(M, OMEGA4, &x), Err(CodecError::NTTDisabled)));
        assert!(matches!(
            ntt.verify_round_trip(M, OMEGA4, &x),
            Err(CodecError::NTTDisabled)
        ));
    }

    #[test]
    fn length_not_dividing_modulus_minus_one_fails_domain() {
        let ntt = Ntt::new(true);
        let x = vec![1u64, 2, 3]; // 3 does not divide 16
        assert!(matches!(
            ntt.forward(M, OMEGA4, &x),
            Err(CodecError::NTTDomainError { .. })
        ));
    }

    #[test]
    fn entry_at_or_above_modulus_fails_domain() {
        let ntt = Ntt::new(true);
        let x = vec![1u64, 2, 3, 17]; // 17 == modulus
        assert!(matches!(
            ntt.forward(M, OMEGA4, &x),
            Err(CodecError::NTTDomainError { .. })
        ));
    }

    #[test]
    fn next_power_satisfying_modulus_finds_divisor() {
        assert_eq!(next_power_satisfying_modulus(17, 3), Some(4));
        assert_eq!(next_power_satisfying_modulus(17, 5), Some(8));
        assert_eq!(next_power_satisfying_modulus(17, 17), None);
    }
}
