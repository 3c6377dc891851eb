//! # Config — Explicit Configuration Structs
//!
//! Two plain `Clone` structs threaded through constructors rather than
//! loaded from a file or environment: [`CodecConfig`] for the registry /
//! checksum / encoding / NTT layers, [`StreamConfig`] for the orchestrator.
//! Loading either from TOML or env vars is the named peripheral
//! (configuration loaders) and stays outside this crate — callers build
//! these structs however they like and pass them to `Encoder::new`,
//! `StreamOrchestrator::new`, and friends.

use crate::error::{CodecError, CodecResult};
use crate::stream::optimizer::OptimizerStrategy;

/// Maximum payload digit exponent `encoding` ever emits (see that module's
/// doc comment). `CodecConfig::k` must exceed this.
pub const MAX_PAYLOAD_EXPONENT: u32 = 5;

/// Checksum power, NTT enable flag, and the checksum cache capacity used
/// by `checksum::ChecksumCache`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Checksum power `k`. MUST be >= 2 and > [`MAX_PAYLOAD_EXPONENT`].
    pub k: u32,
    /// Whether NTT operations are permitted; `false` makes every NTT
    /// operation fail `NTTDisabled`.
    pub ntt_enabled: bool,
    /// Capacity of the checksum derivation cache.
    pub checksum_cache_capacity: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            k: crate::checksum::DEFAULT_K,
            ntt_enabled: true,
            checksum_cache_capacity: 4096,
        }
    }
}

impl CodecConfig {
    /// Validates `k >= 2` and `k > MAX_PAYLOAD_EXPONENT`; everything else
    /// about this struct is unconditionally valid.
    pub fn validate(&self) -> CodecResult<()> {
        if self.k < 2 || self.k <= MAX_PAYLOAD_EXPONENT {
            return Err(CodecError::ConfigurationError {
                reason: format!(
                    "checksum power k={} must be >= 2 and > max payload exponent {}",
                    self.k, MAX_PAYLOAD_EXPONENT
                ),
            });
        }
        Ok(())
    }
}

/// Backpressure thresholds, as fractions of buffer occupancy in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackpressureThresholds {
    pub warning: f64,
    pub critical: f64,
    pub blocking: f64,
    /// Occupancy at or below which an auto-paused pipeline is eligible to
    /// resume (policy (a) of spec.md §4.6's open question).
    pub release: f64,
}

impl Default for BackpressureThresholds {
    fn default() -> Self {
        BackpressureThresholds {
            warning: 0.5,
            critical: 0.8,
            blocking: 0.95,
            release: 0.5,
        }
    }
}

/// Memory manager limits: a soft cap and the maximum allowed growth
/// factor for any single registered buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryLimits {
    pub max_memory_bytes: u64,
    pub max_growth_factor: f64,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        MemoryLimits {
            max_memory_bytes: 256 * 1024 * 1024,
            max_growth_factor: 2.0,
        }
    }
}

/// Chunk-size and concurrency bounds the performance optimizer must stay
/// within, regardless of strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputBounds {
    pub min_chunk: usize,
    pub max_chunk: usize,
    pub max_concurrency: usize,
}

impl Default for ThroughputBounds {
    fn default() -> Self {
        ThroughputBounds {
            min_chunk: 16,
            max_chunk: 8192,
            max_concurrency: 16,
        }
    }
}

/// Resilience policy knobs for the optional rate limiter, circuit
/// breaker, and retry wrapper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResilienceConfig {
    pub rate_limit_per_sec: Option<u32>,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_after_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        ResilienceConfig {
            rate_limit_per_sec: None,
            circuit_failure_threshold: 5,
            circuit_reset_after_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 50,
        }
    }
}

/// Everything the Stream Orchestrator needs at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub backpressure: BackpressureThresholds,
    pub memory: MemoryLimits,
    pub throughput: ThroughputBounds,
    pub optimizer_strategy: OptimizerStrategy,
    pub resilience: ResilienceConfig,
    /// Number of chunks a batch-verification call processes as one group.
    pub batch_size: usize,
    /// `fail_fast` aborts a batch on its first invalid chunk instead of
    /// reporting every chunk's status.
    pub fail_fast: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            backpressure: BackpressureThresholds::default(),
            memory: MemoryLimits::default(),
            throughput: ThroughputBounds::default(),
            optimizer_strategy: OptimizerStrategy::Balanced,
            resilience: ResilienceConfig::default(),
            batch_size: 64,
            fail_fast: false,
        }
    }
}
