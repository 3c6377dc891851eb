//! # primechunk — Prime-Factorization Data Codec & Processing Stack
//!
//! Values — text characters, VM opcodes, block headers, spectral-transform
//! headers — are encoded as positive integers whose prime factorizations
//! carry structured meaning, with a self-describing integrity checksum
//! embedded as a high-exponent prime factor. A small stack VM interprets
//! sequences of decoded chunks; a streaming layer pipes chunks through
//! backpressure-aware, memory-bounded pipelines.
//!
//! ## Module organization
//!
//! **Core codec** (leaves first):
//! - [`registry`] — append-only indexed prime table: enumeration, primality,
//!   factorization, integer square root.
//! - [`checksum`] — XOR-based prime-index checksum: derive, attach, extract,
//!   verify, batch-verify.
//! - [`encoding`] — chunk ↔ integer mapping built on the two modules above.
//! - [`vm`] — the stack machine that executes decoded `OPERATION` chunks.
//! - [`ntt`] — forward/inverse number-theoretic transform with round-trip
//!   verification.
//! - [`stream`] — the async, backpressure-aware orchestrator tying the codec
//!   to bulk chunk sequences: [`stream::backpressure`], [`stream::memory`],
//!   [`stream::optimizer`], [`stream::resilience`], [`stream::adapter`].
//! - [`cache`] — the generic LRU(+TTL) eviction substrate `registry` and
//!   `checksum` build their caches on.
//!
//! **Ambient**:
//! - [`error`] — the unified [`error::CodecError`]/[`error::StreamError`]
//!   taxonomy.
//! - [`config`] — [`config::CodecConfig`]/[`config::StreamConfig`], threaded
//!   explicitly through constructors rather than loaded from a file or env.
//! - [`wire`] — the length-prefixed big-endian wire format and the registry
//!   snapshot format.
//! - [`metrics`] — in-process Prometheus-style counters/gauges.
//! - [`arith`] — shared bigint helpers (`integer_sqrt`, Montgomery modular
//!   arithmetic) `registry` and `ntt` build on.
//!
//! ## Composing a codec
//!
//! Registry, checksum cache, encoder, and NTT evaluator are explicit
//! handles composed once by [`Codec::new`] and threaded through from
//! there — no global module instance anywhere in the crate.
//!
//! ```
//! use primechunk::{Codec, config::CodecConfig};
//!
//! let codec = Codec::new(CodecConfig::default()).expect("default config is valid");
//! let chunks = codec.encoder().encode_text("Hi").unwrap();
//! assert_eq!(codec.encoder().decode_text(&chunks).unwrap(), "Hi");
//! ```

pub mod arith;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod ntt;
pub mod registry;
pub mod stream;
pub mod vm;
pub mod wire;

use std::sync::Arc;

use rug::Integer;

use checksum::ChecksumCache;
use config::{CodecConfig, StreamConfig};
use encoding::Encoder;
use error::{CodecError, CodecResult};
use metrics::CodecMetrics;
use ntt::Ntt;
use registry::PrimeRegistry;
use stream::StreamOrchestrator;
use vm::Vm;

/// Composes the registry, checksum cache, encoder, VM, and NTT evaluator
/// that share a single `CodecConfig`. Cheap to construct; expensive state
/// (the prime table, the checksum cache) lives behind `Arc` so a `Codec`
/// clones cheaply and can be shared across threads or handed to a
/// [`StreamOrchestrator`].
pub struct Codec {
    registry: Arc<PrimeRegistry>,
    checksum_cache: Arc<ChecksumCache>,
    encoder: Encoder,
    ntt: Ntt,
    metrics: Arc<CodecMetrics>,
    config: CodecConfig,
}

impl Codec {
    /// Validates `config`, then builds a fresh registry, checksum cache,
    /// encoder, and NTT evaluator around it.
    pub fn new(config: CodecConfig) -> CodecResult<Self> {
        config.validate()?;
        let registry = Arc::new(PrimeRegistry::new());
        let checksum_cache = Arc::new(ChecksumCache::new(config.checksum_cache_capacity));
        let metrics = Arc::new(CodecMetrics::new());
        let encoder = Encoder::new(Arc::clone(&registry), config.k)?.with_metrics(Arc::clone(&metrics));
        let ntt = Ntt::new(config.ntt_enabled);

        Ok(Codec {
            registry,
            checksum_cache,
            encoder,
            ntt,
            metrics,
            config,
        })
    }

    /// Builds a `Codec` sharing an existing registry and checksum cache —
    /// the shape a [`StreamOrchestrator`] or a multi-codec embedding needs
    /// when several encoders must agree on the same prime table.
    pub fn with_shared_state(
        config: CodecConfig,
        registry: Arc<PrimeRegistry>,
        checksum_cache: Arc<ChecksumCache>,
    ) -> CodecResult<Self> {
        config.validate()?;
        let metrics = Arc::new(CodecMetrics::new());
        let encoder = Encoder::new(Arc::clone(&registry), config.k)?.with_metrics(Arc::clone(&metrics));
        let ntt = Ntt::new(config.ntt_enabled);

        Ok(Codec {
            registry,
            checksum_cache,
            encoder,
            ntt,
            metrics,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<PrimeRegistry> {
        &self.registry
    }

    pub fn checksum_cache(&self) -> &Arc<ChecksumCache> {
        &self.checksum_cache
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn ntt(&self) -> &Ntt {
        &self.ntt
    }

    pub fn metrics(&self) -> &Arc<CodecMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Builds a [`StreamOrchestrator`] that shares this codec's registry
    /// and checksum cache.
    pub fn orchestrator(&self, stream_config: StreamConfig) -> StreamOrchestrator {
        StreamOrchestrator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.checksum_cache),
            stream_config,
        )
        .with_metrics(Arc::clone(&self.metrics))
    }

    /// Encodes `ops` into OPERATION chunks, decodes them back, and
    /// executes the resulting program on a fresh [`Vm`] — the §6 external
    /// interface's `executeProgram([op]) → [string]` composed from the
    /// encoding and VM layers, recording a metrics observation either way.
    pub fn execute_program(&self, ops: &[(u8, Option<u32>)]) -> CodecResult<Vec<String>> {
        let encoded = self.encoder.encode_program(ops)?;
        let decoded = encoded
            .iter()
            .map(|v| self.encoder.decode_chunk(v).map(|d| d.chunk))
            .collect::<CodecResult<Vec<_>>>()?;

        let mut vm = Vm::new();
        let result = vm.execute(&decoded);
        self.metrics.vm_executions.inc();
        if result.is_err() {
            self.metrics.vm_faults.inc();
        }
        result
    }

    /// Convenience wrapper over [`registry::PrimeRegistry::factor`] for
    /// callers holding a `Codec` rather than its registry directly.
    pub fn factor(&self, n: &Integer) -> CodecResult<Vec<(Integer, u32)>> {
        self.registry.factor(n)
    }
}
