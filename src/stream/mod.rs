//! # Stream Orchestrator
//!
//! Ties the backpressure controller, memory manager, performance
//! optimizer, and resilience wrappers around the codec layers to process
//! chunk sequences at scale: batched integrity verification, bounded
//! parallel partitioned execution, and a pull-based [`ChunkStream`]
//! combinator surface (map/filter/take/skip/reduce/forEach/concat) over
//! async iterators of chunks.
//!
//! Concurrency is governed the way a `tokio::sync::Semaphore` governs
//! per-file worker pools elsewhere in this lineage: a fixed number of
//! permits bounds how many chunks are in flight at once, so `parallel(n)`
//! never oversubscribes the caller's machine regardless of how many items
//! are queued.

pub mod adapter;
pub mod backpressure;
pub mod memory;
pub mod optimizer;
pub mod resilience;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rug::Integer;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::checksum::ChecksumCache;
use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::metrics::{BackpressureLevelLabel, CodecMetrics};
use crate::registry::PrimeRegistry;

use adapter::{verify_batch, AdapterStats, ChunkVerification};
use backpressure::BackpressureController;
use memory::MemoryManager;
use optimizer::{OptimizationDecision, PerformanceOptimizer, StreamPerformanceMetrics};
use resilience::{CircuitBreaker, RateLimiter};

/// A cooperative cancellation flag shared between a driver and whatever
/// long-running `parallel`/`batch_verify` call it wants to interrupt. Once
/// set, in-flight work finishes its current item but no new item starts.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything the stream orchestrator wires together: the codec's shared
/// registry and checksum cache, plus the orchestrator's own flow-control,
/// memory, optimizer, and resilience state.
pub struct StreamOrchestrator {
    registry: Arc<PrimeRegistry>,
    checksum_cache: Arc<ChecksumCache>,
    config: StreamConfig,
    pub backpressure: BackpressureController,
    pub memory: MemoryManager,
    pub optimizer: PerformanceOptimizer,
    pub circuit_breaker: CircuitBreaker,
    pub rate_limiter: Option<RateLimiter>,
    concurrency: Arc<Semaphore>,
    metrics: Option<Arc<CodecMetrics>>,
}

impl StreamOrchestrator {
    pub fn new(registry: Arc<PrimeRegistry>, checksum_cache: Arc<ChecksumCache>, config: StreamConfig) -> Self {
        let rate_limiter = config.resilience.rate_limit_per_sec.map(RateLimiter::new);
        let circuit_breaker = CircuitBreaker::new(config.resilience);
        let backpressure = BackpressureController::new(config.backpressure);
        let memory = MemoryManager::new(config.memory);
        let optimizer = PerformanceOptimizer::new(config.throughput, config.optimizer_strategy);
        let concurrency = Arc::new(Semaphore::new(config.throughput.max_concurrency));

        StreamOrchestrator {
            registry,
            checksum_cache,
            config,
            backpressure,
            memory,
            optimizer,
            circuit_breaker,
            rate_limiter,
            concurrency,
            metrics: None,
        }
    }

    /// Attaches a metrics handle this orchestrator reports
    /// `batch_verifications`, `batch_chunks_invalid`, and
    /// `backpressure_transitions` to.
    pub fn with_metrics(mut self, metrics: Arc<CodecMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PrimeRegistry> {
        &self.registry
    }

    pub fn checksum_cache(&self) -> &Arc<ChecksumCache> {
        &self.checksum_cache
    }

    /// Re-derives an [`OptimizationDecision`] from a fresh metrics
    /// snapshot, useful for periodically re-tuning chunk size and
    /// concurrency as throughput/latency/memory conditions change.
    pub fn retune(&self, metrics: &StreamPerformanceMetrics) -> OptimizationDecision {
        self.optimizer.optimize(metrics)
    }

    /// Verifies `values` in batches of `config.batch_size`, honoring
    /// `config.fail_fast` within each batch. Returns every
    /// [`ChunkVerification`] produced plus the aggregate [`AdapterStats`].
    /// A cancelled token stops the run between batches without losing
    /// results already collected.
    pub fn batch_verify(
        &self,
        values: &[Integer],
        cancellation: &CancellationToken,
    ) -> (Vec<ChunkVerification>, AdapterStats) {
        let mut all_results = Vec::with_capacity(values.len());
        let mut all_stats = AdapterStats::default();

        for (batch_index, chunk) in values.chunks(self.config.batch_size.max(1)).enumerate() {
            if cancellation.is_cancelled() {
                info!(
                    target: "primechunk::stream",
                    batch_index,
                    "batch verification cancelled before batch started"
                );
                break;
            }

            let (results, stats) = verify_batch(
                chunk,
                &self.registry,
                self.config_k(),
                self.config.fail_fast,
            );
            debug!(
                target: "primechunk::stream",
                batch_index,
                invalid = stats.invalid,
                "batch verified"
            );

            let stop_after_batch = self.config.fail_fast && stats.invalid > 0;
            all_results.extend(results);
            all_stats.total += stats.total;
            all_stats.valid += stats.valid;
            all_stats.invalid += stats.invalid;
            all_stats.total_elapsed_micros += stats.total_elapsed_micros;

            if stop_after_batch {
                break;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.batch_verifications.inc();
            metrics.batch_chunks_invalid.inc_by(all_stats.invalid);
        }

        (all_results, all_stats)
    }

    fn config_k(&self) -> u32 {
        crate::checksum::DEFAULT_K
    }

    /// Feeds a buffer-occupancy reading into [`BackpressureController`],
    /// recording the reached level's gauge and, on a rising transition, a
    /// `backpressure_transitions` count for that level.
    pub fn update_occupancy(&self, occupancy: f64) -> Option<backpressure::Level> {
        let reached = self.backpressure.update_occupancy(occupancy);
        if let Some(metrics) = &self.metrics {
            metrics.buffer_occupancy_percent.set(occupancy * 100.0);
            if let Some(level) = reached {
                metrics
                    .backpressure_transitions
                    .get_or_create(&BackpressureLevelLabel {
                        level: level.as_str().to_string(),
                    })
                    .inc();
            }
        }
        reached
    }

    /// Runs `op` over `items` with at most `self.concurrency`'s permit
    /// count in flight at once. Ordering is preserved within the returned
    /// `Vec` (each result lands at its original index), matching spec.md
    /// §4.6's "ordering preserved within partition, not across" guarantee
    /// for a single call — callers needing cross-partition ordering must
    /// sequence multiple `parallel` calls themselves.
    pub async fn parallel<T, F, Fut>(&self, items: Vec<T>, op: F) -> StreamResult<Vec<StreamResult<Integer>>>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StreamResult<Integer>> + Send + 'static,
    {
        let op = Arc::new(op);
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            self.circuit_breaker.guard()?;
            if let Some(limiter) = &self.rate_limiter {
                limiter.try_acquire()?;
            }

            let permit = Arc::clone(&self.concurrency)
                .acquire_owned()
                .await
                .map_err(|_| StreamError::Cancelled)?;
            let op = Arc::clone(&op);
            let fut = op(item);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                fut.await
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(r) => results.push(r),
                Err(_) => results.push(Err(StreamError::Cancelled)),
            }
        }
        Ok(results)
    }
}

/// A pull-based, cancellable chunk stream built over an in-memory sequence.
/// Mirrors the handful of combinators spec.md §4.6 calls out by name —
/// `map`/`filter`/`take`/`skip` stay lazy until `to_vec`/`reduce`/`for_each`
/// drives the sequence; `concat` and `branch` compose whole streams.
pub struct ChunkStream<T> {
    items: Vec<T>,
    cancellation: CancellationToken,
}

impl<T: Clone> ChunkStream<T> {
    pub fn new(items: Vec<T>) -> Self {
        ChunkStream {
            items,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(items: Vec<T>, cancellation: CancellationToken) -> Self {
        ChunkStream { items, cancellation }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn map<U: Clone>(self, f: impl Fn(T) -> U) -> ChunkStream<U> {
        ChunkStream {
            items: self.items.into_iter().map(f).collect(),
            cancellation: self.cancellation,
        }
    }

    pub fn filter(self, pred: impl Fn(&T) -> bool) -> ChunkStream<T> {
        ChunkStream {
            items: self.items.into_iter().filter(pred).collect(),
            cancellation: self.cancellation,
        }
    }

    pub fn take(self, n: usize) -> ChunkStream<T> {
        ChunkStream {
            items: self.items.into_iter().take(n).collect(),
            cancellation: self.cancellation,
        }
    }

    pub fn skip(self, n: usize) -> ChunkStream<T> {
        ChunkStream {
            items: self.items.into_iter().skip(n).collect(),
            cancellation: self.cancellation,
        }
    }

    /// Concatenates `other` after `self`, keeping `self`'s cancellation
    /// token.
    pub fn concat(mut self, other: ChunkStream<T>) -> ChunkStream<T> {
        self.items.extend(other.items);
        self
    }

    /// Splits the stream into `n` independent branches over disjoint
    /// slices (round-robin by index), each carrying a clone of the
    /// cancellation token so cancelling one stops all of them.
    pub fn branch(self, n: usize) -> Vec<ChunkStream<T>> {
        let n = n.max(1);
        let mut branches: Vec<Vec<T>> = (0..n).map(|_| Vec::new()).collect();
        for (i, item) in self.items.into_iter().enumerate() {
            branches[i % n].push(item);
        }
        branches
            .into_iter()
            .map(|items| ChunkStream::with_cancellation(items, self.cancellation.clone()))
            .collect()
    }

    /// Drives the stream to completion, stopping early if the
    /// cancellation token is set between items.
    pub fn to_vec(self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.items.len());
        for item in self.items {
            if self.cancellation.is_cancelled() {
                break;
            }
            out.push(item);
        }
        out
    }

    pub fn reduce<U>(self, init: U, f: impl Fn(U, T) -> U) -> U {
        let mut acc = init;
        for item in self.items {
            if self.cancellation.is_cancelled() {
                break;
            }
            acc = f(acc, item);
        }
        acc
    }

    pub fn for_each(self, mut f: impl FnMut(T)) {
        for item in self.items {
            if self.cancellation.is_cancelled() {
                break;
            }
            f(item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
