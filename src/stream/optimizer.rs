//! # Performance Optimizer — Chunk Size, Concurrency, Buffer Tuning
//!
//! Given a [`StreamPerformanceMetrics`] snapshot, derives a chunk size, a
//! concurrency level, and a [`BufferConfig`] per spec.md §4.6.1's decision
//! rules. Every strategy's output is clamped to the configured
//! [`ThroughputBounds`] before being returned.

use serde::{Deserialize, Serialize};

use crate::config::ThroughputBounds;

/// Objective the optimizer biases its decision toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerStrategy {
    Throughput,
    Latency,
    Memory,
    Balanced,
    Custom,
}

/// A snapshot of recent stream performance, supplied by the caller (the
/// orchestrator doesn't measure these itself — it's handed them by
/// whatever instrumentation wraps the pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamPerformanceMetrics {
    /// Items per second.
    pub throughput: f64,
    pub latency_ms: f64,
    /// Fraction of the memory cap in use, `[0, 1]`.
    pub memory_usage: f64,
    /// Fraction of operations that errored, `[0, 1]`.
    pub error_rate: f64,
    /// Fraction of CPU in use, `[0, 1]`, if available.
    pub cpu_usage: Option<f64>,
}

/// Buffer sizing advice paired with the chunk/concurrency decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub capacity: usize,
    /// Occupancy fraction at which the buffer is considered "high" for
    /// backpressure purposes.
    pub high_watermark: f64,
}

/// The optimizer's output for one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationDecision {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub buffer: BufferConfig,
}

pub struct PerformanceOptimizer {
    bounds: ThroughputBounds,
    strategy: OptimizerStrategy,
}

impl PerformanceOptimizer {
    pub fn new(bounds: ThroughputBounds, strategy: OptimizerStrategy) -> Self {
        PerformanceOptimizer { bounds, strategy }
    }

    pub fn strategy(&self) -> OptimizerStrategy {
        self.strategy
    }

    pub fn optimize(&self, metrics: &StreamPerformanceMetrics) -> OptimizationDecision {
        let (chunk_size, concurrency) = match self.strategy {
            OptimizerStrategy::Throughput => self.throughput_decision(metrics),
            OptimizerStrategy::Latency => self.latency_decision(metrics),
            OptimizerStrategy::Memory => self.memory_decision(metrics),
            OptimizerStrategy::Balanced | OptimizerStrategy::Custom => {
                self.balanced_decision(metrics)
            }
        };

        OptimizationDecision {
            chunk_size: self.clamp_chunk(chunk_size),
            concurrency: concurrency.clamp(1, self.bounds.max_concurrency),
            buffer: BufferConfig {
                capacity: self.clamp_chunk(chunk_size) * concurrency.max(1),
                high_watermark: 0.8,
            },
        }
    }

    fn clamp_chunk(&self, chunk: usize) -> usize {
        chunk.clamp(self.bounds.min_chunk, self.bounds.max_chunk)
    }

    /// THROUGHPUT: prefer larger chunks (1.5x when memory pressure < 0.5);
    /// concurrency rises when cpu < 0.7 and error rate < 5%.
    fn throughput_decision(&self, m: &StreamPerformanceMetrics) -> (usize, usize) {
        let mut chunk = self.bounds.max_chunk / 2;
        if m.memory_usage < 0.5 {
            chunk = ((chunk as f64) * 1.5) as usize;
        }
        let cpu = m.cpu_usage.unwrap_or(0.5);
        let concurrency = if cpu < 0.7 && m.error_rate < 0.05 {
            self.bounds.max_concurrency
        } else {
            (self.bounds.max_concurrency / 2).max(1)
        };
        (chunk, concurrency)
    }

    /// LATENCY: start small (~2k), shrink further once latency exceeds
    /// 30ms, never below `min_chunk`.
    fn latency_decision(&self, m: &StreamPerformanceMetrics) -> (usize, usize) {
        let mut chunk = 2 * self.bounds.min_chunk.max(1);
        if m.latency_ms > 30.0 {
            chunk = (chunk / 2).max(self.bounds.min_chunk);
        }
        (chunk, self.bounds.max_concurrency.clamp(1, 4))
    }

    /// MEMORY: chunk size scales inversely with memory pressure; above
    /// 0.8 pressure, chunks halve from the midpoint baseline.
    fn memory_decision(&self, m: &StreamPerformanceMetrics) -> (usize, usize) {
        let baseline = (self.bounds.min_chunk + self.bounds.max_chunk) / 2;
        let scaled = ((baseline as f64) * (1.0 - m.memory_usage).max(0.1)) as usize;
        let chunk = if m.memory_usage > 0.8 { scaled / 2 } else { scaled };
        (chunk, (self.bounds.max_concurrency / 2).max(1))
    }

    /// BALANCED: weighted combination of throughput, latency, and memory
    /// headroom.
    fn balanced_decision(&self, m: &StreamPerformanceMetrics) -> (usize, usize) {
        let (t_chunk, t_conc) = self.throughput_decision(m);
        let (l_chunk, l_conc) = self.latency_decision(m);
        let (mem_chunk, mem_conc) = self.memory_decision(m);

        let chunk = (t_chunk + l_chunk + mem_chunk) / 3;
        let concurrency = ((t_conc + l_conc + mem_conc) as f64 / 3.0).round() as usize;
        (chunk, concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> ThroughputBounds {
        ThroughputBounds {
            min_chunk: 16,
            max_chunk: 8192,
            max_concurrency: 16,
        }
    }

    fn metrics(throughput: f64, latency_ms: f64, memory_usage: f64, error_rate: f64) -> StreamPerformanceMetrics {
        StreamPerformanceMetrics {
            throughput,
            latency_ms,
            memory_usage,
            error_rate,
            cpu_usage: Some(0.3),
        }
    }

    #[test]
    fn decision_is_always_within_bounds() {
        for strategy in [
            OptimizerStrategy::Throughput,
            OptimizerStrategy::Latency,
            OptimizerStrategy::Memory,
            OptimizerStrategy::Balanced,
        ] {
            let opt = PerformanceOptimizer::new(bounds(), strategy);
            let decision = opt.optimize(&metrics(100.0, 10.0, 0.3, 0.01));
            assert!(decision.chunk_size >= bounds().min_chunk);
            assert!(decision.chunk_size <= bounds().max_chunk);
            assert!(decision.concurrency >= 1);
            assert!(decision.concurrency <= bounds().max_concurrency);
        }
    }

    #[test]
    fn throughput_strategy_grows_chunks_under_low_memory_pressure() {
        let opt = PerformanceOptimizer::new(bounds(), OptimizerStrategy::Throughput);
        let low_pressure = opt.optimize(&metrics(100.0, 10.0, 0.1, 0.0));
        let high_pressure = opt.optimize(&metrics(100.0, 10.0, 0.9, 0.0));
        assert!(low_pressure.chunk_size >= high_pressure.chunk_size);
    }

    #[test]
    fn latency_strategy_shrinks_past_30ms() {
        let opt = PerformanceOptimizer::new(bounds(), OptimizerStrategy::Latency);
        let fast = opt.optimize(&metrics(100.0, 5.0, 0.3, 0.0));
        let slow = opt.optimize(&metrics(100.0, 50.0, 0.3, 0.0));
        assert!(slow.chunk_size <= fast.chunk_size);
        assert!(slow.chunk_size >= bounds().min_chunk);
    }

    #[test]
    fn memory_strategy_halves_chunks_above_08_pressure() {
        let opt = PerformanceOptimizer::new(bounds(), OptimizerStrategy::Memory);
        let moderate = opt.optimize(&metrics(100.0, 10.0, 0.5, 0.0));
        let pressured = opt.optimize(&metrics(100.0, 10.0, 0.9, 0.0));
        assert!(pressured.chunk_size < moderate.chunk_size);
    }

    #[test]
    fn throughput_strategy_reduces_concurrency_on_high_error_rate() {
        let opt = PerformanceOptimizer::new(bounds(), OptimizerStrategy::Throughput);
        let clean = opt.optimize(&metrics(100.0, 10.0, 0.3, 0.0));
        let erroring = opt.optimize(&metrics(100.0, 10.0, 0.3, 0.5));
        assert!(erroring.concurrency <= clean.concurrency);
    }

    #[test]
    fn optimization_decision_round_trips_through_json() {
        let opt = PerformanceOptimizer::new(bounds(), OptimizerStrategy::Balanced);
        let decision = opt.optimize(&metrics(100.0, 10.0, 0.3, 0.01));
        let json = serde_json::to_string(&decision).unwrap();
        let back: OptimizationDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, back);
    }
}
