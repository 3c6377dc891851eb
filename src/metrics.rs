//! # Metrics — In-Process Operational Counters and Gauges
//!
//! Exposes codec and stream activity in the Prometheus text exposition
//! format, the same `prometheus-client` shape this lineage's coordinator
//! metrics use — `Family`/`Counter`/`Gauge` registered once, updated from
//! any thread, rendered on demand with [`CodecMetrics::encode`]. No HTTP
//! scrape endpoint ships here (that's the named CLI/HTTP peripheral);
//! `encode()` just renders the current registry state for a caller that
//! wants to serve or log it.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

/// Label set distinguishing codec-layer counters by chunk kind
/// (`"data"`, `"operation"`, `"block_header"`, `"ntt_header"`).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChunkKindLabel {
    pub kind: String,
}

/// Label set distinguishing backpressure level transitions.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackpressureLevelLabel {
    pub level: String,
}

/// Thread-safe metrics registry for codec and stream-orchestrator
/// activity. All fields use atomic types and are safe to update from any
/// thread or async task.
pub struct CodecMetrics {
    pub registry: Registry,
    pub chunks_encoded: Family<ChunkKindLabel, Counter>,
    pub chunks_decoded: Family<ChunkKindLabel, Counter>,
    pub checksum_mismatches: Counter,
    pub batch_verifications: Counter,
    pub batch_chunks_invalid: Counter,
    pub backpressure_transitions: Family<BackpressureLevelLabel, Counter>,
    pub buffer_occupancy_percent: Gauge<f64, AtomicU64>,
    pub memory_usage_bytes: Gauge,
    pub vm_executions: Counter,
    pub vm_faults: Counter,
}

impl CodecMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let chunks_encoded = Family::<ChunkKindLabel, Counter>::default();
        registry.register(
            "primechunk_chunks_encoded",
            "Total chunks encoded, by kind",
            chunks_encoded.clone(),
        );

        let chunks_decoded = Family::<ChunkKindLabel, Counter>::default();
        registry.register(
            "primechunk_chunks_decoded",
            "Total chunks decoded, by kind",
            chunks_decoded.clone(),
        );

        let checksum_mismatches = Counter::default();
        registry.register(
            "primechunk_checksum_mismatches",
            "Total checksum verification failures",
            checksum_mismatches.clone(),
        );

        let batch_verifications = Counter::default();
        registry.register(
            "primechunk_batch_verifications",
            "Total batch-verification runs completed",
            batch_verifications.clone(),
        );

        let batch_chunks_invalid = Counter::default();
        registry.register(
            "primechunk_batch_chunks_invalid",
            "Total chunks found invalid across all batch-verification runs",
            batch_chunks_invalid.clone(),
        );

        let backpressure_transitions = Family::<BackpressureLevelLabel, Counter>::default();
        registry.register(
            "primechunk_backpressure_transitions",
            "Total backpressure level transitions, by level reached",
            backpressure_transitions.clone(),
        );

        let buffer_occupancy_percent = Gauge::<f64, AtomicU64>::default();
        registry.register(
            "primechunk_buffer_occupancy_percent",
            "Current stream buffer occupancy as a percentage",
            buffer_occupancy_percent.clone(),
        );

        let memory_usage_bytes = Gauge::default();
        registry.register(
            "primechunk_memory_usage_bytes",
            "Current memory manager usage in bytes",
            memory_usage_bytes.clone(),
        );

        let vm_executions = Counter::default();
        registry.register(
            "primechunk_vm_executions",
            "Total stack VM program executions",
            vm_executions.clone(),
        );

        let vm_faults = Counter::default();
        registry.register(
            "primechunk_vm_faults",
            "Total stack VM executions that aborted with a fault",
            vm_faults.clone(),
        );

        Self {
            registry,
            chunks_encoded,
            chunks_decoded,
            checksum_mismatches,
            batch_verifications,
            batch_chunks_invalid,
            backpressure_transitions,
            buffer_occupancy_percent,
            memory_usage_bytes,
            vm_executions,
            vm_faults,
        }
    }

    /// Renders all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).expect("encoding metrics should not fail");
        buf
    }
}

impl Default for CodecMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_returns_valid_text() {
        let m = CodecMetrics::new();
        m.chunks_encoded
            .get_or_create(&ChunkKindLabel {
                kind: "data".to_string(),
            })
            .inc();
        m.buffer_occupancy_percent.set(42.5);

        let output = m.encode();
        assert!(output.contains("primechunk_chunks_encoded"));
        assert!(output.contains("primechunk_buffer_occupancy_percent"));
        assert!(output.contains("data"));
    }

    #[test]
    fn per_kind_counters_are_independent() {
        let m = CodecMetrics::new();
        m.chunks_encoded
            .get_or_create(&ChunkKindLabel {
                kind: "data".to_string(),
            })
            .inc_by(3);
        m.chunks_encoded
            .get_or_create(&ChunkKindLabel {
                kind: "operation".to_string(),
            })
            .inc_by(7);

        let output = m.encode();
        assert!(output.contains("data"));
        assert!(output.contains("operation"));
    }

    #[test]
    fn default_state_still_registers_all_metrics() {
        let m = CodecMetrics::new();
        let output = m.encode();
        assert!(output.contains("primechunk_checksum_mismatches"));
        assert!(output.contains("primechunk_vm_executions"));
        assert!(output.contains("primechunk_memory_usage_bytes"));
    }
}
