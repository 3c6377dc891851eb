//! # Memory Manager — Named Buffer Tracking and Growth Limits
//!
//! Tracks named buffers registered by pipeline stages, enforces
//! `max_memory_bytes` in aggregate, and rejects any single buffer's
//! growth beyond `max_growth_factor` of its last checkpointed size.
//! Registration, update, and release are total functions: an invalid
//! request returns a [`StreamError::MemoryPressure`], never a panic.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::MemoryLimits;
use crate::error::{StreamError, StreamResult};

/// Adaptive-shrink strategy a caller can request when the manager
/// reports sustained pressure; see [`MemoryManager::shrink_under_pressure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkStrategy {
    /// Shrink only when strictly necessary, by the smallest amount.
    Conservative,
    /// Shrink oversized buffers by half.
    Balanced,
    /// Shrink every tracked buffer back to its floor immediately.
    Aggressive,
    /// Scale the shrink factor to how far over the soft cap usage is.
    Adaptive,
}

struct BufferEntry {
    size_bytes: u64,
    last_checkpoint_bytes: u64,
    floor_bytes: u64,
}

/// Registered-buffer ledger plus the aggregate cap.
pub struct MemoryManager {
    limits: MemoryLimits,
    buffers: Mutex<HashMap<String, BufferEntry>>,
}

impl MemoryManager {
    pub fn new(limits: MemoryLimits) -> Self {
        MemoryManager {
            limits,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new named buffer at `initial_bytes`. Re-registering an
    /// existing name resets its tracked size.
    pub fn register_buffer(&self, name: &str, initial_bytes: u64) -> StreamResult<()> {
        let mut buffers = self.buffers.lock();
        let total_without_this: u64 = buffers
            .iter()
            .filter(|(k, _)| k.as_str() != name)
            .map(|(_, v)| v.size_bytes)
            .sum();
        if total_without_this + initial_bytes > self.limits.max_memory_bytes {
            return Err(StreamError::MemoryPressure {
                reason: format!(
                    "registering buffer '{name}' at {initial_bytes} bytes would exceed the \
                     {} byte cap ({total_without_this} already in use)",
                    self.limits.max_memory_bytes
                ),
            });
        }
        buffers.insert(
            name.to_string(),
            BufferEntry {
                size_bytes: initial_bytes,
                last_checkpoint_bytes: initial_bytes.max(1),
                floor_bytes: initial_bytes,
            },
        );
        Ok(())
    }

    /// Updates a registered buffer's size. Rejected if it would grow more
    /// than `max_growth_factor` past its last checkpoint, or push
    /// aggregate usage past the cap.
    pub fn update_buffer(&self, name: &str, new_size_bytes: u64) -> StreamResult<()> {
        let mut buffers = self.buffers.lock();
        let total_others: u64 = buffers
            .iter()
            .filter(|(k, _)| k.as_str() != name)
            .map(|(_, v)| v.size_bytes)
            .sum();

        let entry = buffers
            .get_mut(name)
            .ok_or_else(|| StreamError::MemoryPressure {
                reason: format!("buffer '{name}' is not registered"),
            })?;

        let growth_cap = (entry.last_checkpoint_bytes as f64 * self.limits.max_growth_factor) as u64;
        if new_size_bytes > growth_cap {
            return Err(StreamError::MemoryPressure {
                reason: format!(
                    "buffer '{name}' growth to {new_size_bytes} exceeds {}x cap ({growth_cap})",
                    self.limits.max_growth_factor
                ),
            });
        }
        if total_others + new_size_bytes > self.limits.max_memory_bytes {
            return Err(StreamError::MemoryPressure {
                reason: format!(
                    "buffer '{name}' growth to {new_size_bytes} would exceed the {} byte cap",
                    self.limits.max_memory_bytes
                ),
            });
        }

        entry.size_bytes = new_size_bytes;
        entry.last_checkpoint_bytes = new_size_bytes.max(1);
        Ok(())
    }

    /// Releases a registered buffer, freeing its share of the aggregate
    /// cap. Releasing an unknown name is a no-op, not an error — callers
    /// may release defensively during cleanup.
    pub fn release_buffer(&self, name: &str) {
        self.buffers.lock().remove(name);
    }

    pub fn total_usage_bytes(&self) -> u64 {
        self.buffers.lock().values().map(|v| v.size_bytes).sum()
    }

    pub fn usage_fraction(&self) -> f64 {
        if self.limits.max_memory_bytes == 0 {
            return 1.0;
        }
        self.total_usage_bytes() as f64 / self.limits.max_memory_bytes as f64
    }

    /// Shrinks every tracked buffer according to `strategy`, returning the
    /// number of bytes freed in aggregate. Buffers never shrink below
    /// their registered floor.
    pub fn shrink_under_pressure(&self, strategy: ShrinkStrategy) -> u64 {
        let pressure = self.usage_fraction();
        let mut buffers = self.buffers.lock();
        let mut freed = 0u64;

        for (name, entry) in buffers.iter_mut() {
            let factor: f64 = match strategy {
                ShrinkStrategy::Conservative => 0.9,
                ShrinkStrategy::Balanced => 0.5,
                ShrinkStrategy::Aggressive => 0.0,
                ShrinkStrategy::Adaptive => (1.0 - pressure).clamp(0.0, 1.0),
            };
            let target = ((entry.size_bytes as f64) * factor).max(entry.floor_bytes as f64) as u64;
            if target < entry.size_bytes {
                freed += entry.size_bytes - target;
                warn!(
                    target: "primechunk::stream::memory",
                    buffer = name.as_str(),
                    from = entry.size_bytes,
                    to = target,
                    "buffer shrunk under memory pressure"
                );
                entry.size_bytes = target;
                entry.last_checkpoint_bytes = target.max(1);
            }
        }
        freed
    }
}
