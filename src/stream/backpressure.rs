//! # Backpressure — Occupancy-Driven Flow Control
//!
//! A small state machine over buffer occupancy in `[0, 1]`:
//! `NORMAL -> WARNING -> CRITICAL -> BLOCKED`, crossing the blocking
//! threshold auto-pauses the producer. This implementation resolves
//! spec.md §4.6's open question with policy (a): after an auto-pause, the
//! pipeline becomes eligible to resume once occupancy falls at or below
//! the release threshold **and** no registered pressure callback vetoes
//! it — `resume()` is still available to force an earlier, explicit
//! resume regardless of occupancy.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::BackpressureThresholds;

/// The controller's current flow-control level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Normal,
    Warning,
    Critical,
    Blocked,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Normal => "normal",
            Level::Warning => "warning",
            Level::Critical => "critical",
            Level::Blocked => "blocked",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Level::Normal => 0,
            Level::Warning => 1,
            Level::Critical => 2,
            Level::Blocked => 3,
        }
    }
}

/// A callback consulted before an auto-resume; returning `true` vetoes
/// (keeps the pipeline paused) the resume attempt.
pub type PressureVeto = Arc<dyn Fn() -> bool + Send + Sync>;

struct Inner {
    level: Level,
    paused: bool,
    occupancy: f64,
}

/// Tracks buffer occupancy updates and derives the current backpressure
/// level and pause state from them. Cheap to clone (an internal `Arc`
/// would be added by a caller that needs to share one across tasks — this
/// type itself holds only a lock-guarded state struct plus the vetoes).
pub struct BackpressureController {
    thresholds: BackpressureThresholds,
    inner: RwLock<Inner>,
    vetoes: RwLock<Vec<PressureVeto>>,
}

impl BackpressureController {
    pub fn new(thresholds: BackpressureThresholds) -> Self {
        BackpressureController {
            thresholds,
            inner: RwLock::new(Inner {
                level: Level::Normal,
                paused: false,
                occupancy: 0.0,
            }),
            vetoes: RwLock::new(Vec::new()),
        }
    }

    pub fn register_pressure_veto(&self, veto: PressureVeto) {
        self.vetoes.write().push(veto);
    }

    pub fn level(&self) -> Level {
        self.inner.read().level
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused
    }

    pub fn occupancy(&self) -> f64 {
        self.inner.read().occupancy
    }

    /// Feeds a new occupancy reading in. Returns the level reached if this
    /// update raised the level (a rising transition fires its event;
    /// falling occupancy alone never fires one — only an explicit or
    /// policy-driven resume clears `BLOCKED`).
    pub fn update_occupancy(&self, occupancy: f64) -> Option<Level> {
        let occupancy = occupancy.clamp(0.0, 1.0);
        let new_level = self.level_for(occupancy);

        let mut inner = self.inner.write();
        inner.occupancy = occupancy;
        let raised = new_level.rank() > inner.level.rank();
        if raised {
            inner.level = new_level;
        }

        if new_level == Level::Blocked && !inner.paused {
            inner.paused = true;
            warn!(
                target: "primechunk::stream::backpressure",
                occupancy,
                "blocking threshold crossed, producer auto-paused"
            );
        }

        if raised {
            info!(
                target: "primechunk::stream::backpressure",
                level = new_level.as_str(),
                occupancy,
                "backpressure level raised"
            );
            Some(new_level)
        } else {
            None
        }
    }

    fn level_for(&self, occupancy: f64) -> Level {
        if occupancy >= self.thresholds.blocking {
            Level::Blocked
        } else if occupancy >= self.thresholds.critical {
            Level::Critical
        } else if occupancy >= self.thresholds.warning {
            Level::Warning
        } else {
            Level::Normal
        }
    }

    /// Attempts the policy-(a) auto-resume: succeeds only if occupancy is
    /// at or below the release threshold and no registered veto objects.
    /// Returns whether the controller is unpaused afterward.
    pub fn try_auto_resume(&self) -> bool {
        let occupancy = self.inner.read().occupancy;
        if occupancy > self.thresholds.release {
            return false;
        }
        if self.vetoes.read().iter().any(|veto| veto()) {
            return false;
        }
        self.force_resume();
        true
    }

    /// Explicit resume: unconditionally clears the paused flag and drops
    /// the level back to whatever the current occupancy implies.
    pub fn force_resume(&self) {
        let mut inner = self.inner.write();
        inner.paused = false;
        inner.level = self.level_for(inner.occupancy);
        info!(target: "primechunk::stream::backpressure", "producer resumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> BackpressureThresholds {
        BackpressureThresholds {
            warning: 0.5,
            critical: 0.8,
            blocking: 0.95,
            release: 0.5,
        }
    }

    #[test]
    fn starts_normal_and_unpaused() {
        let c = BackpressureController::new(thresholds());
        assert_eq!(c.level(), Level::Normal);
        assert!(!c.is_paused());
    }

    #[test]
    fn rising_occupancy_fires_transitions_in_order() {
        let c = BackpressureController::new(thresholds());
        assert_eq!(c.update_occupancy(0.6), Some(Level::Warning));
        assert_eq!(c.update_occupancy(0.85), Some(Level::Critical));
        assert_eq!(c.update_occupancy(0.97), Some(Level::Blocked));
        assert!(c.is_paused());
    }

    #[test]
    fn falling_occupancy_alone_does_not_fire_event_or_unpause() {
        let c = BackpressureController::new(thresholds());
        c.update_occupancy(0.97);
        assert!(c.is_paused());
        assert_eq!(c.update_occupancy(0.1), None);
        assert!(c.is_paused(), "occupancy drop alone must not auto-unpause");
    }

    #[test]
    fn auto_resume_requires_occupancy_at_or_below_release() {
        let c = BackpressureController::new(thresholds());
        c.update_occupancy(0.97);
        assert!(!c.try_auto_resume(), "occupancy still above release");
        c.update_occupancy(0.4);
        assert!(c.try_auto_resume());
        assert!(!c.is_paused());
    }

    #[test]
    fn veto_blocks_auto_resume() {
        let c = BackpressureController::new(thresholds());
        c.update_occupancy(0.97);
        c.update_occupancy(0.3);
        c.register_pressure_veto(Arc::new(|| true));
        assert!(!c.try_auto_resume());
        assert!(c.is_paused());
    }

    #[test]
    fn force_resume_always_clears_pause() {
        let c = BackpressureController::new(thresholds());
        c.update_occupancy(0.97);
        c.register_pressure_veto(Arc::new(|| true));
        c.force_resume();
        assert!(!c.is_paused());
    }
}
