//! Contract stage enum and its transition table.

use serde::{Deserialize, Serialize};

/// Lifecycle stage of one tracked contract within an expiry cycle.
///
/// Forward path: `Idle -> PatternDetected -> MomentumConfirmed ->
/// BreakoutConfirmed -> {TargetHit | StopHit | Expired}`. `Cancelled` is the
/// non-trading terminal used when the paired contract wins the cycle.
/// The only backward edge is the overlap-window revert to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    PatternDetected,
    MomentumConfirmed,
    BreakoutConfirmed,
    TargetHit,
    StopHit,
    Expired,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::TargetHit | Stage::StopHit | Stage::Expired | Stage::Cancelled
        )
    }

    /// Explicit transition table. Everything not listed is illegal.
    pub fn can_transition(from: Stage, to: Stage) -> bool {
        use Stage::*;
        match (from, to) {
            (Idle, PatternDetected) => true,
            (Idle, Cancelled) => true,
            (PatternDetected, MomentumConfirmed) => true,
            // Overlap window expired unconfirmed, or the channel was lost.
            (PatternDetected, Idle) => true,
            (PatternDetected, Cancelled) => true,
            (MomentumConfirmed, BreakoutConfirmed) => true,
            (MomentumConfirmed, Idle) => true,
            (MomentumConfirmed, Cancelled) => true,
            (BreakoutConfirmed, TargetHit) => true,
            (BreakoutConfirmed, StopHit) => true,
            (BreakoutConfirmed, Expired) => true,
            (BreakoutConfirmed, Cancelled) => true,
            _ => false,
        }
    }
}
