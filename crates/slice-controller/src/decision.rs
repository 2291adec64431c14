//! Hysteresis decision engine
//!
//! Two thresholds keep the slice state from flapping:
//!
//! ```text
//!   rate ─────────────────────────────────────────────►
//!        │   release   │     hold band     │  trip
//!   0 ───┼─────────────┼───────────────────┼──────────
//!        │ LOWER→UPPER │   no transition   │ UPPER→LOWER
//!                  threshold/2         threshold
//! ```
//!
//! Both comparisons are strict: a rate equal to either threshold holds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use slice_common::SliceState;

/// A committed state change
#[derive(Debug, Clone, Serialize)]
pub struct SliceTransition {
    /// State before
    pub from: SliceState,
    /// State after
    pub to: SliceState,
    /// Maximum monitored rate that triggered it, bytes/second
    pub max_rate: f64,
    /// When it was decided
    pub at: DateTime<Utc>,
}

/// Two-state machine over the maximum monitored rate
#[derive(Debug)]
pub struct HysteresisEngine {
    state: SliceState,
    threshold: f64,
}

impl HysteresisEngine {
    /// Create engine in the initial [`SliceState::Upper`] state
    pub fn new(threshold: f64) -> Self {
        Self {
            state: SliceState::default(),
            threshold,
        }
    }

    /// Start from a given state
    pub fn with_state(mut self, state: SliceState) -> Self {
        self.state = state;
        self
    }

    /// Current state
    pub fn state(&self) -> SliceState {
        self.state
    }

    /// Trip threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Release threshold
    pub fn release_threshold(&self) -> f64 {
        self.threshold / 2.0
    }

    /// Evaluate the latest maximum rate. Commits and returns the transition
    /// when the state changes.
    pub fn evaluate(&mut self, max_rate: f64) -> Option<SliceTransition> {
        let congested = max_rate > self.threshold;

        let target = match self.state {
            SliceState::Upper if congested => SliceState::Lower,
            SliceState::Lower if !congested && max_rate < self.release_threshold() => SliceState::Upper,
            _ => return None,
        };

        let transition = SliceTransition {
            from: self.state,
            to: target,
            max_rate,
            at: Utc::now(),
        };
        self.state = target;
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const THRESHOLD: f64 = 125_000.0;

    #[test]
    fn test_trip_is_strict() {
        let mut engine = HysteresisEngine::new(THRESHOLD);
        assert!(engine.evaluate(125_000.0).is_none());
        assert_eq!(engine.state(), SliceState::Upper);

        let t = engine.evaluate(125_001.0).unwrap();
        assert_eq!((t.from, t.to), (SliceState::Upper, SliceState::Lower));
        assert_eq!(engine.state(), SliceState::Lower);
    }

    #[test]
    fn test_release_is_strict() {
        let mut engine = HysteresisEngine::new(THRESHOLD).with_state(SliceState::Lower);
        assert_eq!(engine.release_threshold(), 62_500.0);

        assert!(engine.evaluate(62_500.0).is_none());
        assert_eq!(engine.state(), SliceState::Lower);

        let t = engine.evaluate(62_499.0).unwrap();
        assert_eq!(t.to, SliceState::Upper);
        assert_eq!(t.max_rate, 62_499.0);
    }

    #[test]
    fn test_band_holds_lower() {
        let mut engine = HysteresisEngine::new(THRESHOLD).with_state(SliceState::Lower);
        for _ in 0..1000 {
            assert!(engine.evaluate(90_000.0).is_none());
        }
        assert_eq!(engine.state(), SliceState::Lower);
    }

    #[test]
    fn test_no_self_transition() {
        let mut engine = HysteresisEngine::new(THRESHOLD);
        assert!(engine.evaluate(0.0).is_none());

        engine.evaluate(500_000.0).unwrap();
        assert!(engine.evaluate(500_000.0).is_none());
        assert!(engine.evaluate(1e9).is_none());
    }

    proptest! {
        #[test]
        fn prop_band_never_transitions(
            lower in any::<bool>(),
            rates in prop::collection::vec(62_500.0f64..=125_000.0, 1..256),
        ) {
            let initial = if lower { SliceState::Lower } else { SliceState::Upper };
            let mut engine = HysteresisEngine::new(THRESHOLD).with_state(initial);
            for rate in rates {
                prop_assert!(engine.evaluate(rate).is_none());
                prop_assert_eq!(engine.state(), initial);
            }
        }

        #[test]
        fn prop_transitions_alternate(rates in prop::collection::vec(0.0f64..400_000.0, 1..256)) {
            let mut engine = HysteresisEngine::new(THRESHOLD);
            let mut expected_from = SliceState::Upper;
            for rate in rates {
                if let Some(t) = engine.evaluate(rate) {
                    prop_assert_eq!(t.from, expected_from);
                    prop_assert_ne!(t.from, t.to);
                    expected_from = t.to;
                }
            }
        }
    }
}
