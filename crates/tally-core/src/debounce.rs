//! Temporal debounce over per-frame match decisions.
//!
//! A single frame's match is noisy; an identity must be seen in
//! `verification_frames` consecutive frames before it confirms, and once
//! confirmed it is silenced for a cooldown period. Per-identity state
//! machine: UNSEEN → ACCUMULATING(n) → CONFIRMED → (cooldown) →
//! ACCUMULATING(0).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Debounce tuning. `verification_frames` damps single-frame
/// misclassification; `cooldown` damps duplicate punches from someone
/// lingering in frame.
#[derive(Debug, Clone, Copy)]
pub struct DebounceConfig {
    pub verification_frames: u32,
    pub cooldown: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        DebounceConfig {
            verification_frames: 5,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// One identity seen in the current frame, with its match score.
#[derive(Debug, Clone)]
pub struct Sighting {
    pub identity_id: String,
    pub display_name: String,
    pub score: f32,
}

/// A debounced attendance event, fired once per confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedEvent {
    pub identity_id: String,
    pub display_name: String,
    pub confidence: f32,
}

#[derive(Debug, Default)]
struct TrackState {
    consecutive: u32,
    last_confirmed: Option<Instant>,
}

/// Tracks consecutive sightings per identity and emits confirmed events.
///
/// Time is injected through `observe` so the machine runs against
/// synthetic frame streams in tests. State is local to one camera source;
/// no cross-thread synchronization is needed.
pub struct DebounceTracker {
    config: DebounceConfig,
    states: HashMap<String, TrackState>,
}

impl DebounceTracker {
    pub fn new(config: DebounceConfig) -> Self {
        DebounceTracker {
            config,
            states: HashMap::new(),
        }
    }

    /// Feed one frame's sightings. Identities absent from the frame have
    /// their consecutive counter reset; cooldown timestamps survive
    /// absence so a person who steps out and back does not double-punch.
    pub fn observe(&mut self, sightings: &[Sighting], now: Instant) -> Vec<ConfirmedEvent> {
        // Reset counters for identities not visible this frame.
        for (id, state) in self.states.iter_mut() {
            if !sightings.iter().any(|s| s.identity_id == *id) {
                if state.consecutive > 0 {
                    tracing::trace!(identity = %id, "lost sight, counter reset");
                }
                state.consecutive = 0;
            }
        }

        let mut events = Vec::new();

        for sighting in sightings {
            let state = self.states.entry(sighting.identity_id.clone()).or_default();

            if let Some(confirmed_at) = state.last_confirmed {
                if now.duration_since(confirmed_at) < self.config.cooldown {
                    // Still cooling down; accumulation restarts afterwards.
                    state.consecutive = 0;
                    continue;
                }
            }

            state.consecutive += 1;
            if state.consecutive >= self.config.verification_frames {
                tracing::debug!(
                    identity = %sighting.identity_id,
                    score = sighting.score,
                    "identity confirmed"
                );
                state.last_confirmed = Some(now);
                state.consecutive = 0;
                events.push(ConfirmedEvent {
                    identity_id: sighting.identity_id.clone(),
                    display_name: sighting.display_name.clone(),
                    confidence: sighting.score,
                });
            }
        }

        // Drop fully-idle entries so the map stays bounded.
        let cooldown = self.config.cooldown;
        self.states.retain(|_, s| {
            s.consecutive > 0
                || s.last_confirmed
                    .is_some_and(|t| now.duration_since(t) < cooldown)
        });

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(id: &str) -> Sighting {
        Sighting {
            identity_id: id.into(),
            display_name: id.into(),
            score: 0.8,
        }
    }

    fn config(frames: u32, cooldown_secs: u64) -> DebounceConfig {
        DebounceConfig {
            verification_frames: frames,
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    #[test]
    fn test_confirms_on_nth_consecutive_frame() {
        let mut tracker = DebounceTracker::new(config(5, 60));
        let start = Instant::now();

        // Identity visible in frames 1..10, ~33ms apart. Exactly one
        // event, on frame 5.
        let mut fired_at = Vec::new();
        for frame in 1..=10u32 {
            let now = start + Duration::from_millis(frame as u64 * 33);
            let events = tracker.observe(&[sighting("emp1")], now);
            if !events.is_empty() {
                fired_at.push(frame);
            }
        }
        assert_eq!(fired_at, vec![5]);
    }

    #[test]
    fn test_cooldown_suppresses_through_frame_20() {
        let mut tracker = DebounceTracker::new(config(5, 10));
        let start = Instant::now();

        let mut total = 0;
        for frame in 1..=20u32 {
            let now = start + Duration::from_millis(frame as u64 * 33);
            total += tracker.observe(&[sighting("emp1")], now).len();
        }
        assert_eq!(total, 1);
    }

    #[test]
    fn test_losing_sight_resets_counter() {
        let mut tracker = DebounceTracker::new(config(3, 60));
        let start = Instant::now();

        // Two sightings, a gap, then two more: never confirms.
        for (i, present) in [true, true, false, true, true].iter().enumerate() {
            let now = start + Duration::from_millis(i as u64 * 33);
            let frame = if *present { vec![sighting("emp1")] } else { vec![] };
            assert!(tracker.observe(&frame, now).is_empty());
        }

        // Third consecutive sighting confirms.
        let now = start + Duration::from_millis(5 * 33);
        let events = tracker.observe(&[sighting("emp1")], now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity_id, "emp1");
    }

    #[test]
    fn test_cooldown_survives_absence() {
        let mut tracker = DebounceTracker::new(config(1, 10));
        let start = Instant::now();

        assert_eq!(tracker.observe(&[sighting("emp1")], start).len(), 1);

        // Leaves the frame, comes back 2s later: still cooling down.
        let now = start + Duration::from_secs(1);
        assert!(tracker.observe(&[], now).is_empty());
        let now = start + Duration::from_secs(2);
        assert!(tracker.observe(&[sighting("emp1")], now).is_empty());
    }

    #[test]
    fn test_reconfirms_after_cooldown() {
        let mut tracker = DebounceTracker::new(config(2, 5));
        let start = Instant::now();

        assert!(tracker.observe(&[sighting("emp1")], start).is_empty());
        let t1 = start + Duration::from_millis(33);
        assert_eq!(tracker.observe(&[sighting("emp1")], t1).len(), 1);

        // After the cooldown elapses, accumulation starts over from zero:
        // two more consecutive frames are required.
        let t2 = start + Duration::from_secs(6);
        assert!(tracker.observe(&[sighting("emp1")], t2).is_empty());
        let t3 = t2 + Duration::from_millis(33);
        assert_eq!(tracker.observe(&[sighting("emp1")], t3).len(), 1);
    }

    #[test]
    fn test_independent_identities() {
        let mut tracker = DebounceTracker::new(config(2, 60));
        let start = Instant::now();

        let frame = vec![sighting("emp1"), sighting("emp2")];
        assert!(tracker.observe(&frame, start).is_empty());
        let events = tracker.observe(&frame, start + Duration::from_millis(33));
        assert_eq!(events.len(), 2);
    }
}
