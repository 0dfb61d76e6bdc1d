//! Peg activation state machine
//!
//! `Active -> Disabled -> Active`. Knocked-down pegs come back after a
//! cooldown; a hit on a reset peg, an external reset, or the watchdog brings
//! every peg back at once. Time is passed in by the caller (simulated
//! seconds) so the machine never reads a wall clock.

use serde::{Deserialize, Serialize};

use super::board::{PegId, PegTags};
use crate::consts::DISABLED_PEG_SCALE;
use crate::settings::PegSettings;

/// Activation state of one peg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PegState {
    Active,
    /// Knocked down; `None` means latched until the next global reset
    Disabled { reactivate_at: Option<f64> },
}

/// Why every peg was reactivated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetReason {
    /// A `reset_pegs` peg was hit
    ResetPeg,
    /// Watchdog: too many togglable pegs down
    TooManyDisabled,
    /// Watchdog: too long since the last reset
    Timeout,
    /// Requested from outside the simulation
    External,
}

/// Result of a global reset
#[derive(Debug, Clone, PartialEq)]
pub struct PegReset {
    pub reason: ResetReason,
    /// Pegs that were disabled and are active again
    pub reactivated: Vec<PegId>,
}

/// What a qualifying hit did
#[derive(Debug, Clone, PartialEq)]
pub enum HitOutcome {
    /// The peg was knocked down
    Disabled,
    /// The peg is a reset trigger; every peg is active again
    Reset(PegReset),
    /// The peg was already down or unknown
    Ignored,
}

#[derive(Debug, Clone)]
struct PegEntry {
    state: PegState,
    tags: PegTags,
}

/// State of every peg on the board plus the watchdog
#[derive(Debug, Clone)]
pub struct PegStates {
    pegs: Vec<PegEntry>,
    settings: PegSettings,
    /// Hits on togglable pegs since the last reset
    toggled_count: u32,
    togglable_total: usize,
    last_reset_at: f64,
    next_watchdog_at: f64,
}

impl PegStates {
    /// All pegs start active; `tags` is indexed by `PegId`
    pub fn new(tags: impl IntoIterator<Item = PegTags>, settings: &PegSettings, now: f64) -> Self {
        let pegs: Vec<PegEntry> = tags
            .into_iter()
            .map(|tags| PegEntry {
                state: PegState::Active,
                tags,
            })
            .collect();
        let togglable_total = pegs.iter().filter(|p| p.tags.togglable).count();

        Self {
            pegs,
            settings: settings.clone(),
            toggled_count: 0,
            togglable_total,
            last_reset_at: now,
            next_watchdog_at: now + settings.watchdog_interval as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.pegs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pegs.is_empty()
    }

    pub fn state(&self, id: PegId) -> Option<PegState> {
        self.pegs.get(id.0 as usize).map(|p| p.state)
    }

    pub fn is_active(&self, id: PegId) -> bool {
        matches!(self.state(id), Some(PegState::Active))
    }

    /// Visual scale for the renderer
    pub fn scale(&self, id: PegId) -> f32 {
        if self.is_active(id) { 1.0 } else { DISABLED_PEG_SCALE }
    }

    pub fn toggled_count(&self) -> u32 {
        self.toggled_count
    }

    pub fn togglable_total(&self) -> usize {
        self.togglable_total
    }

    pub fn disabled_togglable(&self) -> usize {
        self.pegs
            .iter()
            .filter(|p| p.tags.togglable && p.state != PegState::Active)
            .count()
    }

    pub fn last_reset_at(&self) -> f64 {
        self.last_reset_at
    }

    /// Handle a bouncing hit on `id`
    pub fn hit(&mut self, id: PegId, now: f64) -> HitOutcome {
        let latch = self.settings.latch_togglable;
        let cooldown = self.settings.cooldown as f64;
        let Some(peg) = self.pegs.get_mut(id.0 as usize) else {
            return HitOutcome::Ignored;
        };
        if peg.state != PegState::Active {
            return HitOutcome::Ignored;
        }

        if peg.tags.reset_pegs {
            return HitOutcome::Reset(self.reset_all(ResetReason::ResetPeg, now));
        }

        let reactivate_at = if latch && peg.tags.togglable {
            None
        } else {
            Some(now + cooldown)
        };
        peg.state = PegState::Disabled { reactivate_at };
        if peg.tags.togglable {
            self.toggled_count += 1;
        }
        HitOutcome::Disabled
    }

    /// Reactivate every peg and clear the toggle counter
    pub fn reset_all(&mut self, reason: ResetReason, now: f64) -> PegReset {
        let mut reactivated = Vec::new();
        for (i, peg) in self.pegs.iter_mut().enumerate() {
            if peg.state != PegState::Active {
                peg.state = PegState::Active;
                reactivated.push(PegId(i as u32));
            }
        }
        self.toggled_count = 0;
        self.last_reset_at = now;
        log::debug!("Peg reset ({:?}): {} reactivated", reason, reactivated.len());
        PegReset {
            reason,
            reactivated,
        }
    }

    /// Reactivate pegs whose cooldown has elapsed
    pub fn tick(&mut self, now: f64) -> Vec<PegId> {
        let mut reactivated = Vec::new();
        for (i, peg) in self.pegs.iter_mut().enumerate() {
            if let PegState::Disabled {
                reactivate_at: Some(at),
            } = peg.state
            {
                if now >= at {
                    peg.state = PegState::Active;
                    reactivated.push(PegId(i as u32));
                }
            }
        }
        reactivated
    }

    /// Run the watchdog if its interval has elapsed
    pub fn watchdog(&mut self, now: f64) -> Option<PegReset> {
        if now < self.next_watchdog_at {
            return None;
        }
        let interval = self.settings.watchdog_interval as f64;
        while self.next_watchdog_at <= now {
            self.next_watchdog_at += interval;
        }

        let disabled = self.disabled_togglable();
        let too_many = self.togglable_total > 0
            && disabled > 0
            && disabled as f32 / self.togglable_total as f32 >= self.settings.reset_fraction;
        let timed_out = now - self.last_reset_at >= self.settings.max_reset_interval as f64;

        let reason = if too_many {
            ResetReason::TooManyDisabled
        } else if timed_out {
            ResetReason::Timeout
        } else {
            return None;
        };

        let reset = self.reset_all(reason, now);
        log::info!(
            "Watchdog reset ({:?}): {} pegs reactivated",
            reason,
            reset.reactivated.len()
        );
        Some(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn togglable() -> PegTags {
        PegTags {
            togglable: true,
            ..PegTags::default()
        }
    }

    fn reset_peg() -> PegTags {
        PegTags {
            reset_pegs: true,
            togglable: true,
            ..PegTags::default()
        }
    }

    #[test]
    fn test_hit_disables_then_cooldown_reactivates() {
        let settings = PegSettings::default();
        let mut pegs = PegStates::new([PegTags::default()], &settings, 0.0);

        assert_eq!(pegs.hit(PegId(0), 1.0), HitOutcome::Disabled);
        assert!(!pegs.is_active(PegId(0)));
        assert_eq!(pegs.scale(PegId(0)), DISABLED_PEG_SCALE);

        assert!(pegs.tick(2.0).is_empty());
        assert_eq!(pegs.tick(2.5), vec![PegId(0)]);
        assert!(pegs.is_active(PegId(0)));
        assert_eq!(pegs.scale(PegId(0)), 1.0);
    }

    #[test]
    fn test_hit_on_disabled_peg_is_ignored() {
        let mut pegs = PegStates::new([togglable()], &PegSettings::default(), 0.0);
        pegs.hit(PegId(0), 0.0);
        assert_eq!(pegs.hit(PegId(0), 0.1), HitOutcome::Ignored);
        assert_eq!(pegs.toggled_count(), 1);
        assert_eq!(pegs.hit(PegId(9), 0.1), HitOutcome::Ignored);
    }

    #[test]
    fn test_reset_peg_resets_everything_without_shrinking() {
        let mut pegs = PegStates::new(
            [togglable(), togglable(), reset_peg()],
            &PegSettings::default(),
            0.0,
        );
        pegs.hit(PegId(0), 0.0);
        pegs.hit(PegId(1), 0.0);
        assert_eq!(pegs.toggled_count(), 2);

        let HitOutcome::Reset(reset) = pegs.hit(PegId(2), 0.5) else {
            panic!("reset peg should trigger a reset");
        };
        assert_eq!(reset.reason, ResetReason::ResetPeg);
        assert_eq!(reset.reactivated, vec![PegId(0), PegId(1)]);
        assert!(pegs.is_active(PegId(2)));
        assert_eq!(pegs.toggled_count(), 0);
        assert_eq!(pegs.last_reset_at(), 0.5);
    }

    #[test]
    fn test_latched_pegs_wait_for_reset() {
        let settings = PegSettings {
            latch_togglable: true,
            ..PegSettings::default()
        };
        let mut pegs = PegStates::new([togglable(), PegTags::default()], &settings, 0.0);
        pegs.hit(PegId(0), 0.0);
        pegs.hit(PegId(1), 0.0);

        assert_eq!(pegs.tick(10.0), vec![PegId(1)]);
        assert_eq!(
            pegs.state(PegId(0)),
            Some(PegState::Disabled {
                reactivate_at: None
            })
        );
        pegs.reset_all(ResetReason::External, 11.0);
        assert!(pegs.is_active(PegId(0)));
    }

    #[test]
    fn test_watchdog_resets_at_fraction() {
        let settings = PegSettings {
            latch_togglable: true,
            ..PegSettings::default()
        };
        let tags: Vec<PegTags> = (0..10).map(|_| togglable()).collect();
        let mut pegs = PegStates::new(tags, &settings, 0.0);

        for i in 0..5 {
            pegs.hit(PegId(i), 0.1);
        }
        assert!(pegs.watchdog(1.0).is_none());

        pegs.hit(PegId(5), 1.1);
        assert_eq!(pegs.disabled_togglable(), 6);
        // Not due yet
        assert!(pegs.watchdog(1.5).is_none());

        let reset = pegs.watchdog(2.0).expect("60% disabled should reset");
        assert_eq!(reset.reason, ResetReason::TooManyDisabled);
        assert_eq!(reset.reactivated.len(), 6);
        assert_eq!(pegs.disabled_togglable(), 0);
        assert_eq!(pegs.toggled_count(), 0);
    }

    #[test]
    fn test_watchdog_timeout() {
        let settings = PegSettings::default();
        let mut pegs = PegStates::new([togglable(), togglable()], &settings, 0.0);
        for t in 1..30 {
            assert!(pegs.watchdog(t as f64).is_none());
        }
        let reset = pegs.watchdog(30.0).expect("30s without reset");
        assert_eq!(reset.reason, ResetReason::Timeout);
        assert!(reset.reactivated.is_empty());
        assert_eq!(pegs.last_reset_at(), 30.0);
        assert!(pegs.watchdog(31.0).is_none());
    }

    #[test]
    fn test_watchdog_ignores_board_without_togglable_pegs() {
        let mut pegs = PegStates::new([PegTags::default()], &PegSettings::default(), 0.0);
        pegs.hit(PegId(0), 0.0);
        assert!(pegs.watchdog(1.0).is_none());
    }
}
