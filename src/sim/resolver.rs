//! Collision response policy
//!
//! Each collision-start event is classified through the body tag table into
//! at most one token and at most one peg. Token/peg contacts produce
//! [`StepAction`]s which the simulation applies at one fixed point in the
//! step, after every event of that step has been classified.

use glam::Vec2;

use super::board::{Board, PegId};
use super::pegs::PegStates;
use super::physics::{BodyTag, CollisionStart, PhysicsWorld};
use super::pool::{TokenId, TokenPool};
use crate::settings::TokenSettings;

/// Deferred mutation produced while resolving collisions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAction {
    /// Push a token away from a peg
    Impulse { token: TokenId, impulse: Vec2 },
    /// Knock down (or trigger) a peg
    HitPeg { peg: PegId },
    /// Reset every peg (non-bouncing reset trigger)
    ResetPegs { peg: PegId },
    /// Add one point to a token
    Score { token: TokenId },
}

/// Why an event produced no actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A collider or body has no tag (e.g. mid-removal)
    UnknownBody,
    /// Token body whose slot holds no live token
    StaleToken,
    /// Peg id not on the board
    UnknownPeg,
    /// Peg is currently disabled
    InactivePeg,
}

/// Outcome of resolving one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Token bounced off a peg
    Bounce { token: TokenId, peg: PegId, impulse: Vec2 },
    /// Token touched a `nobounce` peg
    NoBounce { token: TokenId, peg: PegId, reset: bool },
    /// Not a token/peg pair (wall, token-token, peg-peg)
    Ignored,
    Skipped(SkipReason),
}

/// Bounce policy for token/peg contacts
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    base_impulse: f32,
    superbounce_multiplier: f32,
}

impl CollisionResolver {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            base_impulse: settings.base_impulse,
            superbounce_multiplier: settings.superbounce_multiplier,
        }
    }

    pub fn base_impulse(&self) -> f32 {
        self.base_impulse
    }

    /// Resolve one event, queueing actions; never fails
    pub fn resolve(
        &self,
        event: CollisionStart,
        world: &PhysicsWorld,
        board: &Board,
        pegs: &PegStates,
        pool: &TokenPool,
        actions: &mut Vec<StepAction>,
    ) -> Resolution {
        let (Some(a), Some(b)) = (
            world.collider_tag(event.collider1),
            world.collider_tag(event.collider2),
        ) else {
            return Resolution::Skipped(SkipReason::UnknownBody);
        };

        let (token_slot, peg_id) = match (a, b) {
            (BodyTag::Token(slot), BodyTag::Peg(peg)) | (BodyTag::Peg(peg), BodyTag::Token(slot)) => {
                (slot, peg)
            }
            _ => return Resolution::Ignored,
        };

        let Some(token) = pool.token_in_slot(token_slot) else {
            return Resolution::Skipped(SkipReason::StaleToken);
        };
        let Some(peg) = board.peg(peg_id) else {
            return Resolution::Skipped(SkipReason::UnknownPeg);
        };
        if !pegs.is_active(peg_id) {
            return Resolution::Skipped(SkipReason::InactivePeg);
        }

        if !peg.tags.bounces() {
            let reset = peg.tags.reset_pegs;
            if reset {
                actions.push(StepAction::ResetPegs { peg: peg_id });
            }
            return Resolution::NoBounce {
                token: token.id,
                peg: peg_id,
                reset,
            };
        }

        let Some(token_pos) = pool.handle(token.id).and_then(|h| world.position(h)) else {
            return Resolution::Skipped(SkipReason::StaleToken);
        };

        // Push the token straight away from the peg centre
        let direction = (token_pos - peg.pos).try_normalize().unwrap_or(Vec2::Y);
        let mut magnitude = self.base_impulse;
        if peg.tags.is_superbounce() {
            magnitude *= self.superbounce_multiplier;
        }
        let impulse = direction * magnitude;

        actions.push(StepAction::Impulse {
            token: token.id,
            impulse,
        });
        actions.push(StepAction::HitPeg { peg: peg_id });
        actions.push(StepAction::Score { token: token.id });

        Resolution::Bounce {
            token: token.id,
            peg: peg_id,
            impulse,
        }
    }
}
