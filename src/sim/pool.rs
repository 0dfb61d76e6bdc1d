//! Token body pool
//!
//! Token bodies are never removed from the physics world. A released token's
//! body is disabled and its slot index goes onto a free list; the next spawn
//! reuses it with a bumped generation so stale ids can't touch the new token.

use glam::Vec2;
use rand::Rng;
use rapier2d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use super::physics::{BodyTag, DynamicBall, PhysicsWorld};
use crate::settings::TokenSettings;

/// Generational token id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId {
    pub slot: u32,
    pub generation: u32,
}

/// Renderable payload from the chat collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Emote name; also the marketplace class the token belongs to
    pub emote: String,
    /// Chat user that posted the emote
    pub username: String,
}

impl SpawnRequest {
    pub fn new(emote: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            emote: emote.into(),
            username: username.into(),
        }
    }
}

/// A live token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub emote: String,
    pub username: String,
    /// Pegs bounced off; only ever increases
    pub score: u32,
    /// Held by an external actor (kinematic, never exits)
    pub grasped: bool,
    pub spawned_at: f64,
}

impl Token {
    /// Add one point, returning the new score
    pub fn add_point(&mut self) -> u32 {
        self.score = self.score.saturating_add(1);
        self.score
    }
}

#[derive(Debug)]
struct Slot {
    handle: RigidBodyHandle,
    generation: u32,
    token: Option<Token>,
}

/// Pool of token bodies
#[derive(Debug)]
pub struct TokenPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    active: usize,
    settings: TokenSettings,
}

impl TokenPool {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            active: 0,
            settings: settings.clone(),
        }
    }

    /// Spawn at a random x in the spawn band
    pub fn acquire<R: Rng>(
        &mut self,
        world: &mut PhysicsWorld,
        rng: &mut R,
        request: SpawnRequest,
        now: f64,
    ) -> TokenId {
        let half = self.settings.spawn_half_width.abs();
        let x = rng.random_range(-half..=half);
        let pos = Vec2::new(x, self.settings.spawn_height);
        self.acquire_at(world, pos, request, now)
    }

    /// Spawn at an explicit position
    pub fn acquire_at(
        &mut self,
        world: &mut PhysicsWorld,
        position: Vec2,
        request: SpawnRequest,
        now: f64,
    ) -> TokenId {
        let slot_index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                world.reset_body(slot.handle, position);
                world.set_enabled(slot.handle, true);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                let handle = world.insert_dynamic_ball(
                    BodyTag::Token(index),
                    DynamicBall {
                        position,
                        radius: self.settings.radius,
                        mass: self.settings.mass,
                        angular_damping: self.settings.angular_damping,
                    },
                );
                self.slots.push(Slot {
                    handle,
                    generation: 0,
                    token: None,
                });
                index
            }
        };

        let slot = &mut self.slots[slot_index as usize];
        let id = TokenId {
            slot: slot_index,
            generation: slot.generation,
        };
        slot.token = Some(Token {
            id,
            emote: request.emote,
            username: request.username,
            score: 0,
            grasped: false,
            spawned_at: now,
        });
        self.active += 1;
        id
    }

    /// Return a token to the pool; `None` if it is not live (idempotent)
    pub fn release(&mut self, world: &mut PhysicsWorld, id: TokenId) -> Option<Token> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let token = slot.token.take()?;
        if token.grasped {
            world.set_kinematic(slot.handle, false);
        }
        // Body stays where it left the board until reused
        world.set_enabled(slot.handle, false);
        self.free.push(id.slot);
        self.active -= 1;
        Some(token)
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.slots
            .get(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.token.as_ref())
    }

    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.token.as_mut())
    }

    /// Live token occupying a slot (used to resolve body tags)
    pub fn token_in_slot(&self, slot: u32) -> Option<&Token> {
        self.slots.get(slot as usize).and_then(|s| s.token.as_ref())
    }

    pub fn handle(&self, id: TokenId) -> Option<RigidBodyHandle> {
        self.get(id)?;
        self.slots.get(id.slot as usize).map(|s| s.handle)
    }

    pub fn is_live(&self, id: TokenId) -> bool {
        self.get(id).is_some()
    }

    /// Live tokens in slot order
    pub fn iter(&self) -> impl Iterator<Item = (&Token, RigidBodyHandle)> {
        self.slots
            .iter()
            .filter_map(|s| s.token.as_ref().map(|t| (t, s.handle)))
    }

    /// Number of live tokens
    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Bodies allocated so far (live + pooled)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live, free-falling tokens below the exit height
    pub fn exited(&self, world: &PhysicsWorld) -> Vec<TokenId> {
        self.iter()
            .filter(|(t, _)| !t.grasped)
            .filter(|(_, handle)| {
                world
                    .position(*handle)
                    .is_some_and(|p| p.y < self.settings.exit_y)
            })
            .map(|(t, _)| t.id)
            .collect()
    }

    /// Take a token out of autonomous physics
    pub fn grasp(&mut self, world: &mut PhysicsWorld, id: TokenId) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };
        let Some(token) = self.get_mut(id) else {
            return false;
        };
        if !token.grasped {
            token.grasped = true;
            world.set_kinematic(handle, true);
        }
        true
    }

    /// Move a grasped token (applied on the next step)
    pub fn move_grasped(&mut self, world: &mut PhysicsWorld, id: TokenId, position: Vec2) -> bool {
        match (self.get(id).map(|t| t.grasped), self.handle(id)) {
            (Some(true), Some(handle)) => {
                world.move_kinematic(handle, position);
                true
            }
            _ => false,
        }
    }

    /// Hand a grasped token back to physics with `velocity`
    pub fn drop_grasped(&mut self, world: &mut PhysicsWorld, id: TokenId, velocity: Vec2) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };
        match self.get_mut(id) {
            Some(token) if token.grasped => {
                token.grasped = false;
                world.set_kinematic(handle, false);
                world.set_velocity(handle, velocity);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn setup() -> (PhysicsWorld, TokenPool, Pcg32) {
        (
            PhysicsWorld::new(-15.0),
            TokenPool::new(&TokenSettings::default()),
            Pcg32::seed_from_u64(42),
        )
    }

    #[test]
    fn test_acquire_spawns_in_band() {
        let (mut world, mut pool, mut rng) = setup();
        let settings = TokenSettings::default();
        for _ in 0..20 {
            let id = pool.acquire(&mut world, &mut rng, SpawnRequest::new("Kappa", "alice"), 0.0);
            let pos = world.position(pool.handle(id).unwrap()).unwrap();
            assert!(pos.x.abs() <= settings.spawn_half_width);
            assert_eq!(pos.y, settings.spawn_height);
        }
        assert_eq!(pool.len(), 20);
        assert_eq!(pool.capacity(), 20);
    }

    #[test]
    fn test_release_reuses_body() {
        let (mut world, mut pool, mut rng) = setup();
        let first = pool.acquire(&mut world, &mut rng, SpawnRequest::new("Kappa", "alice"), 0.0);
        pool.get_mut(first).unwrap().add_point();
        let released = pool.release(&mut world, first).unwrap();
        assert_eq!(released.score, 1);
        assert!(pool.is_empty());

        let second = pool.acquire(&mut world, &mut rng, SpawnRequest::new("PogChamp", "bob"), 1.0);
        assert_eq!(second.slot, first.slot);
        assert_ne!(second.generation, first.generation);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(world.body_count(), 1);

        let token = pool.get(second).unwrap();
        assert_eq!(token.score, 0);
        assert_eq!(token.emote, "PogChamp");
        assert!(world.is_enabled(pool.handle(second).unwrap()));
    }

    #[test]
    fn test_double_release_is_noop() {
        let (mut world, mut pool, mut rng) = setup();
        let id = pool.acquire(&mut world, &mut rng, SpawnRequest::default(), 0.0);
        assert!(pool.release(&mut world, id).is_some());
        assert!(pool.release(&mut world, id).is_none());
        assert_eq!(pool.len(), 0);

        // Stale id must not release the slot's new occupant
        let reused = pool.acquire(&mut world, &mut rng, SpawnRequest::default(), 0.0);
        assert!(pool.release(&mut world, id).is_none());
        assert!(pool.is_live(reused));

        let unknown = TokenId {
            slot: 99,
            generation: 0,
        };
        assert!(pool.release(&mut world, unknown).is_none());
    }

    #[test]
    fn test_released_body_is_disabled() {
        let (mut world, mut pool, mut rng) = setup();
        let id = pool.acquire(&mut world, &mut rng, SpawnRequest::default(), 0.0);
        let handle = pool.handle(id).unwrap();
        pool.release(&mut world, id);
        assert!(!world.is_enabled(handle));
        assert!(pool.handle(id).is_none());
    }

    #[test]
    fn test_exited_skips_grasped_tokens() {
        let (mut world, mut pool, _) = setup();
        let falling = pool.acquire_at(&mut world, Vec2::new(0.0, -20.0), SpawnRequest::default(), 0.0);
        let held = pool.acquire_at(&mut world, Vec2::new(3.0, -20.0), SpawnRequest::default(), 0.0);
        let above = pool.acquire_at(&mut world, Vec2::new(-3.0, 5.0), SpawnRequest::default(), 0.0);
        assert!(pool.grasp(&mut world, held));

        let exited = pool.exited(&world);
        assert_eq!(exited, vec![falling]);
        assert!(!exited.contains(&above));
    }

    #[test]
    fn test_grasp_and_drop() {
        let (mut world, mut pool, _) = setup();
        let id = pool.acquire_at(&mut world, Vec2::new(0.0, 5.0), SpawnRequest::default(), 0.0);
        assert!(!pool.move_grasped(&mut world, id, Vec2::ZERO));
        assert!(pool.grasp(&mut world, id));
        assert!(pool.move_grasped(&mut world, id, Vec2::new(1.0, 5.0)));
        for _ in 0..10 {
            world.step();
        }
        // Kinematic: gravity does not pull it down
        let pos = world.position(pool.handle(id).unwrap()).unwrap();
        assert!((pos - Vec2::new(1.0, 5.0)).length() < 1e-3);

        assert!(pool.drop_grasped(&mut world, id, Vec2::new(0.0, -2.0)));
        assert!(!pool.get(id).unwrap().grasped);
        assert!(!pool.drop_grasped(&mut world, id, Vec2::ZERO));
    }
}
