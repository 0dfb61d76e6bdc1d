//! Rigid-body backend adapter
//!
//! Wraps the rapier pipeline and body/collider sets behind a small API in
//! glam types. Every body the board or pool creates is registered with a
//! [`BodyTag`] in a side-table so collision events can be classified without
//! touching backend user data.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, unbounded};
use glam::Vec2;
use rapier2d::prelude::*;

use super::board::PegId;
use crate::consts::SIM_DT;

/// What a rigid body represents on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyTag {
    /// Boundary or decorative wall (index into `Board::walls`)
    Wall(u32),
    /// Peg by generation id
    Peg(PegId),
    /// Pool slot; the live token id is looked up in the pool
    Token(u32),
}

/// A collision-start event reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionStart {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
}

/// Surface material for a static body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

/// Dynamic ball parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicBall {
    pub position: Vec2,
    pub radius: f32,
    pub mass: f32,
    pub angular_damping: f32,
}

#[inline]
fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

#[inline]
fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// The shared physics world
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    events: ChannelEventCollector,
    collision_recv: Receiver<CollisionEvent>,
    contact_force_recv: Receiver<ContactForceEvent>,
    tags: HashMap<RigidBodyHandle, BodyTag>,
}

impl PhysicsWorld {
    /// Create an empty world with downward gravity `gravity_y`
    pub fn new(gravity_y: f32) -> Self {
        let (collision_send, collision_recv) = unbounded();
        let (contact_force_send, contact_force_recv) = unbounded();
        let params = IntegrationParameters {
            dt: SIM_DT,
            ..IntegrationParameters::default()
        };

        Self {
            gravity: vector![0.0, gravity_y],
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            events: ChannelEventCollector::new(collision_send, contact_force_send),
            collision_recv,
            contact_force_recv,
            tags: HashMap::new(),
        }
    }

    /// Add a fixed box
    pub fn insert_fixed_cuboid(
        &mut self,
        tag: BodyTag,
        position: Vec2,
        half_extents: Vec2,
        rotation: f32,
        material: Material,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(to_vector(position))
            .rotation(rotation)
            .build();
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y)
            .friction(material.friction)
            .restitution(material.restitution)
            .build();
        self.insert(tag, body, collider)
    }

    /// Add a fixed ball that reports collision events
    pub fn insert_fixed_ball(
        &mut self,
        tag: BodyTag,
        position: Vec2,
        radius: f32,
        material: Material,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(to_vector(position))
            .build();
        let collider = ColliderBuilder::ball(radius)
            .friction(material.friction)
            .restitution(material.restitution)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.insert(tag, body, collider)
    }

    /// Add a dynamic ball that reports collision events
    pub fn insert_dynamic_ball(&mut self, tag: BodyTag, ball: DynamicBall) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(ball.position))
            .angular_damping(ball.angular_damping)
            .ccd_enabled(true)
            .build();
        let collider = ColliderBuilder::ball(ball.radius)
            .mass(ball.mass)
            .restitution(0.3)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.insert(tag, body, collider)
    }

    fn insert(&mut self, tag: BodyTag, body: RigidBody, collider: Collider) -> RigidBodyHandle {
        let handle = self.bodies.insert(body);
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(handle, tag);
        handle
    }

    /// Advance one fixed step and drain the collision-start events it produced
    pub fn step(&mut self) -> Vec<CollisionStart> {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &self.events,
        );

        // Contact force events are not requested; keep the channel empty anyway
        while self.contact_force_recv.try_recv().is_ok() {}

        let mut started = Vec::new();
        while let Ok(event) = self.collision_recv.try_recv() {
            if event.started() {
                started.push(CollisionStart {
                    collider1: event.collider1(),
                    collider2: event.collider2(),
                });
            }
        }
        started
    }

    /// Tag of the body owning a collider
    pub fn collider_tag(&self, collider: ColliderHandle) -> Option<BodyTag> {
        let parent = self.colliders.get(collider)?.parent()?;
        self.tags.get(&parent).copied()
    }

    pub fn body_tag(&self, handle: RigidBodyHandle) -> Option<BodyTag> {
        self.tags.get(&handle).copied()
    }

    pub fn position(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.bodies.get(handle).map(|b| to_vec2(b.translation()))
    }

    pub fn rotation(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.bodies.get(handle).map(|b| b.rotation().angle())
    }

    pub fn velocity(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.bodies.get(handle).map(|b| to_vec2(b.linvel()))
    }

    pub fn is_enabled(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.get(handle).is_some_and(|b| b.is_enabled())
    }

    /// Enable or disable a body and its colliders
    pub fn set_enabled(&mut self, handle: RigidBodyHandle, enabled: bool) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_enabled(enabled);
            if enabled {
                body.wake_up(true);
            }
        }
    }

    /// Apply an instantaneous impulse; returns false if the body is gone
    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec2) -> bool {
        match self.bodies.get_mut(handle) {
            Some(body) => {
                body.apply_impulse(to_vector(impulse), true);
                true
            }
            None => false,
        }
    }

    /// Teleport a body to `position` at rest with zero rotation
    pub fn reset_body(&mut self, handle: RigidBodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector![0.0, 0.0], false);
            body.set_angvel(0.0, false);
            body.set_translation(to_vector(position), false);
            body.set_rotation(Rotation::new(0.0), false);
            body.wake_up(true);
        }
    }

    /// Switch a dynamic body to kinematic (`held`) or back to dynamic
    pub fn set_kinematic(&mut self, handle: RigidBodyHandle, held: bool) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let body_type = if held {
                RigidBodyType::KinematicPositionBased
            } else {
                RigidBodyType::Dynamic
            };
            body.set_body_type(body_type, true);
        }
    }

    /// Move a kinematic body; takes effect on the next step
    pub fn move_kinematic(&mut self, handle: RigidBodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_next_kinematic_translation(to_vector(position));
        }
    }

    pub fn set_velocity(&mut self, handle: RigidBodyHandle, velocity: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(to_vector(velocity), true);
        }
    }

    /// Surface material of a body's first collider
    pub fn material(&self, handle: RigidBodyHandle) -> Option<Material> {
        let collider = self.bodies.get(handle)?.colliders().first().copied()?;
        let collider = self.colliders.get(collider)?;
        Some(Material {
            friction: collider.friction(),
            restitution: collider.restitution(),
        })
    }

    /// Number of bodies ever allocated (pooled bodies are never removed)
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(position: Vec2) -> DynamicBall {
        DynamicBall {
            position,
            radius: 0.25,
            mass: 1.0,
            angular_damping: 0.0,
        }
    }

    #[test]
    fn test_dynamic_body_falls() {
        let mut world = PhysicsWorld::new(-15.0);
        let handle = world.insert_dynamic_ball(BodyTag::Token(0), ball_at(Vec2::new(0.0, 5.0)));
        for _ in 0..60 {
            world.step();
        }
        let pos = world.position(handle).unwrap();
        assert!(pos.y < 5.0);
        assert!(world.velocity(handle).unwrap().y < 0.0);
    }

    #[test]
    fn test_collision_start_is_tagged() {
        let mut world = PhysicsWorld::new(-15.0);
        world.insert_fixed_ball(BodyTag::Peg(PegId(7)), Vec2::ZERO, 0.25, Material::default());
        world.insert_dynamic_ball(BodyTag::Token(3), ball_at(Vec2::new(0.0, 1.0)));

        let mut tags = Vec::new();
        for _ in 0..120 {
            for event in world.step() {
                tags.push((
                    world.collider_tag(event.collider1),
                    world.collider_tag(event.collider2),
                ));
            }
            if !tags.is_empty() {
                break;
            }
        }

        let (a, b) = tags[0];
        let pair = [a.unwrap(), b.unwrap()];
        assert!(pair.contains(&BodyTag::Peg(PegId(7))));
        assert!(pair.contains(&BodyTag::Token(3)));
    }

    #[test]
    fn test_disabled_peg_is_passed_through() {
        let mut world = PhysicsWorld::new(-15.0);
        let peg = world.insert_fixed_ball(BodyTag::Peg(PegId(0)), Vec2::ZERO, 0.25, Material::default());
        world.set_enabled(peg, false);
        let token = world.insert_dynamic_ball(BodyTag::Token(0), ball_at(Vec2::new(0.0, 1.0)));

        let mut events = 0;
        for _ in 0..120 {
            events += world.step().len();
        }
        assert_eq!(events, 0);
        assert!(world.position(token).unwrap().y < -1.0);
    }

    #[test]
    fn test_impulse_changes_velocity() {
        let mut world = PhysicsWorld::new(0.0);
        let handle = world.insert_dynamic_ball(BodyTag::Token(0), ball_at(Vec2::ZERO));
        // Mass properties are settled by the first step
        world.step();
        assert!(world.apply_impulse(handle, Vec2::new(0.0, 3.0)));
        let vel = world.velocity(handle).unwrap();
        assert!((vel.y - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset_body_clears_motion() {
        let mut world = PhysicsWorld::new(-15.0);
        let handle = world.insert_dynamic_ball(BodyTag::Token(0), ball_at(Vec2::new(0.0, 5.0)));
        for _ in 0..30 {
            world.step();
        }
        world.reset_body(handle, Vec2::new(2.0, 12.0));
        assert_eq!(world.position(handle).unwrap(), Vec2::new(2.0, 12.0));
        assert_eq!(world.velocity(handle).unwrap(), Vec2::ZERO);
        assert!(world.rotation(handle).unwrap().abs() < 1e-6);
    }
}
