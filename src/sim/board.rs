//! Board layout: walls and the peg field
//!
//! [`BoardLayout::generate`] is a pure function of the settings, so the same
//! settings always produce the same pegs with the same tags. [`Board::build`]
//! then registers every wall and peg as a fixed body in the physics world.

use std::f32::consts::PI;

use glam::Vec2;
use rapier2d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use super::physics::{BodyTag, Material, PhysicsWorld};
use crate::settings::BoardSettings;

/// Stable peg identifier (generation order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PegId(pub u32);

/// Behaviour tags of a peg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PegTags {
    /// Amplified bounce
    pub superbounce: bool,
    /// No bounce, no shrink, no score
    pub nobounce: bool,
    /// Hitting it reactivates every peg
    pub reset_pegs: bool,
    /// Counted by the watchdog (arc row)
    pub togglable: bool,
}

impl PegTags {
    /// `nobounce` wins over `superbounce`
    pub fn bounces(&self) -> bool {
        !self.nobounce
    }

    pub fn is_superbounce(&self) -> bool {
        self.superbounce && !self.nobounce
    }

    /// Tags for the arc peg at running index `index`
    pub fn for_arc_index(index: i32) -> Self {
        let n = index.abs();
        Self {
            superbounce: n == 4 || n == 12,
            nobounce: n == 8 || n == 16,
            reset_pegs: n == 8,
            togglable: true,
        }
    }
}

/// Peg definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PegDef {
    pub id: PegId,
    pub pos: Vec2,
    pub tags: PegTags,
}

/// Wall definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallDef {
    pub pos: Vec2,
    pub half_extents: Vec2,
    pub rotation: f32,
    /// Part of the playfield (false for decorative walls off the board)
    pub on_board: bool,
}

impl WallDef {
    fn new(x: f32, y: f32, width: f32, height: f32, rotation: f32, on_board: bool) -> Self {
        Self {
            pos: Vec2::new(x, y),
            half_extents: Vec2::new(width / 2.0, height / 2.0),
            rotation,
            on_board,
        }
    }
}

/// Complete static layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardLayout {
    pub walls: Vec<WallDef>,
    pub pegs: Vec<PegDef>,
}

impl BoardLayout {
    /// Generate the layout for the given settings
    pub fn generate(settings: &BoardSettings) -> Self {
        let mut layout = Self::default();
        layout.walls = boundary_walls();
        if settings.idle_walls {
            layout.walls.extend(idle_walls());
        }

        let preset = settings.preset;

        // Grid region: striped rows, middle rows left open as a funnel gap
        let (col_min, col_max) = preset.grid_columns();
        let spacing_x = preset.grid_spacing_x();
        for x in col_min..=col_max {
            for y in -5i32..=5 {
                if (-1..=1).contains(&y) {
                    continue;
                }
                let stripe = if y % 2 == 0 { 0.5 } else { 0.0 };
                let pos = Vec2::new((x as f32 + stripe) * spacing_x, y as f32 * settings.row_spacing);
                layout.push_peg(pos, PegTags::default());
            }
        }

        // Sinusoidal arc across the funnel gap
        let half = preset.arc_half_count();
        let (step, offset, amplitude) = preset.arc_shape();
        for i in -half..half {
            let phase = (i as f32 / settings.board_length) * PI * 1.5;
            let pos = Vec2::new(i as f32 * step + offset, phase.sin() * amplitude);
            layout.push_peg(pos, PegTags::for_arc_index(i));
        }

        layout
    }

    /// Append a peg with the next id
    pub fn push_peg(&mut self, pos: Vec2, tags: PegTags) -> PegId {
        let id = PegId(self.pegs.len() as u32);
        self.pegs.push(PegDef { id, pos, tags });
        id
    }

    pub fn togglable_count(&self) -> usize {
        self.pegs.iter().filter(|p| p.tags.togglable).count()
    }
}

fn boundary_walls() -> Vec<WallDef> {
    vec![
        WallDef::new(-7.0, 0.0, 0.25, 17.0, 0.0, true),
        WallDef::new(7.5, 0.0, 0.25, 17.0, 0.0, true),
        // Lid above the spawn band, only reachable by tokens bounced upward
        WallDef::new(0.25, 16.0, 14.5, 0.25, 0.0, true),
    ]
}

fn idle_walls() -> Vec<WallDef> {
    vec![
        WallDef::new(-15.0 + 0.526, 4.0, 2.0, 0.5, -PI / 4.0, false),
        WallDef::new(-15.0 - 0.526, 4.0, 2.0, 0.5, PI / 4.0, false),
        WallDef::new(-15.0 + 3.5, -1.0, 5.0, 0.5, 0.5, false),
        WallDef::new(-15.0 - 3.5, -1.0, 5.0, 0.5, -0.5, false),
    ]
}

/// A peg registered in the physics world
#[derive(Debug, Clone)]
pub struct Peg {
    pub id: PegId,
    pub pos: Vec2,
    pub tags: PegTags,
    pub handle: RigidBodyHandle,
}

/// A wall registered in the physics world
#[derive(Debug, Clone)]
pub struct Wall {
    pub def: WallDef,
    pub handle: RigidBodyHandle,
}

/// The built board (pegs sorted by id)
#[derive(Debug, Clone)]
pub struct Board {
    pub walls: Vec<Wall>,
    pub pegs: Vec<Peg>,
}

impl Board {
    /// Register the layout's walls and pegs as fixed bodies
    pub fn build(layout: &BoardLayout, peg_radius: f32, world: &mut PhysicsWorld) -> Self {
        let walls = layout
            .walls
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let handle = world.insert_fixed_cuboid(
                    BodyTag::Wall(i as u32),
                    def.pos,
                    def.half_extents,
                    def.rotation,
                    Material::default(),
                );
                Wall {
                    def: def.clone(),
                    handle,
                }
            })
            .collect();

        let pegs: Vec<Peg> = layout
            .pegs
            .iter()
            .map(|def| {
                let material = if def.tags.nobounce {
                    Material {
                        friction: 0.8,
                        restitution: 0.0,
                    }
                } else {
                    Material {
                        friction: 0.2,
                        restitution: 0.5,
                    }
                };
                let handle = world.insert_fixed_ball(BodyTag::Peg(def.id), def.pos, peg_radius, material);
                Peg {
                    id: def.id,
                    pos: def.pos,
                    tags: def.tags,
                    handle,
                }
            })
            .collect();

        log::info!(
            "Board built: {} walls, {} pegs ({} togglable)",
            layout.walls.len(),
            pegs.len(),
            layout.togglable_count()
        );

        Self { walls, pegs }
    }

    pub fn peg(&self, id: PegId) -> Option<&Peg> {
        // Ids are dense and assigned in order
        self.pegs.get(id.0 as usize).filter(|p| p.id == id)
    }
}
