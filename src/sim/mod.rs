//! Fixed-step board simulation
//!
//! Everything that touches the physics world lives here:
//! - Fixed 120 Hz timestep, frame deltas clamped
//! - Seeded RNG only (spawn positions)
//! - Stable iteration order (pegs by id, tokens by slot)
//! - No rendering or platform dependencies

pub mod board;
pub mod clock;
pub mod pegs;
pub mod physics;
pub mod pool;
pub mod resolver;
pub mod scoring;
pub mod simulation;

pub use board::{Board, BoardLayout, Peg, PegDef, PegId, PegTags, WallDef};
pub use clock::{FixedStepClock, FrameBudget, Interval};
pub use pegs::{HitOutcome, PegReset, PegState, PegStates, ResetReason};
pub use physics::{BodyTag, CollisionStart, PhysicsWorld};
pub use pool::{SpawnRequest, Token, TokenId, TokenPool};
pub use resolver::{CollisionResolver, Resolution, SkipReason, StepAction};
pub use scoring::ScoreAggregator;
pub use simulation::{
    DisplaySnapshot, PegView, SimEvent, SimStats, Simulation, SpawnTicket, TokenView,
};
