//! Simulation root
//!
//! Owns the physics world and every component around it, and runs the fixed
//! step in a fixed order:
//!
//! 1. apply queued spawn requests
//! 2. advance physics and drain collision-start events
//! 3. classify every event into [`StepAction`]s
//! 4. apply the actions (impulses, peg hits/resets, scores)
//! 5. reactivate pegs whose cooldown elapsed
//! 6. despawn tokens below the exit line and book their impact
//! 7. watchdog, chart and marketplace timers
//!
//! Nothing outside a step mutates the world except the explicit external
//! operations (`spawn_at`, `remove_token`, `reset_all_pegs`, grasping).

use std::collections::VecDeque;

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::Serialize;

use super::board::{Board, BoardLayout, PegId, PegTags};
use super::clock::{FixedStepClock, Interval};
use super::pegs::{HitOutcome, PegReset, PegStates, ResetReason};
use super::physics::PhysicsWorld;
use super::pool::{SpawnRequest, Token, TokenId, TokenPool};
use super::resolver::{CollisionResolver, Resolution, StepAction};
use super::scoring::ScoreAggregator;
use crate::heading_angle;
use crate::market::{ExitSide, Ledger, MarketInbox, Marketplace};
use crate::settings::Settings;

/// Answer to a spawn request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnTicket {
    /// Applied at the start of the next step
    Queued,
    /// Rejected because the clock is recovering from a stall
    Dropped,
}

/// Notification produced by a step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SimEvent {
    TokenSpawned { token: TokenId, position: Vec2 },
    /// Queued request discarded by a stalled frame
    SpawnDropped { emote: String, username: String },
    Bounce { token: TokenId, peg: PegId, impulse: Vec2 },
    /// Token touched a `nobounce` peg
    NoBounce { token: TokenId, peg: PegId },
    TokenScored { token: TokenId, score: u32 },
    PegDisabled { peg: PegId },
    /// Cooldown elapsed
    PegReactivated { peg: PegId },
    PegsReset { reason: ResetReason, reactivated: usize },
    TokenDespawned { token: TokenId, score: u32, side: ExitSide },
    ChartUpdated { total: u64 },
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub spawned: u64,
    pub despawned: u64,
    pub dropped_spawns: u64,
    pub bounces: u64,
    pub skipped_events: u64,
    pub peg_resets: u64,
}

/// Render view of one token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenView {
    pub id: TokenId,
    pub emote: String,
    pub username: String,
    pub position: Vec2,
    /// Velocity heading in radians
    pub heading: f32,
    pub score: u32,
    pub grasped: bool,
}

/// Render view of one peg
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PegView {
    pub id: PegId,
    pub position: Vec2,
    pub tags: PegTags,
    pub active: bool,
    pub scale: f32,
}

/// Read-only state sampled once per render frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    pub time: f64,
    pub tokens: Vec<TokenView>,
    pub pegs: Vec<PegView>,
    /// Rolling total-value series, oldest first
    pub series: Vec<f32>,
    pub normalized_series: Vec<f32>,
    pub live_count: usize,
    pub total_value: u64,
}

/// The whole board simulation
pub struct Simulation {
    settings: Settings,
    seed: u64,
    rng: Pcg32,
    world: PhysicsWorld,
    board: Board,
    pegs: PegStates,
    pool: TokenPool,
    resolver: CollisionResolver,
    scores: ScoreAggregator,
    market: Marketplace,
    clock: FixedStepClock,
    pending: VecDeque<SpawnRequest>,
    actions: Vec<StepAction>,
    chart_timer: Interval,
    inbox_timer: Interval,
    stats: SimStats,
}

impl Simulation {
    /// Build the board for `settings` with a seeded spawn RNG
    pub fn new(settings: Settings, seed: u64) -> Self {
        let layout = BoardLayout::generate(&settings.board);
        Self::with_layout(settings, layout, seed)
    }

    /// Build from an explicit layout
    pub fn with_layout(settings: Settings, layout: BoardLayout, seed: u64) -> Self {
        let settings = settings.sanitized();
        let mut world = PhysicsWorld::new(settings.physics.gravity);
        let board = Board::build(&layout, settings.pegs.radius, &mut world);
        let pegs = PegStates::new(board.pegs.iter().map(|p| p.tags), &settings.pegs, 0.0);

        log::info!(
            "Simulation ready: preset {}, seed {}",
            settings.board.preset.as_str(),
            seed
        );

        Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            world,
            board,
            pegs,
            pool: TokenPool::new(&settings.tokens),
            resolver: CollisionResolver::new(&settings.tokens),
            scores: ScoreAggregator::new(&settings.market),
            market: Marketplace::new(),
            clock: FixedStepClock::new(&settings.physics),
            pending: VecDeque::new(),
            actions: Vec::new(),
            chart_timer: Interval::new(settings.market.chart_interval, 0.0),
            inbox_timer: Interval::new(settings.market.inbox_interval, 0.0),
            stats: SimStats::default(),
            settings,
        }
    }

    /// Queue a spawn for the next step; dropped while stalled
    pub fn request_spawn(&mut self, request: SpawnRequest) -> SpawnTicket {
        if self.clock.is_stalled() {
            self.stats.dropped_spawns += 1;
            log::debug!("Spawn of {} dropped during stall", request.emote);
            return SpawnTicket::Dropped;
        }
        self.pending.push_back(request);
        SpawnTicket::Queued
    }

    /// Spawn immediately at `position` (drop choreography, scripted scenes)
    pub fn spawn_at(&mut self, request: SpawnRequest, position: Vec2) -> TokenId {
        let now = self.clock.now();
        let id = self.pool.acquire_at(&mut self.world, position, request, now);
        self.on_spawned(id);
        id
    }

    /// Advance by one render frame's wall-clock delta (seconds)
    pub fn frame(&mut self, elapsed: f32) -> Vec<SimEvent> {
        let budget = self.clock.begin_frame(elapsed);
        let mut events = Vec::new();

        if budget.stalled {
            let dropped = self.pending.len();
            for request in self.pending.drain(..) {
                events.push(SimEvent::SpawnDropped {
                    emote: request.emote,
                    username: request.username,
                });
            }
            self.stats.dropped_spawns += dropped as u64;
            log::warn!(
                "Frame stalled ({:.2}s): {} queued spawns dropped",
                elapsed,
                dropped
            );
        }

        for _ in 0..budget.steps {
            self.step_into(&mut events);
        }
        events
    }

    /// Run exactly one fixed step
    pub fn step(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        self.step_into(&mut events);
        events
    }

    fn step_into(&mut self, events: &mut Vec<SimEvent>) {
        let spawn_time = self.clock.now();
        while let Some(request) = self.pending.pop_front() {
            let id = self
                .pool
                .acquire(&mut self.world, &mut self.rng, request, spawn_time);
            self.on_spawned(id);
            let position = self
                .pool
                .handle(id)
                .and_then(|h| self.world.position(h))
                .unwrap_or_default();
            events.push(SimEvent::TokenSpawned { token: id, position });
        }

        let contacts = self.world.step();
        self.clock.tick();
        let now = self.clock.now();

        self.actions.clear();
        for contact in contacts {
            let resolution = self.resolver.resolve(
                contact,
                &self.world,
                &self.board,
                &self.pegs,
                &self.pool,
                &mut self.actions,
            );
            match resolution {
                Resolution::Bounce {
                    token,
                    peg,
                    impulse,
                } => {
                    self.stats.bounces += 1;
                    events.push(SimEvent::Bounce {
                        token,
                        peg,
                        impulse,
                    });
                }
                Resolution::NoBounce { token, peg, .. } => {
                    events.push(SimEvent::NoBounce { token, peg });
                }
                Resolution::Skipped(reason) => {
                    self.stats.skipped_events += 1;
                    log::debug!("Collision skipped: {:?}", reason);
                }
                Resolution::Ignored => {}
            }
        }

        let actions = std::mem::take(&mut self.actions);
        for action in &actions {
            self.apply_action(*action, now, events);
        }
        self.actions = actions;

        for peg in self.pegs.tick(now) {
            self.set_peg_enabled(peg, true);
            events.push(SimEvent::PegReactivated { peg });
        }

        for id in self.pool.exited(&self.world) {
            if let Some(event) = self.despawn(id, now) {
                events.push(event);
            }
        }

        if let Some(reset) = self.pegs.watchdog(now) {
            self.apply_reset(reset, events);
        }

        if self.chart_timer.due(now) {
            let total = self.scores.recalc();
            events.push(SimEvent::ChartUpdated { total });
        }

        if self.inbox_timer.due(now) {
            let applied = self.market.process_inbox();
            if applied > 0 {
                log::debug!("Applied {} marketplace commands", applied);
            }
        }
    }

    fn apply_action(&mut self, action: StepAction, now: f64, events: &mut Vec<SimEvent>) {
        match action {
            StepAction::Impulse { token, impulse } => {
                if let Some(handle) = self.pool.handle(token) {
                    self.world.apply_impulse(handle, impulse);
                }
            }
            StepAction::HitPeg { peg } => match self.pegs.hit(peg, now) {
                HitOutcome::Disabled => {
                    self.set_peg_enabled(peg, false);
                    events.push(SimEvent::PegDisabled { peg });
                }
                HitOutcome::Reset(reset) => self.apply_reset(reset, events),
                HitOutcome::Ignored => {}
            },
            StepAction::ResetPegs { .. } => {
                let reset = self.pegs.reset_all(ResetReason::ResetPeg, now);
                self.apply_reset(reset, events);
            }
            StepAction::Score { token } => {
                if let Some(t) = self.pool.get_mut(token) {
                    let score = t.add_point();
                    self.scores.on_token_scored(token, score);
                    events.push(SimEvent::TokenScored { token, score });
                }
            }
        }
    }

    fn apply_reset(&mut self, reset: PegReset, events: &mut Vec<SimEvent>) {
        for &peg in &reset.reactivated {
            self.set_peg_enabled(peg, true);
        }
        self.stats.peg_resets += 1;
        events.push(SimEvent::PegsReset {
            reason: reset.reason,
            reactivated: reset.reactivated.len(),
        });
    }

    fn set_peg_enabled(&mut self, peg: PegId, enabled: bool) {
        if let Some(handle) = self.board.peg(peg).map(|p| p.handle) {
            self.world.set_enabled(handle, enabled);
        }
    }

    fn on_spawned(&mut self, id: TokenId) {
        self.scores.on_token_spawned(id);
        self.stats.spawned += 1;
    }

    /// Release a live token and book its impact; `None` if not live
    fn despawn(&mut self, id: TokenId, now: f64) -> Option<SimEvent> {
        let handle = self.pool.handle(id)?;
        let x = self.world.position(handle).map(|p| p.x).unwrap_or(0.0);
        let token = self.pool.release(&mut self.world, id)?;

        let tracked = self.scores.on_token_despawned(id).unwrap_or(0);
        let score = token.score.max(tracked);
        let side = ExitSide::from_x(x);
        self.market.record_impact(id, &token.emote, score, side, now);
        self.stats.despawned += 1;

        Some(SimEvent::TokenDespawned {
            token: id,
            score,
            side,
        })
    }

    /// Remove a token from outside the step; repeated calls are no-ops
    pub fn remove_token(&mut self, id: TokenId) -> Option<SimEvent> {
        let now = self.clock.now();
        self.despawn(id, now)
    }

    /// Reactivate every peg now
    pub fn reset_all_pegs(&mut self) -> PegReset {
        let reset = self.pegs.reset_all(ResetReason::External, self.clock.now());
        for &peg in &reset.reactivated {
            self.set_peg_enabled(peg, true);
        }
        self.stats.peg_resets += 1;
        reset
    }

    /// Hold a token in place (kinematic); it never exits while held
    pub fn grasp_token(&mut self, id: TokenId) -> bool {
        self.pool.grasp(&mut self.world, id)
    }

    pub fn move_grasped_token(&mut self, id: TokenId, position: Vec2) -> bool {
        self.pool.move_grasped(&mut self.world, id, position)
    }

    /// Let go of a held token with an initial velocity
    pub fn drop_grasped_token(&mut self, id: TokenId, velocity: Vec2) -> bool {
        self.pool.drop_grasped(&mut self.world, id, velocity)
    }

    /// Sample everything a renderer needs
    pub fn snapshot(&self) -> DisplaySnapshot {
        let tokens = self
            .pool
            .iter()
            .map(|(token, handle)| TokenView {
                id: token.id,
                emote: token.emote.clone(),
                username: token.username.clone(),
                position: self.world.position(handle).unwrap_or_default(),
                heading: heading_angle(self.world.velocity(handle).unwrap_or_default()),
                score: token.score,
                grasped: token.grasped,
            })
            .collect();

        let pegs = self
            .board
            .pegs
            .iter()
            .map(|peg| PegView {
                id: peg.id,
                position: peg.pos,
                tags: peg.tags,
                active: self.pegs.is_active(peg.id),
                scale: self.pegs.scale(peg.id),
            })
            .collect();

        DisplaySnapshot {
            time: self.clock.now(),
            tokens,
            pegs,
            series: self.scores.series(),
            normalized_series: self.scores.normalized_series(),
            live_count: self.pool.len(),
            total_value: self.scores.total_value(),
        }
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.pool.get(id)
    }

    pub fn live_count(&self) -> usize {
        self.pool.len()
    }

    pub fn pending_spawns(&self) -> usize {
        self.pending.len()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn pegs(&self) -> &PegStates {
        &self.pegs
    }

    pub fn scores(&self) -> &ScoreAggregator {
        &self.scores
    }

    pub fn market(&self) -> &Marketplace {
        &self.market
    }

    pub fn market_mut(&mut self) -> &mut Marketplace {
        &mut self.market
    }

    /// Sender for chat lines; drained on the marketplace interval
    pub fn inbox(&self) -> MarketInbox {
        self.market.inbox()
    }

    pub fn ledger(&self) -> &Ledger {
        self.market.ledger()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Simulated seconds since start
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn ticks(&self) -> u64 {
        self.clock.ticks()
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }
}
