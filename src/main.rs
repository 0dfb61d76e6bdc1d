//! Plinko Board headless runner
//!
//! Drives the simulation at a fixed render rate with synthetic chat traffic
//! and logs the resulting ledger.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use plinko_board::sim::{SimEvent, Simulation, SpawnRequest, SpawnTicket};
use plinko_board::{BoardPreset, Settings};

const EMOTES: &[&str] = &["Kappa", "PogChamp", "LUL", "monkaS", "OMEGALUL"];
const USERS: &[&str] = &["alice", "bob", "carol", "dave"];

/// Headless Plinko board simulation
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Seed for spawn positions and synthetic chat
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 60.0, value_parser = parse_non_negative)]
    seconds: f32,

    /// Emote spawns per second
    #[arg(long, default_value_t = 4.0, value_parser = parse_non_negative)]
    spawn_rate: f32,

    /// Render frames per second driving the fixed step
    #[arg(long, default_value_t = 60.0, value_parser = parse_non_negative)]
    fps: f32,

    /// Board preset (compact or wide) when no config file is given
    #[arg(long)]
    preset: Option<String>,

    /// JSON settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the final display snapshot as JSON
    #[arg(long)]
    json: bool,
}

/// Finite, non-negative number argument
fn parse_non_negative(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("expected a finite non-negative number, got {}", s));
    }
    Ok(value)
}

fn load_settings(args: &Args) -> Result<Settings, String> {
    if let Some(path) = &args.config {
        return Settings::load(path).map_err(|e| format!("{}: {}", path.display(), e));
    }
    match args.preset.as_deref() {
        None => Ok(Settings::default()),
        Some(name) => BoardPreset::from_str(name)
            .map(Settings::from_preset)
            .ok_or_else(|| format!("unknown preset '{}'", name)),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut sim = Simulation::new(settings, args.seed);
    let mut chat_rng = Pcg32::seed_from_u64(args.seed.wrapping_add(1));

    // Chat arrives from its own thread; the simulation drains it on its interval
    let inbox = sim.inbox();
    let portfolio: Vec<(&str, &str)> = USERS
        .iter()
        .map(|&user| (user, EMOTES[chat_rng.random_range(0..EMOTES.len())]))
        .collect();
    let chat = std::thread::spawn(move || {
        for (user, emote) in portfolio {
            inbox.send(user, format!("buy {}", emote));
        }
        inbox.send("dave", "hello chat");
    });
    if chat.join().is_err() {
        log::warn!("Chat thread panicked");
    }

    let fps = args.fps.max(1.0);
    let dt = 1.0 / fps;
    let frames = (args.seconds.max(0.0) * fps) as u64;
    let mut spawn_budget = 0.0f32;
    let mut despawned = 0u64;
    let mut dropped = 0u64;

    log::info!(
        "Running {:.1}s at {} fps, {} spawns/s",
        args.seconds,
        fps,
        args.spawn_rate
    );

    for _ in 0..frames {
        spawn_budget += args.spawn_rate * dt;
        while spawn_budget >= 1.0 {
            spawn_budget -= 1.0;
            let emote = EMOTES[chat_rng.random_range(0..EMOTES.len())];
            let user = USERS[chat_rng.random_range(0..USERS.len())];
            if sim.request_spawn(SpawnRequest::new(emote, user)) == SpawnTicket::Dropped {
                dropped += 1;
            }
        }

        for event in sim.frame(dt) {
            match event {
                SimEvent::TokenDespawned { .. } => despawned += 1,
                SimEvent::SpawnDropped { .. } => dropped += 1,
                SimEvent::PegsReset { reason, reactivated } => {
                    log::debug!("Pegs reset ({:?}), {} reactivated", reason, reactivated);
                }
                _ => {}
            }
        }
    }

    let stats = sim.stats();
    log::info!(
        "Done after {:.1}s simulated ({} ticks): {} spawned, {} despawned, {} dropped, {} bounces, {} peg resets",
        sim.now(),
        sim.ticks(),
        stats.spawned,
        despawned,
        dropped,
        stats.bounces,
        stats.peg_resets
    );
    log::info!(
        "{} tokens still live, total value {}",
        sim.live_count(),
        sim.scores().total_value()
    );
    for (user, balance) in sim.ledger().balances() {
        log::info!("  {:>8}: {:+}", user, balance);
    }

    if args.json {
        match serde_json::to_string_pretty(&sim.snapshot()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                log::error!("Failed to serialize snapshot: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
