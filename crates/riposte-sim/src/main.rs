//! Headless scenario runner.
//!
//! Loads ability definitions, plays a scripted skirmish on the server side and
//! feeds every broadcast into a client mirror per character, the way a
//! connected client would see it. The tank's own inputs are anticipated on its
//! mirror before the server confirms them.
//!
//! ```text
//! riposte-sim --definitions actions.json --seed 7 --duration 10
//! RUST_LOG=riposte_core=debug riposte-sim
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use riposte_core::client::{ClientActionPlayer, VisualContext, VisualEvent};
use riposte_core::definition::DefinitionTable;
use riposte_core::entity::{EntityId, EntityTag};
use riposte_core::request::{ActionRequest, ActionType};
use riposte_core::server_player::PlayOutcome;
use riposte_core::simulation::Simulation;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_DEFINITIONS: &str = include_str!("../assets/actions.json");

/// Headless skirmish runner for the Riposte action engine
#[derive(Parser, Debug)]
#[command(name = "riposte-sim")]
#[command(version)]
struct Args {
    /// JSON ability definitions; the bundled table when omitted
    #[arg(long, value_name = "DEFINITIONS_JSON")]
    definitions: Option<PathBuf>,

    /// Master seed for every entity RNG
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 8.0)]
    duration: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let definitions = match &args.definitions {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading definitions from {}", path.display()))?,
        None => DEFAULT_DEFINITIONS.to_owned(),
    };

    let table = DefinitionTable::from_json(&definitions).context("loading definitions")?;
    info!(count = table.len(), seed = args.seed, "definitions loaded");

    let report = run_skirmish(args.seed, args.duration, Arc::new(table))?;
    report.log();
    Ok(())
}

// =============================================================================
// Scenario
// =============================================================================

/// One scripted input.
struct Cue {
    at: f32,
    entity: EntityId,
    input: Input,
}

enum Input {
    Action(ActionRequest),
    Move(Vec3),
    StopCharging,
}

struct Cast {
    tank: EntityId,
    archer: EntityId,
    rogue: EntityId,
    boss: EntityId,
    imps: [EntityId; 2],
}

impl Cast {
    fn spawn(sim: &mut Simulation) -> Self {
        Self {
            tank: sim.spawn_character(EntityTag::Hero, Vec3::ZERO, 120),
            archer: sim.spawn_character(EntityTag::Hero, Vec3::new(-4.0, 0.0, -2.0), 80),
            rogue: sim.spawn_character(EntityTag::Hero, Vec3::new(3.0, 0.0, -1.0), 90),
            boss: sim.spawn_character(EntityTag::Npc, Vec3::new(0.0, 0.0, 7.0), 300),
            imps: [
                sim.spawn_character(EntityTag::Npc, Vec3::new(-1.0, 0.0, 2.0), 30),
                sim.spawn_character(EntityTag::Npc, Vec3::new(2.0, 0.0, 3.0), 30),
            ],
        }
    }

    fn members(&self) -> Vec<EntityId> {
        let mut members = vec![self.tank, self.archer, self.rogue, self.boss];
        members.extend(self.imps);
        members
    }

    /// The inputs, sorted by time.
    fn script(&self) -> Vec<Cue> {
        let act = |at, entity, request| Cue { at, entity, input: Input::Action(request) };
        let [imp_a, imp_b] = self.imps;

        let mut script = vec![
            act(0.0, self.tank, ActionRequest::new(ActionType::TankBaseAttack).with_target(imp_a)),
            act(0.0, imp_a, ActionRequest::new(ActionType::ImpBaseAttack).with_target(self.tank)),
            act(0.1, self.archer, ActionRequest::new(ActionType::ArcherChargedShot)),
            act(0.3, self.rogue, ActionRequest::new(ActionType::RogueStealthMode)),
            act(
                0.5,
                self.boss,
                ActionRequest::new(ActionType::ImpBossTrampleAttack).with_target(self.tank),
            ),
            Cue { at: 0.6, entity: self.archer, input: Input::StopCharging },
            act(1.2, self.tank, ActionRequest::new(ActionType::TankShieldBuff)),
            act(
                1.5,
                imp_b,
                ActionRequest::new(ActionType::ImpBaseAttack).with_target(self.rogue).closing(),
            ),
            act(
                1.8,
                self.rogue,
                ActionRequest::new(ActionType::RogueDashAttack)
                    .with_position(Vec3::new(1.5, 0.0, 3.5)),
            ),
            Cue { at: 2.4, entity: self.tank, input: Input::StopCharging },
            act(
                3.0,
                self.archer,
                ActionRequest::new(ActionType::ArcherVolley).with_position(Vec3::new(0.0, 0.0, 6.0)),
            ),
            Cue { at: 3.5, entity: self.rogue, input: Input::Move(Vec3::new(4.0, 0.0, 0.0)) },
            act(
                4.0,
                self.boss,
                ActionRequest::new(ActionType::ImpBossBaseAttack).with_target(self.tank).closing(),
            ),
        ];
        for i in 0..3u8 {
            script.push(act(
                4.5 + f32::from(i) * 0.2,
                self.tank,
                ActionRequest::new(ActionType::TankBaseAttack).with_target(self.boss).queued(),
            ));
        }
        script
    }
}

// =============================================================================
// Runner
// =============================================================================

#[derive(Debug, Default)]
struct Report {
    ticks: u64,
    outcomes: BTreeMap<String, usize>,
    events: BTreeMap<String, usize>,
    anticipated: usize,
    visuals: Vec<VisualEvent>,
    hp: Vec<(EntityId, Option<i32>)>,
    still_playing: Vec<(EntityId, Vec<ActionType>)>,
}

impl Report {
    fn log(&self) {
        info!(ticks = self.ticks, anticipated = self.anticipated, "skirmish finished");
        for (outcome, count) in &self.outcomes {
            info!(outcome = %outcome, count, "requests");
        }
        for (kind, count) in &self.events {
            info!(kind = %kind, count, "world events");
        }
        info!(count = self.visuals.len(), "visual events");
        for (entity, hp) in &self.hp {
            match hp {
                Some(hp) => info!(entity = %entity, hp, "final hp"),
                None => warn!(entity = %entity, "entity missing at end of run"),
            }
        }
        for (entity, types) in &self.still_playing {
            debug!(entity = %entity, playing = ?types, "mirror still playing");
        }
    }
}

/// Runs the skirmish to completion and summarizes it.
fn run_skirmish(seed: u64, duration: f32, definitions: Arc<DefinitionTable>) -> Result<Report> {
    let mut sim = Simulation::new(seed, definitions);
    let cast = Cast::spawn(&mut sim);
    let mut mirrors: BTreeMap<EntityId, ClientActionPlayer> = cast
        .members()
        .into_iter()
        .map(|id| {
            let mirror = ClientActionPlayer::new(id, id == cast.tank, Arc::clone(sim.definitions()));
            (id, mirror)
        })
        .collect();
    let mut report = Report::default();
    let mut script = cast.script().into_iter().peekable();

    while sim.now() < duration {
        let now = sim.now();
        while let Some(cue) = script.next_if(|cue| cue.at <= now) {
            let local = cue.entity == cast.tank;
            apply_cue(&mut sim, &mut mirrors, &mut report, cue, local)?;
        }

        sim.step();
        let now = sim.now();
        let records = sim.drain_events();
        let mut ctx = VisualContext::new(now, sim.arena(), &mut report.visuals);
        for record in &records {
            *report.events.entry(record.event.kind().to_string()).or_default() += 1;
            for mirror in mirrors.values_mut() {
                mirror
                    .apply_event(&mut ctx, &record.event)
                    .with_context(|| format!("mirroring event {}", record.id))?;
            }
        }
        for mirror in mirrors.values_mut() {
            mirror.on_update(&mut ctx);
        }
    }

    report.ticks = sim.tick();
    report.hp = cast
        .members()
        .into_iter()
        .map(|id| (id, sim.arena().hp(id)))
        .collect();
    report.still_playing = mirrors
        .iter()
        .filter(|(_, mirror)| mirror.playing_count() > 0)
        .map(|(id, mirror)| (*id, mirror.playing_types()))
        .collect();
    Ok(report)
}

fn apply_cue(
    sim: &mut Simulation,
    mirrors: &mut BTreeMap<EntityId, ClientActionPlayer>,
    report: &mut Report,
    cue: Cue,
    local: bool,
) -> Result<()> {
    match cue.input {
        Input::Action(request) => {
            if local {
                if let Some(mirror) = mirrors.get_mut(&cue.entity) {
                    let mut ctx = VisualContext::new(sim.now(), sim.arena(), &mut report.visuals);
                    if mirror.anticipate_action(&mut ctx, &request)? {
                        report.anticipated += 1;
                    }
                }
            }
            let action_type = request.action_type;
            let outcome = sim
                .request_action(cue.entity, request)
                .with_context(|| format!("{} requesting {action_type}", cue.entity))?;
            if outcome == PlayOutcome::Discarded {
                warn!(entity = %cue.entity, action = %action_type, "request discarded");
            } else {
                debug!(entity = %cue.entity, action = %action_type, ?outcome, "request accepted");
            }
            *report.outcomes.entry(format!("{outcome:?}")).or_default() += 1;
        }
        Input::Move(destination) => sim.request_move(cue.entity, destination),
        Input::StopCharging => sim.stop_charging(cue.entity),
    }
    Ok(())
}
