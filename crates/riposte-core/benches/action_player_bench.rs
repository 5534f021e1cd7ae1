use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;
use riposte_core::client::{ClientActionPlayer, VisualContext, VisualEvent};
use riposte_core::definition::DefinitionTable;
use riposte_core::entity::{EntityId, EntityTag};
use riposte_core::request::{ActionRequest, ActionType};
use riposte_core::simulation::Simulation;

const DEFINITIONS: &str = r#"[
    { "action_type": "GeneralChase", "logic": "Chase",
      "action_interruptible": true, "is_friendly": true },
    { "action_type": "GeneralTarget", "logic": "Target", "action_interruptible": true,
      "blocking_mode": "OnlyDuringExecTime", "is_friendly": true },
    { "action_type": "Stun", "logic": "Stunned", "amount": 2, "duration_seconds": 3.0 },
    { "action_type": "TankBaseAttack", "logic": "Melee", "amount": 10, "range": 3.0,
      "duration_seconds": 1.0, "exec_time_seconds": 0.5, "anim": "Attack1" },
    { "action_type": "ImpBaseAttack", "logic": "Melee", "amount": 5, "range": 2.0,
      "duration_seconds": 0.8, "exec_time_seconds": 0.4, "action_interruptible": true },
    { "action_type": "ArcherBaseAttack", "logic": "RangedTargeted",
      "duration_seconds": 0.6, "exec_time_seconds": 0.2,
      "projectiles": [{ "prefab": "Arrow", "speed_m_s": 20.0, "range": 20.0,
                        "damage": 7, "max_victims": 1 }] }
]"#;

fn table() -> Arc<DefinitionTable> {
    Arc::new(DefinitionTable::from_json(DEFINITIONS).expect("bench definitions are valid"))
}

/// A small brawl: two heroes against a ring of imps, everyone swinging.
fn brawl(imps: usize) -> (Simulation, Vec<(EntityId, ActionRequest)>) {
    let mut sim = Simulation::new(7, table());
    let tank = sim.spawn_character(EntityTag::Hero, Vec3::ZERO, 10_000);
    let archer = sim.spawn_character(EntityTag::Hero, Vec3::new(-3.0, 0.0, 0.0), 10_000);

    let mut script = Vec::new();
    for i in 0..imps {
        let angle = i as f32 / imps as f32 * std::f32::consts::TAU;
        let pos = Vec3::new(angle.cos(), 0.0, angle.sin()) * 1.5;
        let imp = sim.spawn_character(EntityTag::Npc, pos, 10_000);
        script.push((imp, ActionRequest::new(ActionType::ImpBaseAttack).with_target(tank)));
        script.push((
            archer,
            ActionRequest::new(ActionType::ArcherBaseAttack).with_target(imp).queued(),
        ));
    }
    script.push((tank, ActionRequest::new(ActionType::TankBaseAttack)));
    (sim, script)
}

fn bench_brawl_step(c: &mut Criterion) {
    let (mut sim, script) = brawl(8);

    c.bench_function("brawl_step", |b| {
        b.iter(|| {
            for (entity, request) in &script {
                let _ = sim.request_action(*entity, request.clone());
            }
            sim.run_for(black_box(0.5));
            sim.drain_events()
        })
    });
}

fn bench_queue_churn(c: &mut Criterion) {
    let (mut sim, _) = brawl(1);
    let tank = EntityId::new(1);
    let swing = ActionRequest::new(ActionType::TankBaseAttack).queued();

    c.bench_function("queue_churn", |b| {
        b.iter(|| {
            for _ in 0..4 {
                let _ = black_box(sim.request_action(tank, swing.clone()));
            }
            sim.step();
        })
    });
}

fn bench_client_mirror(c: &mut Criterion) {
    let (mut sim, script) = brawl(4);
    for (entity, request) in &script {
        let _ = sim.request_action(*entity, request.clone());
    }
    sim.run_for(2.0);
    let events = sim.drain_events();
    let definitions = Arc::clone(sim.definitions());
    let owners: Vec<EntityId> = sim.arena().entity_ids_sorted().collect();

    c.bench_function("client_mirror_replay", |b| {
        b.iter(|| {
            let mut sink: Vec<VisualEvent> = Vec::new();
            let mut mirrors: Vec<ClientActionPlayer> = owners
                .iter()
                .map(|&owner| ClientActionPlayer::new(owner, false, Arc::clone(&definitions)))
                .collect();
            for record in &events {
                let mut ctx = VisualContext::new(sim.now(), sim.arena(), &mut sink);
                for mirror in &mut mirrors {
                    let _ = mirror.apply_event(&mut ctx, &record.event);
                }
            }
            black_box(sink.len())
        })
    });
}

criterion_group!(benches, bench_brawl_step, bench_queue_churn, bench_client_mirror);
criterion_main!(benches);
