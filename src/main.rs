#![cfg(not(target_arch = "wasm32"))]

use std::panic;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, LevelFilter};
use slop_physics::prelude::*;

const FRAME: Duration = Duration::from_micros(16_667);
const TICKS: u32 = 300;

fn main() {
    setup_diagnostics();
    info!("Starting physics demo (headless)...");

    if let Err(e) = run() {
        error!("Demo failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Optional JSON config path as the first argument.
    let config = match std::env::args().nth(1) {
        Some(path) => PhysicsConfig::load(&path).with_context(|| format!("loading config {}", path))?,
        None => PhysicsConfig::default(),
    };
    let mut scene = Scene::new(config).context("creating scene")?;

    // Floor plus a column of crates and a couple of balls.
    let floor = scene.physics().box_shape(Vec3::new(50.0, 1.0, 50.0));
    scene.spawn_body(floor, 0.0, Vec3::ZERO, Vec3::ZERO)?;

    let crate_shape = scene.physics().box_shape(Vec3::splat(0.5));
    let mut crates = Vec::new();
    for i in 0..5 {
        let y = 2.0 + i as f32 * 1.5;
        crates.push(scene.spawn_body(crate_shape.clone(), 1.0, Vec3::new(0.0, y, 0.0), Vec3::new(0.0, i as f32 * 15.0, 0.0))?);
    }

    let ball = scene.physics().sphere_shape(0.5);
    for x in [-3.0, 3.0] {
        scene.spawn_body(ball.clone(), 2.0, Vec3::new(x, 10.0, 0.0), Vec3::ZERO)?;
    }

    // Upright player capsule.
    let capsule = scene.physics().capsule_shape(0.5, 1.0);
    let player = scene.spawn_body(capsule, 50.0, Vec3::new(6.0, 3.0, 0.0), Vec3::ZERO)?;
    if let Some(body) = scene.body_of(player) {
        let mut physics = scene.physics();
        physics.lock_rotations(body, true)?;
        physics.set_friction(body, 8.0)?;
    }
    drop((crate_shape, ball));

    for tick in 0..TICKS {
        scene.update(FRAME);
        if tick == TICKS / 2 {
            // Knock the top crate off the column; its shape stays shared with the rest.
            if let Some(top) = crates.pop() {
                scene.destroy_entity(top);
            }
        }
    }
    scene.sync_transforms();

    let hits = scene.raycast(Vec3::new(0.0, 50.0, 0.0), Vec3::new(0.0, -50.0, 0.0), true);
    info!("Raycast down the column: {} hits", hits.len());
    for hit in &hits {
        info!("  {:?} at {:?} (normal {:?}, d={:.2})", hit.entity, hit.point, hit.normal, hit.distance);
    }

    if let Some(body) = scene.body_of(player) {
        let physics = scene.physics();
        info!("Player on ground: {}", physics.is_on_ground(body));
    }

    info!("Next shape-cache compaction in {:.2}s", scene.next_compaction_in());

    let stats = scene.physics().stats();
    info!(
        "Stats: {} bodies, {} colliders, {} steps, last step {:.3} ms, shapes {:?}",
        stats.bodies, stats.colliders, stats.steps_taken, stats.last_step_ms, stats.shapes
    );
    Ok(())
}

/// Logger plus a panic hook that routes panics through the log before the default report.
fn setup_diagnostics() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let msg = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        match panic_info.location() {
            Some(loc) => error!("Simulation thread '{}' panicked at {}:{}: {}", thread.name().unwrap_or("unnamed"), loc.file(), loc.line(), msg),
            None => error!("Simulation thread '{}' panicked: {}", thread.name().unwrap_or("unnamed"), msg),
        }
        default_hook(panic_info);
    }));
}
