//! SkyTinker headless entry point
//!
//! Builds a starter vehicle, flies it with a simple autopilot until it
//! crashes (or the time limit runs out) and logs the result.
//!
//! Usage: `skytinker [tuning.json]`. Progress is saved under the system temp
//! directory unless `SKYTINKER_DATA` points elsewhere.

use std::path::PathBuf;

use glam::IVec3;
use skytinker::audio::AudioManager;
use skytinker::backend::{BackendHandle, LoggingClient};
use skytinker::persistence::JsonFileStorage;
use skytinker::runtime::Runtime;
use skytinker::sim::part::{PartTier, PartType};
use skytinker::sim::session::{PlayerProfile, SessionState};
use skytinker::tuning::Tuning;

/// Frame time of the simulated host loop
const FRAME_DT: f32 = 1.0 / 60.0;
/// Give up after this many simulated seconds
const TIME_LIMIT: f32 = 180.0;

fn main() {
    env_logger::init();
    log::info!("SkyTinker (headless) starting...");

    let tuning = match std::env::args().nth(1) {
        Some(path) => Tuning::load_or_default(path),
        None => Tuning::default(),
    };
    let data_dir = std::env::var_os("SKYTINKER_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("skytinker"));
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1);

    let mut runtime = Runtime::new(
        tuning,
        Box::new(JsonFileStorage::new(&data_dir)),
        PlayerProfile {
            player_id: None,
            player_name: Some("autopilot".to_string()),
            is_vip: false,
        },
        seed,
        Some(BackendHandle::spawn(Box::new(LoggingClient))),
        AudioManager::default(),
    );

    build_starter(&mut runtime);
    if let Err(e) = runtime.session_mut().start_flight() {
        log::error!("Could not launch: {}", e);
        return;
    }

    let mut elapsed = 0.0;
    while elapsed < TIME_LIMIT {
        let flap = autopilot(&runtime);
        runtime.session_mut().set_flap_input(flap);
        runtime.update(FRAME_DT, None);
        elapsed += FRAME_DT;

        if runtime.session().state() == SessionState::GameOver {
            break;
        }
    }

    let snapshot = runtime.snapshot();
    println!(
        "Run finished after {:.1}s: score {}, stage {} (best stage {}, best score {})",
        elapsed, snapshot.score, snapshot.stage, snapshot.highest_stage, snapshot.high_score
    );
    for (rank, entry) in runtime.high_scores().entries.iter().enumerate() {
        println!("  #{:<2} {:>6}  stage {}", rank + 1, entry.score, entry.stage);
    }
    println!("Progress saved in {}", data_dir.display());

    runtime.shutdown();
}

/// Three engines, a fuselage, two wings and a cockpit
fn build_starter(runtime: &mut Runtime) {
    let layout = [
        (PartType::Fuselage, IVec3::new(0, 0, 0)),
        (PartType::Engine, IVec3::new(0, 0, 1)),
        (PartType::Engine, IVec3::new(0, 0, 2)),
        (PartType::Engine, IVec3::new(0, 0, 3)),
        (PartType::Wing, IVec3::new(-1, 0, 0)),
        (PartType::Wing, IVec3::new(1, 0, 0)),
        (PartType::Cockpit, IVec3::new(0, 1, 0)),
    ];
    let session = runtime.session_mut();
    for (part_type, cell) in layout {
        if let Err(e) = session.place_part(part_type, PartTier::Normal, cell) {
            log::warn!("Skipped {} at {}: {}", part_type, cell, e);
        }
    }
    runtime.flush();

    let perf = runtime.session().performance();
    log::info!(
        "Vehicle: mass {:.1}, thrust {:.1}, lift {:.1}, stability {:.2}, connected: {}",
        perf.total_mass,
        perf.total_thrust,
        perf.total_lift,
        perf.stability_score,
        runtime.session().connectivity().connected
    );
}

/// Flap whenever the body sits below the next gap center
fn autopilot(runtime: &Runtime) -> bool {
    let session = runtime.session();
    let Some(body) = session.flight_body() else {
        return false;
    };
    let target = session
        .obstacles()
        .iter()
        .filter(|o| o.x + session.tuning().flight.obstacle_half_width() > body.position.x)
        .min_by(|a, b| a.x.total_cmp(&b.x))
        .map(|o| o.gap_center_y)
        .unwrap_or(session.tuning().flight.spawn_height);
    body.position.y + body.velocity.y * 0.25 < target
}
