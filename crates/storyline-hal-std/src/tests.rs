use std::path::PathBuf;

use storyline_core::{
    app_host::AppHost,
    command::{ReplyCode, handle_serial_line},
    controller::{ControllerConfig, StoryController},
    resources::ResourceStore,
    runtime::{PortableRuntime, RuntimeConfig, RuntimeState},
};

use crate::{
    host::{SimulatedAppHost, SimulatedAppHostConfig},
    storage::StdResourceFs,
};

fn sample_root() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../data")
        .to_string_lossy()
        .into_owned()
}

fn sample_runtime(strict: bool) -> PortableRuntime<StdResourceFs, SimulatedAppHost> {
    PortableRuntime::new(
        ResourceStore::new(StdResourceFs::default(), &sample_root()),
        StoryController::new(
            SimulatedAppHost::new(SimulatedAppHostConfig {
                audio_duration_ms: 200,
                ..SimulatedAppHostConfig::default()
            }),
            ControllerConfig::default(),
        ),
        RuntimeConfig {
            strict_fs_only: strict,
            ..RuntimeConfig::default()
        },
    )
}

#[test]
fn bundled_tree_runs_from_disk() {
    let mut runtime = sample_runtime(true);
    runtime.set_scenario("CAVE_DEMO", 0, "test").unwrap();
    assert_eq!(runtime.state(), RuntimeState::Running);
    assert!(runtime.scenario_from_fs());
    assert_eq!(runtime.store().cached_app_configs(), 3);
    assert_eq!(
        runtime.controller().host().active_screen_scene_id(),
        Some("SCENE_LOCKED")
    );

    let reply = handle_serial_line(&mut runtime, "STORY_V2_EVENT button", 10);
    assert_eq!(reply.code, ReplyCode::Ok);
    runtime.update(20);

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.controller.story.step_id, "CAVE_OPEN");
    assert!(snapshot.controller.story.mp3_gate_open);
    assert_eq!(runtime.controller().host().playing_pack(), Some("PACK_CAVE_WIN"));
}

#[test]
fn bundled_tree_is_listed_before_catalog() {
    let runtime = sample_runtime(false);
    let entries = runtime.list_scenarios();
    assert_eq!(entries[0].info.id, "CAVE_DEMO");
    assert!(entries[0].info.checksum_ok);
    assert_eq!(entries[0].info.estimated_duration_ms, 120_000);
    assert!(entries.iter().any(|entry| entry.info.id == "DEFAULT"));
}

#[test]
fn strict_mode_refuses_catalog_only_ids() {
    let mut runtime = sample_runtime(true);
    let err = runtime.set_scenario("DEFAULT", 0, "test").unwrap_err();
    assert_eq!(err.as_code(), "littlefs_scenario_missing");
    assert_eq!(runtime.state(), RuntimeState::Error);
}
