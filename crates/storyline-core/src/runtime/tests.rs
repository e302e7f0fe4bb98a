use serde_json::json;

use super::*;
use crate::{
    app_host::NullAppHost,
    controller::ControllerConfig,
    event::{StoryEvent, StoryEventType},
    resources::MemoryFs,
};

fn fs_with_demo() -> MemoryFs {
    let mut fs = MemoryFs::new();
    fs.insert_sealed(
        "data/scenarios/FS_DEMO.json",
        json!({
            "id": "FS_DEMO",
            "version": 1,
            "initial_step": "A",
            "steps": [
                {
                    "step_id": "A",
                    "transitions": [{
                        "id": "T_AB",
                        "event_type": "unlock",
                        "target_step_id": "B",
                        "priority": 1
                    }]
                },
                { "step_id": "B" }
            ]
        })
        .to_string(),
    );
    fs
}

fn runtime(fs: MemoryFs, config: RuntimeConfig) -> PortableRuntime<MemoryFs, NullAppHost> {
    PortableRuntime::new(
        ResourceStore::new(fs, "data"),
        StoryController::new(NullAppHost::new(), ControllerConfig::default()),
        config,
    )
}

#[test]
fn resource_tree_is_preferred() {
    let mut runtime = runtime(fs_with_demo(), RuntimeConfig::default());
    runtime.set_scenario("FS_DEMO", 0, "test").unwrap();

    assert_eq!(runtime.state(), RuntimeState::Running);
    assert!(runtime.scenario_from_fs());
    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.scenario_id, "FS_DEMO");
    assert_eq!(snapshot.controller.story.step_id, "A");
    assert_eq!(snapshot.last_error, None);
}

#[test]
fn fs_failure_falls_back_to_catalog() {
    let mut runtime = runtime(MemoryFs::new(), RuntimeConfig::default());
    runtime.begin(0).unwrap();

    assert_eq!(runtime.state(), RuntimeState::Running);
    assert!(!runtime.scenario_from_fs());
    assert!(!runtime.snapshot().scenario_from_fs);
    assert_eq!(runtime.controller().engine().scenario_id(), "DEFAULT");
}

#[test]
fn tampered_tree_falls_back_when_catalog_has_the_id() {
    let mut fs = MemoryFs::new();
    fs.insert("data/scenarios/SPECTRE_RADIO_LAB.json", "{}");
    fs.insert("data/scenarios/SPECTRE_RADIO_LAB.json.sha256", "00");
    let mut runtime = runtime(fs, RuntimeConfig::default());

    runtime.set_scenario("SPECTRE_RADIO_LAB", 0, "test").unwrap();
    assert!(!runtime.scenario_from_fs());
    assert_eq!(
        runtime.store().last_error().map(|err| err.as_code()),
        Some("CHECKSUM_MISMATCH")
    );
}

#[test]
fn strict_mode_surfaces_fs_error_and_keeps_controller() {
    let config = RuntimeConfig {
        strict_fs_only: true,
        ..RuntimeConfig::default()
    };
    let mut runtime = runtime(fs_with_demo(), config);
    runtime.set_scenario("FS_DEMO", 0, "test").unwrap();

    let err = runtime.set_scenario("DEFAULT", 10, "test").unwrap_err();
    assert_eq!(err.as_code(), "littlefs_scenario_missing");
    assert_eq!(runtime.state(), RuntimeState::Error);
    assert_eq!(runtime.snapshot().last_error, Some("littlefs_scenario_missing"));
    assert_eq!(runtime.controller().engine().scenario_id(), "FS_DEMO");
    assert!(runtime.controller().engine().is_running());
}

#[test]
fn disabled_fallback_reports_fs_error() {
    let config = RuntimeConfig {
        allow_generated_fallback: false,
        ..RuntimeConfig::default()
    };
    let mut runtime = runtime(MemoryFs::new(), config);
    let err = runtime.begin(0).unwrap_err();
    assert!(matches!(err, RuntimeError::FsScenarioMissing { .. }));
}

#[test]
fn unknown_everywhere_is_not_found() {
    let mut runtime = runtime(MemoryFs::new(), RuntimeConfig::default());
    let err = runtime.set_scenario("NOWHERE", 0, "test").unwrap_err();
    assert_eq!(err.as_code(), "scenario_not_found");
    assert_eq!(runtime.state(), RuntimeState::Error);
}

#[test]
fn catalog_only_mode_skips_tree() {
    let config = RuntimeConfig {
        prefer_fs: false,
        ..RuntimeConfig::default()
    };
    let mut runtime = runtime(fs_with_demo(), config);
    assert!(runtime.set_scenario("FS_DEMO", 0, "test").is_err());
    runtime.set_scenario("DEFAULT", 0, "test").unwrap();
    assert!(!runtime.scenario_from_fs());
    assert!(runtime.store().scenario().is_none());
}

#[test]
fn update_only_while_running_and_stop_returns_to_idle() {
    let mut runtime = runtime(fs_with_demo(), RuntimeConfig::default());
    runtime.update(0);
    assert_eq!(runtime.state(), RuntimeState::Idle);

    runtime.set_scenario("FS_DEMO", 0, "test").unwrap();
    runtime
        .controller_mut()
        .post_event(StoryEvent::new(StoryEventType::Unlock, "", 0, 0).unwrap(), 0)
        .unwrap();
    runtime.update(5);
    assert_eq!(runtime.controller().engine().current_step_id(), "B");

    runtime.stop("test");
    assert_eq!(runtime.state(), RuntimeState::Idle);
    assert!(!runtime.controller().engine().is_running());
}

#[test]
fn listing_merges_tree_and_catalog() {
    let runtime = runtime(fs_with_demo(), RuntimeConfig::default());
    let entries = runtime.list_scenarios();
    let ids: std::vec::Vec<(&str, ScenarioSource)> = entries
        .iter()
        .map(|entry| (entry.info.id.as_str(), entry.source))
        .collect();
    assert_eq!(
        ids,
        [
            ("FS_DEMO", ScenarioSource::Fs),
            ("DEFAULT", ScenarioSource::Catalog),
            ("SPECTRE_RADIO_LAB", ScenarioSource::Catalog),
        ]
    );
}
