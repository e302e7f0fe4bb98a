//! Scenarios compiled into the firmware, used when the resource tree is
//! missing or fails verification.

use std::sync::Arc;

use log::warn;

use crate::{
    event::StoryEventType,
    scenario::{
        ScenarioDef, ScenarioInfo, StepDef, TextTooLong, TransitionDef, TransitionTrigger,
        story_text,
    },
};

pub const DEFAULT_SCENARIO_ID: &str = "DEFAULT";

struct CatalogTransition {
    id: &'static str,
    trigger: TransitionTrigger,
    event_type: StoryEventType,
    event_name: &'static str,
    after_ms: u32,
    target: &'static str,
    priority: u8,
}

struct CatalogStep {
    id: &'static str,
    screen_scene_id: &'static str,
    audio_pack_id: &'static str,
    actions: &'static [&'static str],
    apps: &'static [&'static str],
    mp3_gate_open: bool,
    transitions: &'static [CatalogTransition],
}

struct CatalogScenario {
    id: &'static str,
    version: u32,
    initial_step: &'static str,
    app_bindings: &'static [&'static str],
    steps: &'static [CatalogStep],
}

const fn on_event(
    id: &'static str,
    event_type: StoryEventType,
    event_name: &'static str,
    target: &'static str,
    priority: u8,
) -> CatalogTransition {
    CatalogTransition {
        id,
        trigger: TransitionTrigger::OnEvent,
        event_type,
        event_name,
        after_ms: 0,
        target,
        priority,
    }
}

const fn after_ms(
    id: &'static str,
    after_ms: u32,
    target: &'static str,
    priority: u8,
) -> CatalogTransition {
    CatalogTransition {
        id,
        trigger: TransitionTrigger::AfterMs,
        event_type: StoryEventType::None,
        event_name: "",
        after_ms,
        target,
        priority,
    }
}

const fn immediate(id: &'static str, target: &'static str, priority: u8) -> CatalogTransition {
    CatalogTransition {
        id,
        trigger: TransitionTrigger::Immediate,
        event_type: StoryEventType::None,
        event_name: "",
        after_ms: 0,
        target,
        priority,
    }
}

const DEFAULT_STEPS: [CatalogStep; 6] = [
    CatalogStep {
        id: "STEP_BOOT",
        screen_scene_id: "SCENE_READY",
        audio_pack_id: "",
        actions: &[],
        apps: &["APP_SCREEN"],
        mp3_gate_open: false,
        transitions: &[immediate("TR_BOOT_DONE", "STEP_LOCKED", 1)],
    },
    CatalogStep {
        id: "STEP_LOCKED",
        screen_scene_id: "SCENE_LOCKED",
        audio_pack_id: "PACK_LOCKED",
        actions: &[],
        apps: &["APP_SCREEN", "APP_AUDIO"],
        mp3_gate_open: false,
        transitions: &[
            on_event("TR_LOCKED_UNLOCK", StoryEventType::Unlock, "UNLOCK", "STEP_U_SON", 2),
            on_event("TR_LOCKED_BUTTON", StoryEventType::Button, "", "STEP_U_SON", 1),
            on_event(
                "TR_LOCKED_FORCE",
                StoryEventType::Serial,
                "FORCE_UNLOCK",
                "STEP_U_SON",
                3,
            ),
        ],
    },
    CatalogStep {
        id: "STEP_U_SON",
        screen_scene_id: "SCENE_BROKEN",
        audio_pack_id: "PACK_BROKEN_RADIO",
        actions: &["ACTION_TRACE_STEP"],
        apps: &["APP_SCREEN", "APP_AUDIO"],
        mp3_gate_open: false,
        transitions: &[
            on_event(
                "TR_U_SON_AUDIO_DONE",
                StoryEventType::AudioDone,
                "",
                "STEP_WAIT_ETAPE2",
                1,
            ),
            after_ms("TR_U_SON_TIMEOUT", 30_000, "STEP_WAIT_ETAPE2", 0),
        ],
    },
    CatalogStep {
        id: "STEP_WAIT_ETAPE2",
        screen_scene_id: "SCENE_SEARCH",
        audio_pack_id: "",
        actions: &[],
        apps: &["APP_SCREEN", "APP_LA"],
        mp3_gate_open: false,
        transitions: &[
            on_event(
                "TR_WAIT_DUE",
                StoryEventType::Timer,
                "ETAPE2_DUE",
                "STEP_ETAPE2",
                1,
            ),
            on_event(
                "TR_WAIT_FORCE",
                StoryEventType::Serial,
                "FORCE_ETAPE2",
                "STEP_ETAPE2",
                2,
            ),
        ],
    },
    CatalogStep {
        id: "STEP_ETAPE2",
        screen_scene_id: "SCENE_CAMERA_SCAN",
        audio_pack_id: "PACK_ETAPE2",
        actions: &["ACTION_QR_ARM"],
        apps: &["APP_SCREEN", "APP_AUDIO", "APP_QR_UNLOCK", "APP_ESPNOW"],
        mp3_gate_open: false,
        transitions: &[
            on_event("TR_ETAPE2_QR", StoryEventType::Action, "QR_OK", "STEP_DONE", 2),
            on_event("TR_ETAPE2_ACK", StoryEventType::EspNow, "ACK_WIN", "STEP_DONE", 1),
        ],
    },
    CatalogStep {
        id: "STEP_DONE",
        screen_scene_id: "SCENE_MP3_PLAYER",
        audio_pack_id: "PACK_WIN",
        actions: &[],
        apps: &["APP_SCREEN", "APP_GATE"],
        mp3_gate_open: true,
        transitions: &[on_event(
            "TR_DONE_RESET",
            StoryEventType::Serial,
            "RESET",
            "STEP_LOCKED",
            1,
        )],
    },
];

const RADIO_LAB_STEPS: [CatalogStep; 3] = [
    CatalogStep {
        id: "RADIO_INTRO",
        screen_scene_id: "SCENE_READY",
        audio_pack_id: "PACK_RADIO_INTRO",
        actions: &[],
        apps: &["APP_SCREEN", "APP_AUDIO"],
        mp3_gate_open: false,
        transitions: &[
            on_event(
                "TR_INTRO_DONE",
                StoryEventType::AudioDone,
                "",
                "RADIO_TUNE",
                1,
            ),
            after_ms("TR_INTRO_TIMEOUT", 20_000, "RADIO_TUNE", 0),
        ],
    },
    CatalogStep {
        id: "RADIO_TUNE",
        screen_scene_id: "SCENE_LA_DETECTOR",
        audio_pack_id: "",
        actions: &["ACTION_LA_LISTEN"],
        apps: &["APP_SCREEN", "APP_LA"],
        mp3_gate_open: false,
        transitions: &[
            on_event("TR_TUNE_MATCH", StoryEventType::Action, "LA_MATCH", "RADIO_REWARD", 2),
            on_event(
                "TR_TUNE_FORCE",
                StoryEventType::Serial,
                "FORCE_TUNE",
                "RADIO_REWARD",
                1,
            ),
        ],
    },
    CatalogStep {
        id: "RADIO_REWARD",
        screen_scene_id: "SCENE_REWARD",
        audio_pack_id: "PACK_RADIO_REWARD",
        actions: &[],
        apps: &["APP_SCREEN", "APP_AUDIO", "APP_GATE"],
        mp3_gate_open: true,
        transitions: &[after_ms("TR_REWARD_LOOP", 60_000, "RADIO_INTRO", 0)],
    },
];

const SCENARIOS: [CatalogScenario; 2] = [
    CatalogScenario {
        id: DEFAULT_SCENARIO_ID,
        version: 2,
        initial_step: "STEP_BOOT",
        app_bindings: &[
            "APP_SCREEN",
            "APP_AUDIO",
            "APP_LA",
            "APP_QR_UNLOCK",
            "APP_ESPNOW",
            "APP_GATE",
        ],
        steps: &DEFAULT_STEPS,
    },
    CatalogScenario {
        id: "SPECTRE_RADIO_LAB",
        version: 1,
        initial_step: "RADIO_INTRO",
        app_bindings: &["APP_SCREEN", "APP_AUDIO", "APP_LA", "APP_GATE"],
        steps: &RADIO_LAB_STEPS,
    },
];

/// Build a fresh definition for `id`.
pub fn by_id(id: &str) -> Option<Arc<ScenarioDef>> {
    let entry = SCENARIOS.iter().find(|entry| entry.id == id)?;
    match build(entry) {
        Ok(scenario) => Some(Arc::new(scenario)),
        Err(err) => {
            warn!("catalog: build failed id={} err={}", entry.id, err);
            None
        }
    }
}

pub fn default_scenario() -> Option<Arc<ScenarioDef>> {
    by_id(DEFAULT_SCENARIO_ID)
}

pub const fn count() -> usize {
    SCENARIOS.len()
}

pub fn id_at(index: usize) -> Option<&'static str> {
    SCENARIOS.get(index).map(|entry| entry.id)
}

/// Listing records for every buildable catalog entry.
pub fn infos() -> impl Iterator<Item = ScenarioInfo> {
    (0..count())
        .filter_map(id_at)
        .filter_map(by_id)
        .map(|scenario| ScenarioInfo::from_def(&scenario))
}

fn build(entry: &CatalogScenario) -> Result<ScenarioDef, TextTooLong> {
    let mut scenario = ScenarioDef::new(entry.id, entry.version, entry.initial_step)?;
    for binding in entry.app_bindings {
        if scenario.app_bindings.push(story_text(binding)?).is_err() {
            warn!("catalog: binding dropped scenario={} id={}", entry.id, binding);
        }
    }

    for source in entry.steps {
        let step = build_step(source)?;
        if scenario.steps.push(step).is_err() {
            warn!("catalog: step dropped scenario={} id={}", entry.id, source.id);
        }
    }

    Ok(scenario)
}

fn build_step(source: &CatalogStep) -> Result<StepDef, TextTooLong> {
    let mut step = StepDef::new(source.id)?;
    step.mp3_gate_open = source.mp3_gate_open;
    step.resources.screen_scene_id = story_text(source.screen_scene_id)?;
    step.resources.audio_pack_id = story_text(source.audio_pack_id)?;
    for action in source.actions {
        if step.resources.action_ids.push(story_text(action)?).is_err() {
            warn!("catalog: action dropped step={} id={}", source.id, action);
        }
    }
    for app in source.apps {
        if step.resources.app_ids.push(story_text(app)?).is_err() {
            warn!("catalog: app dropped step={} id={}", source.id, app);
        }
    }

    for transition in source.transitions {
        let built = TransitionDef {
            id: story_text(transition.id)?,
            trigger: transition.trigger,
            event_type: transition.event_type,
            event_name: story_text(transition.event_name)?,
            after_ms: transition.after_ms,
            target_step_id: story_text(transition.target)?,
            priority: transition.priority,
        };
        if step.transitions.push(built).is_err() {
            warn!("catalog: transition dropped step={} id={}", source.id, transition.id);
        }
    }

    Ok(step)
}
