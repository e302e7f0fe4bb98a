//! App host without peripherals: screens and apps are tracked, audio packs
//! "play" for a fixed duration and then raise `audio_done`.

use heapless::Vec;
use log::{debug, info, warn};
use storyline_core::{
    app_host::{AppHost, EventSink},
    event::{StoryEvent, StoryEventType},
    registry::{self, AppKind},
    scenario::{MAX_APPS_PER_STEP, ScenarioDef, StepDef},
};

pub const DEFAULT_AUDIO_DURATION_MS: u32 = 3_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimulatedAppHostConfig {
    pub audio_duration_ms: u32,
    /// Refuse to start steps naming a scene outside the registry.
    pub strict_scenes: bool,
}

impl Default for SimulatedAppHostConfig {
    fn default() -> Self {
        Self {
            audio_duration_ms: DEFAULT_AUDIO_DURATION_MS,
            strict_scenes: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct PlayingAudio {
    pack_id: String,
    done_at_ms: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SimulatedAppHost {
    config: SimulatedAppHostConfig,
    scenario_id: String,
    scene: Option<String>,
    audio: Option<PlayingAudio>,
    apps: Vec<AppKind, MAX_APPS_PER_STEP>,
    last_error: Option<String>,
}

impl SimulatedAppHost {
    pub fn new(config: SimulatedAppHostConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn active_apps(&self) -> &[AppKind] {
        &self.apps
    }

    pub fn playing_pack(&self) -> Option<&str> {
        self.audio.as_ref().map(|audio| audio.pack_id.as_str())
    }

    fn reject(&mut self, message: String) -> bool {
        warn!("app-host: start failed scenario={} err={}", self.scenario_id, message);
        self.last_error = Some(message);
        false
    }
}

impl AppHost for SimulatedAppHost {
    fn begin(&mut self, scenario: &ScenarioDef) {
        self.scenario_id.clear();
        self.scenario_id.push_str(&scenario.id);
        self.scene = None;
        self.audio = None;
        self.apps.clear();
        self.last_error = None;
        info!(
            "app-host: begin scenario={} bindings={}",
            scenario.id,
            scenario.app_bindings.len()
        );
    }

    fn start_step(
        &mut self,
        _scenario: &ScenarioDef,
        step: &StepDef,
        now_ms: u32,
        source: &str,
    ) -> bool {
        self.last_error = None;
        let resources = &step.resources;

        let scene = resources.screen_scene_id.as_str();
        if !scene.is_empty() && !registry::is_known_screen_scene(scene) {
            if self.config.strict_scenes {
                return self.reject(format!("unknown scene {scene}"));
            }
            warn!("app-host: unknown scene id={} step={}", scene, step.id);
        }

        let mut apps = Vec::new();
        for app_id in &resources.app_ids {
            let Some(binding) = registry::find_app_binding(app_id) else {
                return self.reject(format!("unknown app {app_id}"));
            };
            // Capacity matches the step's app list.
            let _ = apps.push(binding.kind);
        }
        self.apps = apps;
        self.scene = (!scene.is_empty()).then(|| scene.to_owned());

        let pack = resources.audio_pack_id.as_str();
        self.audio = (!pack.is_empty()).then(|| PlayingAudio {
            pack_id: pack.to_owned(),
            done_at_ms: now_ms.wrapping_add(self.config.audio_duration_ms),
        });

        for action_id in &resources.action_ids {
            debug!("app-host: action id={} step={}", action_id, step.id);
        }
        info!(
            "app-host: step={} scene={} audio={} apps={} source={}",
            step.id,
            scene,
            pack,
            self.apps.len(),
            source
        );
        true
    }

    fn update(&mut self, now_ms: u32, sink: &mut EventSink) {
        let Some(audio) = &self.audio else {
            return;
        };
        if (now_ms.wrapping_sub(audio.done_at_ms) as i32) < 0 {
            return;
        }

        match StoryEvent::new(StoryEventType::AudioDone, &audio.pack_id, 0, now_ms) {
            Ok(event) => {
                if !sink.post(event) {
                    warn!("app-host: sink full, audio_done dropped pack={}", audio.pack_id);
                }
            }
            Err(err) => warn!("app-host: audio_done name err={}", err),
        }
        debug!("app-host: audio done pack={}", audio.pack_id);
        self.audio = None;
    }

    fn handle_event(&mut self, event: &StoryEvent, _sink: &mut EventSink) -> bool {
        if event.event_type != StoryEventType::AudioDone || self.audio.is_none() {
            return false;
        }
        // An external audio_done ends the simulated pack early.
        self.audio = None;
        true
    }

    fn stop_all(&mut self, reason: &str) {
        self.scene = None;
        self.audio = None;
        self.apps.clear();
        debug!("app-host: stop all reason={}", reason);
    }

    fn active_screen_scene_id(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn audio_busy(&self) -> bool {
        self.audio.is_some()
    }
}
