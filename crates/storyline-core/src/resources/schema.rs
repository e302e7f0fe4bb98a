//! On-disk JSON layout of scenario and app config files.

use serde::Deserialize;
use serde_json::Value;

use crate::scenario::TransitionTrigger;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioFile {
    pub id: String,
    pub version: u32,
    pub initial_step: String,
    pub app_bindings: Vec<AppBindingFile>,
    pub steps: Vec<StepFile>,
}

impl ScenarioFile {
    /// Sum over steps of each step's longest `after_ms` delay.
    pub fn estimated_duration_ms(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| {
                step.transitions
                    .iter()
                    .filter(|transition| {
                        TransitionTrigger::from_schema(&transition.trigger)
                            == TransitionTrigger::AfterMs
                    })
                    .map(|transition| u64::from(transition.after_ms))
                    .max()
                    .unwrap_or(0)
            })
            .sum()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppBindingFile {
    pub id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StepFile {
    #[serde(alias = "id")]
    pub step_id: String,
    pub screen_scene_id: String,
    pub audio_pack_id: String,
    pub actions: Vec<String>,
    pub apps: Vec<String>,
    pub mp3_gate_open: bool,
    pub transitions: Vec<TransitionFile>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransitionFile {
    pub id: String,
    pub trigger: String,
    pub event_type: String,
    pub event_name: String,
    pub after_ms: u32,
    pub target_step_id: String,
    pub priority: u8,
}

/// `apps/<id>.json`: the app type tag plus an opaque config object.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppFile {
    pub id: String,
    pub app: String,
    #[serde(alias = "params")]
    pub config: Value,
}
