//! Scenario data model: scenarios, steps, transitions and resource bindings.

use heapless::{String, Vec};
use serde::Serialize;
use thiserror::Error;

use crate::event::StoryEventType;

pub use validate::{ValidationCode, ValidationError, validate};

pub const STORY_TEXT_BYTES: usize = 32;
pub const MAX_STEPS: usize = 24;
pub const MAX_TRANSITIONS_PER_STEP: usize = 8;
pub const MAX_ACTIONS_PER_STEP: usize = 6;
pub const MAX_APPS_PER_STEP: usize = 6;
pub const MAX_APP_BINDINGS: usize = 12;

/// Bounded identifier or event name.
pub type StoryText = String<STORY_TEXT_BYTES>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("text of {len} bytes exceeds {capacity}-byte capacity")]
pub struct TextTooLong {
    pub len: usize,
    pub capacity: usize,
}

/// Copy `value` into a [`StoryText`], refusing to truncate.
pub fn story_text(value: &str) -> Result<StoryText, TextTooLong> {
    let mut text = StoryText::new();
    text.push_str(value).map_err(|_| TextTooLong {
        len: value.len(),
        capacity: STORY_TEXT_BYTES,
    })?;
    Ok(text)
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    #[default]
    OnEvent,
    AfterMs,
    Immediate,
}

impl TransitionTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnEvent => "on_event",
            Self::AfterMs => "after_ms",
            Self::Immediate => "immediate",
        }
    }

    /// Scenario files only name the timed and unconditional triggers; any
    /// other value is an event trigger.
    pub fn from_schema(value: &str) -> Self {
        match value.trim() {
            v if v.eq_ignore_ascii_case("after_ms") => Self::AfterMs,
            v if v.eq_ignore_ascii_case("immediate") => Self::Immediate,
            _ => Self::OnEvent,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TransitionDef {
    pub id: StoryText,
    pub trigger: TransitionTrigger,
    pub event_type: StoryEventType,
    /// Empty name matches every event of `event_type`.
    pub event_name: StoryText,
    pub after_ms: u32,
    pub target_step_id: StoryText,
    pub priority: u8,
}

impl TransitionDef {
    pub fn on_event(
        id: &str,
        event_type: StoryEventType,
        event_name: &str,
        target_step_id: &str,
        priority: u8,
    ) -> Result<Self, TextTooLong> {
        Ok(Self {
            id: story_text(id)?,
            trigger: TransitionTrigger::OnEvent,
            event_type,
            event_name: story_text(event_name)?,
            after_ms: 0,
            target_step_id: story_text(target_step_id)?,
            priority,
        })
    }

    pub fn after_ms(
        id: &str,
        after_ms: u32,
        target_step_id: &str,
        priority: u8,
    ) -> Result<Self, TextTooLong> {
        Ok(Self {
            id: story_text(id)?,
            trigger: TransitionTrigger::AfterMs,
            after_ms,
            target_step_id: story_text(target_step_id)?,
            priority,
            ..Self::default()
        })
    }

    pub fn immediate(id: &str, target_step_id: &str, priority: u8) -> Result<Self, TextTooLong> {
        Ok(Self {
            id: story_text(id)?,
            trigger: TransitionTrigger::Immediate,
            target_step_id: story_text(target_step_id)?,
            priority,
            ..Self::default()
        })
    }
}

/// Peripheral resources a step asks the app host to bring up.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ResourceBindings {
    pub screen_scene_id: StoryText,
    pub audio_pack_id: StoryText,
    pub action_ids: Vec<StoryText, MAX_ACTIONS_PER_STEP>,
    pub app_ids: Vec<StoryText, MAX_APPS_PER_STEP>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StepDef {
    pub id: StoryText,
    pub resources: ResourceBindings,
    pub transitions: Vec<TransitionDef, MAX_TRANSITIONS_PER_STEP>,
    pub mp3_gate_open: bool,
}

impl StepDef {
    pub fn new(id: &str) -> Result<Self, TextTooLong> {
        Ok(Self {
            id: story_text(id)?,
            ..Self::default()
        })
    }

    /// Largest `AfterMs` delay declared on this step, `0` when none.
    pub fn longest_delay_ms(&self) -> u32 {
        self.transitions
            .iter()
            .filter(|transition| transition.trigger == TransitionTrigger::AfterMs)
            .map(|transition| transition.after_ms)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ScenarioDef {
    pub id: StoryText,
    pub version: u32,
    pub initial_step_id: StoryText,
    pub steps: Vec<StepDef, MAX_STEPS>,
    pub app_bindings: Vec<StoryText, MAX_APP_BINDINGS>,
}

impl ScenarioDef {
    pub fn new(id: &str, version: u32, initial_step_id: &str) -> Result<Self, TextTooLong> {
        Ok(Self {
            id: story_text(id)?,
            version,
            initial_step_id: story_text(initial_step_id)?,
            ..Self::default()
        })
    }

    pub fn find_step_index(&self, step_id: &str) -> Option<usize> {
        find_step_index(self, step_id)
    }

    pub fn step(&self, index: usize) -> Option<&StepDef> {
        self.steps.get(index)
    }

    pub fn step_by_id(&self, step_id: &str) -> Option<&StepDef> {
        self.find_step_index(step_id).and_then(|index| self.step(index))
    }

    /// Rough play time: every step waits for its longest timed transition.
    pub fn estimated_duration_ms(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| u64::from(step.longest_delay_ms()))
            .sum()
    }
}

/// Linear scan over the scenario steps.
pub fn find_step_index(scenario: &ScenarioDef, step_id: &str) -> Option<usize> {
    scenario
        .steps
        .iter()
        .position(|step| step.id.as_str() == step_id)
}

/// Lightweight listing record produced without loading dependent resources.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ScenarioInfo {
    pub id: std::string::String,
    pub version: u32,
    pub step_count: usize,
    pub estimated_duration_ms: u64,
    pub checksum_ok: bool,
}

impl ScenarioInfo {
    pub fn from_def(scenario: &ScenarioDef) -> Self {
        Self {
            id: scenario.id.as_str().into(),
            version: scenario.version,
            step_count: scenario.steps.len(),
            estimated_duration_ms: scenario.estimated_duration_ms(),
            checksum_ok: true,
        }
    }
}

mod validate;
