use core::fmt::{self, Write};

use serde::Serialize;
use thiserror::Error;

use super::{ScenarioDef, StoryText, TransitionTrigger};
use crate::event::StoryEventType;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    ScenarioIdEmpty,
    ScenarioStepsEmpty,
    ScenarioInitialStepInvalid,
    StepIdEmpty,
    StepIdDuplicate,
    TransitionTargetEmpty,
    TransitionTargetUnknown,
    TransitionEventInvalid,
    StepAppsInvalid,
}

impl ValidationCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScenarioIdEmpty => "SCENARIO_ID_EMPTY",
            Self::ScenarioStepsEmpty => "SCENARIO_STEPS_EMPTY",
            Self::ScenarioInitialStepInvalid => "SCENARIO_INITIAL_STEP_INVALID",
            Self::StepIdEmpty => "STEP_ID_EMPTY",
            Self::StepIdDuplicate => "STEP_ID_DUPLICATE",
            Self::TransitionTargetEmpty => "TRANSITION_TARGET_EMPTY",
            Self::TransitionTargetUnknown => "TRANSITION_TARGET_UNKNOWN",
            Self::TransitionEventInvalid => "TRANSITION_EVENT_INVALID",
            Self::StepAppsInvalid => "STEP_APPS_INVALID",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural defect found in a scenario; `detail` names the offending id.
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize)]
#[error("{code}: {detail}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub detail: StoryText,
}

impl ValidationError {
    pub fn new(code: ValidationCode, detail: &StoryText) -> Self {
        Self {
            code,
            detail: detail.clone(),
        }
    }

    fn at_index(code: ValidationCode, index: usize) -> Self {
        let mut detail = StoryText::new();
        // Fits: "#" plus at most 20 digits.
        let _ = write!(detail, "#{index}");
        Self { code, detail }
    }
}

/// Check scenario structure, stopping at the first defect.
pub fn validate(scenario: &ScenarioDef) -> Result<(), ValidationError> {
    if scenario.id.is_empty() {
        return Err(ValidationError::new(
            ValidationCode::ScenarioIdEmpty,
            &scenario.id,
        ));
    }

    if scenario.steps.is_empty() {
        return Err(ValidationError::new(
            ValidationCode::ScenarioStepsEmpty,
            &scenario.id,
        ));
    }

    if scenario.find_step_index(&scenario.initial_step_id).is_none() {
        return Err(ValidationError::new(
            ValidationCode::ScenarioInitialStepInvalid,
            &scenario.initial_step_id,
        ));
    }

    for (index, step) in scenario.steps.iter().enumerate() {
        if step.id.is_empty() {
            return Err(ValidationError::at_index(ValidationCode::StepIdEmpty, index));
        }

        if scenario.steps[index + 1..]
            .iter()
            .any(|later| later.id == step.id)
        {
            return Err(ValidationError::new(
                ValidationCode::StepIdDuplicate,
                &step.id,
            ));
        }

        for transition in &step.transitions {
            if transition.target_step_id.is_empty() {
                return Err(ValidationError::new(
                    ValidationCode::TransitionTargetEmpty,
                    &transition.id,
                ));
            }

            if scenario
                .find_step_index(&transition.target_step_id)
                .is_none()
            {
                return Err(ValidationError::new(
                    ValidationCode::TransitionTargetUnknown,
                    &transition.target_step_id,
                ));
            }

            if transition.trigger == TransitionTrigger::OnEvent
                && transition.event_type == StoryEventType::None
            {
                return Err(ValidationError::new(
                    ValidationCode::TransitionEventInvalid,
                    &transition.id,
                ));
            }
        }

        if step.resources.app_ids.iter().any(|app_id| app_id.is_empty()) {
            return Err(ValidationError::new(
                ValidationCode::StepAppsInvalid,
                &step.id,
            ));
        }
    }

    Ok(())
}
