//! Transition engine: a Stopped/Running state machine stepping through one
//! scenario, fed by the bounded event queue.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    event::{StoryEvent, StoryEventQueue},
    scenario::{
        ScenarioDef, StepDef, StoryText, TransitionDef, TransitionTrigger, ValidationError,
        validate,
    },
};

/// Events drained per `update`; bounds tick latency under bursts.
pub const EVENT_BUDGET_PER_TICK: usize = 6;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    #[default]
    Stopped,
    Running,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EngineError {
    #[error("scenario rejected: {0}")]
    Invalid(ValidationError),
    #[error("no scenario loaded or engine stopped")]
    ScenarioNotLoaded,
    #[error("scenario id mismatch (loaded={loaded}, requested={requested})")]
    ScenarioIdMismatch { loaded: StoryText, requested: String },
    #[error("initial step {0} not found")]
    InitialStepNotFound(StoryText),
    #[error("event queue full")]
    EventQueueFull,
    #[error("event budget exhausted with {0} events still queued")]
    EventBudget(usize),
    #[error("transition target {0} not found")]
    TargetStepNotFound(StoryText),
    #[error("step {0} not found")]
    StepNotFound(String),
}

impl EngineError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Invalid(err) => err.code.as_str(),
            Self::ScenarioNotLoaded => "SCENARIO_NOT_LOADED",
            Self::ScenarioIdMismatch { .. } => "SCENARIO_ID_MISMATCH",
            Self::InitialStepNotFound(_) => "INITIAL_STEP_NOT_FOUND",
            Self::EventQueueFull => "EVENT_QUEUE_FULL",
            Self::EventBudget(_) => "EVENT_BUDGET",
            Self::TargetStepNotFound(_) => "TARGET_STEP_NOT_FOUND",
            Self::StepNotFound(_) => "STEP_NOT_FOUND",
        }
    }

    /// Backpressure conditions are informational; everything else marks the
    /// engine unhealthy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EventQueueFull | Self::EventBudget(_))
    }
}

/// Read view of the engine; derived on demand.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StorySnapshot {
    pub running: bool,
    pub mp3_gate_open: bool,
    pub scenario_id: String,
    pub step_id: String,
    pub previous_step_id: String,
    pub step_index: usize,
    pub step_entered_at_ms: u32,
    pub next_due_at_ms: Option<u32>,
    pub queued_events: usize,
    pub dropped_events: u32,
    pub last_transition_id: String,
    pub last_error: &'static str,
}

#[derive(Debug, Default)]
pub struct ScenarioEngine {
    scenario: Option<Arc<ScenarioDef>>,
    queue: StoryEventQueue,
    status: EngineStatus,
    current: usize,
    previous: usize,
    entered_at_ms: u32,
    step_changed: bool,
    last_transition_id: String,
    last_error: Option<EngineError>,
}

impl ScenarioEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and adopt `scenario`. The engine ends up stopped; a rejected
    /// scenario leaves the previous one in place.
    pub fn load_scenario(&mut self, scenario: Arc<ScenarioDef>) -> Result<(), EngineError> {
        if let Err(err) = validate(&scenario) {
            warn!(
                "story-engine: load rejected scenario={} code={} detail={}",
                scenario.id, err.code, err.detail
            );
            return Err(self.fail(EngineError::Invalid(err)));
        }

        info!(
            "story-engine: scenario loaded id={} version={} steps={}",
            scenario.id,
            scenario.version,
            scenario.steps.len()
        );
        self.scenario = Some(scenario);
        self.queue.clear();
        self.status = EngineStatus::Stopped;
        self.current = 0;
        self.previous = 0;
        self.step_changed = false;
        self.last_transition_id.clear();
        self.last_error = None;
        Ok(())
    }

    /// Enter the initial step. An empty `scenario_id` skips the identity check.
    pub fn start(&mut self, scenario_id: &str, now_ms: u32) -> Result<(), EngineError> {
        let Some(scenario) = self.scenario.clone() else {
            return Err(self.fail(EngineError::ScenarioNotLoaded));
        };

        if !scenario_id.is_empty() && scenario.id.as_str() != scenario_id {
            return Err(self.fail(EngineError::ScenarioIdMismatch {
                loaded: scenario.id.clone(),
                requested: scenario_id.into(),
            }));
        }

        let Some(initial) = scenario.find_step_index(&scenario.initial_step_id) else {
            return Err(self.fail(EngineError::InitialStepNotFound(
                scenario.initial_step_id.clone(),
            )));
        };

        self.queue.clear();
        self.status = EngineStatus::Running;
        self.current = initial;
        self.previous = initial;
        self.entered_at_ms = now_ms;
        self.step_changed = true;
        self.last_transition_id.clear();
        self.last_error = None;
        info!(
            "story-engine: start scenario={} step={} at_ms={}",
            scenario.id, scenario.initial_step_id, now_ms
        );
        Ok(())
    }

    pub fn stop(&mut self, reason: &str) {
        self.queue.clear();
        if self.status == EngineStatus::Running {
            info!(
                "story-engine: stop scenario={} step={} reason={}",
                self.scenario_id(),
                self.current_step_id(),
                reason
            );
        }
        self.status = EngineStatus::Stopped;
    }

    pub fn post_event(&mut self, event: StoryEvent) -> Result<(), EngineError> {
        if self.status != EngineStatus::Running {
            return Err(self.fail(EngineError::ScenarioNotLoaded));
        }

        if !self.queue.push(event) {
            return Err(self.fail(EngineError::EventQueueFull));
        }

        Ok(())
    }

    /// Advance the state machine. Returns `true` when a transition fired;
    /// at most one transition is applied per call.
    pub fn update(&mut self, now_ms: u32) -> bool {
        if self.status != EngineStatus::Running {
            return false;
        }

        let Some(scenario) = self.scenario.clone() else {
            return false;
        };

        let mut processed = 0usize;
        while processed < EVENT_BUDGET_PER_TICK {
            let Some(event) = self.queue.pop() else {
                break;
            };
            processed += 1;

            let selected = scenario
                .step(self.current)
                .and_then(|step| select_event_transition(step, &event));
            match selected {
                Some(transition) => {
                    debug!(
                        "story-engine: event matched type={} name={} transition={}",
                        event.event_type.as_str(),
                        event.name,
                        transition.id
                    );
                    if self.apply_transition(&scenario, transition, now_ms) {
                        return true;
                    }
                }
                None => debug!(
                    "story-engine: event ignored type={} name={} step={}",
                    event.event_type.as_str(),
                    event.name,
                    self.current_step_id()
                ),
            }
        }

        if processed == EVENT_BUDGET_PER_TICK && !self.queue.is_empty() {
            let pending = self.queue.len();
            debug!("story-engine: event budget exhausted pending={}", pending);
            self.last_error = Some(EngineError::EventBudget(pending));
            return false;
        }

        let implicit = scenario
            .step(self.current)
            .and_then(|step| select_implicit_transition(step, self.entered_at_ms, now_ms));
        match implicit {
            Some(transition) => self.apply_transition(&scenario, transition, now_ms),
            None => false,
        }
    }

    /// Best `OnEvent` transition of the current step for `event`.
    pub fn select_event_transition(&self, event: &StoryEvent) -> Option<&TransitionDef> {
        self.current_step()
            .and_then(|step| select_event_transition(step, event))
    }

    /// Best `Immediate`/elapsed `AfterMs` transition of the current step.
    pub fn select_implicit_transition(&self, now_ms: u32) -> Option<&TransitionDef> {
        self.current_step()
            .and_then(|step| select_implicit_transition(step, self.entered_at_ms, now_ms))
    }

    /// Move to `next_index`, recording `reason` as the last transition id.
    pub fn transition_to(
        &mut self,
        next_index: usize,
        now_ms: u32,
        reason: &str,
    ) -> Result<(), EngineError> {
        let Some(scenario) = self.scenario.clone() else {
            return Err(self.fail(EngineError::ScenarioNotLoaded));
        };
        let Some(next) = scenario.step(next_index) else {
            return Err(self.fail(EngineError::StepNotFound(format!("#{next_index}"))));
        };

        info!(
            "story-engine: transition scenario={} from={} to={} reason={} at_ms={}",
            scenario.id,
            self.current_step_id(),
            next.id,
            reason,
            now_ms
        );
        self.previous = self.current;
        self.current = next_index;
        self.entered_at_ms = now_ms;
        self.step_changed = true;
        self.last_transition_id.clear();
        self.last_transition_id.push_str(reason);
        Ok(())
    }

    /// Administrative jump. A stopped engine with a loaded scenario starts at
    /// the requested step.
    pub fn jump_to_step(
        &mut self,
        step_id: &str,
        now_ms: u32,
        reason: &str,
    ) -> Result<(), EngineError> {
        let Some(scenario) = self.scenario.clone() else {
            return Err(self.fail(EngineError::ScenarioNotLoaded));
        };
        let Some(index) = scenario.find_step_index(step_id) else {
            return Err(self.fail(EngineError::StepNotFound(step_id.into())));
        };

        if self.status == EngineStatus::Stopped {
            self.queue.clear();
            self.status = EngineStatus::Running;
            self.current = index;
        }
        self.transition_to(index, now_ms, reason)
    }

    /// One-shot edge set by every step entry.
    pub fn consume_step_changed(&mut self) -> bool {
        core::mem::replace(&mut self.step_changed, false)
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == EngineStatus::Running
    }

    pub fn scenario(&self) -> Option<&Arc<ScenarioDef>> {
        self.scenario.as_ref()
    }

    pub fn scenario_id(&self) -> &str {
        self.scenario
            .as_deref()
            .map(|scenario| scenario.id.as_str())
            .unwrap_or("")
    }

    pub fn current_step_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> Option<&StepDef> {
        self.scenario.as_deref()?.step(self.current)
    }

    pub fn current_step_id(&self) -> &str {
        self.current_step().map(|step| step.id.as_str()).unwrap_or("")
    }

    pub fn previous_step(&self) -> Option<&StepDef> {
        self.scenario.as_deref()?.step(self.previous)
    }

    pub fn entered_at_ms(&self) -> u32 {
        self.entered_at_ms
    }

    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped_events(&self) -> u32 {
        self.queue.dropped()
    }

    pub fn last_transition_id(&self) -> &str {
        &self.last_transition_id
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn last_error_code(&self) -> &'static str {
        self.last_error.as_ref().map(EngineError::as_code).unwrap_or("OK")
    }

    /// Earliest deadline among the current step's timed transitions.
    pub fn next_due_at_ms(&self) -> Option<u32> {
        if !self.is_running() {
            return None;
        }
        self.current_step()?
            .transitions
            .iter()
            .filter(|transition| transition.trigger == TransitionTrigger::AfterMs)
            .map(|transition| transition.after_ms)
            .min()
            .map(|after_ms| self.entered_at_ms.wrapping_add(after_ms))
    }

    pub fn snapshot(&self) -> StorySnapshot {
        StorySnapshot {
            running: self.is_running(),
            mp3_gate_open: self.current_step().is_some_and(|step| step.mp3_gate_open),
            scenario_id: self.scenario_id().into(),
            step_id: self.current_step_id().into(),
            previous_step_id: self
                .previous_step()
                .map(|step| step.id.as_str())
                .unwrap_or("")
                .into(),
            step_index: self.current,
            step_entered_at_ms: self.entered_at_ms,
            next_due_at_ms: self.next_due_at_ms(),
            queued_events: self.queue.len(),
            dropped_events: self.queue.dropped(),
            last_transition_id: self.last_transition_id.clone(),
            last_error: self.last_error_code(),
        }
    }

    fn apply_transition(
        &mut self,
        scenario: &ScenarioDef,
        transition: &TransitionDef,
        now_ms: u32,
    ) -> bool {
        match scenario.find_step_index(&transition.target_step_id) {
            Some(next) => self.transition_to(next, now_ms, &transition.id).is_ok(),
            None => {
                warn!(
                    "story-engine: transition target missing transition={} target={}",
                    transition.id, transition.target_step_id
                );
                let _ = self.fail(EngineError::TargetStepNotFound(
                    transition.target_step_id.clone(),
                ));
                false
            }
        }
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        self.last_error = Some(err.clone());
        err
    }
}

/// Highest priority wins; on ties the first declared candidate is kept.
pub fn select_highest_priority<'a, I>(candidates: I) -> Option<&'a TransitionDef>
where
    I: IntoIterator<Item = &'a TransitionDef>,
{
    let mut best: Option<&TransitionDef> = None;
    for candidate in candidates {
        if best.is_none_or(|current| candidate.priority > current.priority) {
            best = Some(candidate);
        }
    }
    best
}

pub fn select_event_transition<'a>(
    step: &'a StepDef,
    event: &StoryEvent,
) -> Option<&'a TransitionDef> {
    select_highest_priority(step.transitions.iter().filter(|transition| {
        transition.trigger == TransitionTrigger::OnEvent
            && transition.event_type == event.event_type
            && (transition.event_name.is_empty() || transition.event_name == event.name)
    }))
}

/// `AfterMs` eligibility uses wrapping subtraction so deadlines survive the
/// 2^32 ms counter rollover.
pub fn select_implicit_transition(
    step: &StepDef,
    entered_at_ms: u32,
    now_ms: u32,
) -> Option<&TransitionDef> {
    let elapsed = now_ms.wrapping_sub(entered_at_ms);
    select_highest_priority(step.transitions.iter().filter(|transition| {
        match transition.trigger {
            TransitionTrigger::Immediate => true,
            TransitionTrigger::AfterMs => elapsed >= transition.after_ms,
            TransitionTrigger::OnEvent => false,
        }
    }))
}
