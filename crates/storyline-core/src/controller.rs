//! Story controller: routes events between the app host and the engine,
//! suppresses event storms, drives the wait-step due timer and exposes the
//! administrative surface.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    app_host::{AppHost, EventSink},
    catalog,
    engine::{EngineError, ScenarioEngine, StorySnapshot, select_highest_priority},
    event::{StoryEvent, StoryEventType},
    scenario::{ScenarioDef, ValidationError, story_text, validate},
};

pub const WAIT_STEP_ID: &str = "STEP_WAIT_ETAPE2";
pub const ETAPE2_EVENT_NAME: &str = "ETAPE2_DUE";
pub const ETAPE2_DELAY_MS: u32 = 15 * 60 * 1000;
pub const DEFAULT_TEST_DELAY_MS: u32 = 5_000;
/// Queue depth from which repeated identical events are suppressed.
pub const STORM_QUEUE_THRESHOLD: usize = 8;
pub const STORM_WINDOW_MS: u32 = 40;

#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceLevel {
    Off,
    Err,
    #[default]
    Info,
    Debug,
}

impl TraceLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Err => "ERR",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        [Self::Off, Self::Err, Self::Info, Self::Debug]
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLabel {
    Ok,
    Busy,
    Error,
    OutOfContext,
}

impl HealthLabel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Busy => "BUSY",
            Self::Error => "ERROR",
            Self::OutOfContext => "OUT_OF_CONTEXT",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    pub enabled: bool,
    pub test_mode: bool,
    pub test_delay_ms: u32,
    pub etape2_delay_ms: u32,
    pub trace_level: TraceLevel,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test_mode: false,
            test_delay_ms: DEFAULT_TEST_DELAY_MS,
            etape2_delay_ms: ETAPE2_DELAY_MS,
            trace_level: TraceLevel::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ControllerMetrics {
    pub posted_events: u32,
    pub accepted_events: u32,
    pub rejected_events: u32,
    pub dropped_storm_events: u32,
    pub transitions: u32,
    pub max_queue_depth: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ControllerError {
    #[error("controller disabled")]
    NotEnabled,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("scenario {0} not in catalog")]
    CatalogMiss(String),
    #[error("app host rejected scenario: {0}")]
    AppHostRejected(ValidationError),
    #[error("step {0} has no transition")]
    NoTransition(String),
    #[error("app host failed to start step {0}")]
    AppHostStartFailed(String),
    #[error("event suppressed by storm filter")]
    StormSuppressed,
}

impl ControllerError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::NotEnabled => "CONTROLLER_DISABLED",
            Self::Engine(err) => err.as_code(),
            Self::CatalogMiss(_) => "SCENARIO_NOT_FOUND",
            Self::AppHostRejected(err) => err.code.as_str(),
            Self::NoTransition(_) => "NO_TRANSITION",
            Self::AppHostStartFailed(_) => "APP_HOST_START_FAILED",
            Self::StormSuppressed => "EVENT_STORM_SUPPRESSED",
        }
    }

    /// A skip on a terminal step and engine backpressure leave the story
    /// intact.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Engine(err) => err.is_fatal(),
            Self::NoTransition(_) => false,
            _ => true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub enabled: bool,
    pub paused: bool,
    pub test_mode: bool,
    pub test_delay_ms: u32,
    pub trace_level: TraceLevel,
    pub etape2_due_at_ms: Option<u32>,
    pub etape2_due_posted: bool,
    pub health: HealthLabel,
    pub screen_scene_id: Option<String>,
    pub last_error: &'static str,
    pub metrics: ControllerMetrics,
    pub story: StorySnapshot,
}

pub struct StoryController<H: AppHost> {
    engine: ScenarioEngine,
    host: H,
    sink: EventSink,
    config: ControllerConfig,
    paused: bool,
    etape2_due_at_ms: Option<u32>,
    etape2_due_posted: bool,
    last_posted: Option<(StoryEvent, u32)>,
    metrics: ControllerMetrics,
    last_error: Option<ControllerError>,
}

impl<H: AppHost> StoryController<H> {
    pub fn new(host: H, config: ControllerConfig) -> Self {
        Self {
            engine: ScenarioEngine::new(),
            host,
            sink: EventSink::new(),
            config,
            paused: false,
            etape2_due_at_ms: None,
            etape2_due_posted: false,
            last_posted: None,
            metrics: ControllerMetrics::default(),
            last_error: None,
        }
    }

    pub fn engine(&self) -> &ScenarioEngine {
        &self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn scenario(&self) -> Option<&Arc<ScenarioDef>> {
        self.engine.scenario()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_error(&self) -> Option<&ControllerError> {
        self.last_error.as_ref()
    }

    /// Controller error first, then the engine's.
    pub fn last_error_code(&self) -> &'static str {
        match &self.last_error {
            Some(err) => err.as_code(),
            None => self.engine.last_error_code(),
        }
    }

    pub fn load_from_catalog(
        &mut self,
        scenario_id: &str,
        now_ms: u32,
    ) -> Result<(), ControllerError> {
        let Some(scenario) = catalog::by_id(scenario_id) else {
            return Err(self.fail(ControllerError::CatalogMiss(scenario_id.into())));
        };
        self.set_scenario_from_definition(scenario, now_ms, "catalog")
    }

    /// Adopt `scenario` and enter its initial step. A rejected scenario leaves
    /// the running one untouched.
    pub fn set_scenario_from_definition(
        &mut self,
        scenario: Arc<ScenarioDef>,
        now_ms: u32,
        source: &str,
    ) -> Result<(), ControllerError> {
        if let Err(err) = self.host.validate_scenario(&scenario) {
            warn!(
                "story-controller: app host rejected scenario={} code={} detail={}",
                scenario.id, err.code, err.detail
            );
            return Err(self.fail(ControllerError::AppHostRejected(err)));
        }
        if let Err(err) = self.engine.load_scenario(Arc::clone(&scenario)) {
            return Err(self.fail(err.into()));
        }

        self.host.stop_all("scenario_change");
        self.host.begin(&scenario);
        self.sink.clear();
        self.clear_due_timer();
        self.last_posted = None;
        self.last_error = None;

        if let Err(err) = self.engine.start(&scenario.id, now_ms) {
            return Err(self.fail(err.into()));
        }
        info!(
            "story-controller: scenario set id={} version={} source={}",
            scenario.id, scenario.version, source
        );

        // Entering the initial step is not a transition.
        self.engine.consume_step_changed();
        self.apply_current_step(now_ms, source)
    }

    /// Stop everything and forget the run state; the scenario stays loaded.
    pub fn reset(&mut self, reason: &str) {
        self.engine.stop(reason);
        self.host.stop_all(reason);
        self.sink.clear();
        self.clear_due_timer();
        self.last_posted = None;
        self.last_error = None;
        self.paused = false;
        info!("story-controller: reset reason={}", reason);
    }

    /// Re-enter the initial step of the loaded scenario.
    pub fn restart(&mut self, now_ms: u32, source: &str) -> Result<(), ControllerError> {
        let Some(scenario) = self.engine.scenario().cloned() else {
            return Err(self.fail(EngineError::ScenarioNotLoaded.into()));
        };
        self.reset(source);
        if let Err(err) = self.engine.start(&scenario.id, now_ms) {
            return Err(self.fail(err.into()));
        }
        self.host.begin(&scenario);
        self.engine.consume_step_changed();
        self.apply_current_step(now_ms, source)
    }

    pub fn update(&mut self, now_ms: u32) {
        if !self.config.enabled || self.paused {
            return;
        }

        self.host.update(now_ms, &mut self.sink);
        self.drain_sink(now_ms);

        // The latch closes only once the timer event is queued; a full
        // queue retries on the next tick.
        if self.etape2_due(now_ms) {
            match self.post_timer_event(now_ms) {
                Ok(()) => {
                    self.etape2_due_posted = true;
                    self.trace_info(format_args!(
                        "story-controller: etape2 due step={} at_ms={}",
                        WAIT_STEP_ID, now_ms
                    ));
                }
                Err(err) => self.trace_debug(format_args!(
                    "story-controller: etape2 due deferred code={}",
                    err.as_code()
                )),
            }
        }

        if self.engine.update(now_ms) {
            debug!(
                "story-controller: engine advanced step={}",
                self.engine.current_step_id()
            );
        }
        self.sync_step_change(now_ms);
    }

    pub fn post_event(&mut self, event: StoryEvent, now_ms: u32) -> Result<(), ControllerError> {
        if !self.config.enabled {
            self.metrics.posted_events = self.metrics.posted_events.saturating_add(1);
            self.metrics.rejected_events = self.metrics.rejected_events.saturating_add(1);
            return Err(ControllerError::NotEnabled);
        }

        let result = self.post_event_internal(event, now_ms, false);
        self.drain_sink(now_ms);
        result
    }

    /// Storm filter, app host notification and engine hand-off. Events that
    /// came out of the host's own sink skip the host notification.
    pub fn post_event_internal(
        &mut self,
        event: StoryEvent,
        now_ms: u32,
        from_sink: bool,
    ) -> Result<(), ControllerError> {
        self.metrics.posted_events = self.metrics.posted_events.saturating_add(1);
        let depth = self.engine.queued_events();

        if self.is_storm(&event, depth, now_ms) {
            self.metrics.dropped_storm_events = self.metrics.dropped_storm_events.saturating_add(1);
            self.metrics.rejected_events = self.metrics.rejected_events.saturating_add(1);
            self.trace_debug(format_args!(
                "story-controller: event dropped (storm) type={} name={} value={} depth={}",
                event.event_type.as_str(),
                event.name,
                event.value,
                depth
            ));
            return Err(ControllerError::StormSuppressed);
        }
        self.last_posted = Some((event.clone(), now_ms));

        if !from_sink {
            self.host.handle_event(&event, &mut self.sink);
        }

        let kind = event.event_type;
        let name = event.name.clone();
        match self.engine.post_event(event) {
            Ok(()) => {
                let depth = self.engine.queued_events();
                self.metrics.accepted_events = self.metrics.accepted_events.saturating_add(1);
                self.metrics.max_queue_depth = self.metrics.max_queue_depth.max(depth);
                self.trace_debug(format_args!(
                    "story-controller: event accepted type={} name={} depth={} sink={}",
                    kind.as_str(),
                    name,
                    depth,
                    from_sink
                ));
                Ok(())
            }
            Err(err) => {
                self.metrics.rejected_events = self.metrics.rejected_events.saturating_add(1);
                self.trace_err(format_args!(
                    "story-controller: event rejected type={} name={} code={}",
                    kind.as_str(),
                    name,
                    err.as_code()
                ));
                Err(err.into())
            }
        }
    }

    /// Push the current step to the app host and arm or clear the wait-step
    /// due timer.
    pub fn apply_current_step(
        &mut self,
        now_ms: u32,
        source: &str,
    ) -> Result<(), ControllerError> {
        let Some(scenario) = self.engine.scenario().cloned() else {
            return Err(self.fail(EngineError::ScenarioNotLoaded.into()));
        };
        let Some(step) = scenario.step(self.engine.current_step_index()) else {
            let index = self.engine.current_step_index();
            return Err(self.fail(EngineError::StepNotFound(format!("#{index}")).into()));
        };

        self.trace_info(format_args!(
            "story-controller: apply step={} screen={} audio={} source={}",
            step.id, step.resources.screen_scene_id, step.resources.audio_pack_id, source
        ));

        if step.id.as_str() == WAIT_STEP_ID {
            self.arm_due_timer(now_ms);
        } else {
            self.clear_due_timer();
        }

        let started = self.host.start_step(&scenario, step, now_ms, source);
        self.drain_sink(now_ms);
        if !started {
            self.trace_err(format_args!(
                "story-controller: app host start failed step={} err={}",
                step.id,
                self.host.last_error().unwrap_or("unknown")
            ));
            return Err(self.fail(ControllerError::AppHostStartFailed(step.id.as_str().into())));
        }
        Ok(())
    }

    pub fn pause(&mut self) -> bool {
        if self.paused {
            return false;
        }
        self.paused = true;
        info!("story-controller: paused step={}", self.engine.current_step_id());
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;
        info!("story-controller: resumed step={}", self.engine.current_step_id());
        true
    }

    /// Fire the highest-priority transition of the current step, whatever
    /// its trigger.
    pub fn skip_to_next_step(&mut self, now_ms: u32) -> Result<(), ControllerError> {
        let Some(step) = self.engine.current_step().cloned() else {
            return Err(self.fail(EngineError::ScenarioNotLoaded.into()));
        };
        let Some(transition) = select_highest_priority(step.transitions.iter()) else {
            return Err(self.fail(ControllerError::NoTransition(step.id.as_str().into())));
        };

        let target = transition.target_step_id.clone();
        let reason = transition.id.clone();
        if let Err(err) = self.engine.jump_to_step(&target, now_ms, &reason) {
            return Err(self.fail(err.into()));
        }
        self.sync_step_change(now_ms);
        Ok(())
    }

    pub fn jump_to_step(&mut self, step_id: &str, now_ms: u32) -> Result<(), ControllerError> {
        if let Err(err) = self.engine.jump_to_step(step_id, now_ms, "admin_jump") {
            return Err(self.fail(err.into()));
        }
        self.sync_step_change(now_ms);
        Ok(())
    }

    /// Post the wait-step timer event now instead of waiting for the delay.
    pub fn force_etape2_due_now(&mut self, now_ms: u32) -> Result<(), ControllerError> {
        info!(
            "story-controller: etape2 forced step={}",
            self.engine.current_step_id()
        );
        let result = self.post_timer_event(now_ms);
        if result.is_ok() {
            self.etape2_due_posted = true;
        }
        self.drain_sink(now_ms);
        result
    }

    pub fn set_test_mode(&mut self, enabled: bool, now_ms: u32) {
        self.config.test_mode = enabled;
        info!("story-controller: test mode={}", enabled);
        self.rearm_if_waiting(now_ms);
    }

    pub fn set_test_delay_ms(&mut self, delay_ms: u32, now_ms: u32) {
        self.config.test_delay_ms = delay_ms;
        info!("story-controller: test delay_ms={}", delay_ms);
        self.rearm_if_waiting(now_ms);
    }

    /// Returns `false` when `level` was already active.
    pub fn set_trace_level(&mut self, level: TraceLevel) -> bool {
        if self.config.trace_level == level {
            return false;
        }
        self.config.trace_level = level;
        info!("story-controller: trace level={}", level.as_str());
        true
    }

    pub fn trace_level(&self) -> TraceLevel {
        self.config.trace_level
    }

    /// Returns `false` when nothing changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.config.enabled == enabled {
            return false;
        }
        self.config.enabled = enabled;
        info!("story-controller: enabled={}", enabled);
        true
    }

    pub fn health(&self) -> HealthLabel {
        if !self.config.enabled {
            return HealthLabel::OutOfContext;
        }

        let engine_failed = self.engine.last_error().is_some_and(EngineError::is_fatal);
        let controller_failed = self.last_error.as_ref().is_some_and(ControllerError::is_fatal);
        if engine_failed || controller_failed || self.host.last_error().is_some() {
            return HealthLabel::Error;
        }

        if self.engine.is_running() && (self.engine.queued_events() > 0 || self.host.audio_busy())
        {
            return HealthLabel::Busy;
        }
        HealthLabel::Ok
    }

    /// Re-run structural and app-binding checks on the loaded scenario.
    pub fn validate_active(&self) -> Result<(), ControllerError> {
        let Some(scenario) = self.engine.scenario() else {
            return Err(EngineError::ScenarioNotLoaded.into());
        };
        validate(scenario).map_err(|err| ControllerError::Engine(EngineError::Invalid(err)))?;
        self.host
            .validate_scenario(scenario)
            .map_err(ControllerError::AppHostRejected)
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = ControllerMetrics::default();
        info!("story-controller: metrics reset");
    }

    pub fn etape2_due_at_ms(&self) -> Option<u32> {
        self.etape2_due_at_ms
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            enabled: self.config.enabled,
            paused: self.paused,
            test_mode: self.config.test_mode,
            test_delay_ms: self.config.test_delay_ms,
            trace_level: self.config.trace_level,
            etape2_due_at_ms: self.etape2_due_at_ms,
            etape2_due_posted: self.etape2_due_posted,
            health: self.health(),
            screen_scene_id: self.host.active_screen_scene_id().map(String::from),
            last_error: self.last_error_code(),
            metrics: self.metrics,
            story: self.engine.snapshot(),
        }
    }

    fn effective_delay_ms(&self) -> u32 {
        if self.config.test_mode {
            self.config.test_delay_ms
        } else {
            self.config.etape2_delay_ms
        }
    }

    fn arm_due_timer(&mut self, now_ms: u32) {
        let due = now_ms.wrapping_add(self.effective_delay_ms());
        self.etape2_due_at_ms = Some(due);
        self.etape2_due_posted = false;
        self.trace_info(format_args!(
            "story-controller: etape2 armed due_at_ms={} test_mode={}",
            due, self.config.test_mode
        ));
    }

    fn clear_due_timer(&mut self) {
        self.etape2_due_at_ms = None;
        self.etape2_due_posted = false;
    }

    fn rearm_if_waiting(&mut self, now_ms: u32) {
        if self.engine.is_running()
            && self.engine.current_step_id() == WAIT_STEP_ID
            && !self.etape2_due_posted
        {
            self.arm_due_timer(now_ms);
        }
    }

    fn etape2_due(&self, now_ms: u32) -> bool {
        if self.etape2_due_posted || self.engine.current_step_id() != WAIT_STEP_ID {
            return false;
        }
        self.etape2_due_at_ms
            .is_some_and(|due| now_ms.wrapping_sub(due) as i32 >= 0)
    }

    fn post_timer_event(&mut self, now_ms: u32) -> Result<(), ControllerError> {
        let event = StoryEvent {
            event_type: StoryEventType::Timer,
            name: story_text(ETAPE2_EVENT_NAME).unwrap_or_default(),
            value: 0,
            at_ms: now_ms,
        };
        self.post_event_internal(event, now_ms, false)
    }

    fn is_storm(&self, event: &StoryEvent, depth: usize, now_ms: u32) -> bool {
        let Some((last, last_at_ms)) = &self.last_posted else {
            return false;
        };
        depth >= STORM_QUEUE_THRESHOLD
            && last.same_payload(event)
            && now_ms.wrapping_sub(*last_at_ms) <= STORM_WINDOW_MS
    }

    fn drain_sink(&mut self, now_ms: u32) {
        while let Some(event) = self.sink.pop() {
            let _ = self.post_event_internal(event, now_ms, true);
        }
    }

    fn sync_step_change(&mut self, now_ms: u32) {
        if !self.engine.consume_step_changed() {
            return;
        }
        self.metrics.transitions = self.metrics.transitions.saturating_add(1);
        let _ = self.apply_current_step(now_ms, "transition");
    }

    fn fail(&mut self, err: ControllerError) -> ControllerError {
        self.trace_err(format_args!(
            "story-controller: error code={} err={}",
            err.as_code(),
            err
        ));
        self.last_error = Some(err.clone());
        err
    }

    fn trace_err(&self, args: core::fmt::Arguments<'_>) {
        if self.config.trace_level >= TraceLevel::Err {
            warn!("{}", args);
        }
    }

    fn trace_info(&self, args: core::fmt::Arguments<'_>) {
        if self.config.trace_level >= TraceLevel::Info {
            info!("{}", args);
        }
    }

    fn trace_debug(&self, args: core::fmt::Arguments<'_>) {
        if self.config.trace_level >= TraceLevel::Debug {
            info!("{}", args);
        }
    }
}

#[cfg(test)]
mod tests;
