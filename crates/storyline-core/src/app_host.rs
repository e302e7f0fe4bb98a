//! Peripheral app host seam: audio, screen scenes and device mini-apps live
//! behind this trait.

use heapless::Deque;

use crate::{
    event::StoryEvent,
    registry,
    scenario::{ScenarioDef, StepDef, ValidationError},
};

pub const EVENT_SINK_CAPACITY: usize = 8;

/// Events raised by the app host, drained by the controller after each call.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    events: Deque<StoryEvent, EVENT_SINK_CAPACITY>,
    dropped: u32,
}

impl EventSink {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            dropped: 0,
        }
    }

    pub fn post(&mut self, event: StoryEvent) -> bool {
        match self.events.push_back(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.saturating_add(1);
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<StoryEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

pub trait AppHost {
    /// Bind the host to a freshly loaded scenario.
    fn begin(&mut self, scenario: &ScenarioDef);

    fn validate_scenario(&self, scenario: &ScenarioDef) -> Result<(), ValidationError> {
        registry::validate_app_bindings(scenario)
    }

    /// Bring up the resources of `step`. `false` means the step could not be
    /// started; details are in [`AppHost::last_error`].
    fn start_step(
        &mut self,
        scenario: &ScenarioDef,
        step: &StepDef,
        now_ms: u32,
        source: &str,
    ) -> bool;

    fn update(&mut self, now_ms: u32, sink: &mut EventSink);

    /// Observe an event before it reaches the engine. Returns `true` when the
    /// host consumed it for its own purposes; the engine still sees it.
    fn handle_event(&mut self, event: &StoryEvent, sink: &mut EventSink) -> bool;

    fn stop_all(&mut self, reason: &str);

    fn active_screen_scene_id(&self) -> Option<&str>;

    fn last_error(&self) -> Option<&str>;

    fn audio_busy(&self) -> bool {
        false
    }
}

/// Host with no peripherals; every step starts successfully.
#[derive(Clone, Debug, Default)]
pub struct NullAppHost {
    scene: Option<String>,
}

impl NullAppHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppHost for NullAppHost {
    fn begin(&mut self, _scenario: &ScenarioDef) {
        self.scene = None;
    }

    fn start_step(
        &mut self,
        _scenario: &ScenarioDef,
        step: &StepDef,
        _now_ms: u32,
        _source: &str,
    ) -> bool {
        let scene = step.resources.screen_scene_id.as_str();
        self.scene = (!scene.is_empty()).then(|| scene.into());
        true
    }

    fn update(&mut self, _now_ms: u32, _sink: &mut EventSink) {}

    fn handle_event(&mut self, _event: &StoryEvent, _sink: &mut EventSink) -> bool {
        false
    }

    fn stop_all(&mut self, _reason: &str) {
        self.scene = None;
    }

    fn active_screen_scene_id(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    fn last_error(&self) -> Option<&str> {
        None
    }
}
