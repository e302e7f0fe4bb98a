use super::*;
use crate::{
    app_host::NullAppHost,
    event::EVENT_QUEUE_CAPACITY,
    scenario::{StepDef, TransitionDef},
};

fn demo() -> Arc<ScenarioDef> {
    let mut scenario = ScenarioDef::new("DEMO", 1, "A").unwrap();
    let mut a = StepDef::new("A").unwrap();
    a.transitions
        .push(TransitionDef::on_event("T_AB", StoryEventType::Unlock, "", "B", 1).unwrap())
        .unwrap();
    let mut b = StepDef::new("B").unwrap();
    b.transitions
        .push(TransitionDef::after_ms("T_BA", 1_000, "A", 1).unwrap())
        .unwrap();
    scenario.steps.push(a).unwrap();
    scenario.steps.push(b).unwrap();
    Arc::new(scenario)
}

fn controller() -> StoryController<NullAppHost> {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller
        .set_scenario_from_definition(demo(), 0, "test")
        .unwrap();
    controller
}

fn timer(value: i32) -> StoryEvent {
    StoryEvent::new(StoryEventType::Timer, "TICK", value, 0).unwrap()
}

/// Queue eight distinct events without ticking so the queue stays deep.
fn fill_queue(controller: &mut StoryController<NullAppHost>) {
    for value in 0..STORM_QUEUE_THRESHOLD as i32 {
        controller.post_event(timer(value), 0).unwrap();
    }
    assert_eq!(controller.engine().queued_events(), STORM_QUEUE_THRESHOLD);
}

/// Records calls and can be told to fail step starts.
#[derive(Default)]
struct RecordingHost {
    started: std::vec::Vec<std::string::String>,
    handled: usize,
    fail_start: bool,
    error: Option<&'static str>,
    echo_audio_done: bool,
    busy: bool,
}

impl AppHost for RecordingHost {
    fn begin(&mut self, _scenario: &ScenarioDef) {}

    fn start_step(
        &mut self,
        _scenario: &ScenarioDef,
        step: &crate::scenario::StepDef,
        _now_ms: u32,
        _source: &str,
    ) -> bool {
        self.started.push(step.id.as_str().into());
        if self.fail_start {
            self.error = Some("screen offline");
        }
        !self.fail_start
    }

    fn update(&mut self, _now_ms: u32, _sink: &mut EventSink) {}

    fn handle_event(&mut self, event: &StoryEvent, sink: &mut EventSink) -> bool {
        self.handled += 1;
        if self.echo_audio_done && event.event_type == StoryEventType::Unlock {
            sink.post(StoryEvent::new(StoryEventType::AudioDone, "", 0, event.at_ms).unwrap());
        }
        false
    }

    fn stop_all(&mut self, _reason: &str) {}

    fn active_screen_scene_id(&self) -> Option<&str> {
        None
    }

    fn last_error(&self) -> Option<&str> {
        self.error
    }

    fn audio_busy(&self) -> bool {
        self.busy
    }
}

#[test]
fn repeated_event_within_window_is_suppressed() {
    let mut controller = controller();
    fill_queue(&mut controller);

    let last = timer(STORM_QUEUE_THRESHOLD as i32 - 1);
    assert_eq!(
        controller.post_event(last.clone(), 40),
        Err(ControllerError::StormSuppressed)
    );
    let metrics = controller.metrics();
    assert_eq!(metrics.dropped_storm_events, 1);
    assert_eq!(metrics.rejected_events, 1);
    assert_eq!(metrics.posted_events, 9);
    assert_eq!(metrics.accepted_events, 8);
    assert_eq!(controller.engine().queued_events(), STORM_QUEUE_THRESHOLD);
}

#[test]
fn repeated_event_after_window_is_accepted() {
    let mut controller = controller();
    fill_queue(&mut controller);

    let last = timer(STORM_QUEUE_THRESHOLD as i32 - 1);
    assert_eq!(controller.post_event(last, 41), Ok(()));
    assert_eq!(controller.metrics().dropped_storm_events, 0);
    assert_eq!(controller.metrics().max_queue_depth, 9);
}

#[test]
fn different_payload_is_accepted_under_backpressure() {
    let mut controller = controller();
    fill_queue(&mut controller);
    assert_eq!(controller.post_event(timer(100), 1), Ok(()));
}

#[test]
fn shallow_queue_never_suppresses() {
    let mut controller = controller();
    controller.post_event(timer(1), 0).unwrap();
    assert_eq!(controller.post_event(timer(1), 0), Ok(()));
}

#[test]
fn demo_round_trip_counts_transitions() {
    let mut controller = controller();
    assert_eq!(controller.engine().current_step_id(), "A");
    assert_eq!(controller.metrics().transitions, 0);

    controller
        .post_event(StoryEvent::new(StoryEventType::Unlock, "", 0, 5).unwrap(), 5)
        .unwrap();
    controller.update(10);
    assert_eq!(controller.engine().current_step_id(), "B");

    controller.update(1_009);
    assert_eq!(controller.engine().current_step_id(), "B");
    controller.update(1_010);
    assert_eq!(controller.engine().current_step_id(), "A");
    assert_eq!(controller.metrics().transitions, 2);
}

#[test]
fn wait_step_posts_due_timer_once() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.set_test_mode(true, 0);
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, 100).unwrap();
    assert_eq!(controller.etape2_due_at_ms(), Some(100 + DEFAULT_TEST_DELAY_MS));

    controller.update(100 + DEFAULT_TEST_DELAY_MS - 1);
    assert_eq!(controller.engine().current_step_id(), WAIT_STEP_ID);

    controller.update(100 + DEFAULT_TEST_DELAY_MS);
    assert_eq!(controller.engine().current_step_id(), "STEP_ETAPE2");
    assert_eq!(controller.engine().last_transition_id(), "TR_WAIT_DUE");
    assert_eq!(controller.etape2_due_at_ms(), None);
}

#[test]
fn due_latch_prevents_repeat_posts() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, 0).unwrap();
    controller.set_test_mode(true, 0);

    let due = DEFAULT_TEST_DELAY_MS;
    assert!(controller.etape2_due(due));
    controller.etape2_due_posted = true;
    assert!(!controller.etape2_due(due + 10));
}

#[test]
fn due_timer_survives_wraparound() {
    let start = u32::MAX - 1_000;
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.set_test_mode(true, start);
    controller.load_from_catalog("DEFAULT", start).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, start).unwrap();

    let due = start.wrapping_add(DEFAULT_TEST_DELAY_MS);
    assert!(due < start);
    controller.update(due.wrapping_sub(1));
    assert_eq!(controller.engine().current_step_id(), WAIT_STEP_ID);
    controller.update(due);
    assert_eq!(controller.engine().current_step_id(), "STEP_ETAPE2");
}

#[test]
fn test_delay_change_rearms_from_now() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, 0).unwrap();
    assert_eq!(controller.etape2_due_at_ms(), Some(ETAPE2_DELAY_MS));

    controller.set_test_mode(true, 500);
    assert_eq!(controller.etape2_due_at_ms(), Some(500 + DEFAULT_TEST_DELAY_MS));
    controller.set_test_delay_ms(2_000, 700);
    assert_eq!(controller.etape2_due_at_ms(), Some(2_700));
}

#[test]
fn forced_due_event_advances_wait_step() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, 0).unwrap();
    controller.force_etape2_due_now(10).unwrap();
    controller.update(11);
    assert_eq!(controller.engine().current_step_id(), "STEP_ETAPE2");
}

#[test]
fn due_timer_retries_when_queue_is_full() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.set_test_mode(true, 0);
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, 0).unwrap();
    for value in 0..EVENT_QUEUE_CAPACITY as i32 {
        controller.post_event(timer(value), 0).unwrap();
    }

    let due = DEFAULT_TEST_DELAY_MS;
    controller.update(due);
    assert!(!controller.etape2_due_posted);
    assert_eq!(controller.engine().current_step_id(), WAIT_STEP_ID);

    controller.update(due + 100);
    assert!(controller.etape2_due_posted);
    controller.update(due + 200);
    assert_eq!(controller.engine().current_step_id(), "STEP_ETAPE2");
    assert_eq!(controller.engine().last_transition_id(), "TR_WAIT_DUE");
}

#[test]
fn forced_due_on_full_queue_keeps_latch_open() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step(WAIT_STEP_ID, 0).unwrap();
    for value in 0..EVENT_QUEUE_CAPACITY as i32 {
        controller.post_event(timer(value), 0).unwrap();
    }

    let err = controller.force_etape2_due_now(10).unwrap_err();
    assert_eq!(err.as_code(), "EVENT_QUEUE_FULL");
    assert!(!controller.etape2_due_posted);
}

#[test]
fn pause_freezes_update() {
    let mut controller = controller();
    controller
        .post_event(StoryEvent::new(StoryEventType::Unlock, "", 0, 0).unwrap(), 0)
        .unwrap();
    assert!(controller.pause());
    assert!(!controller.pause());
    controller.update(10);
    assert_eq!(controller.engine().current_step_id(), "A");

    assert!(controller.resume());
    controller.update(20);
    assert_eq!(controller.engine().current_step_id(), "B");
}

#[test]
fn skip_takes_highest_priority_transition() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller.load_from_catalog("DEFAULT", 0).unwrap();
    controller.jump_to_step("STEP_LOCKED", 0).unwrap();

    controller.skip_to_next_step(5).unwrap();
    assert_eq!(controller.engine().current_step_id(), "STEP_U_SON");
    assert_eq!(controller.engine().last_transition_id(), "TR_LOCKED_FORCE");
}

#[test]
fn skip_on_terminal_step_reports_no_transition() {
    let mut scenario = ScenarioDef::new("END", 1, "ONLY").unwrap();
    scenario.steps.push(StepDef::new("ONLY").unwrap()).unwrap();
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    controller
        .set_scenario_from_definition(Arc::new(scenario), 0, "test")
        .unwrap();

    let err = controller.skip_to_next_step(0).unwrap_err();
    assert_eq!(err.as_code(), "NO_TRANSITION");
    assert_eq!(controller.last_error_code(), "NO_TRANSITION");
    assert_eq!(controller.health(), HealthLabel::Ok);
}

#[test]
fn health_tracks_context_and_backpressure() {
    let mut controller = controller();
    assert_eq!(controller.health(), HealthLabel::Ok);

    controller.post_event(timer(1), 0).unwrap();
    assert_eq!(controller.health(), HealthLabel::Busy);

    controller.update(1);
    assert_eq!(controller.health(), HealthLabel::Ok);

    assert!(controller.set_enabled(false));
    assert_eq!(controller.health(), HealthLabel::OutOfContext);
    assert_eq!(
        controller.post_event(timer(2), 2),
        Err(ControllerError::NotEnabled)
    );
}

#[test]
fn budget_exhaustion_is_not_an_error() {
    let mut controller = controller();
    for value in 0..8 {
        controller.post_event(timer(value), 0).unwrap();
    }
    controller.update(1);
    assert_eq!(controller.engine().last_error_code(), "EVENT_BUDGET");
    assert_eq!(controller.health(), HealthLabel::Busy);
}

#[test]
fn host_errors_mark_health_error() {
    let host = RecordingHost {
        fail_start: true,
        ..RecordingHost::default()
    };
    let mut controller = StoryController::new(host, ControllerConfig::default());
    let err = controller
        .set_scenario_from_definition(demo(), 0, "test")
        .unwrap_err();
    assert_eq!(err.as_code(), "APP_HOST_START_FAILED");
    assert_eq!(controller.health(), HealthLabel::Error);
    assert_eq!(controller.snapshot().last_error, "APP_HOST_START_FAILED");
}

#[test]
fn audio_busy_reports_busy() {
    let host = RecordingHost {
        busy: true,
        ..RecordingHost::default()
    };
    let mut controller = StoryController::new(host, ControllerConfig::default());
    controller
        .set_scenario_from_definition(demo(), 0, "test")
        .unwrap();
    assert_eq!(controller.health(), HealthLabel::Busy);
}

#[test]
fn sink_events_skip_host_notification() {
    let host = RecordingHost {
        echo_audio_done: true,
        ..RecordingHost::default()
    };
    let mut controller = StoryController::new(host, ControllerConfig::default());
    controller
        .set_scenario_from_definition(demo(), 0, "test")
        .unwrap();
    assert_eq!(controller.host().started, ["A"]);

    controller
        .post_event(StoryEvent::new(StoryEventType::Unlock, "", 0, 0).unwrap(), 0)
        .unwrap();
    assert_eq!(controller.host().handled, 1);
    assert_eq!(controller.metrics().posted_events, 2);
    assert_eq!(controller.metrics().accepted_events, 2);

    controller.update(1);
    assert_eq!(controller.host().started, ["A", "B"]);
}

#[test]
fn unregistered_app_is_rejected_and_previous_kept() {
    let mut controller = controller();
    let mut scenario = ScenarioDef::new("APPS", 1, "X").unwrap();
    let mut step = StepDef::new("X").unwrap();
    step.resources
        .app_ids
        .push(story_text("APP_TELEPORT").unwrap())
        .unwrap();
    scenario.steps.push(step).unwrap();

    let err = controller
        .set_scenario_from_definition(Arc::new(scenario), 0, "test")
        .unwrap_err();
    assert_eq!(err.as_code(), "STEP_APPS_INVALID");
    assert_eq!(controller.engine().scenario_id(), "DEMO");
    assert!(controller.engine().is_running());
}

#[test]
fn trace_level_change_is_idempotent() {
    let mut controller = controller();
    assert!(!controller.set_trace_level(TraceLevel::Info));
    assert!(controller.set_trace_level(TraceLevel::Debug));
    assert!(!controller.set_trace_level(TraceLevel::Debug));
    assert_eq!(TraceLevel::parse("err"), Some(TraceLevel::Err));
    assert_eq!(TraceLevel::parse("loud"), None);
}

#[test]
fn restart_and_reset() {
    let mut controller = controller();
    controller.jump_to_step("B", 0).unwrap();
    controller.restart(50, "admin").unwrap();
    assert_eq!(controller.engine().current_step_id(), "A");
    assert_eq!(controller.engine().entered_at_ms(), 50);

    controller.reset("admin");
    assert!(!controller.engine().is_running());
    assert_eq!(controller.engine().scenario_id(), "DEMO");
    assert!(controller.validate_active().is_ok());

    controller.reset_metrics();
    assert_eq!(*controller.metrics(), ControllerMetrics::default());
}

#[test]
fn unknown_catalog_id_is_reported() {
    let mut controller = StoryController::new(NullAppHost::new(), ControllerConfig::default());
    let err = controller.load_from_catalog("MISSING", 0).unwrap_err();
    assert_eq!(err, ControllerError::CatalogMiss("MISSING".into()));
    assert_eq!(controller.last_error_code(), "SCENARIO_NOT_FOUND");
}
