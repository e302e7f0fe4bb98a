//! Administrative command surface: `STORY_*` serial lines and `story.*`
//! JSON-RPC requests, both answered with an `{ok, code, data}` envelope.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    app_host::AppHost,
    catalog::DEFAULT_SCENARIO_ID,
    controller::{ControllerError, TraceLevel},
    engine::EngineError,
    event::{StoryEvent, StoryEventType},
    resources::ResourceFs,
    runtime::{PortableRuntime, RuntimeState},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyCode {
    Ok,
    BadArgs,
    NotFound,
    Busy,
    OutOfContext,
}

impl ReplyCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadArgs => "BAD_ARGS",
            Self::NotFound => "NOT_FOUND",
            Self::Busy => "BUSY",
            Self::OutOfContext => "OUT_OF_CONTEXT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandReply {
    pub ok: bool,
    pub code: ReplyCode,
    pub data: Value,
}

impl CommandReply {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            code: ReplyCode::Ok,
            data,
        }
    }

    pub fn error(code: ReplyCode, error: &str, detail: impl core::fmt::Display) -> Self {
        Self {
            ok: false,
            code,
            data: json!({ "error": error, "detail": detail.to_string() }),
        }
    }

    /// `<CODE> <json data>`
    pub fn to_serial_line(&self) -> String {
        format!("{} {}", self.code.as_str(), self.data)
    }

    pub fn to_json(&self) -> Value {
        json!({ "ok": self.ok, "code": self.code, "data": self.data })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoryCommand {
    Status,
    Reset,
    Arm,
    ForceEtape2,
    TestMode(bool),
    TestDelay(u32),
    Trace(TraceLevel),
    Enable(bool),
    Health,
    Metrics { reset: bool },
    List,
    Validate,
    Event {
        event_type: StoryEventType,
        name: String,
        value: i32,
    },
    Step(String),
    Scenario(String),
    Pause,
    Resume,
    Skip,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown command {0}")]
    Unknown(String),
    #[error("missing argument {0}")]
    MissingArgument(&'static str),
    #[error("invalid {name}: {value:?}")]
    InvalidArgument { name: &'static str, value: String },
    #[error("malformed request: {0}")]
    Json(String),
}

impl CommandError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "UNKNOWN_COMMAND",
            Self::MissingArgument(_) => "MISSING_ARGUMENT",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Json(_) => "INVALID_JSON",
        }
    }

    pub fn reply_code(&self) -> ReplyCode {
        match self {
            Self::Unknown(_) => ReplyCode::NotFound,
            _ => ReplyCode::BadArgs,
        }
    }

    fn reply(&self) -> CommandReply {
        CommandReply::error(self.reply_code(), self.as_code(), self)
    }
}

pub fn parse_serial_line(line: &str) -> Result<StoryCommand, CommandError> {
    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        return Err(CommandError::Unknown(String::new()));
    };
    let head = head.to_ascii_uppercase();

    let command = match head.as_str() {
        "STORY_STATUS" => StoryCommand::Status,
        "STORY_RESET" => StoryCommand::Reset,
        "STORY_ARM" => StoryCommand::Arm,
        "STORY_FORCE_ETAPE2" => StoryCommand::ForceEtape2,
        "STORY_TEST_ON" => StoryCommand::TestMode(true),
        "STORY_TEST_OFF" => StoryCommand::TestMode(false),
        "STORY_TEST_DELAY" => {
            let raw = required(tokens.next(), "ms")?;
            StoryCommand::TestDelay(parse_arg(raw, "ms")?)
        }
        "STORY_V2_TRACE" => {
            let raw = required(tokens.next(), "level")?;
            let level = TraceLevel::parse(raw).ok_or_else(|| invalid("level", raw))?;
            StoryCommand::Trace(level)
        }
        "STORY_V2_ENABLE" => {
            let raw = required(tokens.next(), "state")?;
            StoryCommand::Enable(parse_switch(raw)?)
        }
        "STORY_V2_HEALTH" => StoryCommand::Health,
        "STORY_V2_METRICS" => match tokens.next() {
            None => StoryCommand::Metrics { reset: false },
            Some(arg) if arg.eq_ignore_ascii_case("RESET") => StoryCommand::Metrics { reset: true },
            Some(arg) => return Err(invalid("metrics", arg)),
        },
        "STORY_V2_LIST" => StoryCommand::List,
        "STORY_V2_VALIDATE" => StoryCommand::Validate,
        "STORY_V2_EVENT" => {
            let raw = required(tokens.next(), "type")?;
            let event_type = parse_event_type(raw)?;
            let name: String = tokens.next().unwrap_or("").into();
            let value: i32 = match tokens.next() {
                Some(raw) => parse_arg(raw, "value")?,
                None => 0,
            };
            StoryCommand::Event {
                event_type,
                name,
                value,
            }
        }
        "STORY_V2_STEP" => StoryCommand::Step(required(tokens.next(), "step_id")?.into()),
        "STORY_V2_SCENARIO" => {
            StoryCommand::Scenario(required(tokens.next(), "scenario_id")?.into())
        }
        "STORY_V2_PAUSE" => StoryCommand::Pause,
        "STORY_V2_RESUME" => StoryCommand::Resume,
        "STORY_V2_SKIP" => StoryCommand::Skip,
        _ => return Err(CommandError::Unknown(head)),
    };
    Ok(command)
}

#[derive(Deserialize)]
struct JsonRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct IdParams {
    #[serde(alias = "scenario_id", alias = "step_id")]
    id: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct EventParams {
    #[serde(rename = "type", alias = "event_type")]
    event_type: String,
    name: String,
    value: i32,
}

pub fn parse_json_request(text: &str) -> Result<StoryCommand, CommandError> {
    let request: JsonRequest =
        serde_json::from_str(text).map_err(|err| CommandError::Json(err.to_string()))?;

    let command = match request.method.as_str() {
        "story.status" => StoryCommand::Status,
        "story.list" => StoryCommand::List,
        "story.validate" => StoryCommand::Validate,
        "story.load" => {
            let params: IdParams = params(request.params)?;
            StoryCommand::Scenario(non_empty(params.id, "scenario_id")?)
        }
        "story.step" => {
            let params: IdParams = params(request.params)?;
            StoryCommand::Step(non_empty(params.id, "step_id")?)
        }
        "story.event" => {
            let params: EventParams = params(request.params)?;
            StoryCommand::Event {
                event_type: parse_event_type(&params.event_type)?,
                name: params.name,
                value: params.value,
            }
        }
        _ => return Err(CommandError::Unknown(request.method)),
    };
    Ok(command)
}

pub fn execute<F: ResourceFs, H: AppHost>(
    runtime: &mut PortableRuntime<F, H>,
    command: StoryCommand,
    now_ms: u32,
) -> CommandReply {
    let needs_enabled = matches!(
        command,
        StoryCommand::ForceEtape2
            | StoryCommand::Event { .. }
            | StoryCommand::Step(_)
            | StoryCommand::Pause
            | StoryCommand::Resume
            | StoryCommand::Skip
    );
    if needs_enabled && !runtime.controller().is_enabled() {
        return CommandReply::error(ReplyCode::OutOfContext, "CONTROLLER_DISABLED", "enable first");
    }
    let moves_story = matches!(
        command,
        StoryCommand::ForceEtape2
            | StoryCommand::Event { .. }
            | StoryCommand::Step(_)
            | StoryCommand::Skip
    );
    if moves_story && runtime.state() != RuntimeState::Running {
        return CommandReply::error(
            ReplyCode::OutOfContext,
            "RUNTIME_NOT_RUNNING",
            runtime.state().as_str(),
        );
    }

    match command {
        StoryCommand::Status => CommandReply::ok(to_value(&runtime.snapshot())),
        StoryCommand::Reset => {
            if runtime.state() == RuntimeState::Running {
                controller_reply(runtime.controller_mut().restart(now_ms, "reset"), || {
                    json!({ "restarted": true })
                })
            } else {
                reload(runtime, now_ms, "reset")
            }
        }
        StoryCommand::Arm => {
            if runtime.state() == RuntimeState::Running {
                CommandReply::error(ReplyCode::Busy, "ALREADY_RUNNING", runtime.snapshot().scenario_id)
            } else {
                reload(runtime, now_ms, "arm")
            }
        }
        StoryCommand::ForceEtape2 => {
            let result = runtime.controller_mut().force_etape2_due_now(now_ms);
            controller_reply(result, || json!({ "forced": true }))
        }
        StoryCommand::TestMode(enabled) => {
            runtime.controller_mut().set_test_mode(enabled, now_ms);
            CommandReply::ok(test_state(runtime))
        }
        StoryCommand::TestDelay(delay_ms) => {
            runtime.controller_mut().set_test_delay_ms(delay_ms, now_ms);
            CommandReply::ok(test_state(runtime))
        }
        StoryCommand::Trace(level) => {
            let changed = runtime.controller_mut().set_trace_level(level);
            CommandReply::ok(json!({ "trace_level": level, "changed": changed }))
        }
        StoryCommand::Enable(enabled) => {
            let changed = runtime.controller_mut().set_enabled(enabled);
            CommandReply::ok(json!({ "enabled": enabled, "changed": changed }))
        }
        StoryCommand::Health => {
            let controller = runtime.controller();
            CommandReply::ok(json!({
                "health": controller.health(),
                "last_error": controller.last_error_code(),
                "runtime": runtime.state(),
            }))
        }
        StoryCommand::Metrics { reset } => {
            let metrics = to_value(runtime.controller().metrics());
            if reset {
                runtime.controller_mut().reset_metrics();
            }
            CommandReply::ok(json!({ "metrics": metrics, "reset": reset }))
        }
        StoryCommand::List => CommandReply::ok(json!({
            "scenarios": to_value(&runtime.list_scenarios()),
            "fs": to_value(&runtime.store().fs_info()),
        })),
        StoryCommand::Validate => match runtime.controller().validate_active() {
            Ok(()) => CommandReply::ok(json!({
                "valid": true,
                "scenario_id": runtime.controller().engine().scenario_id(),
            })),
            Err(err) => controller_error_reply(&err),
        },
        StoryCommand::Event {
            event_type,
            name,
            value,
        } => {
            let event = match StoryEvent::new(event_type, &name, value, now_ms) {
                Ok(event) => event,
                Err(err) => return CommandReply::error(ReplyCode::BadArgs, "TEXT_TOO_LONG", err),
            };
            let result = runtime.controller_mut().post_event(event, now_ms);
            let queued = runtime.controller().engine().queued_events();
            controller_reply(result, || json!({ "queued": queued }))
        }
        StoryCommand::Step(step_id) => {
            let result = runtime.controller_mut().jump_to_step(&step_id, now_ms);
            controller_reply(result, || json!({ "step_id": step_id }))
        }
        StoryCommand::Scenario(scenario_id) => {
            match runtime.set_scenario(&scenario_id, now_ms, "command") {
                Ok(()) => CommandReply::ok(json!({
                    "scenario_id": scenario_id,
                    "from_fs": runtime.scenario_from_fs(),
                })),
                Err(err) => CommandReply::error(ReplyCode::NotFound, err.as_code(), err),
            }
        }
        StoryCommand::Pause => {
            let changed = runtime.controller_mut().pause();
            CommandReply::ok(json!({ "paused": true, "changed": changed }))
        }
        StoryCommand::Resume => {
            let changed = runtime.controller_mut().resume();
            CommandReply::ok(json!({ "paused": false, "changed": changed }))
        }
        StoryCommand::Skip => {
            let result = runtime.controller_mut().skip_to_next_step(now_ms);
            let step_id = runtime.controller().engine().current_step_id().to_owned();
            controller_reply(result, || json!({ "step_id": step_id }))
        }
    }
}

pub fn handle_serial_line<F: ResourceFs, H: AppHost>(
    runtime: &mut PortableRuntime<F, H>,
    line: &str,
    now_ms: u32,
) -> CommandReply {
    match parse_serial_line(line) {
        Ok(command) => execute(runtime, command, now_ms),
        Err(err) => err.reply(),
    }
}

pub fn handle_json_request<F: ResourceFs, H: AppHost>(
    runtime: &mut PortableRuntime<F, H>,
    text: &str,
    now_ms: u32,
) -> CommandReply {
    match parse_json_request(text) {
        Ok(command) => execute(runtime, command, now_ms),
        Err(err) => err.reply(),
    }
}

/// Reply code for a controller failure.
pub fn controller_reply_code(err: &ControllerError) -> ReplyCode {
    match err {
        ControllerError::NotEnabled | ControllerError::Engine(EngineError::ScenarioNotLoaded) => {
            ReplyCode::OutOfContext
        }
        ControllerError::StormSuppressed
        | ControllerError::AppHostStartFailed(_)
        | ControllerError::Engine(EngineError::EventQueueFull | EngineError::EventBudget(_)) => {
            ReplyCode::Busy
        }
        ControllerError::AppHostRejected(_) | ControllerError::Engine(EngineError::Invalid(_)) => {
            ReplyCode::BadArgs
        }
        ControllerError::CatalogMiss(_)
        | ControllerError::NoTransition(_)
        | ControllerError::Engine(
            EngineError::StepNotFound(_)
            | EngineError::TargetStepNotFound(_)
            | EngineError::InitialStepNotFound(_)
            | EngineError::ScenarioIdMismatch { .. },
        ) => ReplyCode::NotFound,
    }
}

fn controller_error_reply(err: &ControllerError) -> CommandReply {
    CommandReply::error(controller_reply_code(err), err.as_code(), err)
}

fn controller_reply(
    result: Result<(), ControllerError>,
    data: impl FnOnce() -> Value,
) -> CommandReply {
    match result {
        Ok(()) => CommandReply::ok(data()),
        Err(err) => controller_error_reply(&err),
    }
}

fn reload<F: ResourceFs, H: AppHost>(
    runtime: &mut PortableRuntime<F, H>,
    now_ms: u32,
    source: &str,
) -> CommandReply {
    let scenario_id = match runtime.snapshot().scenario_id {
        id if id.is_empty() => DEFAULT_SCENARIO_ID.to_owned(),
        id => id,
    };
    match runtime.set_scenario(&scenario_id, now_ms, source) {
        Ok(()) => CommandReply::ok(json!({
            "scenario_id": scenario_id,
            "from_fs": runtime.scenario_from_fs(),
        })),
        Err(err) => CommandReply::error(ReplyCode::NotFound, err.as_code(), err),
    }
}

fn test_state<F: ResourceFs, H: AppHost>(runtime: &PortableRuntime<F, H>) -> Value {
    let controller = runtime.controller();
    json!({
        "test_mode": controller.config().test_mode,
        "test_delay_ms": controller.config().test_delay_ms,
        "etape2_due_at_ms": controller.etape2_due_at_ms(),
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn params<T: DeserializeOwned + Default>(value: Value) -> Result<T, CommandError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|err| CommandError::Json(err.to_string()))
}

fn required<'a>(token: Option<&'a str>, name: &'static str) -> Result<&'a str, CommandError> {
    token.ok_or(CommandError::MissingArgument(name))
}

fn non_empty(value: String, name: &'static str) -> Result<String, CommandError> {
    if value.is_empty() {
        return Err(CommandError::MissingArgument(name));
    }
    Ok(value)
}

fn invalid(name: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        name,
        value: value.into(),
    }
}

fn parse_arg<T: core::str::FromStr>(raw: &str, name: &'static str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| invalid(name, raw))
}

fn parse_switch(raw: &str) -> Result<bool, CommandError> {
    if raw.eq_ignore_ascii_case("ON") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("OFF") {
        Ok(false)
    } else {
        Err(invalid("state", raw))
    }
}

/// `none` is a valid schema value but can never match a transition.
fn parse_event_type(raw: &str) -> Result<StoryEventType, CommandError> {
    match StoryEventType::parse(raw) {
        Some(StoryEventType::None) | None => Err(invalid("type", raw)),
        Some(event_type) => Ok(event_type),
    }
}
