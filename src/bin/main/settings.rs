use std::{env, str::FromStr};

use log::warn;
use storyline_core::{controller::ControllerConfig, runtime::RuntimeConfig};
use storyline_hal_std::host::SimulatedAppHostConfig;

const DEFAULT_ROOT: &str = "data";
const DEFAULT_TICK_MS: u64 = 20;

pub(super) struct Settings {
    pub(super) root: String,
    pub(super) scenario: Option<String>,
    pub(super) tick_ms: u64,
    pub(super) runtime: RuntimeConfig,
    pub(super) controller: ControllerConfig,
    pub(super) host: SimulatedAppHostConfig,
}

impl Settings {
    pub(super) fn from_env() -> Self {
        let mut runtime = RuntimeConfig::default();
        runtime.strict_fs_only = flag("STORYLINE_STRICT_FS");
        runtime.allow_generated_fallback = !flag("STORYLINE_NO_FALLBACK");

        let mut controller = ControllerConfig::default();
        controller.test_mode = flag("STORYLINE_TEST_MODE");
        controller.test_delay_ms = number("STORYLINE_TEST_DELAY_MS", controller.test_delay_ms);

        let mut host = SimulatedAppHostConfig::default();
        host.audio_duration_ms = number("STORYLINE_AUDIO_MS", host.audio_duration_ms);

        Self {
            root: env::var("STORYLINE_ROOT").unwrap_or_else(|_| DEFAULT_ROOT.into()),
            scenario: env::var("STORYLINE_SCENARIO").ok().filter(|id| !id.is_empty()),
            tick_ms: number("STORYLINE_TICK_MS", DEFAULT_TICK_MS).max(1),
            runtime,
            controller,
            host,
        }
    }
}

fn flag(name: &str) -> bool {
    env::var(name).is_ok_and(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "on" | "ON"))
}

fn number<T: FromStr + Copy + core::fmt::Display>(name: &str, default: T) -> T {
    let Ok(raw) = env::var(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("settings: bad {}={:?}, using {}", name, raw, default);
            default
        }
    }
}
