//! Portable runtime: chooses where a scenario comes from (verified resource
//! tree first, compiled catalog as fallback) and owns the controller.

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    app_host::AppHost,
    catalog::{self, DEFAULT_SCENARIO_ID},
    controller::{ControllerSnapshot, StoryController},
    resources::{ResourceFs, ResourceStore},
    scenario::ScenarioInfo,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    #[default]
    Idle,
    Running,
    Error,
}

impl RuntimeState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RuntimeConfig {
    /// Try the resource tree before the catalog.
    pub prefer_fs: bool,
    /// Never fall back once the resource tree has failed.
    pub strict_fs_only: bool,
    pub allow_generated_fallback: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            prefer_fs: true,
            strict_fs_only: false,
            allow_generated_fallback: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuntimeEvent<'a> {
    Begin {
        now_ms: u32,
    },
    Load {
        scenario_id: &'a str,
        now_ms: u32,
        source: &'a str,
    },
    Update {
        now_ms: u32,
    },
    Stop {
        reason: &'a str,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RuntimeError {
    #[error("scenario {id} unavailable from resource tree ({detail})")]
    FsScenarioMissing { id: String, detail: String },
    #[error("scenario {id} not found ({detail})")]
    ScenarioNotFound { id: String, detail: String },
}

impl RuntimeError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::FsScenarioMissing { .. } => "littlefs_scenario_missing",
            Self::ScenarioNotFound { .. } => "scenario_not_found",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioSource {
    Fs,
    Catalog,
}

/// Listing entry tagged with where it would be loaded from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ScenarioEntry {
    #[serde(flatten)]
    pub info: ScenarioInfo,
    pub source: ScenarioSource,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PortableSnapshot {
    pub state: RuntimeState,
    pub scenario_id: String,
    pub scenario_from_fs: bool,
    pub last_error: Option<&'static str>,
    pub controller: ControllerSnapshot,
}

pub struct PortableRuntime<F: ResourceFs, H: AppHost> {
    store: ResourceStore<F>,
    controller: StoryController<H>,
    config: RuntimeConfig,
    state: RuntimeState,
    scenario_id: String,
    scenario_from_fs: bool,
    last_error: Option<RuntimeError>,
}

impl<F: ResourceFs, H: AppHost> PortableRuntime<F, H> {
    pub fn new(
        store: ResourceStore<F>,
        controller: StoryController<H>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            controller,
            config,
            state: RuntimeState::Idle,
            scenario_id: String::new(),
            scenario_from_fs: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &ResourceStore<F> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ResourceStore<F> {
        &mut self.store
    }

    pub fn controller(&self) -> &StoryController<H> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StoryController<H> {
        &mut self.controller
    }

    pub fn scenario_from_fs(&self) -> bool {
        self.scenario_from_fs
    }

    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.last_error.as_ref()
    }

    pub fn begin(&mut self, now_ms: u32) -> Result<(), RuntimeError> {
        self.dispatch(RuntimeEvent::Begin { now_ms })
    }

    pub fn set_scenario(
        &mut self,
        scenario_id: &str,
        now_ms: u32,
        source: &str,
    ) -> Result<(), RuntimeError> {
        self.dispatch(RuntimeEvent::Load {
            scenario_id,
            now_ms,
            source,
        })
    }

    pub fn update(&mut self, now_ms: u32) {
        let _ = self.dispatch(RuntimeEvent::Update { now_ms });
    }

    pub fn stop(&mut self, reason: &str) {
        let _ = self.dispatch(RuntimeEvent::Stop { reason });
    }

    pub fn dispatch(&mut self, event: RuntimeEvent<'_>) -> Result<(), RuntimeError> {
        match (self.state, event) {
            (_, RuntimeEvent::Begin { now_ms }) => self.load(DEFAULT_SCENARIO_ID, now_ms, "begin"),
            (
                _,
                RuntimeEvent::Load {
                    scenario_id,
                    now_ms,
                    source,
                },
            ) => self.load(scenario_id, now_ms, source),
            (RuntimeState::Running, RuntimeEvent::Update { now_ms }) => {
                self.controller.update(now_ms);
                Ok(())
            }
            (RuntimeState::Idle | RuntimeState::Error, RuntimeEvent::Update { .. }) => Ok(()),
            (_, RuntimeEvent::Stop { reason }) => {
                self.controller.reset(reason);
                self.state = RuntimeState::Idle;
                info!("story-runtime: stopped reason={}", reason);
                Ok(())
            }
        }
    }

    /// Resource-tree entries followed by catalog entries. A tree that cannot
    /// be listed contributes nothing.
    pub fn list_scenarios(&self) -> Vec<ScenarioEntry> {
        let mut entries = Vec::new();
        match self.store.list_scenarios() {
            Ok(infos) => entries.extend(infos.into_iter().map(|info| ScenarioEntry {
                info,
                source: ScenarioSource::Fs,
            })),
            Err(err) => warn!("story-runtime: fs listing failed err={}", err),
        }
        entries.extend(catalog::infos().map(|info| ScenarioEntry {
            info,
            source: ScenarioSource::Catalog,
        }));
        entries
    }

    pub fn snapshot(&self) -> PortableSnapshot {
        PortableSnapshot {
            state: self.state,
            scenario_id: self.scenario_id.clone(),
            scenario_from_fs: self.scenario_from_fs,
            last_error: self.last_error.as_ref().map(RuntimeError::as_code),
            controller: self.controller.snapshot(),
        }
    }

    fn load(&mut self, scenario_id: &str, now_ms: u32, source: &str) -> Result<(), RuntimeError> {
        let mut fs_detail = "fs_disabled";

        if self.config.prefer_fs {
            match self.store.load_scenario(scenario_id) {
                Ok(scenario) => match self
                    .controller
                    .set_scenario_from_definition(scenario, now_ms, source)
                {
                    Ok(()) => {
                        self.enter_running(scenario_id, true);
                        return Ok(());
                    }
                    Err(err) => fs_detail = err.as_code(),
                },
                Err(err) => fs_detail = err.as_code(),
            }
            warn!(
                "story-runtime: fs load failed id={} detail={} strict={}",
                scenario_id, fs_detail, self.config.strict_fs_only
            );

            if self.config.strict_fs_only {
                return Err(self.fail(RuntimeError::FsScenarioMissing {
                    id: scenario_id.into(),
                    detail: fs_detail.into(),
                }));
            }
        }

        if !self.config.allow_generated_fallback {
            return Err(self.fail(RuntimeError::FsScenarioMissing {
                id: scenario_id.into(),
                detail: fs_detail.into(),
            }));
        }

        match self.controller.load_from_catalog(scenario_id, now_ms) {
            Ok(()) => {
                self.enter_running(scenario_id, false);
                Ok(())
            }
            Err(err) => Err(self.fail(RuntimeError::ScenarioNotFound {
                id: scenario_id.into(),
                detail: err.as_code().into(),
            })),
        }
    }

    fn enter_running(&mut self, scenario_id: &str, from_fs: bool) {
        self.state = RuntimeState::Running;
        self.scenario_id.clear();
        self.scenario_id.push_str(scenario_id);
        self.scenario_from_fs = from_fs;
        self.last_error = None;
        info!(
            "story-runtime: running scenario={} from_fs={}",
            scenario_id, from_fs
        );
    }

    fn fail(&mut self, err: RuntimeError) -> RuntimeError {
        warn!(
            "story-runtime: load failed code={} err={}",
            err.as_code(),
            err
        );
        self.state = RuntimeState::Error;
        self.last_error = Some(err.clone());
        err
    }
}

#[cfg(test)]
mod tests;
