//! Checksum-verified loader for scenario, app, screen, audio and action files.
//!
//! Every resource lives at `<root>/<dir>/<id>.json` next to a `.sha256`
//! sidecar. Nothing is parsed before its digest has been checked.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    event::StoryEventType,
    registry::AppKind,
    scenario::{
        MAX_ACTIONS_PER_STEP, MAX_APP_BINDINGS, MAX_APPS_PER_STEP, MAX_STEPS,
        MAX_TRANSITIONS_PER_STEP, ScenarioDef, ScenarioInfo, StepDef, StoryText, TextTooLong,
        TransitionDef, TransitionTrigger, ValidationError, story_text, validate,
    },
};

pub use app_cache::{APP_CACHE_SLOTS, AppConfig, AppConfigCache};
pub use checksum::{SIDECAR_SUFFIX, checksum_matches, sha256_hex, sidecar_digest, sidecar_path};
pub use fs::{MemoryFs, MemoryFsError, ResourceFs};
pub use schema::{AppFile, ScenarioFile, StepFile, TransitionFile};

mod app_cache;
mod checksum;
mod fs;
mod schema;

/// Upper bound on any single resource file.
pub const RESOURCE_MAX_BYTES: usize = 12 * 1024;
const SIDECAR_MAX_BYTES: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Scenario,
    App,
    Screen,
    Audio,
    Action,
}

impl ResourceKind {
    pub const ALL: [Self; 5] = [
        Self::Scenario,
        Self::App,
        Self::Screen,
        Self::Audio,
        Self::Action,
    ];

    pub const fn dir(self) -> &'static str {
        match self {
            Self::Scenario => "scenarios",
            Self::App => "apps",
            Self::Screen => "screens",
            Self::Audio => "audio",
            Self::Action => "actions",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ResourceError {
    #[error("invalid resource id {0:?}")]
    InvalidId(String),
    #[error("{path}: missing")]
    Missing { path: String },
    #[error("{path}: checksum sidecar missing")]
    ChecksumMissing { path: String },
    #[error("{path}: checksum mismatch (expected={expected}, actual={actual})")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("{path}: {size} bytes exceeds limit")]
    TooLarge { path: String, size: usize },
    #[error("{path}: io error: {detail}")]
    Io { path: String, detail: String },
    #[error("{path}: parse error: {detail}")]
    Parse { path: String, detail: String },
    #[error("{path}: field {field}: {source}")]
    TextTooLong {
        path: String,
        field: &'static str,
        source: TextTooLong,
    },
    #[error("scenario rejected: {0}")]
    Invalid(ValidationError),
    #[error("app {app_id}: unknown app type {app_type:?}")]
    UnknownAppType { app_id: String, app_type: String },
}

impl ResourceError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::InvalidId(_) => "INVALID_ID",
            Self::Missing { .. } => "RESOURCE_MISSING",
            Self::ChecksumMissing { .. } => "CHECKSUM_MISSING",
            Self::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Self::TooLarge { .. } => "RESOURCE_TOO_LARGE",
            Self::Io { .. } => "IO_ERROR",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::TextTooLong { .. } => "TEXT_TOO_LONG",
            Self::Invalid(err) => err.code.as_str(),
            Self::UnknownAppType { .. } => "APP_TYPE_UNKNOWN",
        }
    }
}

/// Per-directory file counts of the resource tree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FsInfo {
    pub scenarios: usize,
    pub apps: usize,
    pub screens: usize,
    pub audio: usize,
    pub actions: usize,
    /// `.json` files without a `.sha256` sidecar.
    pub unsealed: usize,
}

impl FsInfo {
    fn count_mut(&mut self, kind: ResourceKind) -> &mut usize {
        match kind {
            ResourceKind::Scenario => &mut self.scenarios,
            ResourceKind::App => &mut self.apps,
            ResourceKind::Screen => &mut self.screens,
            ResourceKind::Audio => &mut self.audio,
            ResourceKind::Action => &mut self.actions,
        }
    }
}

/// Ids end up in paths; reject anything that could leave its directory.
pub fn is_valid_resource_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('/') && !id.contains('\\') && !id.contains("..")
}

pub struct ResourceStore<F: ResourceFs> {
    fs: F,
    root: String,
    scenario: Option<Arc<ScenarioDef>>,
    apps: AppConfigCache,
    last_error: Option<ResourceError>,
}

impl<F: ResourceFs> ResourceStore<F> {
    pub fn new(fs: F, root: &str) -> Self {
        Self {
            fs,
            root: root.trim_end_matches('/').into(),
            scenario: None,
            apps: AppConfigCache::new(),
            last_error: None,
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Last successfully loaded scenario.
    pub fn scenario(&self) -> Option<&Arc<ScenarioDef>> {
        self.scenario.as_ref()
    }

    pub fn last_error(&self) -> Option<&ResourceError> {
        self.last_error.as_ref()
    }

    pub fn reset(&mut self) {
        self.scenario = None;
        self.apps.clear();
        self.last_error = None;
    }

    pub fn dir_path(&self, kind: ResourceKind) -> String {
        if self.root.is_empty() {
            kind.dir().into()
        } else {
            format!("{}/{}", self.root, kind.dir())
        }
    }

    pub fn resource_path(&self, kind: ResourceKind, id: &str) -> Result<String, ResourceError> {
        if !is_valid_resource_id(id) {
            return Err(ResourceError::InvalidId(id.into()));
        }
        Ok(format!("{}/{}.json", self.dir_path(kind), id))
    }

    /// Read `path` after checking size and its `.sha256` sidecar.
    pub fn read_verified(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        if !self.fs.exists(path) {
            return Err(ResourceError::Missing { path: path.into() });
        }
        let sidecar = sidecar_path(path);
        if !self.fs.exists(&sidecar) {
            return Err(ResourceError::ChecksumMissing { path: path.into() });
        }

        let bytes = self.read_bounded(path, RESOURCE_MAX_BYTES)?;
        let expected = self.read_bounded(&sidecar, SIDECAR_MAX_BYTES)?;
        let actual = sha256_hex(&bytes);
        if !checksum_matches(&expected, &actual) {
            return Err(ResourceError::ChecksumMismatch {
                path: path.into(),
                expected: sidecar_digest(&expected).into(),
                actual,
            });
        }

        debug!("resources: verified path={} bytes={}", path, bytes.len());
        Ok(bytes)
    }

    /// Load, verify and validate `scenarios/<id>.json` with every resource it
    /// references. On failure the previous scenario stays loaded.
    pub fn load_scenario(&mut self, id: &str) -> Result<Arc<ScenarioDef>, ResourceError> {
        match self.try_load_scenario(id) {
            Ok(scenario) => {
                info!(
                    "resources: scenario loaded id={} version={} steps={}",
                    scenario.id,
                    scenario.version,
                    scenario.steps.len()
                );
                self.scenario = Some(Arc::clone(&scenario));
                self.last_error = None;
                Ok(scenario)
            }
            Err(err) => {
                warn!(
                    "resources: scenario load failed id={} code={} err={}",
                    id,
                    err.as_code(),
                    err
                );
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Cached app config lookup; a miss loads `apps/<id>.json`.
    pub fn get_app_config(&mut self, app_id: &str) -> Result<Arc<AppConfig>, ResourceError> {
        if let Some(config) = self.apps.get(app_id) {
            return Ok(config);
        }

        let path = self.resource_path(ResourceKind::App, app_id)?;
        let bytes = self.read_verified(&path)?;
        let file: AppFile = parse_json(&path, &bytes)?;
        let Some(kind) = AppKind::from_type_str(&file.app) else {
            return Err(ResourceError::UnknownAppType {
                app_id: app_id.into(),
                app_type: file.app,
            });
        };

        let config = Arc::new(AppConfig {
            id: text(&path, "id", app_id)?,
            app_type: file.app,
            kind,
            config: file.config,
        });
        debug!("resources: app cached id={} kind={}", app_id, kind.as_str());
        self.apps.insert(Arc::clone(&config));
        Ok(config)
    }

    pub fn invalidate_app_config(&mut self, app_id: &str) -> bool {
        self.apps.invalidate(app_id)
    }

    pub fn cached_app_configs(&self) -> usize {
        self.apps.len()
    }

    /// Listing of `scenarios/*.json` without loading dependent resources.
    /// Unreadable or malformed entries are skipped.
    pub fn list_scenarios(&self) -> Result<Vec<ScenarioInfo>, ResourceError> {
        let dir = self.dir_path(ResourceKind::Scenario);
        let names = self.fs.list(&dir).map_err(|err| io_error(&dir, err))?;

        let mut infos = Vec::new();
        for name in names {
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let path = format!("{dir}/{name}");
            let (bytes, checksum_ok) = match self.read_verified(&path) {
                Ok(bytes) => (bytes, true),
                Err(ResourceError::ChecksumMissing { .. } | ResourceError::ChecksumMismatch { .. }) => {
                    match self.read_bounded(&path, RESOURCE_MAX_BYTES) {
                        Ok(bytes) => (bytes, false),
                        Err(err) => {
                            warn!("resources: list skipped path={} err={}", path, err);
                            continue;
                        }
                    }
                }
                Err(err) => {
                    warn!("resources: list skipped path={} err={}", path, err);
                    continue;
                }
            };

            match parse_json::<ScenarioFile>(&path, &bytes) {
                Ok(file) => infos.push(ScenarioInfo {
                    id: if file.id.is_empty() { stem.into() } else { file.id.clone() },
                    version: file.version,
                    step_count: file.steps.len(),
                    estimated_duration_ms: file.estimated_duration_ms(),
                    checksum_ok,
                }),
                Err(err) => warn!("resources: list skipped path={} err={}", path, err),
            }
        }

        Ok(infos)
    }

    /// A directory that cannot be listed counts as empty.
    pub fn fs_info(&self) -> FsInfo {
        let mut info = FsInfo::default();
        for kind in ResourceKind::ALL {
            let dir = self.dir_path(kind);
            let names = match self.fs.list(&dir) {
                Ok(names) => names,
                Err(err) => {
                    debug!("resources: fs info skipped dir={} err={}", dir, err);
                    continue;
                }
            };
            for name in names.iter().filter(|name| name.ends_with(".json")) {
                *info.count_mut(kind) += 1;
                if !self.fs.exists(&sidecar_path(&format!("{dir}/{name}"))) {
                    info.unsealed += 1;
                }
            }
        }
        info
    }

    fn read_bounded(&self, path: &str, max_bytes: usize) -> Result<Vec<u8>, ResourceError> {
        let size = self.fs.size(path).map_err(|err| io_error(path, err))?;
        if size > max_bytes {
            return Err(ResourceError::TooLarge {
                path: path.into(),
                size,
            });
        }

        let bytes = self.fs.read(path).map_err(|err| io_error(path, err))?;
        if bytes.len() > max_bytes {
            return Err(ResourceError::TooLarge {
                path: path.into(),
                size: bytes.len(),
            });
        }
        Ok(bytes)
    }

    fn try_load_scenario(&mut self, id: &str) -> Result<Arc<ScenarioDef>, ResourceError> {
        let path = self.resource_path(ResourceKind::Scenario, id)?;
        let bytes = self.read_verified(&path)?;
        let file: ScenarioFile = parse_json(&path, &bytes)?;
        if !file.id.is_empty() && file.id != id {
            warn!("resources: scenario id differs file={} id={}", path, file.id);
        }

        let scenario = build_scenario(&path, &file)?;

        for binding in &scenario.app_bindings {
            self.get_app_config(binding)?;
        }
        for step in &scenario.steps {
            self.verify_step_resources(step)?;
        }

        validate(&scenario).map_err(ResourceError::Invalid)?;
        Ok(Arc::new(scenario))
    }

    fn verify_step_resources(&mut self, step: &StepDef) -> Result<(), ResourceError> {
        let resources = &step.resources;
        if !resources.screen_scene_id.is_empty() {
            self.verify_resource(ResourceKind::Screen, &resources.screen_scene_id)?;
        }
        if !resources.audio_pack_id.is_empty() {
            self.verify_resource(ResourceKind::Audio, &resources.audio_pack_id)?;
        }
        for action_id in &resources.action_ids {
            self.verify_resource(ResourceKind::Action, action_id)?;
        }
        for app_id in &resources.app_ids {
            // Blank ids are reported by the validator.
            if !app_id.is_empty() {
                self.get_app_config(app_id)?;
            }
        }
        Ok(())
    }

    fn verify_resource(&self, kind: ResourceKind, id: &str) -> Result<(), ResourceError> {
        let path = self.resource_path(kind, id)?;
        self.read_verified(&path).map(|_| ())
    }
}

fn io_error(path: &str, err: impl core::fmt::Display) -> ResourceError {
    ResourceError::Io {
        path: path.into(),
        detail: err.to_string(),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    path: &str,
    bytes: &[u8],
) -> Result<T, ResourceError> {
    serde_json::from_slice(bytes).map_err(|err| ResourceError::Parse {
        path: path.into(),
        detail: err.to_string(),
    })
}

fn text(path: &str, field: &'static str, value: &str) -> Result<StoryText, ResourceError> {
    story_text(value).map_err(|source| ResourceError::TextTooLong {
        path: path.into(),
        field,
        source,
    })
}

/// Convert the parsed file into bounded storage. Entries beyond the fixed
/// capacities are dropped with a warning; oversized strings are errors.
fn build_scenario(path: &str, file: &ScenarioFile) -> Result<ScenarioDef, ResourceError> {
    let mut scenario = ScenarioDef {
        id: text(path, "id", &file.id)?,
        version: file.version,
        initial_step_id: text(path, "initial_step", &file.initial_step)?,
        ..ScenarioDef::default()
    };

    for binding in &file.app_bindings {
        let binding_id = text(path, "app_bindings.id", &binding.id)?;
        if scenario.app_bindings.push(binding_id).is_err() {
            warn!(
                "resources: app binding dropped path={} id={} cap={}",
                path, binding.id, MAX_APP_BINDINGS
            );
        }
    }

    for step_file in &file.steps {
        let step = build_step(path, step_file)?;
        if scenario.steps.push(step).is_err() {
            warn!(
                "resources: step dropped path={} id={} cap={}",
                path, step_file.step_id, MAX_STEPS
            );
        }
    }

    Ok(scenario)
}

fn build_step(path: &str, file: &StepFile) -> Result<StepDef, ResourceError> {
    let mut step = StepDef {
        id: text(path, "step_id", &file.step_id)?,
        mp3_gate_open: file.mp3_gate_open,
        ..StepDef::default()
    };
    step.resources.screen_scene_id = text(path, "screen_scene_id", &file.screen_scene_id)?;
    step.resources.audio_pack_id = text(path, "audio_pack_id", &file.audio_pack_id)?;

    for action in &file.actions {
        if step.resources.action_ids.push(text(path, "actions", action)?).is_err() {
            warn!(
                "resources: action dropped step={} id={} cap={}",
                file.step_id, action, MAX_ACTIONS_PER_STEP
            );
        }
    }
    for app in &file.apps {
        if step.resources.app_ids.push(text(path, "apps", app)?).is_err() {
            warn!(
                "resources: app dropped step={} id={} cap={}",
                file.step_id, app, MAX_APPS_PER_STEP
            );
        }
    }

    for transition in &file.transitions {
        let def = build_transition(path, transition)?;
        if step.transitions.push(def).is_err() {
            warn!(
                "resources: transition dropped step={} id={} cap={}",
                file.step_id, transition.id, MAX_TRANSITIONS_PER_STEP
            );
        }
    }

    Ok(step)
}

fn build_transition(path: &str, file: &TransitionFile) -> Result<TransitionDef, ResourceError> {
    Ok(TransitionDef {
        id: text(path, "transitions.id", &file.id)?,
        trigger: TransitionTrigger::from_schema(&file.trigger),
        event_type: StoryEventType::from_schema(&file.event_type),
        event_name: text(path, "event_name", &file.event_name)?,
        after_ms: file.after_ms,
        target_step_id: text(path, "target_step_id", &file.target_step_id)?,
        priority: file.priority,
    })
}
