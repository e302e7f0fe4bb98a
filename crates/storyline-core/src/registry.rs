//! Const lookup tables for app bindings and screen scenes.

use serde::Serialize;

use crate::scenario::{ScenarioDef, StoryText, ValidationCode, ValidationError};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppKind {
    AudioPack,
    Mp3Gate,
    LaDetector,
    ScreenScene,
    WifiStack,
    EspNowStack,
    CameraScene,
    QrUnlock,
}

impl AppKind {
    pub const ALL: [Self; 8] = [
        Self::AudioPack,
        Self::Mp3Gate,
        Self::LaDetector,
        Self::ScreenScene,
        Self::WifiStack,
        Self::EspNowStack,
        Self::CameraScene,
        Self::QrUnlock,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AudioPack => "AUDIO_PACK",
            Self::Mp3Gate => "MP3_GATE",
            Self::LaDetector => "LA_DETECTOR",
            Self::ScreenScene => "SCREEN_SCENE",
            Self::WifiStack => "WIFI_STACK",
            Self::EspNowStack => "ESPNOW_STACK",
            Self::CameraScene => "CAMERA_SCENE",
            Self::QrUnlock => "QR_UNLOCK",
        }
    }

    /// Case-insensitive match against the `app` field of app config files.
    pub fn from_type_str(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppBindingDef {
    pub id: &'static str,
    pub kind: AppKind,
}

pub const APP_BINDINGS: [AppBindingDef; 8] = [
    AppBindingDef {
        id: "APP_AUDIO",
        kind: AppKind::AudioPack,
    },
    AppBindingDef {
        id: "APP_GATE",
        kind: AppKind::Mp3Gate,
    },
    AppBindingDef {
        id: "APP_LA",
        kind: AppKind::LaDetector,
    },
    AppBindingDef {
        id: "APP_SCREEN",
        kind: AppKind::ScreenScene,
    },
    AppBindingDef {
        id: "APP_WIFI",
        kind: AppKind::WifiStack,
    },
    AppBindingDef {
        id: "APP_ESPNOW",
        kind: AppKind::EspNowStack,
    },
    AppBindingDef {
        id: "APP_CAMERA",
        kind: AppKind::CameraScene,
    },
    AppBindingDef {
        id: "APP_QR_UNLOCK",
        kind: AppKind::QrUnlock,
    },
];

pub fn find_app_binding(id: &str) -> Option<&'static AppBindingDef> {
    APP_BINDINGS.iter().find(|binding| binding.id == id)
}

pub const SCREEN_SCENES: [&str; 10] = [
    "SCENE_READY",
    "SCENE_LOCKED",
    "SCENE_BROKEN",
    "SCENE_SEARCH",
    "SCENE_LA_DETECTOR",
    "SCENE_CAMERA_SCAN",
    "SCENE_WIN",
    "SCENE_REWARD",
    "SCENE_MP3_PLAYER",
    "SCENE_WIN_ETAPE",
];

pub fn is_known_screen_scene(id: &str) -> bool {
    SCREEN_SCENES.contains(&id)
}

/// Every app id referenced by a step must be registered. Structural checks
/// stay in [`crate::scenario::validate`]; this one needs the registry.
pub fn validate_app_bindings(scenario: &ScenarioDef) -> Result<(), ValidationError> {
    for binding in &scenario.app_bindings {
        if find_app_binding(binding).is_none() {
            return Err(ValidationError::new(ValidationCode::StepAppsInvalid, binding));
        }
    }

    for step in &scenario.steps {
        if step
            .resources
            .app_ids
            .iter()
            .any(|app_id| find_app_binding(app_id).is_none())
        {
            return Err(ValidationError::new(ValidationCode::StepAppsInvalid, &step.id));
        }
    }

    Ok(())
}

/// Binding ids of `scenario` resolved against the registry.
pub fn resolved_kinds(scenario: &ScenarioDef) -> impl Iterator<Item = (&StoryText, AppKind)> {
    scenario.app_bindings.iter().filter_map(|binding| {
        find_app_binding(binding).map(|def| (binding, def.kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{StepDef, story_text};

    fn scenario_with_apps(apps: &[&str]) -> ScenarioDef {
        let mut scenario = ScenarioDef::new("APPS", 1, "A").unwrap();
        let mut step = StepDef::new("A").unwrap();
        for app in apps {
            step.resources.app_ids.push(story_text(app).unwrap()).unwrap();
        }
        scenario.steps.push(step).unwrap();
        scenario
    }

    #[test]
    fn app_kinds_round_trip_type_strings() {
        for kind in AppKind::ALL {
            assert_eq!(AppKind::from_type_str(kind.as_str()), Some(kind));
        }
        assert_eq!(AppKind::from_type_str("qr_unlock"), Some(AppKind::QrUnlock));
        assert_eq!(AppKind::from_type_str("HOLOGRAM"), None);
    }

    #[test]
    fn registry_lookups() {
        assert_eq!(find_app_binding("APP_LA").map(|b| b.kind), Some(AppKind::LaDetector));
        assert!(find_app_binding("APP_NOPE").is_none());
        assert!(is_known_screen_scene("SCENE_WIN_ETAPE"));
        assert!(!is_known_screen_scene("SCENE_UNKNOWN"));
    }

    #[test]
    fn unregistered_step_app_names_the_step() {
        assert!(validate_app_bindings(&scenario_with_apps(&["APP_AUDIO", "APP_GATE"])).is_ok());

        let err = validate_app_bindings(&scenario_with_apps(&["APP_AUDIO", "APP_TELEPORT"]))
            .unwrap_err();
        assert_eq!(err.code, ValidationCode::StepAppsInvalid);
        assert_eq!(err.detail.as_str(), "A");
    }

    #[test]
    fn unregistered_binding_names_the_binding() {
        let mut scenario = scenario_with_apps(&[]);
        scenario.app_bindings.push(story_text("APP_WIFI").unwrap()).unwrap();
        scenario.app_bindings.push(story_text("APP_RADAR").unwrap()).unwrap();
        let err = validate_app_bindings(&scenario).unwrap_err();
        assert_eq!(err.detail.as_str(), "APP_RADAR");

        let kinds: std::vec::Vec<_> = resolved_kinds(&scenario).map(|(_, kind)| kind).collect();
        assert_eq!(kinds, [AppKind::WifiStack]);
    }
}
