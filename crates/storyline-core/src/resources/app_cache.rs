use std::sync::Arc;

use heapless::Vec;
use serde::Serialize;
use serde_json::Value;

use crate::{registry::AppKind, scenario::StoryText};

pub const APP_CACHE_SLOTS: usize = 6;

/// Parsed `apps/<id>.json`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub id: StoryText,
    pub app_type: String,
    pub kind: AppKind,
    pub config: Value,
}

#[derive(Clone, Debug)]
struct Slot {
    config: Arc<AppConfig>,
    valid: bool,
    loaded_seq: u32,
}

/// Small fixed cache. When full, a new entry takes the first invalidated
/// slot, else the oldest one.
#[derive(Clone, Debug, Default)]
pub struct AppConfigCache {
    slots: Vec<Slot, APP_CACHE_SLOTS>,
    seq: u32,
}

impl AppConfigCache {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            seq: 0,
        }
    }

    pub fn get(&self, app_id: &str) -> Option<Arc<AppConfig>> {
        self.slots
            .iter()
            .find(|slot| slot.valid && slot.config.id.as_str() == app_id)
            .map(|slot| Arc::clone(&slot.config))
    }

    pub fn insert(&mut self, config: Arc<AppConfig>) {
        self.seq = self.seq.wrapping_add(1);
        let slot = Slot {
            config,
            valid: true,
            loaded_seq: self.seq,
        };

        if let Some(existing) = self
            .slots
            .iter_mut()
            .find(|existing| existing.config.id == slot.config.id)
        {
            *existing = slot;
            return;
        }

        let slot = match self.slots.push(slot) {
            Ok(()) => return,
            Err(slot) => slot,
        };

        let victim = self
            .slots
            .iter()
            .position(|existing| !existing.valid)
            .or_else(|| {
                self.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, existing)| existing.loaded_seq)
                    .map(|(index, _)| index)
            });
        if let Some(index) = victim {
            self.slots[index] = slot;
        }
    }

    /// Mark `app_id` stale; returns `false` when it was not cached.
    pub fn invalidate(&mut self, app_id: &str) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.valid && slot.config.id.as_str() == app_id)
        {
            Some(slot) => {
                slot.valid = false;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::story_text;

    fn config(id: &str) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            id: story_text(id).unwrap(),
            app_type: "AUDIO_PACK".into(),
            kind: AppKind::AudioPack,
            config: Value::Null,
        })
    }

    fn fill(cache: &mut AppConfigCache) {
        for index in 0..APP_CACHE_SLOTS {
            cache.insert(config(&format!("APP_{index}")));
        }
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut cache = AppConfigCache::new();
        fill(&mut cache);
        cache.insert(config("APP_NEW"));
        assert_eq!(cache.len(), APP_CACHE_SLOTS);
        assert!(cache.get("APP_0").is_none());
        assert!(cache.get("APP_1").is_some());
        assert!(cache.get("APP_NEW").is_some());
    }

    #[test]
    fn overflow_prefers_first_invalid_slot() {
        let mut cache = AppConfigCache::new();
        fill(&mut cache);
        assert!(cache.invalidate("APP_3"));
        assert!(!cache.invalidate("APP_3"));
        cache.insert(config("APP_NEW"));
        assert!(cache.get("APP_0").is_some());
        assert!(cache.get("APP_3").is_none());
        assert!(cache.get("APP_NEW").is_some());
    }

    #[test]
    fn reinsert_refreshes_in_place() {
        let mut cache = AppConfigCache::new();
        fill(&mut cache);
        cache.insert(config("APP_0"));
        cache.insert(config("APP_NEW"));
        assert!(cache.get("APP_0").is_some());
        assert!(cache.get("APP_1").is_none());
    }
}
