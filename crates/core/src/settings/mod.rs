use std::{ops::RangeInclusive, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    resolver::{clamp_index, sentence_count},
    SceneCatalog,
};

pub const PITCH_RANGE: RangeInclusive<f32> = 0.5..=2.0;
pub const RATE_RANGE: RangeInclusive<f32> = 0.1..=2.0;

/// User-editable configuration of a playback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pitch: f32,
    pub rate: f32,
    pub language: String,
    pub voice: Option<String>,
    pub selected_scene: Option<String>,
    pub selected_sentence_index: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            rate: 1.0,
            language: "en-US".to_string(),
            voice: None,
            selected_scene: Some("default".to_string()),
            selected_sentence_index: 0,
        }
    }
}

/// Partial update merged into [`Settings`] by [`SettingsStore::update`].
///
/// Fields left as `None` are untouched. `voice` and `selected_scene` are
/// nullable settings, so `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub pitch: Option<f32>,
    pub rate: Option<f32>,
    pub language: Option<String>,
    pub voice: Option<Option<String>>,
    pub selected_scene: Option<Option<String>>,
    pub selected_sentence_index: Option<usize>,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn voice(mut self, voice: Option<String>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn scene(mut self, scene: Option<String>) -> Self {
        self.selected_scene = Some(scene);
        self
    }

    pub fn sentence_index(mut self, index: usize) -> Self {
        self.selected_sentence_index = Some(index);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True if applying this patch would give `settings` a different language.
    pub fn changes_language(&self, settings: &Settings) -> bool {
        self.language
            .as_deref()
            .is_some_and(|language| language != settings.language)
    }
}

/// Owns the session's [`Settings`]. Every change goes through [`update`],
/// which builds the merged value first and swaps it in whole.
///
/// [`update`]: SettingsStore::update
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings: Settings,
    catalog: Arc<SceneCatalog>,
}

impl SettingsStore {
    pub fn new(initial: Settings, catalog: Arc<SceneCatalog>) -> Self {
        let mut store = Self {
            settings: Settings::default(),
            catalog,
        };
        store.settings = store.normalized(initial);
        store
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> Settings {
        self.settings.clone()
    }

    pub fn update(&mut self, patch: SettingsPatch) -> Settings {
        let mut next = self.settings.clone();
        if let Some(pitch) = patch.pitch {
            next.pitch = pitch;
        }
        if let Some(rate) = patch.rate {
            next.rate = rate;
        }
        if let Some(language) = patch.language {
            next.language = language;
        }
        if let Some(voice) = patch.voice {
            next.voice = voice;
        }
        if let Some(scene) = patch.selected_scene {
            next.selected_scene = scene;
        }
        if let Some(index) = patch.selected_sentence_index {
            next.selected_sentence_index = index;
        }

        self.settings = self.normalized(next);
        self.settings.clone()
    }

    /// Sentences available for the current scene and language.
    pub fn sentence_count(&self) -> usize {
        let scene = self
            .settings
            .selected_scene
            .as_deref()
            .and_then(|id| self.catalog.get(id));
        sentence_count(scene, &self.settings.language)
    }

    fn normalized(&self, mut settings: Settings) -> Settings {
        settings.pitch = clamp_to(settings.pitch, PITCH_RANGE, self.settings.pitch, "pitch");
        settings.rate = clamp_to(settings.rate, RATE_RANGE, self.settings.rate, "rate");

        let scene = settings
            .selected_scene
            .as_deref()
            .and_then(|id| self.catalog.get(id));
        let count = sentence_count(scene, &settings.language);
        let index = clamp_index(settings.selected_sentence_index, count);
        if index != settings.selected_sentence_index {
            tracing::debug!(
                requested = settings.selected_sentence_index,
                clamped = index,
                "clamped sentence index"
            );
            settings.selected_sentence_index = index;
        }
        settings
    }
}

fn clamp_to(value: f32, range: RangeInclusive<f32>, previous: f32, field: &'static str) -> f32 {
    if value.is_nan() {
        tracing::warn!(field, "ignoring NaN setting");
        return previous.clamp(*range.start(), *range.end());
    }
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        tracing::warn!(field, value, clamped, "setting out of range");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        let catalog = Arc::new(SceneCatalog::builtin().unwrap());
        SettingsStore::new(Settings::default(), catalog)
    }

    #[test]
    fn merges_only_present_fields() {
        let mut store = store();
        let updated = store.update(SettingsPatch::new().pitch(1.5).language("ja-JP"));

        assert_eq!(updated.pitch, 1.5);
        assert_eq!(updated.language, "ja-JP");
        assert_eq!(updated.rate, 1.0);
        assert_eq!(updated.selected_scene.as_deref(), Some("default"));
        assert_eq!(store.get(), &updated);
    }

    #[test]
    fn clamps_sentence_index_to_scene() {
        let mut store = store();
        let updated = store.update(SettingsPatch::new().sentence_index(10));
        assert_eq!(updated.selected_sentence_index, 2);

        let updated = store.update(SettingsPatch::new().scene(None));
        assert_eq!(updated.selected_sentence_index, 0);
        assert_eq!(store.sentence_count(), 0);
    }

    #[test]
    fn clamps_pitch_and_rate() {
        let mut store = store();
        let updated = store.update(SettingsPatch::new().pitch(9.0).rate(0.0));
        assert_eq!(updated.pitch, 2.0);
        assert_eq!(updated.rate, 0.1);

        let updated = store.update(SettingsPatch::new().pitch(f32::NAN));
        assert_eq!(updated.pitch, 2.0);
    }

    #[test]
    fn voice_can_be_cleared() {
        let mut store = store();
        store.update(SettingsPatch::new().voice(Some("v1".to_string())));
        let updated = store.update(SettingsPatch::new().voice(None));
        assert_eq!(updated.voice, None);
    }

    #[test]
    fn detects_real_changes_only() {
        let settings = Settings::default();
        assert!(!SettingsPatch::new().language("en-US").changes_language(&settings));
        assert!(SettingsPatch::new().language("ja-JP").changes_language(&settings));
        assert!(SettingsPatch::new().is_empty());
    }
}
