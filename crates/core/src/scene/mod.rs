use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{Result, SceneSpeakerError};

const BUILTIN_SCENES: &str = include_str!("../../assets/scenes.json");

/// A named bundle of parallel sentences across languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Ordered sentences keyed by language code (e.g. `en-US`).
    pub sentences: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Scene {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn language_codes(&self) -> impl Iterator<Item = &str> {
        self.sentences.keys().map(String::as_str)
    }
}

/// Display metadata for a language offered by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub flag: String,
}

impl LanguageInfo {
    pub fn from_code(code: &str) -> Self {
        let (name, flag) = match code {
            "en-US" => ("English (US)", "🇺🇸"),
            "zh-CN" => ("Chinese (Simplified)", "🇨🇳"),
            "zh-TW" => ("Chinese (Traditional)", "🇹🇼"),
            "ja-JP" => ("Japanese", "🇯🇵"),
            other => (other, "🌐"),
        };
        Self {
            code: code.to_string(),
            name: name.to_string(),
            flag: flag.to_string(),
        }
    }
}

/// Read-only, ordered collection of scenes loaded once at startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneCatalog {
    scenes: Vec<Scene>,
}

impl SceneCatalog {
    /// Builds a catalog, rejecting duplicate scene ids.
    pub fn new(scenes: Vec<Scene>) -> Result<Self> {
        let mut seen = HashSet::new();
        for scene in &scenes {
            if !seen.insert(scene.id.as_str()) {
                return Err(SceneSpeakerError::DuplicateScene(scene.id.clone()));
            }
        }
        Ok(Self { scenes })
    }

    /// The catalog shipped with the application.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_SCENES)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let scenes: Vec<Scene> = serde_json::from_str(raw)?;
        Self::new(scenes)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), scenes = catalog.len(), "loaded scene catalog");
        Ok(catalog)
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.id == id)
    }

    /// Every tag used by at least one scene, sorted.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.scenes
            .iter()
            .flat_map(|scene| scene.tags.iter().map(String::as_str))
            .collect()
    }

    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Scene> + 'a {
        self.scenes.iter().filter(move |scene| scene.has_tag(tag))
    }

    /// Distinct language codes, walking scenes in catalog order. Within one
    /// scene the codes come out sorted.
    pub fn language_codes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.scenes
            .iter()
            .flat_map(Scene::language_codes)
            .filter(|code| seen.insert(*code))
            .collect()
    }

    pub fn languages(&self) -> Vec<LanguageInfo> {
        self.language_codes()
            .into_iter()
            .map(LanguageInfo::from_code)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = SceneCatalog::builtin().unwrap();
        let default = catalog.get("default").expect("default scene");
        assert_eq!(default.sentences["en-US"].len(), 3);
        assert_eq!(catalog.language_codes(), vec!["en-US", "ja-JP", "zh-CN"]);
        assert!(catalog.tags().contains("multilingual"));
    }

    #[test]
    fn filters_by_tag() {
        let catalog = SceneCatalog::builtin().unwrap();
        let ids: Vec<_> = catalog.with_tag("advanced").map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["long_sentences"]);
        assert_eq!(catalog.with_tag("nope").count(), 0);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let raw = r#"[
            { "id": "a", "title": "A", "sentences": {} },
            { "id": "a", "title": "A again", "sentences": {} }
        ]"#;
        let err = SceneCatalog::from_json(raw).unwrap_err();
        assert!(matches!(err, SceneSpeakerError::DuplicateScene(ref id) if id == "a"));
    }

    #[test]
    fn loads_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{ "id": "fr", "title": "French", "sentences": {{ "fr-FR": ["Bonjour"] }}, "tags": ["x"] }}]"#
        )
        .unwrap();

        let catalog = SceneCatalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        let languages = catalog.languages();
        assert_eq!(languages[0].name, "fr-FR");
        assert_eq!(languages[0].flag, "🌐");
    }

    #[test]
    fn language_codes_follow_scene_order() {
        let raw = r#"[
            { "id": "a", "title": "A", "sentences": { "zh-CN": ["你好"] } },
            { "id": "b", "title": "B", "sentences": { "zh-CN": ["再见"], "en-US": ["Bye"] } }
        ]"#;
        let catalog = SceneCatalog::from_json(raw).unwrap();
        assert_eq!(catalog.language_codes(), vec!["zh-CN", "en-US"]);
    }

    #[test]
    fn known_languages_have_display_names() {
        let info = LanguageInfo::from_code("ja-JP");
        assert_eq!(info.name, "Japanese");
    }
}
