use crate::Scene;

/// Text used whenever a scene has no sentences for the requested language.
pub const FALLBACK_TEXT: &str = "Hello, welcome to the TTS test app.";

/// Maps a scene, language and sentence index to the text that should be
/// spoken, falling back to [`FALLBACK_TEXT`].
///
/// The index is clamped into the sentence list, so any index resolves to a
/// sentence that actually belongs to the scene.
pub fn resolve<'a>(scene: Option<&'a Scene>, language: &str, index: usize) -> &'a str {
    resolve_or(scene, language, index, FALLBACK_TEXT)
}

/// Same as [`resolve`] with a caller-supplied fallback.
pub fn resolve_or<'a>(
    scene: Option<&'a Scene>,
    language: &str,
    index: usize,
    fallback: &'a str,
) -> &'a str {
    match sentences_for(scene, language) {
        [] => fallback,
        sentences => sentences[clamp_index(index, sentences.len())].as_str(),
    }
}

/// Number of sentences available for `language` in `scene`.
pub fn sentence_count(scene: Option<&Scene>, language: &str) -> usize {
    sentences_for(scene, language).len()
}

/// Clamps an index into `[0, count - 1]`, or 0 for an empty list.
pub fn clamp_index(index: usize, count: usize) -> usize {
    index.min(count.saturating_sub(1))
}

fn sentences_for<'a>(scene: Option<&'a Scene>, language: &str) -> &'a [String] {
    scene
        .and_then(|scene| scene.sentences.get(language))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    fn scene() -> Scene {
        let mut sentences = BTreeMap::new();
        sentences.insert(
            "en-US".to_string(),
            vec!["one".to_string(), "two".to_string(), "three".to_string()],
        );
        sentences.insert("ja-JP".to_string(), Vec::new());
        Scene {
            id: "numbers".to_string(),
            title: "Numbers".to_string(),
            description: String::new(),
            sentences,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn any_index_resolves_to_a_member_sentence() {
        let scene = scene();
        let sentences = &scene.sentences["en-US"];
        for index in [0, 1, 2, 3, 17, usize::MAX] {
            let text = resolve(Some(&scene), "en-US", index);
            assert!(sentences.iter().any(|s| s == text), "index {index}");
        }
        assert_eq!(resolve(Some(&scene), "en-US", 99), "three");
    }

    #[test]
    fn missing_scene_language_or_sentences_fall_back() {
        let scene = scene();
        assert_eq!(resolve(None, "en-US", 0), FALLBACK_TEXT);
        assert_eq!(resolve(Some(&scene), "zh-CN", 0), FALLBACK_TEXT);
        assert_eq!(resolve(Some(&scene), "ja-JP", 2), FALLBACK_TEXT);
        assert!(!resolve(Some(&scene), "ja-JP", 0).is_empty());
    }

    #[test]
    fn custom_fallback_is_used() {
        assert_eq!(resolve_or(None, "en-US", 0, "nothing here"), "nothing here");
    }

    #[test]
    fn counts_and_clamps() {
        let scene = scene();
        assert_eq!(sentence_count(Some(&scene), "en-US"), 3);
        assert_eq!(sentence_count(Some(&scene), "ja-JP"), 0);
        assert_eq!(clamp_index(5, 3), 2);
        assert_eq!(clamp_index(5, 0), 0);
    }
}
