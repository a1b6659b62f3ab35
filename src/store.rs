//! Document store reader.
//!
//! The store is a tree of YAML documents owned by the upstream ingestion
//! pipeline; this module only reads it. Loading is two-phase: each file is
//! parsed into a generic `serde_yaml::Value` first, then projected into a
//! typed record with tolerant (`serde(default)`) fields. A document that fails
//! either phase, or whose `id` is missing or empty, is skipped with a warning
//! rather than failing the whole load.

use crate::{config::ProjectLayout, error::FabulaError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

/// Top-level entity categories of the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Characters,
    Scenes,
    World,
    Storyline,
    Decisions,
    Timelines,
}

impl Category {
    pub fn dir(&self, layout: &ProjectLayout) -> PathBuf {
        match self {
            Category::Characters => layout.characters_dir(),
            Category::Scenes => layout.scenes_dir(),
            Category::World => layout.world_dir(),
            Category::Storyline => layout.storyline_dir(),
            Category::Decisions => layout.decisions_dir(),
            Category::Timelines => layout.timelines_dir(),
        }
    }
}

/// One world-state mutation attached to an event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorldStateChange {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: serde_yaml::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoodState {
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub tension: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmotionalShift {
    #[serde(default)]
    pub after: MoodState,
}

/// An `id` must be present and non-empty. Failing deserialization here makes
/// an empty id behave exactly like a missing one: the document is skipped
/// with a warning.
fn require_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let id = String::deserialize(deserializer)?;
    if id.is_empty() {
        Err(serde::de::Error::custom("document id is empty"))
    } else {
        Ok(id)
    }
}

/// A storyline event document (`storyline/events/*.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct EventDoc {
    #[serde(deserialize_with = "require_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, alias = "scene_id")]
    pub scene: String,
    #[serde(default)]
    pub story_order: i64,
    #[serde(default)]
    pub beat: String,
    #[serde(default, rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub timestamp_story: String,
    #[serde(default)]
    pub characters_aware_after: Vec<String>,
    #[serde(default)]
    pub characters_unaware: Vec<String>,
    #[serde(default)]
    pub world_state_changes: Vec<WorldStateChange>,
    #[serde(default)]
    pub emotional_shifts: BTreeMap<String, EmotionalShift>,
}

/// A scene descriptor (`scenes/<act>/<scene>/scene.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct SceneDoc {
    #[serde(deserialize_with = "require_id")]
    pub id: String,
    #[serde(default)]
    pub act: String,
    #[serde(default)]
    pub scene_order: i64,
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub character_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenePacing {
    #[serde(default)]
    pub pace: String,
    #[serde(default)]
    pub rhythm: String,
    #[serde(default)]
    pub duration_target: String,
}

/// Storyline-wide pacing metadata (`storyline/pacing.yaml`), keyed by scene id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacingDoc {
    #[serde(default)]
    pub scenes: BTreeMap<String, ScenePacing>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnownFact {
    #[serde(default)]
    pub fact: String,
    #[serde(default)]
    pub learned_at: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeldBelief {
    #[serde(default)]
    pub belief: String,
    #[serde(default)]
    pub ground_truth: String,
    #[serde(default)]
    pub held_from: String,
    #[serde(default)]
    pub held_until: Option<String>,
}

/// Per-character epistemic state (`characters/<id>/knowledge.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeDoc {
    #[serde(default)]
    pub knows: Vec<KnownFact>,
    #[serde(default)]
    pub beliefs: Vec<HeldBelief>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropLifecycle {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub character: String,
}

/// A prop document (`world/props/*.yaml`). The id falls back to the file stem.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropDoc {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub lifecycle: Vec<PropLifecycle>,
}

/// A narrative fork point (`decisions/*.yaml`). Decisions form a
/// parent-pointer tree; the root has no parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionDoc {
    #[serde(deserialize_with = "require_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default, rename = "type")]
    pub decision_type: String,
    #[serde(default)]
    pub notes: String,
}

/// A named timeline (`timelines/*.yaml`) referencing an ordered decision list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineDoc {
    #[serde(deserialize_with = "require_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_canonical: bool,
    #[serde(default)]
    pub decisions: Vec<String>,
}

/// Render a YAML scalar the way it lands in the projection: scalars as plain
/// text, structured values as their YAML rendering.
pub fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Two-phase load of one document: generic YAML value, then typed projection.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, FabulaError> {
    let text = read_to_string(path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)?;
    Ok(serde_yaml::from_value(value)?)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// YAML files directly under `dir`, sorted by name. A missing directory is an
/// empty category, not an error.
fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, FabulaError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        if path.is_file() && is_yaml(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, FabulaError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Load every parseable document under `dir`, skipping malformed files with a
/// warning. I/O failures on the directory itself still propagate.
pub fn read_documents<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>, FabulaError> {
    let mut docs = Vec::new();
    for path in yaml_files(dir)? {
        match load_document::<T>(&path) {
            Ok(doc) => docs.push((path, doc)),
            Err(e) => {
                tracing::warn!("Skipping malformed document {:?}: {e}", path);
            }
        }
    }
    Ok(docs)
}

/// Storyline events: `storyline/events/*.yaml`.
pub fn read_events(layout: &ProjectLayout) -> Result<Vec<(PathBuf, EventDoc)>, FabulaError> {
    read_documents(&layout.storyline_dir().join("events"))
}

/// Scene descriptors: `scenes/<act>/<scene>/scene.yaml`.
pub fn read_scenes(layout: &ProjectLayout) -> Result<Vec<(PathBuf, SceneDoc)>, FabulaError> {
    let mut scenes = Vec::new();
    for act_dir in subdirs(&layout.scenes_dir())? {
        for scene_dir in subdirs(&act_dir)? {
            let path = scene_dir.join("scene.yaml");
            if !path.is_file() {
                continue;
            }
            match load_document::<SceneDoc>(&path) {
                Ok(doc) => scenes.push((path, doc)),
                Err(e) => {
                    tracing::warn!("Skipping malformed scene {:?}: {e}", path);
                }
            }
        }
    }
    Ok(scenes)
}

/// Storyline pacing metadata, or an empty document when absent or malformed.
pub fn read_pacing(layout: &ProjectLayout) -> PacingDoc {
    let path = layout.storyline_dir().join("pacing.yaml");
    if !path.is_file() {
        return PacingDoc::default();
    }
    match load_document::<PacingDoc>(&path) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("Skipping malformed pacing file {:?}: {e}", path);
            PacingDoc::default()
        }
    }
}

/// Per-character knowledge documents. The character id is the directory name;
/// characters without a knowledge.yaml are skipped silently.
pub fn read_character_knowledge(
    layout: &ProjectLayout,
) -> Result<Vec<(String, KnowledgeDoc)>, FabulaError> {
    let mut results = Vec::new();
    for char_dir in subdirs(&layout.characters_dir())? {
        let Some(character_id) = char_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let path = char_dir.join("knowledge.yaml");
        if !path.is_file() {
            continue;
        }
        match load_document::<KnowledgeDoc>(&path) {
            Ok(doc) => results.push((character_id.to_string(), doc)),
            Err(e) => {
                tracing::warn!("Skipping malformed knowledge file {:?}: {e}", path);
            }
        }
    }
    Ok(results)
}

/// Prop documents: `world/props/*.yaml`. Missing ids fall back to file stems.
pub fn read_props(layout: &ProjectLayout) -> Result<Vec<(PathBuf, PropDoc)>, FabulaError> {
    let mut props = read_documents::<PropDoc>(&layout.world_dir().join("props"))?;
    for (path, prop) in props.iter_mut() {
        if prop.id.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prop.id = stem.to_string();
            }
        }
    }
    Ok(props)
}

pub fn read_decisions(layout: &ProjectLayout) -> Result<Vec<(PathBuf, DecisionDoc)>, FabulaError> {
    read_documents(&layout.decisions_dir())
}

pub fn read_timelines(layout: &ProjectLayout) -> Result<Vec<(PathBuf, TimelineDoc)>, FabulaError> {
    read_documents(&layout.timelines_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(temp: &TempDir) -> ProjectLayout {
        ProjectLayout::with_name(temp.path().to_path_buf(), "test")
    }

    #[test]
    fn event_doc_tolerates_missing_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("event_001.yaml");
        std::fs::write(&path, "id: event_001\nscene_id: scene_001\n").unwrap();
        let doc: EventDoc = load_document(&path).unwrap();
        assert_eq!(doc.id, "event_001");
        // `scene_id` is accepted as an alias for `scene`.
        assert_eq!(doc.scene, "scene_001");
        assert_eq!(doc.story_order, 0);
        assert!(doc.characters_aware_after.is_empty());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("decision.yaml");
        std::fs::write(
            &path,
            "id: decision_001\nlabel: betrayal\nparent_id: decision_000\nunknown_field: 42\n",
        )
        .unwrap();
        let doc: DecisionDoc = load_document(&path).unwrap();
        assert_eq!(doc.parent_id.as_deref(), Some("decision_000"));
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let temp = TempDir::new().unwrap();
        let lay = layout(&temp);
        let events = lay.storyline_dir().join("events");
        std::fs::create_dir_all(&events).unwrap();
        std::fs::write(events.join("good.yaml"), "id: event_001\n").unwrap();
        std::fs::write(events.join("bad.yaml"), "{{ not yaml").unwrap();
        // Parses, but has no id field so the typed projection fails.
        std::fs::write(events.join("no_id.yaml"), "label: orphaned\n").unwrap();

        let docs = read_events(&lay).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].1.id, "event_001");
    }

    #[test]
    fn empty_id_documents_are_skipped() {
        let temp = TempDir::new().unwrap();
        let lay = layout(&temp);
        let events = lay.storyline_dir().join("events");
        std::fs::create_dir_all(&events).unwrap();
        std::fs::write(events.join("blank.yaml"), "id: \"\"\nlabel: unnamed\n").unwrap();
        std::fs::write(events.join("good.yaml"), "id: event_001\n").unwrap();
        assert_eq!(read_events(&lay).unwrap().len(), 1);

        std::fs::create_dir_all(lay.decisions_dir()).unwrap();
        std::fs::write(
            lay.decisions_dir().join("blank.yaml"),
            "id: \"\"\nlabel: ghost fork\n",
        )
        .unwrap();
        assert!(read_decisions(&lay).unwrap().is_empty());
    }

    #[test]
    fn missing_category_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(read_decisions(&layout(&temp)).unwrap().is_empty());
    }

    #[test]
    fn prop_id_falls_back_to_file_stem() {
        let temp = TempDir::new().unwrap();
        let lay = layout(&temp);
        let props = lay.world_dir().join("props");
        std::fs::create_dir_all(&props).unwrap();
        std::fs::write(
            props.join("revolver.yaml"),
            "lifecycle:\n  - event: event_001\n    action: introduced\n",
        )
        .unwrap();
        let docs = read_props(&lay).unwrap();
        assert_eq!(docs[0].1.id, "revolver");
    }

    #[test]
    fn scalar_rendering_matches_projection_text() {
        assert_eq!(scalar_to_string(&serde_yaml::Value::Null), "");
        assert_eq!(
            scalar_to_string(&serde_yaml::Value::Bool(true)),
            "true"
        );
        assert_eq!(
            scalar_to_string(&serde_yaml::Value::String("vault open".into())),
            "vault open"
        );
    }
}
