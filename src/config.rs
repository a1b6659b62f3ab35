//! Project layout discovery.
//!
//! All derived state (the live index, its version marker, and the per-timeline
//! cache) lives inside the project directory, `<root>/.studio/projects/<name>/`,
//! alongside the YAML document store it is derived from.

use crate::error::FabulaError;
use serde::Deserialize;
use std::{
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
};

pub const INDEX_DB_NAME: &str = "index.db";
pub const INDEX_VERSION_NAME: &str = "index_version";
pub const LOCK_FILE_NAME: &str = ".lock";

/// The subset of `project.yaml` we care about.
#[derive(Debug, Deserialize)]
struct ProjectManifest {
    name: Option<String>,
}

/// Resolved paths for one story project.
///
/// The layout is a plain value passed explicitly to every operation rather
/// than read from ambient globals; it carries no open handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub name: String,
}

impl ProjectLayout {
    /// Resolve the workspace root and project name.
    ///
    /// Root: explicit override, else `FABULA_PROJECT_ROOT`, else the current
    /// directory. Name: `FABULA_PROJECT`, else the `name` field of
    /// `<root>/project.yaml`, else `"default"`.
    pub fn discover(root: Option<PathBuf>) -> Result<Self, FabulaError> {
        let root = match root {
            Some(p) => p,
            None => match env::var("FABULA_PROJECT_ROOT") {
                Ok(p) => PathBuf::from(p),
                Err(_) => env::current_dir()?,
            },
        };
        let name = match env::var("FABULA_PROJECT") {
            Ok(name) if !name.is_empty() => name,
            _ => read_project_name(&root),
        };
        Ok(ProjectLayout { root, name })
    }

    pub fn with_name(root: PathBuf, name: impl Into<String>) -> Self {
        ProjectLayout {
            root,
            name: name.into(),
        }
    }

    /// `<root>/.studio/projects/<name>/` — the document store root and home of
    /// all derived state.
    pub fn project_dir(&self) -> PathBuf {
        self.root.join(".studio").join("projects").join(&self.name)
    }

    pub fn script_dir(&self) -> PathBuf {
        self.project_dir().join("script")
    }

    pub fn characters_dir(&self) -> PathBuf {
        self.project_dir().join("characters")
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.project_dir().join("scenes")
    }

    pub fn world_dir(&self) -> PathBuf {
        self.project_dir().join("world")
    }

    pub fn storyline_dir(&self) -> PathBuf {
        self.project_dir().join("storyline")
    }

    pub fn decisions_dir(&self) -> PathBuf {
        self.project_dir().join("decisions")
    }

    pub fn timelines_dir(&self) -> PathBuf {
        self.project_dir().join("timelines")
    }

    /// The live relational projection.
    pub fn index_path(&self) -> PathBuf {
        self.project_dir().join(INDEX_DB_NAME)
    }

    /// Plain-text fingerprint marker for the live index: one hex digest line.
    pub fn version_path(&self) -> PathBuf {
        self.project_dir().join(INDEX_VERSION_NAME)
    }

    /// Per-timeline snapshot directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.project_dir().join("cache")
    }

    /// Cached snapshot slot for a timeline: `cache/<name>.index.db`.
    pub fn cache_index_path(&self, timeline: &str) -> PathBuf {
        self.cache_dir().join(format!("{timeline}.{INDEX_DB_NAME}"))
    }

    /// Fingerprint marker paired with a cached snapshot.
    pub fn cache_version_path(&self, timeline: &str) -> PathBuf {
        self.cache_dir().join(format!("{timeline}.version"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.project_dir().join(LOCK_FILE_NAME)
    }
}

fn read_project_name(root: &Path) -> String {
    let manifest = root.join("project.yaml");
    if !manifest.exists() {
        return "default".to_string();
    }
    match read_to_string(&manifest)
        .map_err(FabulaError::from)
        .and_then(|text| serde_yaml::from_str::<ProjectManifest>(&text).map_err(FabulaError::from))
    {
        Ok(ProjectManifest { name: Some(name) }) if !name.is_empty() => name,
        Ok(_) => "default".to_string(),
        Err(e) => {
            tracing::warn!("Unreadable project.yaml at {:?}: {e}", manifest);
            "default".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_paths_nest_under_project_dir() {
        let layout = ProjectLayout::with_name(PathBuf::from("/work"), "noir");
        let base = PathBuf::from("/work/.studio/projects/noir");
        assert_eq!(layout.project_dir(), base);
        assert_eq!(layout.index_path(), base.join("index.db"));
        assert_eq!(layout.version_path(), base.join("index_version"));
        assert_eq!(
            layout.cache_index_path("feature"),
            base.join("cache/feature.index.db")
        );
        assert_eq!(
            layout.cache_version_path("feature"),
            base.join("cache/feature.version")
        );
    }

    #[test]
    fn project_name_read_from_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("project.yaml"), "name: heist\n").unwrap();
        assert_eq!(read_project_name(temp.path()), "heist");
    }

    #[test]
    fn missing_manifest_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(read_project_name(temp.path()), "default");
    }

    #[test]
    fn malformed_manifest_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("project.yaml"), ": not yaml ::\n").unwrap();
        assert_eq!(read_project_name(temp.path()), "default");
    }
}
