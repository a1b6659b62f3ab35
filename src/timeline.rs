//! Timeline switching with per-branch index caching.
//!
//! A timeline is a git branch over the repository containing the document
//! store. Switching checks out the branch, then either restores a cached
//! index snapshot (when its recorded fingerprint matches the checked-out
//! store) or rebuilds and refreshes the cache slot. After a successful
//! switch the live version marker always equals the fingerprint of the
//! checked-out store; the cache is an optimization, never a correctness
//! relaxation.

use crate::{
    config::ProjectLayout,
    error::FabulaError,
    hash::fingerprint,
    index::{read_version_marker, rebuild_locked, write_version_marker},
    lock::ProjectLock,
    store::{DecisionDoc, TimelineDoc},
};
use std::{fs, path::Path, time::Duration};
use tokio::process::Command;

/// Bound on every git subprocess call. Exceeding it fails the operation;
/// the working tree stays checked out but the cache and live index may be
/// stale, so the caller must retry.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a `switch_timeline` call satisfied the index invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The cached snapshot matched the checked-out store and was copied in.
    CacheHit,
    /// The index was rebuilt and the cache slot refreshed.
    Rebuilt,
}

async fn run_git(root: &Path, args: &[&str]) -> Result<String, FabulaError> {
    run_git_bounded(root, args, GIT_TIMEOUT).await
}

async fn run_git_bounded(
    root: &Path,
    args: &[&str],
    limit: Duration,
) -> Result<String, FabulaError> {
    let rendered = format!("git {}", args.join(" "));
    // kill_on_drop: a timed-out subprocess must not keep mutating the
    // working tree while the caller retries.
    let output = tokio::time::timeout(
        limit,
        Command::new("git")
            .args(args)
            .current_dir(root)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| FabulaError::Git(format!("{rendered} timed out after {limit:?}")))?
    .map_err(|e| FabulaError::Git(format!("failed to run {rendered}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FabulaError::Git(format!(
            "{rendered} failed: {}",
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// The currently checked-out branch name, or `None` when detached.
pub async fn current_branch(layout: &ProjectLayout) -> Result<Option<String>, FabulaError> {
    let stdout = run_git(&layout.root, &["branch", "--show-current"]).await?;
    let branch = stdout.trim();
    Ok(if branch.is_empty() {
        None
    } else {
        Some(branch.to_string())
    })
}

/// Check out `name` and make the live index current for it, preferring the
/// per-branch cache over a rebuild.
///
/// Checkout failures (unknown branch, dirty-tree conflict) propagate with
/// git's message verbatim and are not retried.
pub async fn switch_timeline(
    layout: &ProjectLayout,
    name: &str,
) -> Result<SwitchOutcome, FabulaError> {
    let _guard = ProjectLock::acquire(layout)?;
    run_git(&layout.root, &["checkout", name]).await?;

    let store_root = layout.project_dir();
    fs::create_dir_all(&store_root)?;
    let current = fingerprint(&store_root)?;

    let cache_db = layout.cache_index_path(name);
    let cache_version = layout.cache_version_path(name);
    if cache_db.exists()
        && read_version_marker(&cache_version).as_deref() == Some(current.as_str())
    {
        let live = layout.index_path();
        if live.exists() {
            fs::remove_file(&live)?;
        }
        fs::copy(&cache_db, &live)?;
        write_version_marker(&layout.version_path(), &current)?;
        tracing::info!("Timeline '{name}': restored index from cache");
        return Ok(SwitchOutcome::CacheHit);
    }

    let digest = rebuild_locked(layout, &layout.index_path()).await?;
    write_version_marker(&layout.version_path(), &digest)?;
    fs::create_dir_all(layout.cache_dir())?;
    fs::copy(layout.index_path(), &cache_db)?;
    write_version_marker(&cache_version, &digest)?;
    tracing::info!("Timeline '{name}': index rebuilt and cached");
    Ok(SwitchOutcome::Rebuilt)
}

/// Derived index state must never be tracked alongside the store: a rebuild
/// would dirty tracked files and every later checkout would refuse to run.
const IGNORE_RULES: [&str; 4] = [
    ".studio/projects/*/index.db",
    ".studio/projects/*/index_version",
    ".studio/projects/*/cache/",
    ".studio/projects/*/.lock",
];

/// Merge the derived-state patterns into `<root>/.gitignore`, preserving any
/// existing rules. Idempotent.
fn ensure_ignore_rules(root: &Path) -> Result<(), FabulaError> {
    let path = root.join(".gitignore");
    let mut contents = fs::read_to_string(&path).unwrap_or_default();
    let missing: Vec<&str> = IGNORE_RULES
        .iter()
        .copied()
        .filter(|rule| !contents.lines().any(|line| line.trim() == *rule))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    for rule in missing {
        contents.push_str(rule);
        contents.push('\n');
    }
    fs::write(&path, contents)?;
    Ok(())
}

/// Seed the base decision and canonical timeline, then commit and tag the
/// store as `v0-ingested`. Git steps that decline (for example nothing to
/// commit) are logged and skipped rather than fatal.
///
/// Ignore rules for the derived index state are written before anything is
/// staged, so `git add` can never track `index.db`, the version markers, the
/// cache directory, or the lock file.
pub async fn commit_baseline(layout: &ProjectLayout) -> Result<(), FabulaError> {
    let decisions_dir = layout.decisions_dir();
    let timelines_dir = layout.timelines_dir();
    fs::create_dir_all(&decisions_dir)?;
    fs::create_dir_all(&timelines_dir)?;

    let base_decision = DecisionDoc {
        id: "decision_000".to_string(),
        label: "script as written".to_string(),
        parent_id: None,
        decision_type: "base".to_string(),
        notes: "Initial ingestion from screenplay".to_string(),
    };
    fs::write(
        decisions_dir.join("decision_000.yaml"),
        serde_yaml::to_string(&base_decision)?,
    )?;

    let main_timeline = TimelineDoc {
        id: "main".to_string(),
        name: "Main".to_string(),
        is_canonical: true,
        decisions: vec!["decision_000".to_string()],
    };
    fs::write(
        timelines_dir.join("main.yaml"),
        serde_yaml::to_string(&main_timeline)?,
    )?;

    ensure_ignore_rules(&layout.root)?;

    for args in [
        &["add", ".studio/", "project.yaml", ".gitignore"][..],
        &["commit", "-m", "v0-ingested: initial screenplay ingestion"][..],
        &["tag", "v0-ingested"][..],
    ] {
        if let Err(e) = run_git(&layout.root, args).await {
            tracing::warn!("Baseline commit step skipped: {e}");
        }
    }
    Ok(())
}

fn count_dirs(dir: &Path) -> usize {
    match dir.read_dir() {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .count(),
        Err(_) => 0,
    }
}

fn count_yaml(dir: &Path) -> usize {
    match dir.read_dir() {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                matches!(
                    e.path().extension().and_then(|x| x.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .count(),
        Err(_) => 0,
    }
}

/// Human-readable summary of what ingestion produced, for review before the
/// baseline commit.
pub fn review_summary(layout: &ProjectLayout) -> String {
    let mut lines = vec!["=== Ingestion Summary ===".to_string(), String::new()];

    let parsed_path = layout.script_dir().join("parsed.json");
    match fs::read_to_string(&parsed_path)
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
    {
        Some(parsed) => {
            let scenes = parsed["scenes"].as_array().map(|a| a.len()).unwrap_or(0);
            let chars = parsed["characters"]
                .as_array()
                .map(|a| a.len())
                .unwrap_or(0);
            lines.push(format!("Parsed: {scenes} scenes, {chars} characters"));
            if let Some(title) = parsed["title_page"]["title"].as_str() {
                lines.push(format!("Title: {title}"));
            }
        }
        None => lines.push("Parsed: (not run)".to_string()),
    }

    lines.push(format!(
        "Characters: {}",
        count_dirs(&layout.characters_dir())
    ));

    let mut scene_count = 0;
    if let Ok(acts) = layout.scenes_dir().read_dir() {
        for act in acts.filter_map(|e| e.ok()) {
            if act.path().is_dir() {
                scene_count += count_dirs(&act.path());
            }
        }
    }
    lines.push(format!("Scenes: {scene_count}"));
    lines.push(format!(
        "Events: {}",
        count_yaml(&layout.storyline_dir().join("events"))
    ));
    lines.push(format!(
        "Decisions: {}",
        count_yaml(&layout.decisions_dir())
    ));
    lines.push(format!(
        "Timelines: {}",
        count_yaml(&layout.timelines_dir())
    ));

    lines.push(String::new());
    lines.push("Review the generated YAML files. Edit as needed, then run:".to_string());
    lines.push("  fabula commit".to_string());
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn ignore_rules_merge_without_clobbering() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gitignore");
        std::fs::write(&path, "*.log\n.studio/projects/*/index.db\n").unwrap();

        ensure_ignore_rules(temp.path()).unwrap();
        ensure_ignore_rules(temp.path()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        // Pre-existing rules survive, each derived-state rule appears once.
        assert!(contents.starts_with("*.log\n"));
        for rule in IGNORE_RULES {
            assert_eq!(contents.matches(rule).count(), 1, "rule: {rule}");
        }
    }

    #[test]
    fn ignore_rules_create_missing_gitignore() {
        let temp = TempDir::new().unwrap();
        ensure_ignore_rules(temp.path()).unwrap();
        let contents = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
        assert!(contents.contains(".studio/projects/*/cache/"));
        assert!(contents.contains(".studio/projects/*/.lock"));
    }

    #[tokio::test(start_paused = true)]
    async fn git_calls_fail_at_the_timeout_bound() {
        let temp = TempDir::new().unwrap();
        let err = run_git_bounded(temp.path(), &["status"], Duration::ZERO)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FabulaError::Git(ref msg) if msg.contains("timed out")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn review_summary_counts_categories() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::with_name(PathBuf::from(temp.path()), "test");
        let events = layout.storyline_dir().join("events");
        std::fs::create_dir_all(&events).unwrap();
        std::fs::write(events.join("event_001.yaml"), "id: event_001\n").unwrap();
        std::fs::create_dir_all(layout.characters_dir().join("alice")).unwrap();
        std::fs::create_dir_all(layout.scenes_dir().join("act_1").join("scene_001")).unwrap();

        let summary = review_summary(&layout);
        assert!(summary.contains("Characters: 1"));
        assert!(summary.contains("Scenes: 1"));
        assert!(summary.contains("Events: 1"));
        assert!(summary.contains("Parsed: (not run)"));
    }
}
