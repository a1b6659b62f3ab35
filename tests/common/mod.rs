//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use fabula::config::ProjectLayout;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times — subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Project layout rooted at a temp dir, project name "test".
#[allow(dead_code)]
pub fn test_layout(temp: &TempDir) -> ProjectLayout {
    ProjectLayout::with_name(temp.path().to_path_buf(), "test")
}

/// Write a document at `rel` below the project directory, creating parents.
#[allow(dead_code)]
pub fn write_doc(layout: &ProjectLayout, rel: &str, content: &str) {
    let path = layout.project_dir().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Seed a small but representative document store: two scenes, two events
/// with awareness and world-state payloads, one character with knowledge,
/// one prop, a two-node decision tree, and the canonical timeline.
#[allow(dead_code)]
pub fn seed_store(layout: &ProjectLayout) {
    write_doc(
        layout,
        "storyline/events/event_001.yaml",
        r#"id: event_001
label: the heist begins
scene: scene_001
story_order: 1
type: action
characters_aware_after:
  - alice
  - bob
characters_unaware:
  - carol
world_state_changes:
  - key: vault_door
    value: open
"#,
    );
    write_doc(
        layout,
        "storyline/events/event_002.yaml",
        r#"id: event_002
label: the double-cross
scene_id: scene_002
story_order: 2
type: turn
characters_aware_after:
  - alice
world_state_changes:
  - key: vault_door
    value: sealed
  - key: alarm
    value: ringing
emotional_shifts:
  bob:
    after:
      mood: betrayed
      tension: high
"#,
    );
    write_doc(
        layout,
        "scenes/act_1/scene_001/scene.yaml",
        r#"id: scene_001
act: act_1
scene_order: 1
location_id: loc_vault
character_ids:
  - alice
  - bob
"#,
    );
    write_doc(
        layout,
        "scenes/act_1/scene_002/scene.yaml",
        r#"id: scene_002
act: act_1
scene_order: 2
location_id: loc_rooftop
character_ids:
  - alice
  - bob
  - carol
"#,
    );
    write_doc(
        layout,
        "storyline/pacing.yaml",
        r#"scenes:
  scene_001:
    pace: slow
    rhythm: build
    duration_target: 3m
"#,
    );
    write_doc(
        layout,
        "characters/alice/knowledge.yaml",
        r#"knows:
  - fact: vault_combination
    learned_at: event_001
    source: observation
    confidence: certain
beliefs:
  - belief: bob is loyal
    ground_truth: "false"
    held_from: event_001
"#,
    );
    write_doc(
        layout,
        "world/props/revolver.yaml",
        r#"id: revolver
lifecycle:
  - event: event_001
    action: introduced
    location: loc_vault
    character: bob
"#,
    );
    write_doc(
        layout,
        "decisions/decision_000.yaml",
        r#"id: decision_000
label: script as written
parent_id: null
type: base
"#,
    );
    write_doc(
        layout,
        "decisions/decision_001.yaml",
        r#"id: decision_001
label: bob stays loyal
parent_id: decision_000
type: whatif
"#,
    );
    write_doc(
        layout,
        "timelines/main.yaml",
        r#"id: main
name: Main
is_canonical: true
decisions:
  - decision_000
"#,
    );
}

#[allow(dead_code)]
pub fn git(root: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Turn the temp root into a git repo with the current store committed on
/// branch `main`.
#[allow(dead_code)]
pub fn git_init_main(root: &Path) {
    std::fs::write(root.join("project.yaml"), "name: test\n").unwrap();
    // Derived index state must never be committed alongside the store.
    std::fs::write(
        root.join(".gitignore"),
        ".studio/projects/*/index.db\n\
         .studio/projects/*/index_version\n\
         .studio/projects/*/cache/\n\
         .studio/projects/*/.lock\n",
    )
    .unwrap();
    git(root, &["init", "-q"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "user.name", "Test"]);
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "initial store"]);
    git(root, &["branch", "-M", "main"]);
}
