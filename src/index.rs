//! Index build: populate the SQLite projection from the document store, with
//! fingerprint-gated staleness detection.
//!
//! The projection is always rebuilt from scratch inside one transaction;
//! incremental diffing would require per-document dependency tracking the
//! store does not expose. Queries therefore never observe a half-populated
//! index: either the whole rebuild commits or the prior contents remain.

use crate::{
    config::ProjectLayout,
    db::{db_init, PROJECTION_TABLES},
    error::FabulaError,
    hash::fingerprint,
    lock::ProjectLock,
    store,
};
use sqlx::SqliteConnection;
use std::{fs, path::Path};

/// Read a stored fingerprint marker. Absent or unreadable markers are "no
/// prior version"; a forced rebuild is always safe.
pub fn read_version_marker(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let digest = text.trim();
            if digest.is_empty() {
                None
            } else {
                Some(digest.to_string())
            }
        }
        Err(_) => None,
    }
}

/// Write a fingerprint marker: one hex digest line.
pub fn write_version_marker(path: &Path, digest: &str) -> Result<(), FabulaError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, digest)?;
    Ok(())
}

/// Rebuild every projection table from the document store.
///
/// The caller owns the transaction: run this inside one and commit so the
/// swap is atomic. Tables are truncated first, then each category is walked
/// and inserted. Malformed documents are skipped with a warning; database
/// write failures abort the whole call.
///
/// Duplicate ids within a category resolve last-write-wins via
/// `INSERT OR REPLACE`; processing order is sorted directory traversal.
pub async fn populate(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    for table in PROJECTION_TABLES {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *conn)
            .await?;
    }

    populate_events(conn, layout).await?;
    populate_character_knowledge(conn, layout).await?;
    populate_scenes(conn, layout).await?;
    populate_props(conn, layout).await?;
    populate_decisions(conn, layout).await?;
    populate_timelines(conn, layout).await?;

    Ok(())
}

async fn populate_events(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    let events = store::read_events(layout)?;
    tracing::debug!("Indexing {} events", events.len());
    for (_path, event) in events {
        sqlx::query(
            "INSERT OR REPLACE INTO events \
             (id, label, scene_id, story_order, beat, type, timestamp_story) \
             VALUES (?,?,?,?,?,?,?)",
        )
        .bind(&event.id)
        .bind(&event.label)
        .bind(&event.scene)
        .bind(event.story_order)
        .bind(&event.beat)
        .bind(&event.event_type)
        .bind(&event.timestamp_story)
        .execute(&mut *conn)
        .await?;

        for character in &event.characters_aware_after {
            sqlx::query(
                "INSERT OR REPLACE INTO event_awareness \
                 (event_id, character_id, aware, source, confidence) \
                 VALUES (?,?,1,?,?)",
            )
            .bind(&event.id)
            .bind(character)
            .bind("direct_observation")
            .bind("certain")
            .execute(&mut *conn)
            .await?;
        }
        for character in &event.characters_unaware {
            sqlx::query(
                "INSERT OR REPLACE INTO event_awareness \
                 (event_id, character_id, aware, source, confidence) \
                 VALUES (?,?,0,?,?)",
            )
            .bind(&event.id)
            .bind(character)
            .bind("")
            .bind("")
            .execute(&mut *conn)
            .await?;
        }
        for change in &event.world_state_changes {
            sqlx::query(
                "INSERT INTO world_state_changes \
                 (event_id, key, value, event_story_order) VALUES (?,?,?,?)",
            )
            .bind(&event.id)
            .bind(&change.key)
            .bind(store::scalar_to_string(&change.value))
            .bind(event.story_order)
            .execute(&mut *conn)
            .await?;
        }
        for (character, shift) in &event.emotional_shifts {
            sqlx::query(
                "INSERT OR REPLACE INTO emotional_states \
                 (character_id, scene_id, mood, tension, confidence, openness) \
                 VALUES (?,?,?,?,?,?)",
            )
            .bind(character)
            .bind(&event.scene)
            .bind(&shift.after.mood)
            .bind(&shift.after.tension)
            .bind(0.5_f64)
            .bind(0.5_f64)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn populate_character_knowledge(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    for (character_id, knowledge) in store::read_character_knowledge(layout)? {
        for fact in &knowledge.knows {
            sqlx::query(
                "INSERT INTO knowledge \
                 (character_id, fact_key, learned_at_event, source, confidence) \
                 VALUES (?,?,?,?,?)",
            )
            .bind(&character_id)
            .bind(&fact.fact)
            .bind(&fact.learned_at)
            .bind(&fact.source)
            .bind(&fact.confidence)
            .execute(&mut *conn)
            .await?;
        }
        for belief in &knowledge.beliefs {
            sqlx::query(
                "INSERT INTO beliefs \
                 (character_id, belief, ground_truth, held_from_event, held_until_event) \
                 VALUES (?,?,?,?,?)",
            )
            .bind(&character_id)
            .bind(&belief.belief)
            .bind(&belief.ground_truth)
            .bind(&belief.held_from)
            .bind(&belief.held_until)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn populate_scenes(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    let pacing = store::read_pacing(layout);
    for (_path, scene) in store::read_scenes(layout)? {
        let pace = pacing.scenes.get(&scene.id).cloned().unwrap_or_default();
        sqlx::query(
            "INSERT OR REPLACE INTO scenes \
             (id, act, scene_order, location_id, time_of_day, interior_exterior, \
              pace, rhythm, beat, duration_target) \
             VALUES (?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&scene.id)
        .bind(&scene.act)
        .bind(scene.scene_order)
        .bind(&scene.location_id)
        .bind("")
        .bind("")
        .bind(&pace.pace)
        .bind(&pace.rhythm)
        .bind("")
        .bind(&pace.duration_target)
        .execute(&mut *conn)
        .await?;

        for character in &scene.character_ids {
            sqlx::query(
                "INSERT OR REPLACE INTO scene_characters (scene_id, character_id) VALUES (?,?)",
            )
            .bind(&scene.id)
            .bind(character)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn populate_props(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    for (_path, prop) in store::read_props(layout)? {
        for stage in &prop.lifecycle {
            sqlx::query(
                "INSERT INTO prop_events \
                 (prop_id, event_id, action, location, character_id) VALUES (?,?,?,?,?)",
            )
            .bind(&prop.id)
            .bind(&stage.event)
            .bind(&stage.action)
            .bind(&stage.location)
            .bind(&stage.character)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn populate_decisions(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    for (_path, decision) in store::read_decisions(layout)? {
        sqlx::query(
            "INSERT OR REPLACE INTO decisions (id, label, parent_id, type, notes) \
             VALUES (?,?,?,?,?)",
        )
        .bind(&decision.id)
        .bind(&decision.label)
        .bind(&decision.parent_id)
        .bind(&decision.decision_type)
        .bind(&decision.notes)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn populate_timelines(
    conn: &mut SqliteConnection,
    layout: &ProjectLayout,
) -> Result<(), FabulaError> {
    for (_path, timeline) in store::read_timelines(layout)? {
        sqlx::query("INSERT OR REPLACE INTO timelines (id, name, is_canonical) VALUES (?,?,?)")
            .bind(&timeline.id)
            .bind(&timeline.name)
            .bind(timeline.is_canonical as i64)
            .execute(&mut *conn)
            .await?;
        for (order, decision_id) in timeline.decisions.iter().enumerate() {
            sqlx::query(
                "INSERT OR REPLACE INTO timeline_decisions \
                 (timeline_id, decision_id, order_index) VALUES (?,?,?)",
            )
            .bind(&timeline.id)
            .bind(decision_id)
            .bind(order as i64)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Rebuild the live index at `db_path` and return the store fingerprint the
/// rebuild corresponds to. Assumes the project lock is already held.
pub(crate) async fn rebuild_locked(
    layout: &ProjectLayout,
    db_path: &Path,
) -> Result<String, FabulaError> {
    let store_root = layout.project_dir();
    fs::create_dir_all(&store_root)?;
    // Fingerprint before populating; the store must not mutate mid-rebuild.
    let digest = fingerprint(&store_root)?;

    let pool = db_init(db_path).await?;
    let mut tx = pool.begin().await?;
    populate(&mut *tx, layout).await?;
    tx.commit().await?;
    // Close before any caller copies the file so the database is complete on
    // disk.
    pool.close().await;

    Ok(digest)
}

/// Force a full rebuild of the live index regardless of staleness, then
/// record the store fingerprint in the live version marker.
pub async fn reindex(layout: &ProjectLayout) -> Result<(), FabulaError> {
    let _guard = ProjectLock::acquire(layout)?;
    let digest = rebuild_locked(layout, &layout.index_path()).await?;
    write_version_marker(&layout.version_path(), &digest)?;
    tracing::info!("Index rebuilt for project '{}'", layout.name);
    Ok(())
}

/// Rebuild the live index only if the document store changed since the last
/// build. Returns whether a rebuild ran.
///
/// Calling this twice with no store mutation in between performs the
/// expensive rebuild at most once; the second call is a no-op.
pub async fn ensure_fresh(layout: &ProjectLayout) -> Result<bool, FabulaError> {
    let _guard = ProjectLock::acquire(layout)?;
    let store_root = layout.project_dir();
    fs::create_dir_all(&store_root)?;
    let current = fingerprint(&store_root)?;
    if read_version_marker(&layout.version_path()).as_deref() == Some(current.as_str()) {
        tracing::debug!("Index is fresh for project '{}'", layout.name);
        return Ok(false);
    }
    let digest = rebuild_locked(layout, &layout.index_path()).await?;
    write_version_marker(&layout.version_path(), &digest)?;
    tracing::info!("Index was stale and has been rebuilt");
    Ok(true)
}
