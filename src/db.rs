//! SQLite projection schema and query surface.
//!
//! The projection is fully derived from the document store and disposable; it
//! is never the source of truth. Schema creation runs through sqlx's migrator
//! so it is idempotent across startups and never drops or alters existing
//! tables. All reads resolve cross-references (event -> scene, decision ->
//! parent) at query time; the schema carries no foreign keys.

use crate::error::FabulaError;
use futures_core::future::BoxFuture;
use sqlx::{
    error::BoxDynError,
    migrate::{MigrateDatabase, Migration as SqlxMigration, MigrationSource, MigrationType, Migrator},
    pool::PoolOptions,
    sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode},
    ConnectOptions, Pool, Row,
};
use std::{collections::BTreeMap, collections::BTreeSet, path::Path, str::FromStr};

/// A migration definition.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
    pub kind: MigrationType,
}

#[derive(Debug, Clone)]
struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            let mut migrations = Vec::new();
            for migration in self.0 {
                if matches!(migration.kind, MigrationType::ReversibleUp) {
                    migrations.push(SqlxMigration::new(
                        migration.version,
                        migration.description.into(),
                        migration.kind,
                        migration.sql.into(),
                        false,
                    ));
                }
            }
            Ok(migrations)
        })
    }
}

const SCHEMA_V1: &str = "\
    CREATE TABLE events (\
        id TEXT PRIMARY KEY, \
        label TEXT NOT NULL, \
        scene_id TEXT NOT NULL, \
        story_order INTEGER NOT NULL, \
        beat TEXT, \
        type TEXT, \
        timestamp_story TEXT, \
        created_at TEXT DEFAULT CURRENT_TIMESTAMP); \
    CREATE INDEX idx_events_scene ON events(scene_id); \
    CREATE INDEX idx_events_order ON events(story_order); \
    CREATE TABLE event_awareness (\
        event_id TEXT NOT NULL, \
        character_id TEXT NOT NULL, \
        aware INTEGER NOT NULL, \
        source TEXT, \
        confidence TEXT, \
        PRIMARY KEY (event_id, character_id)); \
    CREATE INDEX idx_awareness_character ON event_awareness(character_id, aware); \
    CREATE TABLE world_state_changes (\
        id INTEGER PRIMARY KEY AUTOINCREMENT, \
        event_id TEXT NOT NULL, \
        key TEXT NOT NULL, \
        value TEXT NOT NULL, \
        event_story_order INTEGER NOT NULL); \
    CREATE INDEX idx_state_key ON world_state_changes(key); \
    CREATE INDEX idx_state_order ON world_state_changes(event_story_order); \
    CREATE TABLE emotional_states (\
        character_id TEXT NOT NULL, \
        scene_id TEXT NOT NULL, \
        mood TEXT, \
        tension TEXT, \
        confidence REAL, \
        openness REAL, \
        PRIMARY KEY (character_id, scene_id)); \
    CREATE TABLE beliefs (\
        id INTEGER PRIMARY KEY AUTOINCREMENT, \
        character_id TEXT NOT NULL, \
        belief TEXT NOT NULL, \
        ground_truth TEXT, \
        held_from_event TEXT, \
        held_until_event TEXT); \
    CREATE INDEX idx_beliefs_character ON beliefs(character_id); \
    CREATE TABLE knowledge (\
        id INTEGER PRIMARY KEY AUTOINCREMENT, \
        character_id TEXT NOT NULL, \
        fact_key TEXT NOT NULL, \
        learned_at_event TEXT NOT NULL, \
        source TEXT, \
        confidence TEXT); \
    CREATE INDEX idx_knowledge_character ON knowledge(character_id); \
    CREATE INDEX idx_knowledge_fact ON knowledge(fact_key); \
    CREATE TABLE scenes (\
        id TEXT PRIMARY KEY, \
        act TEXT NOT NULL, \
        scene_order INTEGER NOT NULL, \
        location_id TEXT, \
        time_of_day TEXT, \
        interior_exterior TEXT, \
        pace TEXT, \
        rhythm TEXT, \
        beat TEXT, \
        duration_target TEXT); \
    CREATE TABLE scene_characters (\
        scene_id TEXT NOT NULL, \
        character_id TEXT NOT NULL, \
        PRIMARY KEY (scene_id, character_id)); \
    CREATE TABLE prop_events (\
        id INTEGER PRIMARY KEY AUTOINCREMENT, \
        prop_id TEXT NOT NULL, \
        event_id TEXT NOT NULL, \
        action TEXT, \
        location TEXT, \
        character_id TEXT); \
    CREATE TABLE decisions (\
        id TEXT PRIMARY KEY, \
        label TEXT NOT NULL, \
        parent_id TEXT, \
        type TEXT, \
        created_at TEXT DEFAULT CURRENT_TIMESTAMP, \
        notes TEXT); \
    CREATE TABLE timelines (\
        id TEXT PRIMARY KEY, \
        name TEXT NOT NULL, \
        is_canonical INTEGER DEFAULT 0, \
        created_at TEXT DEFAULT CURRENT_TIMESTAMP); \
    CREATE TABLE timeline_decisions (\
        timeline_id TEXT NOT NULL, \
        decision_id TEXT NOT NULL, \
        order_index INTEGER NOT NULL, \
        PRIMARY KEY (timeline_id, decision_id)); \
    CREATE TABLE renders (\
        id TEXT PRIMARY KEY, \
        scene_id TEXT NOT NULL, \
        timeline_id TEXT, \
        model TEXT, \
        status TEXT, \
        input_path TEXT, \
        output_path TEXT, \
        director_notes TEXT, \
        approved INTEGER DEFAULT 0, \
        created_at TEXT DEFAULT CURRENT_TIMESTAMP);";

/// Every projection table, in deletion-safe order (junction tables first).
pub const PROJECTION_TABLES: [&str; 13] = [
    "event_awareness",
    "world_state_changes",
    "emotional_states",
    "beliefs",
    "knowledge",
    "scene_characters",
    "prop_events",
    "timeline_decisions",
    "events",
    "scenes",
    "decisions",
    "timelines",
    "renders",
];

/// Open (creating if necessary) the projection database at `db_path` and
/// ensure the schema exists. Safe to call on every startup.
pub async fn db_init(db_path: &Path) -> Result<Pool<Sqlite>, sqlx::Error> {
    let fqdb = format!("sqlite:{}", db_path.display());
    tracing::debug!("Initializing index db from file: {:?}", fqdb);
    if !Sqlite::database_exists(&fqdb).await.unwrap_or(false) {
        Sqlite::create_database(&fqdb).await?;
    }
    // Rollback journal instead of WAL: the timeline cache copies the database
    // as a single file, which WAL sidecar files would break.
    let options = SqliteConnectOptions::from_str(&fqdb)?
        .read_only(false)
        .journal_mode(SqliteJournalMode::Delete)
        .disable_statement_logging()
        .create_if_missing(true);

    let pool = PoolOptions::<Sqlite>::new().connect_with(options).await?;

    let migrations = MigrationList(vec![Migration {
        version: 1,
        description: "create_projection_tables",
        sql: SCHEMA_V1,
        kind: MigrationType::ReversibleUp,
    }]);
    let migrator = Migrator::new(migrations).await?;
    migrator.run(&pool).await?;

    let event_count = sqlx::query("SELECT COUNT(*) FROM events;")
        .fetch_one(&pool)
        .await?;
    let scene_count = sqlx::query("SELECT COUNT(*) FROM scenes;")
        .fetch_one(&pool)
        .await?;
    tracing::debug!(
        "Index DB initialized. Indexed events: {}, scenes: {}",
        event_count.get::<u32, usize>(0),
        scene_count.get::<u32, usize>(0)
    );

    Ok(pool)
}

/// Read-side handle over the projection.
#[derive(Debug, Clone)]
pub struct DbConnection(pub Pool<Sqlite>);

impl DbConnection {
    /// Open the live index at `db_path`, creating schema if absent.
    pub async fn open(db_path: &Path) -> Result<Self, FabulaError> {
        Ok(DbConnection(db_init(db_path).await?))
    }

    async fn ids(&self, table: &str) -> Result<Vec<String>, FabulaError> {
        // Table names come from a fixed internal set, never user input.
        let rows = sqlx::query_as::<_, (String,)>(&format!("SELECT id FROM {table} ORDER BY id"))
            .fetch_all(&self.0)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn event_ids(&self) -> Result<Vec<String>, FabulaError> {
        self.ids("events").await
    }

    pub async fn scene_ids(&self) -> Result<Vec<String>, FabulaError> {
        self.ids("scenes").await
    }

    pub async fn decision_ids(&self) -> Result<Vec<String>, FabulaError> {
        self.ids("decisions").await
    }

    pub async fn timeline_ids(&self) -> Result<Vec<String>, FabulaError> {
        self.ids("timelines").await
    }

    /// Event ids belonging to a scene, in story order.
    pub async fn events_for_scene(&self, scene_id: &str) -> Result<Vec<String>, FabulaError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM events WHERE scene_id = ? ORDER BY story_order",
        )
        .bind(scene_id)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Characters present in a scene.
    pub async fn scene_characters(&self, scene_id: &str) -> Result<Vec<String>, FabulaError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT character_id FROM scene_characters WHERE scene_id = ? ORDER BY character_id",
        )
        .bind(scene_id)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Events a character is aware of, in story order.
    pub async fn character_awareness(
        &self,
        character_id: &str,
    ) -> Result<Vec<String>, FabulaError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT a.event_id FROM event_awareness a \
             JOIN events e ON e.id = a.event_id \
             WHERE a.character_id = ? AND a.aware = 1 \
             ORDER BY e.story_order",
        )
        .bind(character_id)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// World state as of a story order: latest value per key among changes
    /// with `event_story_order <= story_order`.
    pub async fn world_state_at(
        &self,
        story_order: i64,
    ) -> Result<BTreeMap<String, String>, FabulaError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM world_state_changes \
             WHERE event_story_order <= ? \
             ORDER BY event_story_order ASC, id ASC",
        )
        .bind(story_order)
        .fetch_all(&self.0)
        .await?;
        // Later rows overwrite earlier ones.
        Ok(rows.into_iter().collect())
    }

    /// Walk a decision's parent pointers to the root. Returns the chain
    /// starting at `decision_id`, ending at the root decision. Unknown ids
    /// yield an empty chain; cycles terminate at the first repeat.
    pub async fn decision_chain(&self, decision_id: &str) -> Result<Vec<String>, FabulaError> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut cursor = decision_id.to_string();
        loop {
            if !seen.insert(cursor.clone()) {
                tracing::warn!("Decision parent cycle detected at {cursor}");
                break;
            }
            let row = sqlx::query_as::<_, (String, Option<String>)>(
                "SELECT id, parent_id FROM decisions WHERE id = ?",
            )
            .bind(&cursor)
            .fetch_optional(&self.0)
            .await?;
            let Some((id, parent)) = row else {
                break;
            };
            chain.push(id);
            match parent {
                Some(parent_id) if !parent_id.is_empty() => cursor = parent_id,
                _ => break,
            }
        }
        Ok(chain)
    }

    /// Ordered decision ids of a timeline.
    pub async fn timeline_decisions(&self, timeline_id: &str) -> Result<Vec<String>, FabulaError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT decision_id FROM timeline_decisions \
             WHERE timeline_id = ? ORDER BY order_index",
        )
        .bind(timeline_id)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// The canonical timeline, if one is marked.
    pub async fn canonical_timeline(&self) -> Result<Option<(String, String)>, FabulaError> {
        Ok(sqlx::query_as::<_, (String, String)>(
            "SELECT id, name FROM timelines WHERE is_canonical = 1 LIMIT 1",
        )
        .fetch_optional(&self.0)
        .await?)
    }
}
