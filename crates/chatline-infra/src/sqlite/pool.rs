//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. `DatabasePool` pairs a
//! multi-connection reader pool for history reads with a single-connection
//! writer pool, which also serializes per-conversation sequence assignment.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: Multi-connection pool (up to 8) for concurrent SELECT queries.
/// - `writer`: Single-connection pool for serialized INSERT/UPDATE/DELETE.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open both pools, running migrations on the writer first.
    ///
    /// Both pools use WAL journal mode, foreign key enforcement, and a
    /// 5-second busy timeout.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        // Migrations must exist before the read-only pool opens.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(read_opts)
            .await?;

        Ok(Self { reader, writer })
    }
}

/// `sqlite://{data_dir}/chatline.db`
pub fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}", data_dir.join("chatline.db").display())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &tempfile::TempDir) -> DatabasePool {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("chatline.db").display());
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn migrations_create_conversation_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&dir).await;

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'conversation%' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        assert_eq!(
            names,
            ["conversation_messages", "conversation_participants", "conversations"]
        );
    }

    #[tokio::test]
    async fn writer_runs_wal_with_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&dir).await;

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool.writer)
            .await
            .unwrap();

        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn reader_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&dir).await;

        let result = sqlx::query("INSERT INTO conversations (id, created_at) VALUES ('c', 'now')")
            .execute(&pool.reader)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn deleting_conversation_cascades_to_messages() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&dir).await;

        sqlx::query("INSERT INTO conversations (id, created_at) VALUES ('c', 'now')")
            .execute(&pool.writer)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO conversation_messages (id, conversation_id, sender_id, role, content, sequence, created_at) \
             VALUES ('m', 'c', 'u', 'user', 'hi', 1, 'now')",
        )
        .execute(&pool.writer)
        .await
        .unwrap();
        sqlx::query("DELETE FROM conversations WHERE id = 'c'")
            .execute(&pool.writer)
            .await
            .unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation_messages")
            .fetch_one(&pool.reader)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn default_url_points_into_data_dir() {
        let url = default_database_url(Path::new("/tmp/chatline"));
        assert_eq!(url, "sqlite:///tmp/chatline/chatline.db");
    }
}
