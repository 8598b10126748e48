//! SQLite-backed store for channels, post requests, and the block list.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crosspost_common::types::{PostContent, UserId};

use crate::{
    blocklist::BlockList,
    directory::ChannelDirectory,
    requests::RequestLog,
    types::{BlockedUser, ChannelStanding, PostRequest, RegisteredChannel, RequestStatus},
};

/// Single SQLite store backing all three persistence seams.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store with its own connection pool and initialize the schema.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        Self::init(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool ([`SqliteStore::init`] must
    /// already have run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS channels (
                name       TEXT    PRIMARY KEY,
                owner_id   INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        // For text content `body` is the message text; for photos `body` is
        // the Telegram file ID and `caption` carries the text.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS post_requests (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id INTEGER NOT NULL,
                channel      TEXT    NOT NULL,
                content_kind TEXT    NOT NULL,
                body         TEXT    NOT NULL,
                caption      TEXT,
                status       TEXT    NOT NULL,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS blocked_users (
                user_id    INTEGER PRIMARY KEY,
                username   TEXT,
                blocked_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[async_trait]
impl ChannelDirectory for SqliteStore {
    async fn resolve_owner(&self, channel: &str) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT owner_id FROM channels WHERE name = ?")
            .bind(channel)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("owner_id")))
    }

    async fn list_registered(&self) -> Result<Vec<RegisteredChannel>> {
        let rows = sqlx::query("SELECT name, owner_id, created_at FROM channels ORDER BY created_at, name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| RegisteredChannel {
                name: r.get("name"),
                owner_id: r.get("owner_id"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn list_owned(&self, user: UserId) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM channels WHERE owner_id = ? ORDER BY created_at, name")
            .bind(user)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("name")).collect())
    }

    async fn list_owners(&self) -> Result<Vec<UserId>> {
        let rows = sqlx::query("SELECT DISTINCT owner_id FROM channels ORDER BY owner_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("owner_id")).collect())
    }

    async fn register(&self, channel: &str, owner: UserId) -> Result<()> {
        sqlx::query(
            "INSERT INTO channels (name, owner_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET owner_id = excluded.owner_id",
        )
        .bind(channel)
        .bind(owner)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unregister(&self, channel: &str, owner: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM channels WHERE name = ? AND owner_id = ?")
            .bind(channel)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RequestLog for SqliteStore {
    async fn record(
        &self,
        requester: UserId,
        channel: &str,
        content: &PostContent,
        status: RequestStatus,
    ) -> Result<()> {
        let (body, caption) = match content {
            PostContent::Text { body } => (body.as_str(), None),
            PostContent::Photo { file_id, caption } => (file_id.as_str(), Some(caption.as_str())),
        };
        let t = now();
        sqlx::query(
            "INSERT INTO post_requests
               (requester_id, channel, content_kind, body, caption, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(requester)
        .bind(channel)
        .bind(content.kind())
        .bind(body)
        .bind(caption)
        .bind(status.as_str())
        .bind(t)
        .bind(t)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        requester: UserId,
        channel: &str,
        status: RequestStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE post_requests SET status = ?, updated_at = ?
             WHERE id = (SELECT id FROM post_requests
                         WHERE requester_id = ? AND channel = ?
                         ORDER BY id DESC LIMIT 1)",
        )
        .bind(status.as_str())
        .bind(now())
        .bind(requester)
        .bind(channel)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_for(&self, requester: UserId) -> Result<Vec<PostRequest>> {
        let rows = sqlx::query(
            "SELECT * FROM post_requests WHERE requester_id = ? AND status = 'pending' ORDER BY id",
        )
        .bind(requester)
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str: String = row.get("status");
            let status = RequestStatus::parse(&status_str)
                .with_context(|| format!("unknown request status: {status_str}"))?;
            requests.push(PostRequest {
                id: row.get("id"),
                requester_id: row.get("requester_id"),
                channel: row.get("channel"),
                content_kind: row.get("content_kind"),
                body: row.get("body"),
                caption: row.get("caption"),
                status,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }
        Ok(requests)
    }

    async fn top_channels(&self, limit: u32) -> Result<Vec<ChannelStanding>> {
        let rows = sqlx::query(
            "SELECT channel, COUNT(*) AS completed FROM post_requests
             WHERE status = 'completed'
             GROUP BY channel
             ORDER BY completed DESC, channel
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ChannelStanding {
                channel: r.get("channel"),
                completed: r.get("completed"),
            })
            .collect())
    }
}

#[async_trait]
impl BlockList for SqliteStore {
    async fn block(&self, user: UserId, username: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO blocked_users (user_id, username, blocked_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username",
        )
        .bind(user)
        .bind(username)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unblock(&self, user: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocked_users WHERE user_id = ?")
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_blocked(&self, user: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM blocked_users WHERE user_id = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list(&self) -> Result<Vec<BlockedUser>> {
        let rows = sqlx::query(
            "SELECT user_id, username, blocked_at FROM blocked_users ORDER BY blocked_at DESC, user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| BlockedUser {
                user_id: r.get("user_id"),
                username: r.get("username"),
                blocked_at: r.get("blocked_at"),
            })
            .collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let store = make_store().await;
        store.register("alpha", 1).await.unwrap();

        assert_eq!(store.resolve_owner("alpha").await.unwrap(), Some(1));
        assert_eq!(store.resolve_owner("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_reowns_existing_channel() {
        let store = make_store().await;
        store.register("alpha", 1).await.unwrap();
        store.register("alpha", 2).await.unwrap();

        assert_eq!(store.resolve_owner("alpha").await.unwrap(), Some(2));
        assert_eq!(store.list_registered().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_owned_and_owners() {
        let store = make_store().await;
        store.register("alpha", 1).await.unwrap();
        store.register("beta", 1).await.unwrap();
        store.register("gamma", 2).await.unwrap();

        assert_eq!(store.list_owned(1).await.unwrap(), vec!["alpha", "beta"]);
        assert!(store.list_owned(3).await.unwrap().is_empty());
        assert_eq!(store.list_owners().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn unregister_requires_ownership() {
        let store = make_store().await;
        store.register("alpha", 1).await.unwrap();

        assert!(!store.unregister("alpha", 2).await.unwrap());
        assert_eq!(store.resolve_owner("alpha").await.unwrap(), Some(1));

        assert!(store.unregister("alpha", 1).await.unwrap());
        assert_eq!(store.resolve_owner("alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn record_and_update_status() {
        let store = make_store().await;
        store
            .record(7, "beta", &PostContent::text("hello"), RequestStatus::Pending)
            .await
            .unwrap();

        let pending = store.pending_for(7).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel, "beta");
        assert_eq!(pending[0].content_kind, "text");
        assert_eq!(pending[0].body, "hello");

        store
            .update_status(7, "beta", RequestStatus::Completed)
            .await
            .unwrap();
        assert!(store.pending_for(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_status_touches_latest_request_only() {
        let store = make_store().await;
        store
            .record(7, "beta", &PostContent::text("first"), RequestStatus::Pending)
            .await
            .unwrap();
        store
            .record(7, "beta", &PostContent::text("second"), RequestStatus::Pending)
            .await
            .unwrap();

        store
            .update_status(7, "beta", RequestStatus::Declined)
            .await
            .unwrap();

        let pending = store.pending_for(7).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].body, "first");
    }

    #[tokio::test]
    async fn photo_content_stores_file_id_and_caption() {
        let store = make_store().await;
        store
            .record(
                7,
                "beta",
                &PostContent::photo("file123", "look at this"),
                RequestStatus::Pending,
            )
            .await
            .unwrap();

        let pending = store.pending_for(7).await.unwrap();
        assert_eq!(pending[0].content_kind, "photo");
        assert_eq!(pending[0].body, "file123");
        assert_eq!(pending[0].caption.as_deref(), Some("look at this"));
    }

    #[tokio::test]
    async fn top_channels_ranks_by_completed() {
        let store = make_store().await;
        for _ in 0..3 {
            store
                .record(1, "beta", &PostContent::text("x"), RequestStatus::Completed)
                .await
                .unwrap();
        }
        store
            .record(1, "alpha", &PostContent::text("x"), RequestStatus::Completed)
            .await
            .unwrap();
        store
            .record(1, "gamma", &PostContent::text("x"), RequestStatus::Pending)
            .await
            .unwrap();

        let top = store.top_channels(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], ChannelStanding {
            channel: "beta".into(),
            completed: 3,
        });
        assert_eq!(top[1].channel, "alpha");
    }

    #[tokio::test]
    async fn block_unblock_roundtrip() {
        let store = make_store().await;
        assert!(!store.is_blocked(5).await.unwrap());

        store.block(5, Some("mallory")).await.unwrap();
        assert!(store.is_blocked(5).await.unwrap());

        let blocked = store.list().await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].username.as_deref(), Some("mallory"));

        assert!(store.unblock(5).await.unwrap());
        assert!(!store.is_blocked(5).await.unwrap());
        assert!(!store.unblock(5).await.unwrap());
    }

    #[tokio::test]
    async fn block_is_idempotent() {
        let store = make_store().await;
        store.block(5, None).await.unwrap();
        store.block(5, Some("mallory")).await.unwrap();

        let blocked = store.list().await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].username.as_deref(), Some("mallory"));
    }
}
