//! Database migrations: idempotent table and index creation.
use sqlx::SqlitePool;
use tracing::info;

pub async fn migrate(pool: &SqlitePool) -> Result<(), String> {
    info!("DB migrate start");

    let ddls = [
        r#"
      CREATE TABLE IF NOT EXISTS tracked_items(
        item_id TEXT PRIMARY KEY,
        collection TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL,
        created_at_text TEXT NOT NULL,
        first_seen_at_ms INTEGER NOT NULL,
        first_seen_at_text TEXT NOT NULL,
        last_updated_at_ms INTEGER NOT NULL,
        last_updated_at_text TEXT NOT NULL,
        update_count INTEGER NOT NULL DEFAULT -1,
        status TEXT NOT NULL DEFAULT 'new',
        remote_doc_id TEXT NULL,
        content_fingerprint TEXT NOT NULL DEFAULT ''
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS cached_items(
        item_id TEXT PRIMARY KEY REFERENCES tracked_items(item_id) ON DELETE CASCADE,
        collection TEXT NOT NULL,
        author TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL,
        permalink TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        upvote_ratio REAL NOT NULL DEFAULT 0.0,
        reply_count INTEGER NOT NULL DEFAULT 0,
        created_at_ms INTEGER NOT NULL,
        created_at_text TEXT NOT NULL,
        edited INTEGER NOT NULL DEFAULT 0,
        flair TEXT NULL,
        is_self INTEGER NOT NULL DEFAULT 1,
        cached_at_ms INTEGER NOT NULL,
        cached_at_text TEXT NOT NULL,
        update_count INTEGER NOT NULL
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS replies(
        reply_id TEXT NOT NULL,
        item_id TEXT NOT NULL REFERENCES cached_items(item_id) ON DELETE CASCADE,
        author TEXT NOT NULL,
        body TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        created_at_ms INTEGER NOT NULL,
        created_at_text TEXT NOT NULL,
        parent_id TEXT NOT NULL,
        is_submitter INTEGER NOT NULL DEFAULT 0,
        edited INTEGER NOT NULL DEFAULT 0,
        depth INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL,
        PRIMARY KEY(item_id, reply_id)
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS retry_queue(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id TEXT NOT NULL,
        collection TEXT NOT NULL,
        action TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 5,
        last_error TEXT NULL,
        created_at_ms INTEGER NOT NULL,
        created_at_text TEXT NOT NULL,
        scheduled_for_ms INTEGER NOT NULL,
        scheduled_for_text TEXT NOT NULL,
        UNIQUE(item_id, action)
      )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_tracked_status ON tracked_items(status, update_count)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_tracked_collection ON tracked_items(collection)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_tracked_first_seen ON tracked_items(first_seen_at_ms)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_replies_item ON replies(item_id)"#,
        r#"
      CREATE INDEX IF NOT EXISTS idx_queue_scheduled
      ON retry_queue(scheduled_for_ms) WHERE attempts < max_attempts"#,
    ];

    for ddl in ddls {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| format!("migrate error (ddl): {e}"))?;
    }

    info!("DB migrate done");
    Ok(())
}
