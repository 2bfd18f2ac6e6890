use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (rows, auth, objects)");
        conn.execute_batch(
            "
            -- Every backend table lives here as JSON documents keyed by (tbl, id).
            CREATE TABLE rows (
                seq     INTEGER PRIMARY KEY AUTOINCREMENT,
                tbl     TEXT NOT NULL,
                id      TEXT NOT NULL,
                body    TEXT NOT NULL,
                UNIQUE(tbl, id)
            );

            CREATE INDEX idx_rows_tbl ON rows(tbl, seq);

            CREATE TABLE auth_users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE objects (
                bucket          TEXT NOT NULL,
                path            TEXT NOT NULL,
                content_type    TEXT NOT NULL,
                data            BLOB NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (bucket, path)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (message index)");
        conn.execute_batch(
            "
            CREATE INDEX idx_rows_group ON rows(tbl, json_extract(body, '$.group_id'));

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
