use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE profiles (
                id                  TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                username            TEXT NOT NULL,
                token_usage         INTEGER NOT NULL DEFAULT 0 CHECK (token_usage >= 0),
                subscription_tier   TEXT NOT NULL DEFAULT 'free'
                                    CHECK (subscription_tier IN ('free', 'premium')),
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE preseeded_adventures (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                starter_message TEXT NOT NULL,
                image_url       TEXT,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE adventures (
                id                      TEXT PRIMARY KEY,
                user_id                 TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title                   TEXT NOT NULL,
                preseeded_adventure_id  TEXT REFERENCES preseeded_adventures(id),
                created_at              TEXT NOT NULL,
                updated_at              TEXT NOT NULL
            );

            CREATE INDEX idx_adventures_user
                ON adventures(user_id, updated_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                adventure_id    TEXT NOT NULL REFERENCES adventures(id) ON DELETE CASCADE,
                sender          TEXT NOT NULL CHECK (sender IN ('user', 'narrator')),
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_adventure
                ON messages(adventure_id, created_at);

            CREATE TABLE token_usage_logs (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                adventure_id    TEXT REFERENCES adventures(id) ON DELETE SET NULL,
                tokens_used     INTEGER NOT NULL CHECK (tokens_used >= 0),
                model_used      TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_token_usage_user
                ON token_usage_logs(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    if version < 2 {
        info!("Running migration v2 (starter catalog)");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            INSERT OR IGNORE INTO preseeded_adventures
                (id, title, description, starter_message, created_at) VALUES
                ('00000000-0000-0000-0000-000000000001',
                 'Tavern at the Crossroads',
                 'A quiet night at a roadside inn takes a strange turn.',
                 'I wake in a tavern with no memory of how I got here.',
                 '2025-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000002',
                 'The Sunken Crypt',
                 'A flooded tomb lies beneath a ruined abbey, and something below is still awake.',
                 'I descend the slick stone stairs into the crypt, torch held high.',
                 '2025-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000003',
                 'The Dragon''s Bargain',
                 'An ancient dragon has summoned you to hear an offer.',
                 'I approach the mouth of the lair under a flag of truce.',
                 '2025-01-01T00:00:00.000000Z');

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}
