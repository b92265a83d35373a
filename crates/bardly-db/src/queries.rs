use crate::models::{
    AdventureRow, MessageRow, PreseededAdventureRow, ProfileRow, TokenUsageLogRow, UserRow,
};
use crate::{Database, now_timestamp};
use anyhow::{Result, bail};
use bardly_types::models::{Sender, SubscriptionTier};
use rusqlite::{Connection, Row};

const ADVENTURE_COLUMNS: &str =
    "id, user_id, title, preseeded_adventure_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, adventure_id, sender, content, created_at";
const PROFILE_COLUMNS: &str =
    "id, username, token_usage, subscription_tier, created_at, updated_at";
const PRESEEDED_COLUMNS: &str =
    "id, title, description, starter_message, image_url, created_at";

impl Database {
    // -- Users --

    /// Creates the account and its profile in one transaction.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, &now),
            )?;
            tx.execute(
                "INSERT INTO profiles (id, username, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                (id, username, &now),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
                [user_id],
                map_profile,
            )
            .optional()
        })
    }

    /// Returns false when no profile exists for `user_id`.
    pub fn set_subscription_tier(&self, user_id: &str, tier: SubscriptionTier) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE profiles SET subscription_tier = ?1, updated_at = ?2 WHERE id = ?3",
                (tier.as_str(), now_timestamp(), user_id),
            )?;
            Ok(updated > 0)
        })
    }

    /// Appends a usage-log entry and bumps the profile counter in the same
    /// transaction, so the counter always equals the sum of the log.
    /// Returns the new cumulative total.
    pub fn record_token_usage(
        &self,
        id: &str,
        user_id: &str,
        adventure_id: Option<&str>,
        tokens_used: i64,
        model_used: &str,
    ) -> Result<i64> {
        if tokens_used < 0 {
            bail!("token usage cannot be negative: {}", tokens_used);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            tx.execute(
                "INSERT INTO token_usage_logs (id, user_id, adventure_id, tokens_used, model_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, user_id, adventure_id, tokens_used, model_used, &now],
            )?;

            let updated = tx.execute(
                "UPDATE profiles SET token_usage = token_usage + ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![tokens_used, &now, user_id],
            )?;
            if updated == 0 {
                bail!("No profile for user {}", user_id);
            }

            let total: i64 = tx.query_row(
                "SELECT token_usage FROM profiles WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(total)
        })
    }

    /// Most recent entries first.
    pub fn get_token_usage_logs(&self, user_id: &str, limit: u32) -> Result<Vec<TokenUsageLogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, adventure_id, tokens_used, model_used, created_at
                 FROM token_usage_logs
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(TokenUsageLogRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        adventure_id: row.get(2)?,
                        tokens_used: row.get(3)?,
                        model_used: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn total_logged_tokens(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COALESCE(SUM(tokens_used), 0) FROM token_usage_logs WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }

    // -- Adventures --

    pub fn create_adventure(&self, id: &str, user_id: &str, title: &str) -> Result<AdventureRow> {
        self.with_conn(|conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO adventures (id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (id, user_id, title, &now),
            )?;

            Ok(AdventureRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                title: title.to_string(),
                preseeded_adventure_id: None,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Starts an adventure from a catalog entry: the adventure takes the
    /// entry's title and its starter text becomes the first `user` message.
    pub fn create_adventure_from_preseeded(
        &self,
        id: &str,
        user_id: &str,
        preseeded: &PreseededAdventureRow,
        message_id: &str,
    ) -> Result<AdventureRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            tx.execute(
                "INSERT INTO adventures (id, user_id, title, preseeded_adventure_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                (id, user_id, &preseeded.title, &preseeded.id, &now),
            )?;
            tx.execute(
                "INSERT INTO messages (id, adventure_id, sender, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (message_id, id, Sender::User.as_str(), &preseeded.starter_message, &now),
            )?;
            tx.commit()?;

            Ok(AdventureRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                title: preseeded.title.clone(),
                preseeded_adventure_id: Some(preseeded.id.clone()),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_adventure(&self, id: &str) -> Result<Option<AdventureRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM adventures WHERE id = ?1", ADVENTURE_COLUMNS),
                [id],
                map_adventure,
            )
            .optional()
        })
    }

    /// The user's adventures, most recently active first. `search` filters by
    /// case-insensitive title substring.
    pub fn list_adventures(&self, user_id: &str, search: Option<&str>) -> Result<Vec<AdventureRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM adventures
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR instr(lower(title), lower(?2)) > 0)
                 ORDER BY updated_at DESC, rowid DESC",
                ADVENTURE_COLUMNS
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, search], map_adventure)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Returns false when the adventure does not exist.
    pub fn rename_adventure(&self, id: &str, title: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE adventures SET title = ?1, updated_at = ?2 WHERE id = ?3",
                (title, now_timestamp(), id),
            )?;
            Ok(updated > 0)
        })
    }

    /// Messages go with the adventure; usage logs stay and lose the reference.
    pub fn delete_adventure(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM adventures WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Messages --

    /// Appends a message and marks the adventure as updated.
    pub fn insert_message(
        &self,
        id: &str,
        adventure_id: &str,
        sender: Sender,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            tx.execute(
                "INSERT INTO messages (id, adventure_id, sender, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, adventure_id, sender.as_str(), content, &now),
            )?;
            tx.execute(
                "UPDATE adventures SET updated_at = ?1 WHERE id = ?2",
                (&now, adventure_id),
            )?;
            tx.commit()?;

            Ok(MessageRow {
                id: id.to_string(),
                adventure_id: adventure_id.to_string(),
                sender: sender.as_str().to_string(),
                content: content.to_string(),
                created_at: now,
            })
        })
    }

    /// Full history in insertion order.
    pub fn get_messages(&self, adventure_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE adventure_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            ))?;

            let rows = stmt
                .query_map([adventure_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        adventure_id: row.get(1)?,
                        sender: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Preseeded catalog --

    pub fn insert_preseeded_adventure(
        &self,
        id: &str,
        title: &str,
        description: &str,
        starter_message: &str,
        image_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO preseeded_adventures (id, title, description, starter_message, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, title, description, starter_message, image_url, now_timestamp()],
            )?;
            Ok(())
        })
    }

    /// Newest first.
    pub fn list_preseeded_adventures(&self) -> Result<Vec<PreseededAdventureRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM preseeded_adventures ORDER BY created_at DESC, rowid DESC",
                PRESEEDED_COLUMNS
            ))?;

            let rows = stmt
                .query_map([], map_preseeded)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_preseeded_adventure(&self, id: &str) -> Result<Option<PreseededAdventureRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM preseeded_adventures WHERE id = ?1", PRESEEDED_COLUMNS),
                [id],
                map_preseeded,
            )
            .optional()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    ))?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        username: row.get(1)?,
        token_usage: row.get(2)?,
        subscription_tier: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_adventure(row: &Row<'_>) -> rusqlite::Result<AdventureRow> {
    Ok(AdventureRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        preseeded_adventure_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_preseeded(row: &Row<'_>) -> rusqlite::Result<PreseededAdventureRow> {
    Ok(PreseededAdventureRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        starter_message: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
