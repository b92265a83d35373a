//! Database row types. These map directly to SQLite rows and are converted
//! into the `bardly-types` models at the crate boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use bardly_types::models::{
    Adventure, Message, PreseededAdventure, Profile, Sender, SubscriptionTier, TokenUsageLog,
};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub token_usage: i64,
    pub subscription_tier: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AdventureRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub preseeded_adventure_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub adventure_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: String,
}

pub struct TokenUsageLogRow {
    pub id: String,
    pub user_id: String,
    pub adventure_id: Option<String>,
    pub tokens_used: i64,
    pub model_used: String,
    pub created_at: String,
}

pub struct PreseededAdventureRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub starter_message: String,
    pub image_url: Option<String>,
    pub created_at: String,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    value
        .parse()
        .with_context(|| format!("corrupt {} '{}'", field, value))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .with_context(|| format!("corrupt timestamp '{}'", value))
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            id: parse_uuid("profile id", &row.id)?,
            subscription_tier: row
                .subscription_tier
                .parse::<SubscriptionTier>()
                .map_err(anyhow::Error::msg)?,
            username: row.username,
            token_usage: row.token_usage,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<AdventureRow> for Adventure {
    type Error = anyhow::Error;

    fn try_from(row: AdventureRow) -> Result<Self> {
        Ok(Adventure {
            id: parse_uuid("adventure id", &row.id)?,
            user_id: parse_uuid("adventure user_id", &row.user_id)?,
            preseeded_adventure_id: row
                .preseeded_adventure_id
                .as_deref()
                .map(|id| parse_uuid("preseeded_adventure_id", id))
                .transpose()?,
            title: row.title,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_uuid("message id", &row.id)?,
            adventure_id: parse_uuid("message adventure_id", &row.adventure_id)?,
            sender: row.sender.parse::<Sender>().map_err(anyhow::Error::msg)?,
            content: row.content,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<TokenUsageLogRow> for TokenUsageLog {
    type Error = anyhow::Error;

    fn try_from(row: TokenUsageLogRow) -> Result<Self> {
        Ok(TokenUsageLog {
            id: parse_uuid("usage log id", &row.id)?,
            user_id: parse_uuid("usage log user_id", &row.user_id)?,
            adventure_id: row
                .adventure_id
                .as_deref()
                .map(|id| parse_uuid("usage log adventure_id", id))
                .transpose()?,
            tokens_used: row.tokens_used,
            model_used: row.model_used,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<PreseededAdventureRow> for PreseededAdventure {
    type Error = anyhow::Error;

    fn try_from(row: PreseededAdventureRow) -> Result<Self> {
        Ok(PreseededAdventure {
            id: parse_uuid("preseeded adventure id", &row.id)?,
            title: row.title,
            description: row.description,
            starter_message: row.starter_message,
            image_url: row.image_url,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamps() {
        let a = parse_timestamp("2026-10-16T12:00:00.123456Z").unwrap();
        let b = parse_timestamp("2026-10-16T12:00:00Z").unwrap();
        assert!(a > b);
        assert!(parse_timestamp("2026-10-16 12:00:00").is_err());
    }

    #[test]
    fn rejects_unknown_sender() {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            adventure_id: Uuid::new_v4().to_string(),
            sender: "ai".into(),
            content: "hello".into(),
            created_at: "2026-10-16T12:00:00Z".into(),
        };
        assert!(Message::try_from(row).is_err());
    }
}
