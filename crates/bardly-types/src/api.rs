use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SubscriptionTier;

// -- JWT Claims --

/// Bearer-token claims. Issued by the auth routes and read back by the
/// auth middleware on every protected route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Adventures --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAdventureRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub preseeded_adventure_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameAdventureRequest {
    pub title: String,
}

// -- Relay --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    /// Omit to start a fresh adventure with this message.
    #[serde(default)]
    pub adventure_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub adventure_id: Uuid,
    pub tokens_used: u32,
}

// -- Profile --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub limit: i64,
    pub remaining: i64,
    pub blocked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token_usage: i64,
    pub subscription_tier: SubscriptionTier,
    pub quota: QuotaStatus,
}

// -- Billing --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetSubscriptionRequest {
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}
