use axum::{
    Extension, Json,
    extract::State,
};
use serde::Deserialize;

use bardly_types::api::{Claims, ProfileResponse};
use bardly_types::models::{Profile, TokenUsageLog};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiQuery;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /profile: Usage counter, tier, and whether the relay will accept
/// another turn. Clients use `quota.blocked` to show the upgrade prompt.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ProfileResponse>> {
    let uid = claims.sub.to_string();
    let profile = with_db(&state, move |db| db.get_profile(&uid)?.map(Profile::try_from).transpose())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(ProfileResponse {
        user_id: profile.id,
        quota: state.quota.status(profile.token_usage, profile.subscription_tier),
        username: profile.username,
        token_usage: profile.token_usage,
        subscription_tier: profile.subscription_tier,
    }))
}

/// GET /profile/usage: Most recent relay calls first.
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<UsageQuery>,
) -> ApiResult<Json<Vec<TokenUsageLog>>> {
    let uid = claims.sub.to_string();
    let limit = query.limit.min(200);

    let logs = with_db(&state, move |db| {
        db.get_token_usage_logs(&uid, limit)?
            .into_iter()
            .map(TokenUsageLog::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(logs))
}
