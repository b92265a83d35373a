use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use bardly_types::api::SetSubscriptionRequest;

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::{AppState, with_db};

pub const BILLING_SECRET_HEADER: &str = "x-billing-secret";

/// POST /billing/subscription: Called by the payment processor integration
/// once a checkout completes or a subscription lapses.
pub async fn set_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<SetSubscriptionRequest>,
) -> ApiResult<StatusCode> {
    let Some(expected) = state.billing_secret.as_deref() else {
        return Err(ApiError::NotFound("billing hook is disabled".into()));
    };

    let provided = headers
        .get(BILLING_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !secret_matches(provided, expected) {
        warn!("Rejected billing call with wrong secret");
        return Err(ApiError::Unauthorized);
    }

    let uid = req.user_id.to_string();
    let tier = req.tier;
    let updated = with_db(&state, move |db| db.set_subscription_tier(&uid, tier)).await?;
    if !updated {
        return Err(ApiError::NotFound(format!("user {}", req.user_id)));
    }

    info!("User {} moved to {} tier", req.user_id, req.tier);
    Ok(StatusCode::NO_CONTENT)
}

fn secret_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
