use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{adventures, auth, billing, messages, preseeded, profile, relay};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/preseeded-adventures", get(preseeded::list_preseeded))
        .route("/billing/subscription", post(billing::set_subscription));

    let protected_routes = Router::new()
        .route("/chat", post(relay::chat))
        .route(
            "/adventures",
            get(adventures::list_adventures).post(adventures::create_adventure),
        )
        .route(
            "/adventures/{adventure_id}",
            get(adventures::get_adventure)
                .patch(adventures::rename_adventure)
                .delete(adventures::delete_adventure),
        )
        .route("/adventures/{adventure_id}/messages", get(messages::get_messages))
        .route("/profile", get(profile::get_profile))
        .route("/profile/usage", get(profile::get_usage))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
