use axum::{
    Extension, Json,
    extract::State,
};
use uuid::Uuid;

use bardly_types::api::Claims;
use bardly_types::models::Message;

use crate::adventures::load_owned_adventure;
use crate::error::ApiResult;
use crate::extract::ApiPath;
use crate::state::{AppState, with_db};

/// GET /adventures/{id}/messages: The whole history, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(adventure_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Message>>> {
    load_owned_adventure(&state, claims.sub, adventure_id).await?;

    let messages = load_history(&state, adventure_id).await?;
    Ok(Json(messages))
}

pub(crate) async fn load_history(state: &AppState, adventure_id: Uuid) -> ApiResult<Vec<Message>> {
    let aid = adventure_id.to_string();
    with_db(state, move |db| {
        db.get_messages(&aid)?
            .into_iter()
            .map(Message::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await
}
