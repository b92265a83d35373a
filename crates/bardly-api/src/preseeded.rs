use axum::{Json, extract::State};

use bardly_types::models::PreseededAdventure;

use crate::error::ApiResult;
use crate::state::{AppState, with_db};

/// GET /preseeded-adventures: Public catalog, newest first.
pub async fn list_preseeded(State(state): State<AppState>) -> ApiResult<Json<Vec<PreseededAdventure>>> {
    let catalog = with_db(&state, |db| {
        db.list_preseeded_adventures()?
            .into_iter()
            .map(PreseededAdventure::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(catalog))
}
