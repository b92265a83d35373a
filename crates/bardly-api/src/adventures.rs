use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use bardly_types::api::{Claims, CreateAdventureRequest, RenameAdventureRequest};
use bardly_types::models::Adventure;

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::{AppState, with_db};

pub const DEFAULT_ADVENTURE_TITLE: &str = "New Adventure";

#[derive(Debug, Deserialize)]
pub struct ListAdventuresQuery {
    /// Case-insensitive title filter.
    pub search: Option<String>,
}

pub async fn list_adventures(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<ListAdventuresQuery>,
) -> ApiResult<Json<Vec<Adventure>>> {
    let uid = claims.sub.to_string();
    let search = query
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let adventures = with_db(&state, move |db| {
        db.list_adventures(&uid, search.as_deref())?
            .into_iter()
            .map(Adventure::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(adventures))
}

/// POST /adventures: Blank, titled, or started from a catalog entry.
pub async fn create_adventure(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateAdventureRequest>,
) -> ApiResult<impl IntoResponse> {
    let adventure = match req.preseeded_adventure_id {
        Some(preseeded_id) => start_preseeded_adventure(&state, claims.sub, preseeded_id).await?,
        None => {
            let title = req
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_ADVENTURE_TITLE);
            new_adventure(&state, claims.sub, title).await?
        }
    };

    info!("User {} created adventure {} '{}'", claims.sub, adventure.id, adventure.title);
    Ok((StatusCode::CREATED, Json(adventure)))
}

pub async fn get_adventure(
    State(state): State<AppState>,
    ApiPath(adventure_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Adventure>> {
    let adventure = load_owned_adventure(&state, claims.sub, adventure_id).await?;
    Ok(Json(adventure))
}

/// PATCH /adventures/{id}: Rename only; history is untouched.
pub async fn rename_adventure(
    State(state): State<AppState>,
    ApiPath(adventure_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RenameAdventureRequest>,
) -> ApiResult<Json<Adventure>> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }

    load_owned_adventure(&state, claims.sub, adventure_id).await?;

    let aid = adventure_id.to_string();
    with_db(&state, move |db| db.rename_adventure(&aid, &title)).await?;

    let adventure = load_owned_adventure(&state, claims.sub, adventure_id).await?;
    Ok(Json(adventure))
}

pub async fn delete_adventure(
    State(state): State<AppState>,
    ApiPath(adventure_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    load_owned_adventure(&state, claims.sub, adventure_id).await?;

    let aid = adventure_id.to_string();
    with_db(&state, move |db| db.delete_adventure(&aid)).await?;

    info!("User {} deleted adventure {}", claims.sub, adventure_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Loads an adventure, treating someone else's adventure the same as a
/// missing one.
pub(crate) async fn load_owned_adventure(
    state: &AppState,
    user_id: Uuid,
    adventure_id: Uuid,
) -> ApiResult<Adventure> {
    let aid = adventure_id.to_string();
    let adventure = with_db(state, move |db| {
        db.get_adventure(&aid)?.map(Adventure::try_from).transpose()
    })
    .await?;

    match adventure {
        Some(adventure) if adventure.user_id == user_id => Ok(adventure),
        Some(_) => {
            warn!("User {} tried to access adventure {} they do not own", user_id, adventure_id);
            Err(ApiError::NotFound(format!("adventure {}", adventure_id)))
        }
        None => Err(ApiError::NotFound(format!("adventure {}", adventure_id))),
    }
}

pub(crate) async fn new_adventure(state: &AppState, user_id: Uuid, title: &str) -> ApiResult<Adventure> {
    let id = Uuid::new_v4().to_string();
    let uid = user_id.to_string();
    let title = title.to_string();

    with_db(state, move |db| Adventure::try_from(db.create_adventure(&id, &uid, &title)?)).await
}

async fn start_preseeded_adventure(
    state: &AppState,
    user_id: Uuid,
    preseeded_id: Uuid,
) -> ApiResult<Adventure> {
    let pid = preseeded_id.to_string();
    let id = Uuid::new_v4().to_string();
    let message_id = Uuid::new_v4().to_string();
    let uid = user_id.to_string();

    let created = with_db(state, move |db| {
        let Some(preseeded) = db.get_preseeded_adventure(&pid)? else {
            return Ok(None);
        };
        let row = db.create_adventure_from_preseeded(&id, &uid, &preseeded, &message_id)?;
        Adventure::try_from(row).map(Some)
    })
    .await?;

    created.ok_or_else(|| ApiError::NotFound(format!("preseeded adventure {}", preseeded_id)))
}
