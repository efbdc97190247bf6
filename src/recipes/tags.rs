//! Owner-scoped listing, editing and removal of tags and ingredients.
//! Both are only ever created implicitly through recipe payloads.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    error::{single_field, AppError, FieldErrors},
    extract::AppJson,
    recipes::{
        dto::{AssignedQuery, IngredientDto, IngredientUpdate, TagDto, TagUpdate},
        repo_types::IngredientChanges,
        services::{check_text, parse_flag, UpdateMode},
    },
    state::AppState,
    store::{Store, StoreError},
};

const DUPLICATE_NAME: &str = "You already have an entry with this name.";

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/:id", put(put_tag).patch(patch_tag).delete(delete_tag))
}

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients", get(list_ingredients))
        .route(
            "/ingredients/:id",
            put(put_ingredient)
                .patch(patch_ingredient)
                .delete(delete_ingredient),
        )
}

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<AssignedQuery>,
) -> Result<Json<Vec<TagDto>>, AppError> {
    let assigned_only = parse_flag("assigned_only", q.assigned_only.as_deref())?;
    let tags = state.store.list_tags(user_id, assigned_only).await?;
    Ok(Json(tags.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, payload))]
pub async fn put_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<TagUpdate>,
) -> Result<Json<TagDto>, AppError> {
    update_tag(state.store.as_ref(), user_id, id, payload, UpdateMode::Full)
        .await
        .map(Json)
}

#[instrument(skip(state, payload))]
pub async fn patch_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<TagUpdate>,
) -> Result<Json<TagDto>, AppError> {
    update_tag(state.store.as_ref(), user_id, id, payload, UpdateMode::Partial)
        .await
        .map(Json)
}

#[instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_tag(user_id, id).await? {
        return Err(AppError::NotFound);
    }
    info!(tag_id = id, %user_id, "tag deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<AssignedQuery>,
) -> Result<Json<Vec<IngredientDto>>, AppError> {
    let assigned_only = parse_flag("assigned_only", q.assigned_only.as_deref())?;
    let ingredients = state.store.list_ingredients(user_id, assigned_only).await?;
    Ok(Json(ingredients.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, payload))]
pub async fn put_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<IngredientUpdate>,
) -> Result<Json<IngredientDto>, AppError> {
    update_ingredient(state.store.as_ref(), user_id, id, payload, UpdateMode::Full)
        .await
        .map(Json)
}

#[instrument(skip(state, payload))]
pub async fn patch_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<IngredientUpdate>,
) -> Result<Json<IngredientDto>, AppError> {
    update_ingredient(state.store.as_ref(), user_id, id, payload, UpdateMode::Partial)
        .await
        .map(Json)
}

#[instrument(skip(state))]
pub async fn delete_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_ingredient(user_id, id).await? {
        return Err(AppError::NotFound);
    }
    info!(ingredient_id = id, %user_id, "ingredient deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_tag(
    store: &dyn Store,
    owner: Uuid,
    id: i64,
    payload: TagUpdate,
    mode: UpdateMode,
) -> Result<TagDto, AppError> {
    let mut errors = FieldErrors::new();
    match &payload.name {
        Some(name) => check_text(&mut errors, "name", name),
        None if mode == UpdateMode::Full => errors.add("name", "This field is required."),
        None => {}
    }
    errors.into_result()?;

    let Some(name) = payload.name else {
        return store
            .get_tag(owner, id)
            .await?
            .map(Into::into)
            .ok_or(AppError::NotFound);
    };
    match store.rename_tag(owner, id, name.trim()).await {
        Ok(Some(tag)) => Ok(tag.into()),
        Ok(None) => Err(AppError::NotFound),
        Err(StoreError::Conflict(_)) => Err(single_field("name", DUPLICATE_NAME)),
        Err(e) => Err(e.into()),
    }
}

async fn update_ingredient(
    store: &dyn Store,
    owner: Uuid,
    id: i64,
    payload: IngredientUpdate,
    mode: UpdateMode,
) -> Result<IngredientDto, AppError> {
    let mut errors = FieldErrors::new();
    match &payload.name {
        Some(name) => check_text(&mut errors, "name", name),
        None if mode == UpdateMode::Full => errors.add("name", "This field is required."),
        None => {}
    }
    if let Some(quantity) = &payload.quantity {
        if quantity.chars().count() > 255 {
            errors.add("quantity", "Ensure this field has no more than 255 characters.");
        }
    }
    errors.into_result()?;

    let changes = IngredientChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        quantity: payload.quantity.map(|q| q.trim().to_string()),
    };
    match store.update_ingredient(owner, id, changes).await {
        Ok(Some(ingredient)) => Ok(ingredient.into()),
        Ok(None) => Err(AppError::NotFound),
        Err(StoreError::Conflict(_)) => Err(single_field("name", DUPLICATE_NAME)),
        Err(e) => Err(e.into()),
    }
}
