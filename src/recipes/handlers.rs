use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::jwt::AuthUser,
    error::{single_field, AppError},
    extract::AppJson,
    images::services::{attach_recipe_image, image_url, remove_image, UploadItem},
    recipes::{
        dto::{RecipeDetail, RecipeImageResponse, RecipeListQuery, RecipePayload, RecipeSummary},
        services::{self, UpdateMode},
    },
    state::AppState,
};

const IMAGE_FIELD: &str = "image";

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/:id",
            get(get_recipe)
                .put(put_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/:id/upload-image", post(upload_image))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<RecipeListQuery>,
) -> Result<Json<Vec<RecipeSummary>>, AppError> {
    let views = services::list_recipes(state.store.as_ref(), user_id, &query).await?;
    Ok(Json(views.into_iter().map(|v| v.into_summary()).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<RecipePayload>,
) -> Result<(StatusCode, Json<RecipeDetail>), AppError> {
    let view = services::create_recipe(state.store.as_ref(), user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(view.into_detail(None))))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, AppError> {
    let view = services::get_recipe(state.store.as_ref(), user_id, id).await?;
    detail(&state, view).await
}

#[instrument(skip(state, payload))]
pub async fn put_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<RecipePayload>,
) -> Result<Json<RecipeDetail>, AppError> {
    let view =
        services::update_recipe(state.store.as_ref(), user_id, id, payload, UpdateMode::Full).await?;
    detail(&state, view).await
}

#[instrument(skip(state, payload))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<RecipePayload>,
) -> Result<Json<RecipeDetail>, AppError> {
    let view =
        services::update_recipe(state.store.as_ref(), user_id, id, payload, UpdateMode::Partial)
            .await?;
    detail(&state, view).await
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let recipe = services::delete_recipe(state.store.as_ref(), user_id, id).await?;
    if let Some(key) = recipe.image.as_deref() {
        remove_image(&state, key).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /recipes/:id/upload-image (multipart)
/// Field: image (single file)
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    mut mp: Multipart,
) -> Result<Json<RecipeImageResponse>, AppError> {
    let mut upload = None;
    loop {
        let field = match mp.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return Err(AppError::BadRequest(e.body_text()));
            }
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some(UploadItem { file_name, body });
        break;
    }
    let upload = upload.ok_or_else(|| single_field(IMAGE_FIELD, "No file was submitted."))?;

    let recipe = attach_recipe_image(&state, user_id, id, upload).await?;
    let image = image_url(&state, recipe.image.as_deref())
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(RecipeImageResponse {
        id: recipe.id,
        image,
    }))
}

async fn detail(
    state: &AppState,
    view: crate::recipes::dto::RecipeView,
) -> Result<Json<RecipeDetail>, AppError> {
    let url = image_url(state, view.recipe.image.as_deref()).await?;
    Ok(Json(view.into_detail(url)))
}
