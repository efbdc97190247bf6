use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use image::ImageFormat;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{single_field, AppError};
use crate::recipes::repo_types::Recipe;
use crate::recipes::services::owned_recipe;
use crate::state::AppState;

const RECIPE_IMAGE_PREFIX: &str = "uploads/recipe";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// One file taken from the `image` multipart field.
pub struct UploadItem {
    pub file_name: Option<String>,
    pub body: Bytes,
}

/// Detects the format from the leading bytes and checks the file decodes.
pub fn sniff_image(body: &[u8]) -> Result<ImageFormat, AppError> {
    if body.is_empty() {
        return Err(single_field("image", "The submitted file is empty."));
    }
    let format = image::guess_format(body).map_err(|_| single_field("image", INVALID_IMAGE))?;
    image::load_from_memory_with_format(body, format)
        .map_err(|_| single_field("image", INVALID_IMAGE))?;
    Ok(format)
}

/// `uploads/recipe/<uuid>.<ext>`. The client's extension is kept only when it
/// names the detected format, since the key's extension decides how the blob
/// is served.
pub fn recipe_image_key(file_name: Option<&str>, format: ImageFormat) -> String {
    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| ImageFormat::from_extension(e) == Some(format))
        .unwrap_or_else(|| ext_from_format(format).to_string());
    format!("{}/{}.{}", RECIPE_IMAGE_PREFIX, Uuid::new_v4(), ext)
}

fn ext_from_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Ico => "ico",
        _ => "bin",
    }
}

fn mime_from_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Validates and stores the upload, then points the recipe at it. The
/// previous blob, if any, is removed best-effort.
pub async fn attach_recipe_image(
    st: &AppState,
    owner: Uuid,
    recipe_id: i64,
    upload: UploadItem,
) -> Result<Recipe, AppError> {
    let current = owned_recipe(st.store.as_ref(), owner, recipe_id).await?;
    let format = sniff_image(&upload.body)?;
    let key = recipe_image_key(upload.file_name.as_deref(), format);

    st.storage
        .put_object(&key, upload.body, mime_from_format(format))
        .await
        .with_context(|| format!("put_object {}", key))?;

    let recipe = st
        .store
        .set_recipe_image(owner, recipe_id, Some(&key))
        .await?
        .ok_or(AppError::NotFound)?;
    info!(recipe_id, %key, "recipe image stored");

    if let Some(old) = current.image.filter(|old| old != &key) {
        remove_image(st, &old).await;
    }
    Ok(recipe)
}

/// Public URL of a stored image key.
pub async fn image_url(st: &AppState, key: Option<&str>) -> Result<Option<String>, AppError> {
    match key {
        Some(key) => Ok(Some(
            st.storage
                .url(key)
                .await
                .with_context(|| format!("url for image {}", key))?,
        )),
        None => Ok(None),
    }
}

pub async fn remove_image(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete image blob");
    }
}
