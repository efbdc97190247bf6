use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{single_field, AppError, FieldErrors};
use crate::recipes::dto::{IngredientInput, RecipeListQuery, RecipePayload, RecipeView, TagInput};
use crate::recipes::repo::{IngredientRepo, RecipeRepo, TagRepo};
use crate::recipes::repo_types::{NewRecipe, Recipe, RecipeChanges, RecipeFilter};
use crate::store::Store;

const MAX_TEXT_LEN: usize = 255;
const PRICE_MAX_DIGITS: u32 = 5;
const PRICE_DECIMAL_PLACES: u32 = 2;

/// PUT replaces every required scalar; PATCH any subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Full,
    Partial,
}

pub async fn list_recipes(
    store: &dyn Store,
    owner: Uuid,
    query: &RecipeListQuery,
) -> Result<Vec<RecipeView>, AppError> {
    let filter = RecipeFilter {
        tag_ids: parse_ids("tags", query.tags.as_deref())?,
        ingredient_ids: parse_ids("ingredients", query.ingredients.as_deref())?,
    };
    let recipes = store.list_recipes(owner, &filter).await?;
    debug!(count = recipes.len(), ?filter, "recipes listed");
    with_relations(store, recipes).await
}

/// Not-found for both missing and foreign recipes.
pub async fn get_recipe(store: &dyn Store, owner: Uuid, id: i64) -> Result<RecipeView, AppError> {
    let recipe = owned_recipe(store, owner, id).await?;
    single_view(store, recipe).await
}

pub async fn owned_recipe(store: &dyn Store, owner: Uuid, id: i64) -> Result<Recipe, AppError> {
    store.get_recipe(owner, id).await?.ok_or(AppError::NotFound)
}

pub async fn create_recipe(
    store: &dyn Store,
    owner: Uuid,
    payload: RecipePayload,
) -> Result<RecipeView, AppError> {
    let new = validate_new(&payload)?;
    validate_relations(&payload)?;

    let recipe = store.insert_recipe(owner, new).await?;
    apply_relations(store, owner, recipe.id, &payload).await?;
    info!(recipe_id = recipe.id, %owner, "recipe created");
    single_view(store, recipe).await
}

pub async fn update_recipe(
    store: &dyn Store,
    owner: Uuid,
    id: i64,
    payload: RecipePayload,
    mode: UpdateMode,
) -> Result<RecipeView, AppError> {
    let changes = match mode {
        UpdateMode::Full => {
            let new = validate_new(&payload)?;
            RecipeChanges {
                title: Some(new.title),
                time_minutes: Some(new.time_minutes),
                price: Some(new.price),
                description: payload.description.clone(),
                link: payload.link.clone(),
            }
        }
        UpdateMode::Partial => validate_changes(&payload)?,
    };
    validate_relations(&payload)?;

    // ownership check before any relation is touched
    let current = owned_recipe(store, owner, id).await?;
    apply_relations(store, owner, current.id, &payload).await?;

    let recipe = if changes.is_empty() {
        current
    } else {
        store
            .update_recipe(owner, id, changes)
            .await?
            .ok_or(AppError::NotFound)?
    };
    info!(recipe_id = recipe.id, %owner, ?mode, "recipe updated");
    single_view(store, recipe).await
}

/// Returns the deleted row so the caller can drop its image blob.
pub async fn delete_recipe(store: &dyn Store, owner: Uuid, id: i64) -> Result<Recipe, AppError> {
    let recipe = store
        .delete_recipe(owner, id)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(recipe_id = id, %owner, "recipe deleted");
    Ok(recipe)
}

/// Replaces the tag and/or ingredient links named in the payload. Each
/// entry is matched on (owner, name) and created when missing.
async fn apply_relations(
    store: &dyn Store,
    owner: Uuid,
    recipe_id: i64,
    payload: &RecipePayload,
) -> Result<(), AppError> {
    if let Some(tags) = &payload.tags {
        let ids = resolve_tags(store, owner, tags).await?;
        store.set_recipe_tags(recipe_id, &ids).await?;
    }
    if let Some(ingredients) = &payload.ingredients {
        let ids = resolve_ingredients(store, owner, ingredients).await?;
        store.set_recipe_ingredients(recipe_id, &ids).await?;
    }
    Ok(())
}

async fn resolve_tags(store: &dyn Store, owner: Uuid, tags: &[TagInput]) -> Result<Vec<i64>, AppError> {
    let mut ids: Vec<i64> = Vec::with_capacity(tags.len());
    for input in tags {
        let tag = store.get_or_create_tag(owner, input.name.trim()).await?;
        if !ids.contains(&tag.id) {
            ids.push(tag.id);
        }
    }
    Ok(ids)
}

async fn resolve_ingredients(
    store: &dyn Store,
    owner: Uuid,
    ingredients: &[IngredientInput],
) -> Result<Vec<i64>, AppError> {
    let mut ids: Vec<i64> = Vec::with_capacity(ingredients.len());
    for input in ingredients {
        let quantity = input.quantity.as_deref().unwrap_or("").trim();
        let ingredient = store
            .get_or_create_ingredient(owner, input.name.trim(), quantity)
            .await?;
        if !ids.contains(&ingredient.id) {
            ids.push(ingredient.id);
        }
    }
    Ok(ids)
}

async fn single_view(store: &dyn Store, recipe: Recipe) -> Result<RecipeView, AppError> {
    let mut views = with_relations(store, vec![recipe]).await?;
    views.pop().ok_or(AppError::NotFound)
}

/// Loads relations for all recipes in two queries, preserving order.
async fn with_relations(store: &dyn Store, recipes: Vec<Recipe>) -> Result<Vec<RecipeView>, AppError> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();

    let mut tags: HashMap<i64, Vec<_>> = HashMap::new();
    for (recipe_id, tag) in store.tags_for_recipes(&ids).await? {
        tags.entry(recipe_id).or_default().push(tag);
    }
    let mut ingredients: HashMap<i64, Vec<_>> = HashMap::new();
    for (recipe_id, ingredient) in store.ingredients_for_recipes(&ids).await? {
        ingredients.entry(recipe_id).or_default().push(ingredient);
    }

    Ok(recipes
        .into_iter()
        .map(|recipe| RecipeView {
            tags: tags.remove(&recipe.id).unwrap_or_default(),
            ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
            recipe,
        })
        .collect())
}

/// Parses a comma-separated id list; `None` and `""` mean no filter.
pub fn parse_ids(field: &str, raw: Option<&str>) -> Result<Option<Vec<i64>>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
        .map_err(|_| single_field(field, "Expected a comma-separated list of integer ids."))
}

/// `assigned_only` must be an integer; anything non-zero enables it.
pub fn parse_flag(field: &str, raw: Option<&str>) -> Result<bool, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) => v
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| single_field(field, "Expected an integer.")),
    }
}

fn validate_new(payload: &RecipePayload) -> Result<NewRecipe, AppError> {
    let mut errors = FieldErrors::new();
    if payload.title.is_none() {
        errors.add("title", "This field is required.");
    }
    if payload.time_minutes.is_none() {
        errors.add("time_minutes", "This field is required.");
    }
    if payload.price.is_none() {
        errors.add("price", "This field is required.");
    }
    check_scalars(&mut errors, payload);
    errors.into_result()?;

    match (&payload.title, payload.time_minutes, payload.price) {
        (Some(title), Some(time_minutes), Some(price)) => Ok(NewRecipe {
            title: title.trim().to_string(),
            time_minutes,
            price,
            description: payload.description.clone().flatten(),
            link: payload.link.clone().flatten(),
        }),
        _ => Err(AppError::BadRequest("Invalid input.".into())),
    }
}

fn validate_changes(payload: &RecipePayload) -> Result<RecipeChanges, AppError> {
    let mut errors = FieldErrors::new();
    check_scalars(&mut errors, payload);
    errors.into_result()?;

    Ok(RecipeChanges {
        title: payload.title.as_deref().map(|t| t.trim().to_string()),
        time_minutes: payload.time_minutes,
        price: payload.price,
        description: payload.description.clone(),
        link: payload.link.clone(),
    })
}

fn check_scalars(errors: &mut FieldErrors, payload: &RecipePayload) {
    if let Some(title) = &payload.title {
        check_text(errors, "title", title);
    }
    if let Some(minutes) = payload.time_minutes {
        if minutes < 0 {
            errors.add("time_minutes", "Ensure this value is greater than or equal to 0.");
        }
    }
    if let Some(price) = payload.price {
        check_price(errors, price);
    }
    if let Some(Some(link)) = &payload.link {
        if link.chars().count() > MAX_TEXT_LEN {
            errors.add(
                "link",
                format!("Ensure this field has no more than {MAX_TEXT_LEN} characters."),
            );
        }
    }
}

fn validate_relations(payload: &RecipePayload) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    for tag in payload.tags.iter().flatten() {
        check_text(&mut errors, "tags", &tag.name);
    }
    for ingredient in payload.ingredients.iter().flatten() {
        check_text(&mut errors, "ingredients", &ingredient.name);
        if let Some(q) = &ingredient.quantity {
            if q.chars().count() > MAX_TEXT_LEN {
                errors.add(
                    "ingredients",
                    format!("Quantity may not exceed {MAX_TEXT_LEN} characters."),
                );
            }
        }
    }
    errors.into_result()
}

pub(crate) fn check_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > MAX_TEXT_LEN {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_TEXT_LEN} characters."),
        );
    }
}

/// NUMERIC(5, 2): at most two decimal places and three integer digits.
fn check_price(errors: &mut FieldErrors, price: Decimal) {
    let price = price.normalize();
    if price.scale() > PRICE_DECIMAL_PLACES {
        errors.add(
            "price",
            format!("Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."),
        );
    }
    let limit = Decimal::from(10_i64.pow(PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES));
    if price.abs() >= limit {
        errors.add(
            "price",
            format!("Ensure that there are no more than {PRICE_MAX_DIGITS} digits in total."),
        );
    }
}
