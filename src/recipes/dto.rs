use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::recipes::repo_types::{Ingredient, Recipe, Tag};

#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientInput {
    pub name: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub quantity: Option<String>,
}

/// Body of POST/PUT/PATCH on recipes. A present `tags`/`ingredients`
/// list (even empty) replaces that relation; an absent one is left alone.
/// `description` and `link` are tri-state: absent keeps the stored value,
/// `null` clears it. Unknown fields such as `user` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipePayload {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub link: Option<Option<String>>,
    pub tags: Option<Vec<TagInput>>,
    pub ingredients: Option<Vec<IngredientInput>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagUpdate {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngredientUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub quantity: Option<String>,
}

/// `?tags=1,2&ingredients=3`
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

/// `?assigned_only=1`
#[derive(Debug, Default, Deserialize)]
pub struct AssignedQuery {
    pub assigned_only: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagDto {
    pub id: i64,
    pub name: String,
}

impl From<Tag> for TagDto {
    fn from(t: Tag) -> Self {
        Self { id: t.id, name: t.name }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientDto {
    pub id: i64,
    pub name: String,
    pub quantity: String,
}

impl From<Ingredient> for IngredientDto {
    fn from(i: Ingredient) -> Self {
        Self {
            id: i.id,
            name: i.name,
            quantity: i.quantity,
        }
    }
}

/// List representation.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<TagDto>,
    pub ingredients: Vec<IngredientDto>,
}

/// Detail representation: the summary plus description and image URL.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub summary: RecipeSummary,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecipeImageResponse {
    pub id: i64,
    pub image: String,
}

/// A recipe with its resolved relations.
#[derive(Debug, Clone)]
pub struct RecipeView {
    pub recipe: Recipe,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<Ingredient>,
}

impl RecipeView {
    pub fn into_summary(self) -> RecipeSummary {
        RecipeSummary {
            id: self.recipe.id,
            title: self.recipe.title,
            time_minutes: self.recipe.time_minutes,
            price: self.recipe.price,
            link: self.recipe.link,
            tags: self.tags.into_iter().map(Into::into).collect(),
            ingredients: self.ingredients.into_iter().map(Into::into).collect(),
        }
    }

    /// `image_url` is the storage backend's URL for `recipe.image`.
    pub fn into_detail(self, image_url: Option<String>) -> RecipeDetail {
        let description = self.recipe.description.clone();
        RecipeDetail {
            summary: self.into_summary(),
            description,
            image: image_url,
        }
    }
}

/// Only called for a present field, so `null` becomes `Some(None)`.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Accepts `"15"` as well as `15` for free-text quantities.
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<TextOrNumber>::deserialize(deserializer)?.map(|v| match v {
        TextOrNumber::Text(s) => s,
        TextOrNumber::Number(n) => n.to_string(),
    }))
}
