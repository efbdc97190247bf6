use async_trait::async_trait;
use uuid::Uuid;

use crate::recipes::repo_types::{
    Ingredient, IngredientChanges, NewRecipe, Recipe, RecipeChanges, RecipeFilter, Tag,
};
use crate::store::{PgStore, StoreResult};

const RECIPE_COLUMNS: &str =
    "id, user_id, title, time_minutes, price, description, link, image, created_at";

/// Every method taking `owner` only sees rows owned by that user; a row
/// owned by someone else behaves exactly like a missing one.
#[async_trait]
pub trait RecipeRepo: Send + Sync {
    /// Newest first (descending id).
    async fn list_recipes(&self, owner: Uuid, filter: &RecipeFilter) -> StoreResult<Vec<Recipe>>;
    async fn get_recipe(&self, owner: Uuid, id: i64) -> StoreResult<Option<Recipe>>;
    async fn insert_recipe(&self, owner: Uuid, new: NewRecipe) -> StoreResult<Recipe>;
    async fn update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        changes: RecipeChanges,
    ) -> StoreResult<Option<Recipe>>;
    /// Returns the deleted row.
    async fn delete_recipe(&self, owner: Uuid, id: i64) -> StoreResult<Option<Recipe>>;
    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: i64,
        image: Option<&str>,
    ) -> StoreResult<Option<Recipe>>;

    /// Replaces all tag links of the recipe; duplicate ids collapse.
    async fn set_recipe_tags(&self, recipe_id: i64, tag_ids: &[i64]) -> StoreResult<()>;
    /// Replaces all ingredient links of the recipe; duplicate ids collapse.
    async fn set_recipe_ingredients(&self, recipe_id: i64, ingredient_ids: &[i64]) -> StoreResult<()>;
    /// `(recipe_id, tag)` pairs for the given recipes.
    async fn tags_for_recipes(&self, recipe_ids: &[i64]) -> StoreResult<Vec<(i64, Tag)>>;
    /// `(recipe_id, ingredient)` pairs for the given recipes.
    async fn ingredients_for_recipes(
        &self,
        recipe_ids: &[i64],
    ) -> StoreResult<Vec<(i64, Ingredient)>>;
}

#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Descending name. `assigned_only` keeps tags linked to a recipe.
    async fn list_tags(&self, owner: Uuid, assigned_only: bool) -> StoreResult<Vec<Tag>>;
    async fn get_tag(&self, owner: Uuid, id: i64) -> StoreResult<Option<Tag>>;
    async fn get_or_create_tag(&self, owner: Uuid, name: &str) -> StoreResult<Tag>;
    /// `StoreError::Conflict` when the owner already has a tag with that name.
    async fn rename_tag(&self, owner: Uuid, id: i64, name: &str) -> StoreResult<Option<Tag>>;
    async fn delete_tag(&self, owner: Uuid, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait IngredientRepo: Send + Sync {
    /// Descending name. `assigned_only` keeps ingredients linked to a recipe.
    async fn list_ingredients(&self, owner: Uuid, assigned_only: bool)
        -> StoreResult<Vec<Ingredient>>;
    /// Matches on (owner, name). `quantity` is only used for a new row.
    async fn get_or_create_ingredient(
        &self,
        owner: Uuid,
        name: &str,
        quantity: &str,
    ) -> StoreResult<Ingredient>;
    async fn update_ingredient(
        &self,
        owner: Uuid,
        id: i64,
        changes: IngredientChanges,
    ) -> StoreResult<Option<Ingredient>>;
    async fn delete_ingredient(&self, owner: Uuid, id: i64) -> StoreResult<bool>;
}

#[async_trait]
impl RecipeRepo for PgStore {
    async fn list_recipes(&self, owner: Uuid, filter: &RecipeFilter) -> StoreResult<Vec<Recipe>> {
        let rows = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            SELECT {RECIPE_COLUMNS}
              FROM recipes r
             WHERE r.user_id = $1
               AND ($2::BIGINT[] IS NULL OR EXISTS (
                     SELECT 1 FROM recipe_tags rt
                      WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
               AND ($3::BIGINT[] IS NULL OR EXISTS (
                     SELECT 1 FROM recipe_ingredients ri
                      WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
             ORDER BY r.id DESC
            "#
        ))
        .bind(owner)
        .bind(filter.tag_ids.as_deref())
        .bind(filter.ingredient_ids.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_recipe(&self, owner: Uuid, id: i64) -> StoreResult<Option<Recipe>> {
        let row = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_recipe(&self, owner: Uuid, new: NewRecipe) -> StoreResult<Recipe> {
        let row = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            INSERT INTO recipes (user_id, title, time_minutes, price, description, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(&new.title)
        .bind(new.time_minutes)
        .bind(new.price)
        .bind(&new.description)
        .bind(&new.link)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        changes: RecipeChanges,
    ) -> StoreResult<Option<Recipe>> {
        // nullable columns carry a "present" flag so NULL can be written
        let set_description = changes.description.is_some();
        let set_link = changes.link.is_some();
        let row = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            UPDATE recipes
               SET title = COALESCE($3, title),
                   time_minutes = COALESCE($4, time_minutes),
                   price = COALESCE($5, price),
                   description = CASE WHEN $6 THEN $7 ELSE description END,
                   link = CASE WHEN $8 THEN $9 ELSE link END
             WHERE id = $1 AND user_id = $2
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(changes.title)
        .bind(changes.time_minutes)
        .bind(changes.price)
        .bind(set_description)
        .bind(changes.description.flatten())
        .bind(set_link)
        .bind(changes.link.flatten())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_recipe(&self, owner: Uuid, id: i64) -> StoreResult<Option<Recipe>> {
        let row = sqlx::query_as::<_, Recipe>(&format!(
            "DELETE FROM recipes WHERE id = $1 AND user_id = $2 RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: i64,
        image: Option<&str>,
    ) -> StoreResult<Option<Recipe>> {
        let row = sqlx::query_as::<_, Recipe>(&format!(
            "UPDATE recipes SET image = $3 WHERE id = $1 AND user_id = $2 RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_recipe_tags(&self, recipe_id: i64, tag_ids: &[i64]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO recipe_tags (recipe_id, tag_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(recipe_id)
        .bind(tag_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_recipe_ingredients(&self, recipe_id: i64, ingredient_ids: &[i64]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO recipe_ingredients (recipe_id, ingredient_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(recipe_id)
        .bind(ingredient_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn tags_for_recipes(&self, recipe_ids: &[i64]) -> StoreResult<Vec<(i64, Tag)>> {
        let rows = sqlx::query_as::<_, (i64, i64, Uuid, String)>(
            r#"
            SELECT rt.recipe_id, t.id, t.user_id, t.name
              FROM recipe_tags rt
              JOIN tags t ON t.id = rt.tag_id
             WHERE rt.recipe_id = ANY($1)
             ORDER BY t.id
            "#,
        )
        .bind(recipe_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(recipe_id, id, user_id, name)| (recipe_id, Tag { id, user_id, name }))
            .collect())
    }

    async fn ingredients_for_recipes(
        &self,
        recipe_ids: &[i64],
    ) -> StoreResult<Vec<(i64, Ingredient)>> {
        let rows = sqlx::query_as::<_, (i64, i64, Uuid, String, String)>(
            r#"
            SELECT ri.recipe_id, i.id, i.user_id, i.name, i.quantity
              FROM recipe_ingredients ri
              JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE ri.recipe_id = ANY($1)
             ORDER BY i.id
            "#,
        )
        .bind(recipe_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(recipe_id, id, user_id, name, quantity)| {
                (recipe_id, Ingredient { id, user_id, name, quantity })
            })
            .collect())
    }
}

#[async_trait]
impl TagRepo for PgStore {
    async fn list_tags(&self, owner: Uuid, assigned_only: bool) -> StoreResult<Vec<Tag>> {
        let rows = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.user_id, t.name
              FROM tags t
             WHERE t.user_id = $1
               AND (NOT $2 OR EXISTS (SELECT 1 FROM recipe_tags rt WHERE rt.tag_id = t.id))
             ORDER BY t.name DESC, t.id DESC
            "#,
        )
        .bind(owner)
        .bind(assigned_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_tag(&self, owner: Uuid, id: i64) -> StoreResult<Option<Tag>> {
        let row = sqlx::query_as::<_, Tag>(
            "SELECT id, user_id, name FROM tags WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_or_create_tag(&self, owner: Uuid, name: &str) -> StoreResult<Tag> {
        // the no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (user_id, name)
            VALUES ($1, $2)
            ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, user_id, name
            "#,
        )
        .bind(owner)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn rename_tag(&self, owner: Uuid, id: i64, name: &str) -> StoreResult<Option<Tag>> {
        let row = sqlx::query_as::<_, Tag>(
            "UPDATE tags SET name = $3 WHERE id = $1 AND user_id = $2 RETURNING id, user_id, name",
        )
        .bind(id)
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_tag(&self, owner: Uuid, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM tags WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl IngredientRepo for PgStore {
    async fn list_ingredients(
        &self,
        owner: Uuid,
        assigned_only: bool,
    ) -> StoreResult<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, Ingredient>(
            r#"
            SELECT i.id, i.user_id, i.name, i.quantity
              FROM ingredients i
             WHERE i.user_id = $1
               AND (NOT $2 OR EXISTS (
                     SELECT 1 FROM recipe_ingredients ri WHERE ri.ingredient_id = i.id))
             ORDER BY i.name DESC, i.id DESC
            "#,
        )
        .bind(owner)
        .bind(assigned_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_or_create_ingredient(
        &self,
        owner: Uuid,
        name: &str,
        quantity: &str,
    ) -> StoreResult<Ingredient> {
        let row = sqlx::query_as::<_, Ingredient>(
            r#"
            INSERT INTO ingredients (user_id, name, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, user_id, name, quantity
            "#,
        )
        .bind(owner)
        .bind(name)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_ingredient(
        &self,
        owner: Uuid,
        id: i64,
        changes: IngredientChanges,
    ) -> StoreResult<Option<Ingredient>> {
        let row = sqlx::query_as::<_, Ingredient>(
            r#"
            UPDATE ingredients
               SET name = COALESCE($3, name),
                   quantity = COALESCE($4, quantity)
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, quantity
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(changes.name)
        .bind(changes.quantity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_ingredient(&self, owner: Uuid, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM ingredients WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
