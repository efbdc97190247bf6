//! In-process store with the same ownership and uniqueness rules as the
//! PostgreSQL schema. Test-only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::UserRepo;
use crate::auth::repo_types::{NewUser, User, UserChanges};
use crate::recipes::repo::{IngredientRepo, RecipeRepo, TagRepo};
use crate::recipes::repo_types::{
    Ingredient, IngredientChanges, NewRecipe, Recipe, RecipeChanges, RecipeFilter, Tag,
};
use crate::store::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    recipes: BTreeMap<i64, Recipe>,
    tags: BTreeMap<i64, Tag>,
    ingredients: BTreeMap<i64, Ingredient>,
    recipe_tags: BTreeSet<(i64, i64)>,
    recipe_ingredients: BTreeSet<(i64, i64)>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.lock().expect("memory store poisoned");
        f(&mut tables)
    }

    pub fn user_count(&self) -> usize {
        self.with(|t| t.users.len())
    }

    pub fn deactivate_user(&self, id: Uuid) {
        self.with(|t| {
            if let Some(u) = t.users.get_mut(&id) {
                u.is_active = false;
            }
        })
    }

    pub fn recipe_exists(&self, id: i64) -> bool {
        self.with(|t| t.recipes.contains_key(&id))
    }

    pub fn tags_named(&self, owner: Uuid, name: &str) -> usize {
        self.with(|t| {
            t.tags
                .values()
                .filter(|tag| tag.user_id == owner && tag.name == name)
                .count()
        })
    }

    pub fn ingredients_named(&self, owner: Uuid, name: &str) -> usize {
        self.with(|t| {
            t.ingredients
                .values()
                .filter(|i| i.user_id == owner && i.name == name)
                .count()
        })
    }

    /// Seeds a tag directly, bypassing the get-or-create path.
    pub fn insert_tag(&self, owner: Uuid, name: &str) -> Tag {
        self.with(|t| {
            let tag = Tag {
                id: t.next_id(),
                user_id: owner,
                name: name.to_string(),
            };
            t.tags.insert(tag.id, tag.clone());
            tag
        })
    }

    /// Seeds an ingredient directly.
    pub fn insert_ingredient(&self, owner: Uuid, name: &str, quantity: &str) -> Ingredient {
        self.with(|t| {
            let ingredient = Ingredient {
                id: t.next_id(),
                user_id: owner,
                name: name.to_string(),
                quantity: quantity.to_string(),
            };
            t.ingredients.insert(ingredient.id, ingredient.clone());
            ingredient
        })
    }
}

fn owned<'a, T>(
    map: &'a mut BTreeMap<i64, T>,
    id: i64,
    owner: Uuid,
    user_of: impl Fn(&T) -> Uuid,
) -> Option<&'a mut T> {
    map.get_mut(&id).filter(|row| user_of(&**row) == owner)
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        self.with(|t| {
            if t.users.values().any(|u| u.email == new.email) {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
            let user = User {
                id: Uuid::new_v4(),
                email: new.email,
                name: new.name,
                password_hash: new.password_hash,
                is_active: true,
                is_staff: new.is_staff,
                is_superuser: new.is_superuser,
                created_at: OffsetDateTime::now_utc(),
            };
            t.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.with(|t| t.users.values().find(|u| u.email == email).cloned()))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.with(|t| t.users.get(&id).cloned()))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        self.with(|t| {
            if let Some(email) = &changes.email {
                if t.users.values().any(|u| u.id != id && &u.email == email) {
                    return Err(StoreError::Conflict("users_email_key".into()));
                }
            }
            let Some(user) = t.users.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(email) = changes.email {
                user.email = email;
            }
            if let Some(name) = changes.name {
                user.name = name;
            }
            if let Some(hash) = changes.password_hash {
                user.password_hash = hash;
            }
            Ok(Some(user.clone()))
        })
    }
}

#[async_trait]
impl RecipeRepo for MemoryStore {
    async fn list_recipes(&self, owner: Uuid, filter: &RecipeFilter) -> StoreResult<Vec<Recipe>> {
        Ok(self.with(|t| {
            t.recipes
                .values()
                .rev()
                .filter(|r| r.user_id == owner)
                .filter(|r| match &filter.tag_ids {
                    Some(ids) => t
                        .recipe_tags
                        .iter()
                        .any(|(rid, tid)| *rid == r.id && ids.contains(tid)),
                    None => true,
                })
                .filter(|r| match &filter.ingredient_ids {
                    Some(ids) => t
                        .recipe_ingredients
                        .iter()
                        .any(|(rid, iid)| *rid == r.id && ids.contains(iid)),
                    None => true,
                })
                .cloned()
                .collect()
        }))
    }

    async fn get_recipe(&self, owner: Uuid, id: i64) -> StoreResult<Option<Recipe>> {
        Ok(self.with(|t| t.recipes.get(&id).filter(|r| r.user_id == owner).cloned()))
    }

    async fn insert_recipe(&self, owner: Uuid, new: NewRecipe) -> StoreResult<Recipe> {
        Ok(self.with(|t| {
            let recipe = Recipe {
                id: t.next_id(),
                user_id: owner,
                title: new.title,
                time_minutes: new.time_minutes,
                price: new.price,
                description: new.description,
                link: new.link,
                image: None,
                created_at: OffsetDateTime::now_utc(),
            };
            t.recipes.insert(recipe.id, recipe.clone());
            recipe
        }))
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        changes: RecipeChanges,
    ) -> StoreResult<Option<Recipe>> {
        Ok(self.with(|t| {
            let recipe = owned(&mut t.recipes, id, owner, |r| r.user_id)?;
            if let Some(title) = changes.title {
                recipe.title = title;
            }
            if let Some(minutes) = changes.time_minutes {
                recipe.time_minutes = minutes;
            }
            if let Some(price) = changes.price {
                recipe.price = price;
            }
            if let Some(description) = changes.description {
                recipe.description = description;
            }
            if let Some(link) = changes.link {
                recipe.link = link;
            }
            Some(recipe.clone())
        }))
    }

    async fn delete_recipe(&self, owner: Uuid, id: i64) -> StoreResult<Option<Recipe>> {
        Ok(self.with(|t| {
            owned(&mut t.recipes, id, owner, |r| r.user_id)?;
            t.recipe_tags.retain(|(rid, _)| *rid != id);
            t.recipe_ingredients.retain(|(rid, _)| *rid != id);
            t.recipes.remove(&id)
        }))
    }

    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: i64,
        image: Option<&str>,
    ) -> StoreResult<Option<Recipe>> {
        Ok(self.with(|t| {
            let recipe = owned(&mut t.recipes, id, owner, |r| r.user_id)?;
            recipe.image = image.map(str::to_string);
            Some(recipe.clone())
        }))
    }

    async fn set_recipe_tags(&self, recipe_id: i64, tag_ids: &[i64]) -> StoreResult<()> {
        self.with(|t| {
            t.recipe_tags.retain(|(rid, _)| *rid != recipe_id);
            t.recipe_tags
                .extend(tag_ids.iter().map(|tid| (recipe_id, *tid)));
        });
        Ok(())
    }

    async fn set_recipe_ingredients(&self, recipe_id: i64, ingredient_ids: &[i64]) -> StoreResult<()> {
        self.with(|t| {
            t.recipe_ingredients.retain(|(rid, _)| *rid != recipe_id);
            t.recipe_ingredients
                .extend(ingredient_ids.iter().map(|iid| (recipe_id, *iid)));
        });
        Ok(())
    }

    async fn tags_for_recipes(&self, recipe_ids: &[i64]) -> StoreResult<Vec<(i64, Tag)>> {
        Ok(self.with(|t| {
            t.recipe_tags
                .iter()
                .filter(|(rid, _)| recipe_ids.contains(rid))
                .filter_map(|(rid, tid)| t.tags.get(tid).map(|tag| (*rid, tag.clone())))
                .collect()
        }))
    }

    async fn ingredients_for_recipes(
        &self,
        recipe_ids: &[i64],
    ) -> StoreResult<Vec<(i64, Ingredient)>> {
        Ok(self.with(|t| {
            t.recipe_ingredients
                .iter()
                .filter(|(rid, _)| recipe_ids.contains(rid))
                .filter_map(|(rid, iid)| t.ingredients.get(iid).map(|i| (*rid, i.clone())))
                .collect()
        }))
    }
}

#[async_trait]
impl TagRepo for MemoryStore {
    async fn list_tags(&self, owner: Uuid, assigned_only: bool) -> StoreResult<Vec<Tag>> {
        Ok(self.with(|t| {
            let mut tags: Vec<Tag> = t
                .tags
                .values()
                .filter(|tag| tag.user_id == owner)
                .filter(|tag| !assigned_only || t.recipe_tags.iter().any(|(_, tid)| *tid == tag.id))
                .cloned()
                .collect();
            tags.sort_by(|a, b| b.name.cmp(&a.name).then(b.id.cmp(&a.id)));
            tags
        }))
    }

    async fn get_tag(&self, owner: Uuid, id: i64) -> StoreResult<Option<Tag>> {
        Ok(self.with(|t| t.tags.get(&id).filter(|tag| tag.user_id == owner).cloned()))
    }

    async fn get_or_create_tag(&self, owner: Uuid, name: &str) -> StoreResult<Tag> {
        Ok(self.with(|t| {
            if let Some(tag) = t
                .tags
                .values()
                .find(|tag| tag.user_id == owner && tag.name == name)
            {
                return tag.clone();
            }
            let tag = Tag {
                id: t.next_id(),
                user_id: owner,
                name: name.to_string(),
            };
            t.tags.insert(tag.id, tag.clone());
            tag
        }))
    }

    async fn rename_tag(&self, owner: Uuid, id: i64, name: &str) -> StoreResult<Option<Tag>> {
        self.with(|t| {
            if !t.tags.get(&id).is_some_and(|tag| tag.user_id == owner) {
                return Ok(None);
            }
            if t
                .tags
                .values()
                .any(|tag| tag.id != id && tag.user_id == owner && tag.name == name)
            {
                return Err(StoreError::Conflict("tags_user_id_name_key".into()));
            }
            Ok(owned(&mut t.tags, id, owner, |tag| tag.user_id).map(|tag| {
                tag.name = name.to_string();
                tag.clone()
            }))
        })
    }

    async fn delete_tag(&self, owner: Uuid, id: i64) -> StoreResult<bool> {
        Ok(self.with(|t| {
            if owned(&mut t.tags, id, owner, |tag| tag.user_id).is_none() {
                return false;
            }
            t.tags.remove(&id);
            t.recipe_tags.retain(|(_, tid)| *tid != id);
            true
        }))
    }
}

#[async_trait]
impl IngredientRepo for MemoryStore {
    async fn list_ingredients(
        &self,
        owner: Uuid,
        assigned_only: bool,
    ) -> StoreResult<Vec<Ingredient>> {
        Ok(self.with(|t| {
            let mut ingredients: Vec<Ingredient> = t
                .ingredients
                .values()
                .filter(|i| i.user_id == owner)
                .filter(|i| {
                    !assigned_only || t.recipe_ingredients.iter().any(|(_, iid)| *iid == i.id)
                })
                .cloned()
                .collect();
            ingredients.sort_by(|a, b| b.name.cmp(&a.name).then(b.id.cmp(&a.id)));
            ingredients
        }))
    }

    async fn get_or_create_ingredient(
        &self,
        owner: Uuid,
        name: &str,
        quantity: &str,
    ) -> StoreResult<Ingredient> {
        Ok(self.with(|t| {
            if let Some(existing) = t
                .ingredients
                .values()
                .find(|i| i.user_id == owner && i.name == name)
            {
                return existing.clone();
            }
            let ingredient = Ingredient {
                id: t.next_id(),
                user_id: owner,
                name: name.to_string(),
                quantity: quantity.to_string(),
            };
            t.ingredients.insert(ingredient.id, ingredient.clone());
            ingredient
        }))
    }

    async fn update_ingredient(
        &self,
        owner: Uuid,
        id: i64,
        changes: IngredientChanges,
    ) -> StoreResult<Option<Ingredient>> {
        self.with(|t| {
            if !t.ingredients.get(&id).is_some_and(|i| i.user_id == owner) {
                return Ok(None);
            }
            if let Some(name) = &changes.name {
                if t
                    .ingredients
                    .values()
                    .any(|i| i.id != id && i.user_id == owner && &i.name == name)
                {
                    return Err(StoreError::Conflict("ingredients_user_id_name_key".into()));
                }
            }
            Ok(owned(&mut t.ingredients, id, owner, |i| i.user_id).map(|i| {
                if let Some(name) = changes.name {
                    i.name = name;
                }
                if let Some(quantity) = changes.quantity {
                    i.quantity = quantity;
                }
                i.clone()
            }))
        })
    }

    async fn delete_ingredient(&self, owner: Uuid, id: i64) -> StoreResult<bool> {
        Ok(self.with(|t| {
            if owned(&mut t.ingredients, id, owner, |i| i.user_id).is_none() {
                return false;
            }
            t.ingredients.remove(&id);
            t.recipe_ingredients.retain(|(_, iid)| *iid != id);
            true
        }))
    }
}
