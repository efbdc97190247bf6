use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tags;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::recipe_routes())
        .merge(handlers::upload_routes())
        .merge(tags::tag_routes())
        .merge(tags::ingredient_routes())
}
