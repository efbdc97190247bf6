use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, ProfileUpdate, PublicUser, RefreshRequest, RegisterRequest, TokenRequest},
        jwt::{AuthUser, JwtKeys},
        services,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/token", post(obtain_token))
        .route("/users/token/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me).put(put_me).patch(patch_me))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = services::register(state.store.as_ref(), payload).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn obtain_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TokenRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = services::authenticate(state.store.as_ref(), &payload.email, &payload.password).await?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    info!(user_id = %user.id, email = %user.email, "token issued");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user = services::load_user(state.store.as_ref(), claims.sub).await?;
    if !user.is_active {
        return Err(AppError::Unauthorized("User inactive.".into()));
    }

    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::load_user(state.store.as_ref(), user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn put_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<ProfileUpdate>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::update_profile(state.store.as_ref(), user_id, payload, true).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn patch_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<ProfileUpdate>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::update_profile(state.store.as_ref(), user_id, payload, false).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::FromRef,
        http::{Method, StatusCode},
    };
    use serde_json::json;
    use uuid::Uuid;

    use crate::auth::jwt::JwtKeys;
    use crate::auth::password::verify_password;
    use crate::auth::repo::UserRepo;
    use crate::testing::{send, TestApp};

    #[tokio::test]
    async fn create_user_returns_created_without_password() {
        let app = TestApp::new();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({"name": "testuser", "email": "test@test.com", "password": "testpassword"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "test@test.com");
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn create_user_short_password_is_rejected() {
        let app = TestApp::new();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({"name": "testuser", "email": "test@test.com", "password": "test"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["password"].is_array());
        assert!(app.store.find_user_by_email("test@test.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_issued_for_valid_credentials() {
        let app = TestApp::new();
        send(
            &app,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({"name": "testuser", "email": "test@test.com", "password": "testpassword"})),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/users/token",
            None,
            Some(json!({"email": "test@test.com", "password": "testpassword"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());
        assert!(body["refresh_token"].is_string());
    }

    #[tokio::test]
    async fn token_rejected_for_bad_or_blank_password() {
        let app = TestApp::new();
        app.user_with_password("email@example.com", "goodpass").await;

        for password in ["wrongpass", ""] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/api/v1/users/token",
                None,
                Some(json!({"email": "email@example.com", "password": password})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.get("access_token").is_none());
        }
    }

    #[tokio::test]
    async fn refresh_issues_new_pair_but_rejects_access_tokens() {
        let app = TestApp::new();
        app.user_with_password("email@example.com", "goodpass").await;
        let (_, body) = send(
            &app,
            Method::POST,
            "/api/v1/users/token",
            None,
            Some(json!({"email": "email@example.com", "password": "goodpass"})),
        )
        .await;

        let (status, refreshed) = send(
            &app,
            Method::POST,
            "/api/v1/users/token/refresh",
            None,
            Some(json!({"refresh_token": body["refresh_token"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(refreshed["user"]["email"], "email@example.com");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/users/token/refresh",
            None,
            Some(json!({"refresh_token": body["access_token"]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_authentication() {
        let app = TestApp::new();
        let (status, _) = send(&app, Method::GET, "/api/v1/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_returns_profile_and_refuses_post() {
        let app = TestApp::new();
        let (user, token) = app.user("test@test.com").await;

        let (status, body) = send(&app, Method::GET, "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "test@test.com");
        assert_eq!(body["name"], user.name);
        assert!(body.get("password").is_none());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/users/me",
            Some(&token),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn patch_me_updates_name_and_password() {
        let app = TestApp::new();
        let (user, token) = app.user("test@test.com").await;

        let (status, body) = send(
            &app,
            Method::PATCH,
            "/api/v1/users/me",
            Some(&token),
            Some(json!({"name": "updated_testuser", "password": "updated_password"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "updated_testuser");

        let stored = app.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "updated_testuser");
        assert!(verify_password("updated_password", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn deactivated_account_loses_access_with_live_token() {
        let app = TestApp::new();
        let (user, token) = app.user("test@test.com").await;
        let (status, _) = send(&app, Method::GET, "/api/v1/recipes", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        app.store.deactivate_user(user.id);

        let (status, _) = send(&app, Method::GET, "/api/v1/recipes", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/recipes",
            Some(&token),
            Some(json!({"title": "Sample recipe", "time_minutes": 10, "price": "5.25"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_for_unknown_user_is_rejected() {
        let app = TestApp::new();
        let token = JwtKeys::from_ref(&app.state)
            .sign_access(Uuid::new_v4())
            .unwrap();
        let (status, _) = send(&app, Method::GET, "/api/v1/recipes", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
