use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::{
        accounts::{self, ActivationOutcome, RegistrationMode},
        activity, mailer, tokens,
    },
    AppState,
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/activate/:email/:code", post(activate))
        .route("/login", post(login))
        .route("/refresh", get(refresh))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me).post(update_profile))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    pub invitation_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub email: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub website: Option<String>,
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .build()
}

async fn register(
    State(state): State<AppState>,
    Query(params): Query<RegisterParams>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    if body.email.is_empty() || !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if body.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let mode = match &params.invitation_token {
        Some(token) => {
            RegistrationMode::Invited(accounts::resolve_invitation(&state.db.pool, token).await?)
        }
        None => RegistrationMode::SelfService,
    };

    let password_hash = hash_password(&body.password)?;
    let user = accounts::register(&state.db.pool, &body.email, &password_hash, mode).await?;

    if let Some(code) = &user.activation_code {
        mailer::dispatch_activation(&state.config.frontend_base_url, &user.email, code);
    }

    Ok(Json(RegisterResponse {
        email: user.email,
        role: user.role,
        is_active: user.is_active,
    }))
}

async fn activate(
    State(state): State<AppState>,
    Path((email, code)): Path<(String, String)>,
) -> Result<Json<Value>> {
    match accounts::activate(&state.db.pool, &email, &code).await? {
        ActivationOutcome::AlreadyActive => Ok(Json(json!({
            "status": "already_active",
            "message": "User is already active"
        }))),
        ActivationOutcome::Activated => Ok(Json(json!({
            "status": "success",
            "message": "Account activated"
        }))),
    }
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>)> {
    // Unknown email and wrong password are indistinguishable to the caller
    let user = sqlx::query_as::<_, (String, String, String, String, bool)>(
        "SELECT id, email, password_hash, role, is_active FROM users WHERE email = ?",
    )
    .bind(&body.email)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let (user_id, email, password_hash, role, is_active) = user;

    if !verify_password(&body.password, &password_hash)? {
        return Err(AppError::Unauthorized);
    }

    if !is_active {
        return Err(AppError::Validation(
            "User is not active, please check your email to activate your account".to_string(),
        ));
    }

    let access_token = tokens::issue_access_token(&state.config, &user_id, &email, &role)?;
    let refresh = tokens::issue_refresh_token(&state.config, &user_id, &email, &role)?;
    tokens::record_session(&state.db.pool, &refresh.jti, &user_id, refresh.expires_at).await?;

    let jar = jar
        .add(auth_cookie("access_token", access_token))
        .add(auth_cookie("refresh_token", refresh.token));

    Ok((jar, Json(json!({ "email": email }))))
}

async fn refresh(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Json<Value>)> {
    let presented = jar
        .get("refresh_token")
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let (claims, old_jti) = tokens::verify_refresh(&state.config, &presented)?;

    // Rotate first: the ledger row moves to the new jti in one
    // conditional update, so a stolen copy of the old token dies here
    let next = tokens::issue_refresh_token(&state.config, &claims.id, &claims.sub, &claims.role)?;
    let rotated =
        tokens::rotate_session(&state.db.pool, &old_jti, &next.jti, next.expires_at).await?;
    if !rotated {
        return Err(AppError::Unauthorized);
    }

    let access_token =
        tokens::issue_access_token(&state.config, &claims.id, &claims.sub, &claims.role)?;

    let jar = jar
        .add(auth_cookie("access_token", access_token))
        .add(auth_cookie("refresh_token", next.token));

    Ok((jar, Json(json!({ "message": "Access token refreshed" }))))
}

async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>)> {
    let presented = jar
        .get("refresh_token")
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let (_, jti) = tokens::verify_refresh(&state.config, &presented)?;
    tokens::revoke_session(&state.db.pool, &jti).await?;

    activity::record(&state.db.pool, &user.id, "USER_LOGOUT").await;

    let jar = jar
        .remove(removal_cookie("access_token"))
        .remove(removal_cookie("refresh_token"));

    Ok((jar, Json(json!({ "message": "Logged out successfully" }))))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<crate::db::models::User>> {
    let profile = sqlx::query_as::<_, crate::db::models::User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<crate::db::models::User>> {
    sqlx::query(
        r#"
        UPDATE users SET
            full_name = COALESCE(?, full_name),
            location = COALESCE(?, location),
            linkedin = COALESCE(?, linkedin),
            github = COALESCE(?, github),
            twitter = COALESCE(?, twitter),
            website = COALESCE(?, website),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&body.full_name)
    .bind(&body.location)
    .bind(&body.linkedin)
    .bind(&body.github)
    .bind(&body.twitter)
    .bind(&body.website)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db.pool)
    .await?;

    activity::record(&state.db.pool, &user.id, "USER_UPDATE").await;

    me(State(state), user).await
}
