use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Extension, Json};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::entities::user::{self, Role};
use crate::error::AppError;
use crate::middleware::auth::{issue_token, AuthUser};
use crate::routes::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id.to_string(),
            username: model.username,
            email: Some(model.email),
            role: model.role,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VerifyResponse {
    pub user: UserProfile,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = LoginResponse),
        (status = 409, description = "Username or email already taken"),
        (status = 400, description = "Invalid input")
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let username = payload.username.trim().to_string();
    if username.len() < 3 {
        return Err(AppError::InvalidInput(
            "Username must be at least 3 characters".to_string(),
        ));
    }
    if payload.password.len() < 6 {
        return Err(AppError::InvalidInput(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    let email = payload.email.trim().to_string();
    if !email.contains('@') {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }

    let taken = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(&username))
                .add(user::Column::Email.eq(&email)),
        )
        .one(&state.db.conn)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(
            "Username or email already taken".to_string(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(format!("Password hash failed: {}", e)))?
        .to_string();

    let now = chrono::Utc::now().naive_utc();
    let id = state
        .db
        .insert_with_generated_id(|id| user::ActiveModel {
            id: Set(id),
            username: Set(username.clone()),
            email: Set(email),
            password: Set(password_hash),
            role: Set(Role::User),
            created_at: Set(now),
        })
        .await?;

    let model = user::Entity::find_by_id(id)
        .one(&state.db.conn)
        .await?
        .ok_or_else(|| AppError::InternalServerError("User row vanished".to_string()))?;

    let token = issue_token(&model)?;
    println!("Auth | POST /auth/register | user={} | res=200", username);
    Ok(Json(LoginResponse {
        token,
        user: model.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = user::Entity::find()
        .filter(user::Column::Username.eq(payload.username.trim()))
        .one(&state.db.conn)
        .await?
        .ok_or_else(|| AppError::AuthInvalid("Invalid username or password".to_string()))?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| AppError::InternalServerError(format!("Stored hash unreadable: {}", e)))?;

    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        println!("Auth | POST /auth/login | user={} | res=401", user.username);
        return Err(AppError::AuthInvalid("Invalid username or password".to_string()));
    }

    let token = issue_token(&user)?;
    println!("Auth | POST /auth/login | user={} | res=200", user.username);
    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/verify",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn verify(
    Extension(auth): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<VerifyResponse>, AppError> {
    // Token claims alone are not enough; the account must still exist.
    let user = user::Entity::find_by_id(auth.id)
        .one(&state.db.conn)
        .await?
        .ok_or_else(|| AppError::AuthInvalid("Account no longer exists".to_string()))?;

    Ok(Json(VerifyResponse { user: user.into() }))
}
