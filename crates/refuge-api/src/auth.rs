use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use refuge_db::Database;
use refuge_gateway::Dispatcher;
use refuge_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use refuge_types::models::{Role, User};

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub token_days: i64,
}

impl AppStateInner {
    /// Runs blocking database work off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }
}

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.name = req.name.trim().to_string();
    req.email = req.email.trim().to_lowercase();

    if req.name.is_empty() || req.name.len() > 100 {
        return Err(ApiError::validation("Name must be between 1 and 100 characters"));
    }
    if !req.email.contains('@') {
        return Err(ApiError::validation("A valid email is required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    // Admin accounts are provisioned out of band.
    if req.role == Some(Role::Admin) {
        return Err(ApiError::forbidden("Cannot self-register as admin"));
    }

    let email = req.email.clone();
    if state.blocking(move |db| db.get_user_by_email(&email)).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state.blocking(move |db| db.create_user(&req, &password_hash)).await?;
    let token = create_token(&state, &user)?;

    info!("Registered {} ({}) as {}", user.name, user.id, user.role);
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();
    let row = state
        .blocking(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".into()))?;

    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| anyhow::anyhow!("Stored password hash is unreadable: {}", e))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("Invalid email or password".into()))?;

    let token = create_token(&state, &row.user)?;
    Ok(Json(AuthResponse {
        token,
        user: row.user,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<User>> {
    let user_id = claims.sub;
    state
        .blocking(move |db| db.get_user_by_id(user_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User"))
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn create_token(state: &AppStateInner, user: &User) -> anyhow::Result<String> {
    issue_token(&state.jwt_secret, user.id, &user.name, user.role, state.token_days)
}

pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    name: &str,
    role: Role,
    days: i64,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
