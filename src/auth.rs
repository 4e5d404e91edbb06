use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use bcrypt::{BcryptError, DEFAULT_COST, hash, verify};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_sessions::Session;
use tower_sessions::session::Error as SessionError;
use validator::{Validate, ValidationErrors};

use crate::db::DbPool;
use crate::model::{NewUser, User};
use crate::schema::users;
use crate::utils::session::set_user_session;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("{0}")]
    ValidationError(String),
    #[error("Database error")]
    DatabaseError(#[from] DieselError),
    #[error("Hashing error")]
    HashingError(#[from] BcryptError),
    #[error("Session error: {0}")]
    SessionError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::EmailTaken => (StatusCode::CONFLICT, self.to_string()),
            AuthError::ValidationError(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AuthError::DatabaseError(e) => {
                log::error!("Database error during auth: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AuthError::HashingError(_) | AuthError::SessionError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = json!({
            "error": message,
            "status": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        AuthError::SessionError(err.to_string())
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(err: ValidationErrors) -> Self {
        AuthError::ValidationError(err.to_string())
    }
}

impl From<r2d2::Error> for AuthError {
    fn from(err: r2d2::Error) -> Self {
        AuthError::SessionError(format!("Failed to get DB connection: {}", err))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[axum::debug_handler]
pub async fn handle_register(
    State(pool): State<DbPool>,
    session: Session,
    Json(form): Json<RegisterForm>,
) -> Result<Json<serde_json::Value>, AuthError> {
    form.validate()?;

    let mut conn = pool.get()?;

    let existing_user = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)
        .optional()?;

    if existing_user.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let hashed_password = hash(&form.password, DEFAULT_COST)?;

    diesel::insert_into(users::table)
        .values(&NewUser {
            email: &form.email,
            username: &form.username,
            password: &hashed_password,
        })
        .execute(&mut conn)?;

    let user = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)?;

    set_user_session(&session, user.user_id, &user.email).await?;

    Ok(Json(json!({ "success": true, "user_id": user.user_id })))
}

#[axum::debug_handler]
pub async fn handle_login(
    State(pool): State<DbPool>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let mut conn = pool.get()?;

    let user = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)
        .optional()?;

    if let Some(user) = user {
        if verify(&form.password, &user.password)? {
            set_user_session(&session, user.user_id, &user.email).await?;
            return Ok(Json(json!({ "success": true, "user_id": user.user_id })));
        }
    }

    Err(AuthError::InvalidCredentials)
}

#[axum::debug_handler]
pub async fn handle_logout(session: Session) -> Result<Json<serde_json::Value>, AuthError> {
    session.flush().await?;
    Ok(Json(json!({ "success": true })))
}

pub fn auth_router(pool: DbPool) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/logout", get(handle_logout))
        .with_state(pool)
}
