//! Registration and login.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::users::{self, Login, User, UserStoreError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl Credentials {
    /// Email and password, both non-empty.
    fn required(self) -> Result<(String, String)> {
        match (self.email, self.password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Ok((email, password))
            }
            _ => Err(ApiError::BadRequest("Email and password are required".to_string())),
        }
    }
}

#[derive(Serialize)]
pub struct Registered {
    success: bool,
    message: &'static str,
    user: User,
}

#[derive(Serialize)]
pub struct LoggedIn {
    success: bool,
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
    user: User,
}

pub async fn register(
    State(state): State<AppState>,
    body: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<Registered>)> {
    let Json(credentials) = body?;
    let (email, password) = credentials.required()?;
    if !users::is_valid_email(email.trim()) {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }

    let user = state.users.register(&email, &password).await.map_err(|err| match err {
        UserStoreError::EmailTaken => ApiError::Conflict(err.to_string()),
        other => ApiError::failed("Registration", other),
    })?;

    Ok((
        StatusCode::CREATED,
        Json(Registered {
            success: true,
            message: "User registered",
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<LoggedIn>> {
    let Json(credentials) = body?;
    let (email, password) = credentials.required()?;

    let user = match state
        .users
        .login(&email, &password)
        .await
        .map_err(|e| ApiError::failed("Login", e))?
    {
        Login::Ok(user) => user,
        Login::Inactive(user) => {
            tracing::info!(user_id = user.id, "login refused for inactive account");
            return Err(ApiError::Forbidden("Account is disabled".to_string()));
        }
        Login::InvalidCredentials => {
            return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
        }
    };

    let access_token = state
        .tokens
        .create(user.id, &user.email)
        .map_err(|e| ApiError::failed("Login", e))?;
    tracing::info!(user_id = user.id, "token issued");

    Ok(Json(LoggedIn {
        success: true,
        access_token,
        token_type: "Bearer",
        expires_in: state.tokens.ttl_secs(),
        user,
    }))
}
