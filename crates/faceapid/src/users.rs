//! Registered users, stored in SQLite.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::password::{self, PasswordError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT    NOT NULL UNIQUE,
    password_hash TEXT    NOT NULL,
    created_at    TEXT    NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1
);
";

#[derive(Error, Debug)]
pub enum UserStoreError {
    #[error("Email already registered")]
    EmailTaken,
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("password worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A registered account. The password hash is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: String,
    pub is_active: bool,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
            is_active: row.get(4)?,
        })
    }
}

/// Outcome of checking a login attempt.
#[derive(Debug)]
pub enum Login {
    Ok(User),
    Inactive(User),
    InvalidCredentials,
}

#[derive(Clone)]
pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, UserStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "user database opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, UserStoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, UserStoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Create an active account. Emails are stored trimmed and lowercased.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, UserStoreError> {
        let email = normalize_email(email);
        let password = password.to_owned();
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&password)).await??;
        let created_at = Utc::now().to_rfc3339();

        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO users (email, password_hash, created_at, is_active) VALUES (?1, ?2, ?3, 1)",
                    params![email, password_hash, created_at],
                );
                match result {
                    Ok(_) => Ok(Some(User {
                        id: conn.last_insert_rowid(),
                        email,
                        password_hash,
                        created_at,
                        is_active: true,
                    })),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        let user = inserted.ok_or(UserStoreError::EmailTaken)?;
        tracing::info!(user_id = user.id, "user registered");
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        let email = normalize_email(email);
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, email, password_hash, created_at, is_active FROM users WHERE email = ?1",
                        params![email],
                        User::from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// Check an email/password pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<Login, UserStoreError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(Login::InvalidCredentials);
        };

        let password = password.to_owned();
        let hash = user.password_hash.clone();
        let valid =
            tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
                .await?;

        Ok(match (valid, user.is_active) {
            (false, _) => Login::InvalidCredentials,
            (true, false) => Login::Inactive(user),
            (true, true) => Login::Ok(user),
        })
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A single `@` with non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
