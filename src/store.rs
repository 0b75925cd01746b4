//! User credential storage.
//!
//! [`UserStore`] is the seam between the account handlers and persistence.
//! [`InMemoryUserStore`] backs tests and local development; a SQL-backed
//! implementation lives outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// Serialized `pbkdf2_sha256$<iterations>$<salt>$<hash>`
    pub password_hash: String,
    pub is_staff: bool,
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub is_staff: bool,
}

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("A user with email {0} already exists")]
    DuplicateEmail(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail(_) => {
                AppError::Conflict("A user with that email already exists".to_string())
            }
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Create a user; fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

/// `tokio::sync::RwLock`-guarded map keyed by normalized email.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&normalize_email(email)).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let key = normalize_email(&user.email);
        let mut users = self.users.write().await;

        if users.contains_key(&key) {
            return Err(StoreError::DuplicateEmail(user.email));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            is_staff: user.is_staff,
        };
        users.insert(key, created.clone());

        Ok(created)
    }
}
