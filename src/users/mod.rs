//! User directory: identity lookup and lazy creation on first verification.

mod memory;
mod repo;

pub use memory::MemoryUserRepository;
pub use repo::{is_unique_violation, PgUserRepository};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub mobile: String,
    pub national_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub mobile: String,
    pub national_id: Option<String>,
}

/// Outcome when attempting to create a user.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    Conflict,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<User>>;

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<User>>;

    /// Insert a user; a clash on mobile or national id yields [`CreateUserOutcome::Conflict`].
    async fn create(&self, user: NewUser) -> Result<CreateUserOutcome>;
}
