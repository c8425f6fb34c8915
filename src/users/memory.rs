use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CreateUserOutcome, NewUser, User, UserRepository};

/// Single-process user directory for development and tests.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|user| user.mobile == mobile).cloned())
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|user| user.national_id.as_deref() == Some(national_id))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<CreateUserOutcome> {
        let mut users = self.users.lock().await;
        let clash = users.iter().any(|user| {
            user.mobile == new.mobile
                || (new.national_id.is_some() && user.national_id == new.national_id)
        });
        if clash {
            return Ok(CreateUserOutcome::Conflict);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            mobile: new.mobile,
            national_id: new.national_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(CreateUserOutcome::Created(user))
    }
}
