//! Database module
//!
//! User persistence behind the `UserStore` trait, with a PostgreSQL
//! implementation and an in-memory one.

pub mod memory;
pub mod models;
pub mod operations;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;

pub use memory::InMemoryUserStore;
pub use models::User;
pub use operations::DbOperations;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user. Fails with `DatabaseError::Duplicate` when the email
    /// is already taken.
    async fn create_user(&self, user: &User) -> Result<User, AppError>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}
