use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Transaction, Postgres};
use std::time::Duration;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::models::User;
use crate::db::UserStore;
use crate::error::AppError;

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at";

/// PostgreSQL-backed user store.
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        Ok(self.pool.as_ref().begin().await?)
    }

    pub async fn create_user_with_transaction(
        &self,
        user: &User,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<User, AppError> {
        let query = format!(
            "INSERT INTO users ({cols}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {cols}",
            cols = USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&mut **transaction)
            .await?;

        Ok(user)
    }
}

/// The insert error wins over a failed rollback, so a unique violation still
/// reaches the caller as `DatabaseError::Duplicate`.
fn settle_failed_insert(insert_err: AppError, rollback: Result<(), sqlx::Error>) -> AppError {
    if let Err(rollback_err) = rollback {
        error!("Rollback after failed user insert also failed: {}", rollback_err);
    }
    insert_err
}

#[async_trait]
impl UserStore for DbOperations {
    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let mut transaction = self.begin_transaction().await?;

        let result = self.create_user_with_transaction(user, &mut transaction).await;

        match result {
            Ok(user) => {
                transaction.commit().await?;
                Ok(user)
            }
            Err(e) => Err(settle_failed_insert(e, transaction.rollback().await)),
        }
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }
}
