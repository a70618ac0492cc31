use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::users::repo_types::{User, UserChanges};

/// Persistence for users. Every call is a round trip to storage; nothing is cached.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> AppResult<User>;
    async fn get_by_email(&self, email: &str) -> AppResult<User>;
    /// Fails with `Conflict` when the email is already present.
    async fn create(&self, email: &str, name: &str) -> AppResult<User>;
    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<User>;
    async fn delete(&self, id: i64) -> AppResult<()>;
    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<User>>;
    async fn count(&self) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_id(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
    }

    async fn create(&self, email: &str, name: &str) -> AppResult<User> {
        // The unique index decides; no separate existence check.
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, name, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(name)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::conflict(format!("user with email {email} already exists")))
    }

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                updated_at = now()
            WHERE id = $1
            RETURNING id, email, name, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User not found"));
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, updated_at
            FROM users
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> AppResult<i64> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(total)
    }
}


/// Runs against a real Postgres named by `DATABASE_URL`:
/// `cargo test -- --ignored`.
#[cfg(test)]
mod pg_tests {
    use std::sync::Arc;

    use super::*;

    async fn store() -> PgUserStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::migrate(&pool).await.unwrap();
        PgUserStore::new(pool)
    }

    fn unique_email(tag: &str) -> String {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        format!("{tag}-{nanos}@example.com")
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn create_update_delete_round() {
        let store = store().await;
        let email = unique_email("crud");

        let user = store.create(&email, "Ada").await.unwrap();
        assert_eq!(store.get_by_email(&email).await.unwrap().id, user.id);

        let err = store.create(&email, "Other").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let kept = store.update(user.id, &UserChanges::default()).await.unwrap();
        assert_eq!(kept.name, "Ada");
        let renamed = store.update(user.id, &UserChanges::name("Lovelace")).await.unwrap();
        assert_eq!(renamed.name, "Lovelace");

        store.delete(user.id).await.unwrap();
        assert!(matches!(store.delete(user.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(store.get_by_id(user.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_inserts_of_one_email_admit_one_row() {
        let store = Arc::new(store().await);
        let email = unique_email("race");

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let email = email.clone();
                tokio::spawn(async move { store.create(&email, &format!("Racer {i}")).await })
            })
            .collect();

        let mut created = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(user) => created.push(user.id),
                Err(AppError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(created.len(), 1);
        store.delete(created[0]).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn offset_far_past_the_end_returns_nothing() {
        let store = store().await;
        assert!(store.list(10, i64::MAX).await.unwrap().is_empty());
    }
}
