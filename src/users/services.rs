use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::users::repo::UserStore;
use crate::users::repo_types::{User, UserChanges};

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// A clamped page request: `page >= 1`, `limit` in `1..=100`, unset limit means 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn clamped(page: i64, limit: i64) -> Self {
        let page = page.max(1);
        let limit = if limit < 1 {
            DEFAULT_PAGE_LIMIT
        } else {
            limit.min(MAX_PAGE_LIMIT)
        };
        Self { page, limit }
    }

    /// Saturates for pages past the end of any real table.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: Page,
    pub total: i64,
}

/// Validation and get-or-create rules on top of a `UserStore`. Holds no state of its own.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.store.get_by_id(id).await
    }

    pub async fn get_by_email(&self, email: &str) -> AppResult<User> {
        self.store.get_by_email(email).await
    }

    pub async fn create_user(&self, email: &str, name: &str) -> AppResult<User> {
        if email.trim().is_empty() {
            return Err(AppError::validation("email is required"));
        }
        if name.trim().is_empty() {
            return Err(AppError::validation("name is required"));
        }
        let user = self.store.create(email, name).await?;
        info!(user_id = user.id, email = %user.email, "user created");
        Ok(user)
    }

    /// Used by the OAuth callback. Creates the user on first sight of the email and
    /// overwrites the stored name when the provider reports a different one.
    pub async fn get_or_create_from_oauth(&self, email: &str, name: &str) -> AppResult<User> {
        let existing = match self.get_by_email(email).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => match self.create_user(email, name).await {
                Ok(user) => return Ok(user),
                // Lost a race with a concurrent callback for the same email.
                Err(AppError::Conflict(_)) => self.get_by_email(email).await?,
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        };

        if existing.name == name || name.trim().is_empty() {
            debug!(user_id = existing.id, "oauth profile unchanged");
            return Ok(existing);
        }

        let updated = self
            .store
            .update(existing.id, &UserChanges::name(name))
            .await?;
        info!(user_id = updated.id, "user name updated from oauth profile");
        Ok(updated)
    }

    pub async fn update_user(&self, id: i64, changes: UserChanges) -> AppResult<User> {
        self.store.get_by_id(id).await?;
        if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::validation("name must not be empty"));
        }
        if changes.is_empty() {
            return self.store.get_by_id(id).await;
        }
        let user = self.store.update(id, &changes).await?;
        info!(user_id = user.id, "user updated");
        Ok(user)
    }

    pub async fn delete_user(&self, id: i64) -> AppResult<()> {
        self.store.get_by_id(id).await?;
        self.store.delete(id).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    pub async fn list_users(&self, page: i64, limit: i64) -> AppResult<UserPage> {
        let page = Page::clamped(page, limit);
        let users = self.store.list(page.limit, page.offset()).await?;
        let total = self.store.count().await?;
        Ok(UserPage { users, page, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::memory::MemoryUserStore;

    fn service() -> (UserService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (UserService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn created_user_is_found_by_email() {
        let (svc, _) = service();
        let created = svc.create_user("ada@example.com", "Ada").await.unwrap();
        let found = svc.get_by_email("ada@example.com").await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email, "ada@example.com");
        assert_eq!(found.name, "Ada");
    }

    #[tokio::test]
    async fn create_requires_email_and_name() {
        let (svc, store) = service();
        assert!(matches!(
            svc.create_user("", "Ada").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.create_user("ada@example.com", "").await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_keeps_one_row() {
        let (svc, store) = service();
        svc.create_user("ada@example.com", "Ada").await.unwrap();
        let err = svc.create_user("ada@example.com", "Other").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_with_same_email_admit_exactly_one() {
        let (svc, store) = service();
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    svc.create_user("race@example.com", &format!("Racer {i}")).await
                })
            })
            .collect();

        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn oauth_get_or_create_is_idempotent() {
        let (svc, store) = service();
        let first = svc.get_or_create_from_oauth("ada@example.com", "Ada").await.unwrap();
        let second = svc.get_or_create_from_oauth("ada@example.com", "Ada").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn oauth_name_change_overwrites_name_only() {
        let (svc, store) = service();
        let old = svc.get_or_create_from_oauth("ada@example.com", "OldName").await.unwrap();
        let new = svc.get_or_create_from_oauth("ada@example.com", "NewName").await.unwrap();
        assert_eq!(new.id, old.id);
        assert_eq!(new.email, old.email);
        assert_eq!(new.name, "NewName");
        assert_eq!(svc.get_by_id(old.id).await.unwrap().name, "NewName");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_oauth_callbacks_share_one_user() {
        let (svc, store) = service();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.get_or_create_from_oauth("ada@example.com", "Ada").await })
            })
            .collect();
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_distinguishes_absent_from_empty() {
        let (svc, _) = service();
        let user = svc.create_user("ada@example.com", "Ada").await.unwrap();

        let same = svc.update_user(user.id, UserChanges::default()).await.unwrap();
        assert_eq!(same.name, "Ada");

        let err = svc.update_user(user.id, UserChanges::name("")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = svc.update_user(user.id, UserChanges::name("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(svc.get_by_id(user.id).await.unwrap().name, "Ada");

        let renamed = svc.update_user(user.id, UserChanges::name("Lovelace")).await.unwrap();
        assert_eq!(renamed.name, "Lovelace");
    }

    #[tokio::test]
    async fn update_and_delete_missing_user_are_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.update_user(99, UserChanges::name("x")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(svc.delete_user(99).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_user() {
        let (svc, store) = service();
        let user = svc.create_user("ada@example.com", "Ada").await.unwrap();
        svc.delete_user(user.id).await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(matches!(svc.get_by_id(user.id).await, Err(AppError::NotFound(_))));
    }

    #[test]
    fn page_is_clamped() {
        assert_eq!(Page::clamped(0, 500), Page { page: 1, limit: 100 });
        assert_eq!(Page::clamped(-3, 0), Page { page: 1, limit: 10 });
        assert_eq!(Page::clamped(3, 25), Page { page: 3, limit: 25 });
        assert_eq!(Page::clamped(3, 25).offset(), 50);
        assert_eq!(Page::clamped(i64::MAX, 10).offset(), i64::MAX);
    }

    #[tokio::test]
    async fn list_users_far_past_the_end_is_empty() {
        let (svc, store) = service();
        svc.create_user("a@example.com", "A").await.unwrap();
        let page = svc.list_users(i64::MAX, 10).await.unwrap();
        assert_eq!(page.page, Page { page: i64::MAX, limit: 10 });
        assert!(page.users.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(store.last_list(), Some((10, i64::MAX)));
    }

    #[tokio::test]
    async fn list_users_clamps_before_querying() {
        let (svc, store) = service();
        svc.create_user("a@example.com", "A").await.unwrap();
        let page = svc.list_users(0, 500).await.unwrap();
        assert_eq!(page.page, Page { page: 1, limit: 100 });
        assert_eq!(store.last_list(), Some((100, 0)));
        assert_eq!(page.total, 1);
        assert_eq!(page.users.len(), 1);
    }
}
