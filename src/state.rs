use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::oauth::{GoogleOAuth, OAuthProvider};
use crate::config::AppConfig;
use crate::db;
use crate::users::{
    repo::{PgUserStore, UserStore},
    services::UserService,
};

/// Application context built once at startup and handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
    pub oauth: Arc<dyn OAuthProvider>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let pool = db::connect(&config.database).await?;
        db::migrate(&pool).await?;

        let store = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        let oauth = Arc::new(GoogleOAuth::new(config.google.clone())?) as Arc<dyn OAuthProvider>;
        Ok(Self::from_parts(config, store, oauth))
    }

    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        oauth: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            users: UserService::new(store),
            oauth,
        }
    }
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}
