use std::{str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};

use crate::config::DatabaseConfig;

pub fn connect_options(cfg: &DatabaseConfig) -> anyhow::Result<PgConnectOptions> {
    if let Some(url) = &cfg.url {
        return PgConnectOptions::from_str(url).context("parse DATABASE_URL");
    }
    let ssl_mode = PgSslMode::from_str(&cfg.ssl_mode).context("parse DB_SSLMODE")?;
    let mut opts = PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.user)
        .database(&cfg.name)
        .ssl_mode(ssl_mode);
    if !cfg.password.is_empty() {
        opts = opts.password(&cfg.password);
    }
    Ok(opts)
}

/// Opens the shared pool. It is the only shared mutable resource in the process.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .min_connections(0)
        .idle_timeout(Duration::from_secs(10 * 60))
        .max_lifetime(Duration::from_secs(60 * 60))
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options(cfg)?)
        .await
        .context("connect to database")?;
    tracing::info!(host = %cfg.host, db = %cfg.name, "database pool ready");
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;
    Ok(())
}
