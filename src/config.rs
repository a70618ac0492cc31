use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection string; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl GoogleConfig {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.redirect_url.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub environment: String,
    pub frontend_url: String,
    pub frontend_path: String,
    pub cookie_secure: bool,
    pub allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
}

impl AppConfig {
    /// Unparseable values fall back to their defaults, so this never fails.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let environment = or("ENVIRONMENT", "development");
        let frontend_url = or("FRONTEND_URL", "http://localhost:2010");

        let mut allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if allowed_origins.is_empty() {
            allowed_origins.push(frontend_url.clone());
        }

        let cookie_secure = get("COOKIE_SECURE")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(environment == "production");

        let config = Self {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            frontend_path: or("FRONTEND_PATH", "frontend/dist"),
            request_timeout: Duration::from_secs(
                get("REQUEST_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            database: DatabaseConfig {
                url: get("DATABASE_URL"),
                host: or("DB_HOST", "localhost"),
                port: get("DB_PORT").and_then(|v| v.parse().ok()).unwrap_or(5432),
                user: or("DB_USER", "postgres"),
                password: or("DB_PASSWORD", ""),
                name: or("DB_NAME", "chronotes"),
                ssl_mode: or("DB_SSLMODE", "disable"),
            },
            google: GoogleConfig {
                client_id: or("GOOGLE_CLIENT_ID", ""),
                client_secret: or("GOOGLE_CLIENT_SECRET", ""),
                redirect_url: or("GOOGLE_REDIRECT_URL", ""),
            },
            environment,
            frontend_url,
            cookie_secure,
            allowed_origins,
        };

        if !config.google.is_complete() {
            tracing::warn!("Google OAuth credentials not set; login will fail");
        }
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.frontend_url, "http://localhost:2010");
        assert_eq!(cfg.frontend_path, "frontend/dist");
        assert!(!cfg.cookie_secure);
        assert_eq!(cfg.allowed_origins, vec!["http://localhost:2010".to_string()]);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.name, "chronotes");
        assert_eq!(cfg.database.ssl_mode, "disable");
        assert!(cfg.database.url.is_none());
        assert!(!cfg.google.is_complete());
    }

    #[test]
    fn reads_overrides_and_splits_origins() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("ENVIRONMENT", "production"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("DB_PORT", "6543"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REDIRECT_URL", "https://app.example/v1/auth/google/callback"),
        ]);
        assert_eq!(cfg.port, 9000);
        assert!(cfg.is_production());
        assert!(cfg.cookie_secure);
        assert_eq!(cfg.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cfg.database.port, 6543);
        assert!(cfg.google.is_complete());
    }

    #[test]
    fn explicit_cookie_flag_wins_and_bad_numbers_fall_back() {
        let cfg = config(&[
            ("ENVIRONMENT", "production"),
            ("COOKIE_SECURE", "false"),
            ("PORT", "not-a-port"),
        ]);
        assert!(!cfg.cookie_secure);
        assert_eq!(cfg.port, 8080);
    }
}
