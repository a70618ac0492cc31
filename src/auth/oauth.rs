//! Google OAuth2 authorization-code flow.
//!
//! The adapter only talks to the provider: it builds the consent URL, trades a code for
//! an access token and reads the profile. Choosing and checking the `state` value is the
//! caller's job (see `auth::session`).

use std::time::Duration;

use async_trait::async_trait;
use oauth2::{
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
    AccessToken, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, Scope, StandardRevocableToken, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GoogleConfig;
use crate::error::{AppError, AppResult};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// The two profile fields the login flow needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent-page URL carrying client id, redirect URL, scopes and `state`.
    fn get_auth_url(&self, state: &str) -> AppResult<String>;

    /// Token endpoint round trip. Any transport or non-2xx failure is an `Auth` error.
    async fn exchange_code(&self, code: &str) -> AppResult<AccessToken>;

    /// `Auth` on transport/non-2xx failure, `Parse` when the body has the wrong shape.
    async fn get_user_info(&self, token: &AccessToken) -> AppResult<OAuthProfile>;
}

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

type ConfiguredClient = oauth2::Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct GoogleOAuth {
    config: GoogleConfig,
    endpoints: GoogleEndpoints,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: GoogleConfig) -> anyhow::Result<Self> {
        Self::with_endpoints(config, GoogleEndpoints::default())
    }

    pub fn with_endpoints(config: GoogleConfig, endpoints: GoogleEndpoints) -> anyhow::Result<Self> {
        // Token requests must not follow redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            config,
            endpoints,
            http,
        })
    }

    /// Built per call so a server with missing credentials still starts; login then
    /// fails with an `Auth` error instead.
    fn client(&self) -> AppResult<ConfiguredClient> {
        let not_configured = |e: oauth2::url::ParseError| {
            warn!(error = %e, "google oauth is not configured");
            AppError::auth("Google OAuth is not configured")
        };
        Ok(BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(self.endpoints.auth_url.clone()).map_err(not_configured)?)
            .set_token_uri(TokenUrl::new(self.endpoints.token_url.clone()).map_err(not_configured)?)
            .set_redirect_uri(
                RedirectUrl::new(self.config.redirect_url.clone()).map_err(not_configured)?,
            ))
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn get_auth_url(&self, state: &str) -> AppResult<String> {
        let state = state.to_string();
        let (url, _) = self
            .client()?
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_extra_param("access_type", "offline")
            .url();
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> AppResult<AccessToken> {
        let token = self
            .client()?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                warn!(error = %e, "authorization code exchange failed");
                AppError::auth("Failed to exchange authorization code")
            })?;
        debug!("authorization code exchanged");
        Ok(token.access_token().clone())
    }

    async fn get_user_info(&self, token: &AccessToken) -> AppResult<OAuthProfile> {
        let res = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "userinfo request failed");
                AppError::auth("Failed to get user information")
            })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%status, "userinfo endpoint rejected the token");
            return Err(AppError::auth("Failed to get user information"));
        }

        let body = res.text().await.map_err(|e| {
            warn!(error = %e, "userinfo body unreadable");
            AppError::auth("Failed to get user information")
        })?;
        serde_json::from_str::<OAuthProfile>(&body).map_err(|e| {
            warn!(error = %e, "userinfo body has unexpected shape");
            AppError::parse("Malformed user information from provider")
        })
    }
}
