use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use projbot_core::config::ZohoConfig;
use projbot_core::errors::ApiError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of one refresh exchange with the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in_secs: u64,
}

/// Seam for the refresh exchange so the store can be exercised without a
/// network.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<TokenGrant, ApiError>;
}

#[derive(Debug)]
struct CachedToken {
    access_value: SecretString,
    expires_at: DateTime<Utc>,
}

/// Owns the OAuth access token and its refresh lifecycle.
///
/// The cache mutex is held across the exchange, so concurrent callers
/// during a refresh wait on the one in-flight exchange and observe its
/// result instead of issuing duplicates.
pub struct TokenStore {
    exchanger: Box<dyn TokenExchanger>,
    cached: Mutex<Option<CachedToken>>,
    safety_margin: Duration,
}

impl TokenStore {
    pub fn new(exchanger: impl TokenExchanger + 'static, safety_margin_secs: u64) -> Self {
        Self {
            exchanger: Box::new(exchanger),
            cached: Mutex::new(None),
            safety_margin: Duration::seconds(safety_margin_secs as i64),
        }
    }

    /// Returns an access token valid for at least the safety margin,
    /// refreshing first when the cached one is absent or stale.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Utc::now() + self.safety_margin < token.expires_at {
                return Ok(token.access_value.expose_secret().to_string());
            }
        }

        match self.exchanger.exchange().await {
            Ok(grant) => {
                let access = grant.access_token.clone();
                *cached = Some(CachedToken {
                    access_value: grant.access_token.into(),
                    expires_at: Utc::now() + Duration::seconds(grant.expires_in_secs as i64),
                });
                info!(event_name = "zoho.token.refreshed", "access token refreshed");
                Ok(access)
            }
            Err(error) => {
                // A token inside the safety margin may still be honored by
                // the provider; keep serving it until it actually expires.
                if let Some(token) = cached.as_ref() {
                    if Utc::now() < token.expires_at {
                        warn!(
                            event_name = "zoho.token.refresh_failed_serving_stale",
                            error = %error,
                            "refresh failed; serving not-yet-expired token"
                        );
                        return Ok(token.access_value.expose_secret().to_string());
                    }
                }
                *cached = None;
                Err(error)
            }
        }
    }

    /// Drops the cache and refreshes unconditionally. Used by the client
    /// after an authentication rejection.
    pub async fn force_refresh(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        *cached = None;

        let grant = self.exchanger.exchange().await?;
        let access = grant.access_token.clone();
        *cached = Some(CachedToken {
            access_value: grant.access_token.into(),
            expires_at: Utc::now() + Duration::seconds(grant.expires_in_secs as i64),
        });
        info!(event_name = "zoho.token.force_refreshed", "access token force-refreshed");
        Ok(access)
    }
}

/// Refresh-token grant against the Zoho accounts endpoint.
pub struct HttpTokenExchanger {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
}

impl HttpTokenExchanger {
    pub fn new(config: &ZohoConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ApiError::Transient(format!("http client build failed: {error}")))?;

        Ok(Self {
            http,
            token_url: format!("{}/oauth/v2/token", config.auth_base_url.trim_end_matches('/')),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self) -> Result<TokenGrant, ApiError> {
        let params = [
            ("refresh_token", self.refresh_token.expose_secret()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|error| ApiError::Auth(format!("token endpoint unreachable: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Auth(format!("token endpoint returned {status}")));
        }

        let payload: TokenExchangeResponse = response
            .json()
            .await
            .map_err(|error| ApiError::Auth(format!("token response unreadable: {error}")))?;

        // Zoho reports some grant failures as 200 with an error field.
        if let Some(error) = payload.error {
            return Err(ApiError::Auth(format!("refresh grant rejected: {error}")));
        }

        let access_token = payload
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Auth("token response missing access_token".to_string()))?;

        Ok(TokenGrant { access_token, expires_in_secs: payload.expires_in.unwrap_or(3600) })
    }
}
