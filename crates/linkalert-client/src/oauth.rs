use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use linkalert_core::error::AppError;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::sync::Mutex;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh a little before the provider-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Client credentials plus the long-lived refresh token from the OAuth handshake.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl OAuthCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    fn refresh_form(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("refresh_token", &self.refresh_token)
            .finish()
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Hands out access tokens, exchanging the refresh token when needed.
///
/// Tokens live in memory only. Concurrent callers share one refresh.
#[derive(Clone)]
pub struct TokenProvider {
    client: Client,
    token_url: String,
    credentials: OAuthCredentials,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenProvider {
    pub fn new(client: Client, credentials: OAuthCredentials) -> Self {
        Self {
            client,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// A usable access token, refreshing first if none is cached or it is expiring.
    pub async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Replace a token the API rejected.
    ///
    /// If another caller already swapped `rejected` for a fresh token, that
    /// token is returned without a second exchange.
    pub async fn refresh(&self, rejected: &str) -> Result<String, AppError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.value != rejected && t.is_fresh())
        {
            return Ok(token.value.clone());
        }
        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(&self) -> Result<CachedToken, AppError> {
        tracing::debug!("Refreshing Analytics access token");

        let response = self
            .client
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.credentials.refresh_form())
            .send()
            .await
            .map_err(|e| AppError::TransientError(format!("Token refresh failed: {e}")))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse token response: {e}")))?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

/// Map a failed token exchange to an error kind.
///
/// Rejected grants or clients mean the stored credentials are unusable.
fn classify_token_error(status: u16, body: &str) -> AppError {
    let parsed = serde_json::from_str::<TokenError>(body).ok();
    let message = match &parsed {
        Some(err) => match &err.error_description {
            Some(desc) => format!("{}: {}", err.error, desc),
            None => err.error.clone(),
        },
        None => format!("HTTP {status}: {body}"),
    };

    if status >= 500 {
        return AppError::TransientError(format!("Token endpoint unavailable: {message}"));
    }
    if status == 429 {
        return AppError::RateLimitExceeded;
    }
    AppError::AuthError(message)
}
