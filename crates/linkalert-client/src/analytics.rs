use std::time::Duration;

use chrono::NaiveDate;
use linkalert_core::error::AppError;
use linkalert_core::models::RawTrafficRow;
use linkalert_core::traits::TrafficSource;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::oauth::{OAuthCredentials, TokenProvider};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/analytics/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Rows requested per page; the provider caps a page at 10 000.
const DEFAULT_PAGE_SIZE: usize = 1000;
/// Rows kept per fetch. Results are sorted by visits, so the tail is the
/// least-visited referrers.
const DEFAULT_MAX_ROWS: usize = 10_000;

/// Google Analytics Core Reporting (v3) client.
///
/// Fetches `ga:source` × `ga:referralPath` visits per profile, paging
/// through `start-index`/`max-results` transparently.
#[derive(Clone)]
pub struct GoogleAnalyticsSource {
    client: Client,
    api_base: String,
    tokens: TokenProvider,
    page_size: usize,
    max_rows: usize,
    timeout_secs: u64,
}

/// A reporting view visible to the authorized user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsProfile {
    pub id: String,
    pub name: String,
    pub website_url: Option<String>,
}

impl GoogleAnalyticsSource {
    pub fn new(credentials: OAuthCredentials) -> Result<Self, AppError> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: OAuthCredentials, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("linkalert/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            tokens: TokenProvider::new(client.clone(), credentials),
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_rows: DEFAULT_MAX_ROWS,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Point at a different API root (and token endpoint), e.g. a local stub.
    pub fn with_endpoints(mut self, api_base: &str, token_url: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.tokens = self.tokens.with_token_url(token_url);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, 10_000);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    /// List every reporting view the credentials can read.
    pub async fn available_profiles(&self) -> Result<Vec<AnalyticsProfile>, AppError> {
        let url = self.endpoint("management/accounts/~all/webproperties/~all/profiles")?;
        let response: ProfileList = self.get_json(url).await?;

        Ok(response
            .items
            .into_iter()
            .map(|item| AnalyticsProfile {
                id: item.id,
                name: item.name,
                website_url: item.website_url,
            })
            .collect())
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        Url::parse(&format!("{}/{}", self.api_base, path))
            .map_err(|e| AppError::ConfigError(format!("Invalid Analytics API URL: {e}")))
    }

    fn data_url(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        start_index: usize,
    ) -> Result<Url, AppError> {
        let mut url = self.endpoint("data/ga")?;
        url.query_pairs_mut()
            .append_pair("ids", &format!("ga:{profile_id}"))
            .append_pair("start-date", &start.format("%Y-%m-%d").to_string())
            .append_pair("end-date", &end.format("%Y-%m-%d").to_string())
            .append_pair("metrics", "ga:visits")
            .append_pair("dimensions", "ga:source,ga:referralPath")
            .append_pair("sort", "-ga:visits")
            .append_pair("start-index", &start_index.to_string())
            .append_pair("max-results", &self.page_size.to_string());
        Ok(url)
    }

    /// GET with bearer auth; one token refresh on 401.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let token = self.tokens.access_token().await?;
        let mut response = self.send(&url, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Access token rejected, refreshing");
            let token = self.tokens.refresh(&token).await?;
            response = self.send(&url, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse Analytics response: {e}")))
    }

    async fn send(&self, url: &Url, token: &str) -> Result<Response, AppError> {
        self.client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_builder() {
                    AppError::HttpError(e.to_string())
                } else {
                    AppError::TransientError(format!("Analytics request failed: {e}"))
                }
            })
    }
}

impl TrafficSource for GoogleAnalyticsSource {
    async fn fetch(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawTrafficRow>, AppError> {
        let mut rows = Vec::new();
        let mut start_index = 1;

        loop {
            let url = self.data_url(profile_id, start, end, start_index)?;
            let page: DataResponse = self.get_json(url).await?;

            if page.contains_sampled_data {
                tracing::warn!(%profile_id, "Analytics returned sampled data");
            }

            let received = page.rows.len();
            for raw in page.rows {
                rows.push(parse_row(raw)?);
            }
            start_index += received;

            if received == 0 || start_index > page.total_results {
                break;
            }
            if rows.len() >= self.max_rows {
                tracing::warn!(
                    %profile_id,
                    total = page.total_results,
                    kept = self.max_rows,
                    "Referral rows truncated"
                );
                break;
            }
        }

        rows.truncate(self.max_rows);
        Ok(rows)
    }
}

// ---- Analytics API types ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataResponse {
    /// Absent when the query matched nothing.
    #[serde(default)]
    rows: Vec<Vec<String>>,
    #[serde(default)]
    total_results: usize,
    #[serde(default)]
    contains_sampled_data: bool,
}

#[derive(Deserialize)]
struct ProfileList {
    #[serde(default)]
    items: Vec<ProfileItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileItem {
    id: String,
    name: String,
    #[serde(default)]
    website_url: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

/// Convert a `[source, referralPath, visits]` row.
fn parse_row(raw: Vec<String>) -> Result<RawTrafficRow, AppError> {
    let [source, path, visits]: [String; 3] = raw.try_into().map_err(|raw: Vec<String>| {
        AppError::HttpError(format!(
            "Expected 3 columns per Analytics row, got {}",
            raw.len()
        ))
    })?;

    let visit_count = visits.parse().map_err(|_| {
        AppError::HttpError(format!("Invalid visit count '{visits}' for {source}{path}"))
    })?;

    Ok(RawTrafficRow {
        source_domain: source,
        referral_path: path,
        visit_count,
    })
}

/// Map a non-success Analytics response to an error kind.
fn classify_api_error(status: u16, body: &str) -> AppError {
    let parsed = serde_json::from_str::<ApiError>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));
    let rate_limited = parsed.as_ref().is_some_and(|e| {
        e.error.errors.iter().any(|r| {
            r.reason.ends_with("RateLimitExceeded") || r.reason == "quotaExceeded"
        })
    });

    match status {
        401 => AppError::AuthError(message),
        403 if rate_limited => AppError::RateLimitExceeded,
        403 => AppError::AuthError(message),
        429 => AppError::RateLimitExceeded,
        500..=599 => AppError::TransientError(format!("HTTP {status}: {message}")),
        _ => AppError::HttpError(format!("HTTP {status}: {message}")),
    }
}
