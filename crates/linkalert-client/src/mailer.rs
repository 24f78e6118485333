use std::time::Duration;

use chrono::NaiveDate;
use linkalert_core::error::AppError;
use linkalert_core::models::{DeliveryReport, ProfileNames, RunResult};
use linkalert_core::traits::Notifier;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "https://api.postmarkapp.com/email";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_HEADER: &str = "X-Postmark-Server-Token";

/// A rendered digest, ready to address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl Digest {
    /// Render new links grouped by profile display name.
    ///
    /// Profiles missing from `names` are listed under their id. Links are
    /// host-plus-path strings and are linked over plain `http://`.
    pub fn render(result: &RunResult, names: &ProfileNames, date: NaiveDate) -> Self {
        let subject = format!("Link Report For {}", date.format("%Y-%m-%d"));

        let mut html = String::from("<html><body>\n");
        let mut text = String::new();

        for (profile_id, links) in result {
            let name = names.get(profile_id).map_or(profile_id.as_str(), String::as_str);

            html.push_str(&format!("<h2>{}</h2>\n<ul>\n", escape_html(name)));
            text.push_str(&format!("{name}\n"));

            for link in links {
                let escaped = escape_html(link);
                html.push_str(&format!(
                    "  <li><a href=\"http://{escaped}\">{escaped}</a></li>\n"
                ));
                text.push_str(&format!("  - http://{link}\n"));
            }

            html.push_str("</ul>\n");
            text.push('\n');
        }

        html.push_str("</body></html>\n");

        Self {
            subject,
            html_body: html,
            text_body: text,
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Postmark transactional email client.
///
/// Sends one message per recipient so a rejected address only fails itself.
#[derive(Clone)]
pub struct PostmarkNotifier {
    client: Client,
    api_url: String,
    server_token: String,
    from: String,
}

impl PostmarkNotifier {
    pub fn new(server_token: &str, from: &str) -> Result<Self, AppError> {
        Self::with_timeout(server_token, from, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(server_token: &str, from: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            server_token: server_token.to_string(),
            from: from.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn deliver(&self, digest: &Digest, recipient: &str) -> Result<(), AppError> {
        let request = EmailRequest {
            from: &self.from,
            to: recipient,
            subject: &digest.subject,
            html_body: &digest.html_body,
            text_body: &digest.text_body,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header(ACCEPT, "application/json")
            .header(TOKEN_HEADER, &self.server_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| notification_error(recipient, e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<EmailResponse>(&body).ok();

        match parsed {
            Some(reply) if status.is_success() && reply.error_code == 0 => Ok(()),
            Some(reply) => Err(notification_error(
                recipient,
                format!("Postmark error {}: {}", reply.error_code, reply.message),
            )),
            None => Err(notification_error(recipient, format!("HTTP {status}: {body}"))),
        }
    }
}

fn notification_error(recipient: &str, message: String) -> AppError {
    AppError::NotificationError {
        recipient: recipient.to_string(),
        message,
    }
}

impl Notifier for PostmarkNotifier {
    async fn send(
        &self,
        result: &RunResult,
        profile_names: &ProfileNames,
        recipients: &[String],
    ) -> Result<DeliveryReport, AppError> {
        let digest = Digest::render(result, profile_names, chrono::Utc::now().date_naive());
        let mut report = DeliveryReport::default();

        for recipient in recipients {
            match self.deliver(&digest, recipient).await {
                Ok(()) => {
                    tracing::debug!(%recipient, "Digest delivered");
                    report.delivered.push(recipient.clone());
                }
                Err(e) => {
                    tracing::debug!(%recipient, error = %e, "Digest delivery failed");
                    report.failed.push((recipient.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

// ---- Postmark API types ----

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmailResponse {
    error_code: i64,
    #[serde(default)]
    message: String,
}
