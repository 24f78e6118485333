use linkalert_client::{GoogleAnalyticsSource, OAuthCredentials};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/token";
pub const API_PATH: &str = "/analytics/v3";
pub const DATA_PATH: &str = "/analytics/v3/data/ga";

pub fn credentials() -> OAuthCredentials {
    OAuthCredentials::new("client-1", "secret-1", "refresh-1")
}

/// Analytics source pointed at the mock server.
pub fn source(server: &MockServer) -> GoogleAnalyticsSource {
    GoogleAnalyticsSource::new(credentials())
        .unwrap()
        .with_endpoints(
            &format!("{}{API_PATH}", server.uri()),
            &format!("{}{TOKEN_PATH}", server.uri()),
        )
}

/// A token endpoint reply carrying `token`.
pub fn token_reply(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "expires_in": 3600,
        "token_type": "Bearer"
    }))
}

/// Token exchange for the test credentials.
pub fn token_exchange() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
}

/// Serve `token` from the token endpoint exactly `times` times.
pub async fn mount_token(server: &MockServer, token: &str, times: u64) {
    token_exchange()
        .respond_with(token_reply(token))
        .expect(times)
        .mount(server)
        .await;
}

/// One page of `data/ga` results.
pub fn data_page(rows: &[(&str, &str, u64)], total: usize) -> Value {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(source, path, visits)| vec![source.to_string(), path.to_string(), visits.to_string()])
        .collect();
    json!({
        "totalResults": total,
        "containsSampledData": false,
        "rows": rows
    })
}
