use chrono::NaiveDate;
use linkalert_core::models::RawTrafficRow;
use linkalert_core::traits::TrafficSource;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use crate::integration::common::{
    DATA_PATH, data_page, mount_token, source, token_exchange, token_reply,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn window() -> (NaiveDate, NaiveDate) {
    (date(2024, 1, 1), date(2024, 1, 31))
}

fn data_request(start_index: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .and(query_param("ids", "ga:42"))
        .and(query_param("start-date", "2024-01-01"))
        .and(query_param("end-date", "2024-01-31"))
        .and(query_param("start-index", start_index))
}

#[tokio::test]
async fn fetch_pages_until_total_results() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;

    let pages = [
        ("1", data_page(&[("a.com", "/1", 50), ("b.com", "/2", 40)], 5)),
        ("3", data_page(&[("c.com", "/3", 30), ("d.com", "/4", 20)], 5)),
        ("5", data_page(&[("e.com", "/5", 10)], 5)),
    ];
    for (start_index, body) in pages {
        data_request(start_index)
            .and(query_param("max-results", "2"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (start, end) = window();
    let rows = source(&server)
        .with_page_size(2)
        .fetch("42", start, end)
        .await
        .unwrap();

    let domains: Vec<&str> = rows.iter().map(|r| r.source_domain.as_str()).collect();
    assert_eq!(domains, ["a.com", "b.com", "c.com", "d.com", "e.com"]);
    assert_eq!(rows[4], RawTrafficRow::new("e.com", "/5", 10));
}

#[tokio::test]
async fn fetch_without_rows_is_empty() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    data_request("1")
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"totalResults": 0, "containsSampledData": false})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (start, end) = window();
    let rows = source(&server).fetch("42", start, end).await.unwrap();

    assert!(rows.is_empty());
}

#[tokio::test]
async fn fetch_stops_at_row_cap() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;

    data_request("1")
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(data_page(&[("a.com", "/1", 9), ("b.com", "/2", 8)], 10)),
        )
        .expect(1)
        .mount(&server)
        .await;
    data_request("3")
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(data_page(&[("c.com", "/3", 7), ("d.com", "/4", 6)], 10)),
        )
        .expect(1)
        .mount(&server)
        .await;
    data_request("5")
        .respond_with(ResponseTemplate::new(200).set_body_json(data_page(&[], 10)))
        .expect(0)
        .mount(&server)
        .await;

    let (start, end) = window();
    let rows = source(&server)
        .with_page_size(2)
        .with_max_rows(3)
        .fetch("42", start, end)
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].source_domain, "c.com");
}

#[tokio::test]
async fn rejected_token_is_refreshed_once_and_retried() {
    let server = MockServer::start().await;
    token_exchange()
        .respond_with(token_reply("tok-1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_token(&server, "tok-2", 1).await;

    data_request("1")
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    data_request("1")
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(data_page(&[("site.com", "/a", 3)], 1)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (start, end) = window();
    let rows = source(&server).fetch("42", start, end).await.unwrap();

    assert_eq!(rows, vec![RawTrafficRow::new("site.com", "/a", 3)]);
}

#[tokio::test]
async fn second_rejection_is_auth_error() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 2).await;
    data_request("1")
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Invalid Credentials"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let (start, end) = window();
    let err = source(&server).fetch("42", start, end).await.unwrap_err();

    assert!(err.is_auth());
    assert!(err.to_string().contains("Invalid Credentials"));
}

#[tokio::test]
async fn revoked_refresh_token_is_auth_error() {
    let server = MockServer::start().await;
    token_exchange()
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .expect(1)
        .mount(&server)
        .await;
    data_request("1")
        .respond_with(ResponseTemplate::new(200).set_body_json(data_page(&[], 0)))
        .expect(0)
        .mount(&server)
        .await;

    let (start, end) = window();
    let err = source(&server).fetch("42", start, end).await.unwrap_err();

    assert!(err.is_auth());
    assert!(err.to_string().contains("invalid_grant"));
}

#[tokio::test]
async fn quota_rejection_is_retryable() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    data_request("1")
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "Quota Error: profileId ga:42 has exceeded the daily request limit.",
                "errors": [{"reason": "dailyLimitExceeded"}, {"reason": "quotaExceeded"}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (start, end) = window();
    let err = source(&server).fetch("42", start, end).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(!err.is_auth());
}

#[tokio::test]
async fn lists_available_profiles() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/analytics/v3/management/accounts/~all/webproperties/~all/profiles"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "42", "name": "All Web Site Data", "websiteUrl": "http://example.com"},
                {"id": "43", "name": "Blog"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profiles = source(&server).available_profiles().await.unwrap();

    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles[0].id, "42");
    assert_eq!(profiles[0].website_url.as_deref(), Some("http://example.com"));
    assert_eq!(profiles[1].name, "Blog");
    assert_eq!(profiles[1].website_url, None);
}
