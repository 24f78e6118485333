use linkalert_client::TokenProvider;
use wiremock::MockServer;

use crate::integration::common::{TOKEN_PATH, credentials, mount_token, token_exchange, token_reply};

fn provider(server: &MockServer) -> TokenProvider {
    TokenProvider::new(reqwest::Client::new(), credentials())
        .with_token_url(format!("{}{TOKEN_PATH}", server.uri()))
}

#[tokio::test]
async fn access_token_is_cached() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    let tokens = provider(&server);

    assert_eq!(tokens.access_token().await.unwrap(), "tok-1");
    assert_eq!(tokens.access_token().await.unwrap(), "tok-1");
}

#[tokio::test]
async fn concurrent_refreshes_share_one_exchange() {
    let server = MockServer::start().await;
    token_exchange()
        .respond_with(token_reply("tok-1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_token(&server, "tok-2", 1).await;
    let tokens = provider(&server);

    let rejected = tokens.access_token().await.unwrap();
    let (a, b, c) = tokio::join!(
        tokens.refresh(&rejected),
        tokens.refresh(&rejected),
        tokens.refresh(&rejected)
    );

    assert_eq!(a.unwrap(), "tok-2");
    assert_eq!(b.unwrap(), "tok-2");
    assert_eq!(c.unwrap(), "tok-2");
    assert_eq!(tokens.access_token().await.unwrap(), "tok-2");
}
