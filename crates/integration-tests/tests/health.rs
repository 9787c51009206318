mod harness;

use harness::config::ConfigBuilder;
use harness::server::TestServer;
use wiremock::MockServer;

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let upstream = MockServer::start().await;
    let config = ConfigBuilder::new("anthropic", &upstream.uri()).build();
    let server = TestServer::start(&config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_endpoint_disabled() {
    let upstream = MockServer::start().await;
    let config = ConfigBuilder::new("anthropic", &upstream.uri()).without_health().build();
    let server = TestServer::start(&config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn models_lists_rewrite_targets() {
    let upstream = MockServer::start().await;
    let config = ConfigBuilder::new("openai", &upstream.uri())
        .with_mapping("claude-sonnet-4", "gpt-4o")
        .with_mapping("claude-haiku", "gpt-4o-mini")
        .with_mapping("claude-opus", "gpt-4o")
        .build();
    let server = TestServer::start(&config).await.unwrap();

    let body: serde_json::Value = server
        .client()
        .get(server.url("/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<_> = body["data"].as_array().unwrap().iter().map(|m| m["id"].clone()).collect();
    assert_eq!(ids, ["gpt-4o", "gpt-4o-mini"]);
    assert_eq!(body["data"][0]["owned_by"], "openai");
}
