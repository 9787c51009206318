mod harness;

use harness::config::ConfigBuilder;
use harness::server::TestServer;
use harness::upstream;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn openai_caller_reaches_anthropic() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4",
            "system": "Be brief.",
            "messages": [{"role": "user"}]
        })))
        .respond_with(upstream::anthropic_message("Hello there"))
        .expect(1)
        .mount(&mock)
        .await;

    let server = TestServer::start(&ConfigBuilder::new("anthropic", &mock.uri()).build())
        .await
        .unwrap();

    let resp = server
        .post(
            "/v1/chat/completions",
            &json!({
                "model": "claude-sonnet-4",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hi"}
                ]
            }),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 12);
    assert_eq!(body["usage"]["completion_tokens"], 4);
}

#[tokio::test]
async fn anthropic_tool_use_becomes_openai_tool_calls() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(upstream::anthropic_tool_use("get_weather", &json!({"city": "Paris"})))
        .mount(&mock)
        .await;

    let server = TestServer::start(&ConfigBuilder::new("anthropic", &mock.uri()).build())
        .await
        .unwrap();

    let body: serde_json::Value = server
        .post(
            "/v1/chat/completions",
            &json!({
                "model": "claude-sonnet-4",
                "messages": [{"role": "user", "content": "Weather in Paris?"}],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "get_weather",
                        "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                    }
                }]
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    let call = &body["choices"][0]["message"]["tool_calls"][0];
    assert_eq!(call["id"], "toolu_1");
    assert_eq!(call["function"]["name"], "get_weather");
    let arguments: serde_json::Value = serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(arguments, json!({"city": "Paris"}));
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
}

#[tokio::test]
async fn anthropic_caller_reaches_openai_with_mapped_model() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o"})))
        .respond_with(upstream::openai_completion("Bonjour"))
        .expect(1)
        .mount(&mock)
        .await;

    let config = ConfigBuilder::new("openai", &mock.uri())
        .with_mapping("claude-sonnet-4", "gpt-4o")
        .build();
    let server = TestServer::start(&config).await.unwrap();

    let resp = server
        .post(
            "/v1/messages",
            &json!({
                "model": "claude-sonnet-4",
                "max_tokens": 64,
                "messages": [{"role": "user", "content": "Say hello in French"}]
            }),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["content"][0]["text"], "Bonjour");
    assert_eq!(body["stop_reason"], "end_turn");
}

#[tokio::test]
async fn responses_caller_reaches_anthropic() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(upstream::anthropic_message("Done"))
        .expect(1)
        .mount(&mock)
        .await;

    let server = TestServer::start(&ConfigBuilder::new("anthropic", &mock.uri()).build())
        .await
        .unwrap();

    let body: serde_json::Value = server
        .post("/v1/responses", &json!({"model": "claude-sonnet-4", "input": "Finish up"}))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["object"], "response");
    assert_eq!(body["status"], "completed");
    let text = body["output"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|item| item["type"] == "message")
        .flat_map(|item| item["content"].as_array().cloned().unwrap_or_default())
        .find_map(|part| part["text"].as_str().map(str::to_owned));
    assert_eq!(text.as_deref(), Some("Done"));
}

#[tokio::test]
async fn upstream_error_keeps_status_and_callers_format() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "rate_limit_error", "code": "rate_limit_exceeded"}
        })))
        .mount(&mock)
        .await;

    let server = TestServer::start(&ConfigBuilder::new("openai", &mock.uri()).build())
        .await
        .unwrap();

    let resp = server
        .post(
            "/v1/messages",
            &json!({"model": "gpt-4o", "max_tokens": 8, "messages": [{"role": "user", "content": "Hi"}]}),
        )
        .await;

    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "rate_limit_error");
    assert_eq!(body["error"]["message"], "Rate limit reached");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(upstream::anthropic_message("Recovered"))
        .expect(1)
        .mount(&mock)
        .await;

    let config = ConfigBuilder::new("anthropic", &mock.uri()).with_max_retries(1).build();
    let server = TestServer::start(&config).await.unwrap();

    let resp = server
        .post(
            "/v1/chat/completions",
            &json!({"model": "claude-sonnet-4", "messages": [{"role": "user", "content": "Hi"}]}),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Recovered");
}

#[tokio::test]
async fn vision_request_is_refused_by_text_only_provider() {
    let mock = MockServer::start().await;

    let server = TestServer::start(&ConfigBuilder::new("deepseek", &mock.uri()).build())
        .await
        .unwrap();

    let resp = server
        .post(
            "/v1/chat/completions",
            &json!({
                "model": "deepseek-chat",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "What is this?"},
                        {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
                    ]
                }]
            }),
        )
        .await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(mock.received_requests().await.unwrap().is_empty());
}
