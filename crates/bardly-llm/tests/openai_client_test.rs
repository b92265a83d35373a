use bardly_llm::{ChatMessage, CompletionClient, CompletionRequest, LlmError, OpenAiClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion_body(content: serde_json::Value, total_tokens: u32) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 40,
            "completion_tokens": total_tokens - 40,
            "total_tokens": total_tokens
        }
    })
}

#[tokio::test]
async fn test_complete_sends_prompt_and_parses_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 500,
            "messages": [
                {"role": "system", "content": "narrate"},
                {"role": "user", "content": "I open the door"},
                {"role": "assistant", "content": "It creaks."},
                {"role": "user", "content": "I step inside"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body(json!("A cold draft greets you."), 87)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", &server.uri()).unwrap();
    let request = CompletionRequest::new(
        "gpt-4o-mini",
        vec![
            ChatMessage::system("narrate"),
            ChatMessage::user("I open the door"),
            ChatMessage::assistant("It creaks."),
            ChatMessage::user("I step inside"),
        ],
    );

    let completion = client.complete(request).await.unwrap();
    assert_eq!(completion.text, "A cold draft greets you.");
    assert_eq!(completion.total_tokens, 87);
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", &server.uri()).unwrap();
    let err = client
        .complete(CompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();

    match err {
        LlmError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_null_content_is_an_empty_completion() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(json!(null), 50)))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", &format!("{}/", server.uri())).unwrap();
    let err = client
        .complete(CompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::EmptyCompletion));
}

#[test]
fn test_empty_api_key_is_rejected() {
    let result = OpenAiClient::new("  ");
    assert!(matches!(result, Err(LlmError::Config(_))));
}
