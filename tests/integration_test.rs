use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sensetime_adaptor::auth::Claims;
use sensetime_adaptor::translate::openai_types::{
    ChatContent, ChatMessage, GeneralRequest, ImageRequest,
};
use sensetime_adaptor::{build_router, Adaptor, AdaptorError, AppState, CredentialIssuer, RelayOutcome};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ACCESS_KEY: &str = "test-ak";
const SECRET_KEY: &str = "test-sk";

// ────────────────────────────────────────────────────────────────
// In-process mock of the vendor API
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RecordedCall {
    path: String,
    authorization: Option<String>,
    body: Value,
}

#[derive(Default)]
struct MockVendor {
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockVendor {
    fn record(&self, path: &str, headers: &HeaderMap, body: &Value) {
        self.calls.lock().unwrap().push(RecordedCall {
            path: path.to_string(),
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body: body.clone(),
        });
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

const STREAM_BODY: &str = concat!(
    "data:{\"data\":{\"id\":\"s1\",\"choices\":[{\"delta\":\"Hel\",\"role\":\"assistant\"}]}}\n\n",
    "data:{\"data\":{\"id\":\"s1\",\"choices\":[{\"delta\":\"lo\",\"role\":\"assistant\"}],",
    "\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2,\"total_tokens\":6}}}\n\n",
    "data:[DONE]\n\n",
);

async fn mock_chat(
    State(state): State<Arc<MockVendor>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/v1/llm/chat-completions", &headers, &body);

    if body["model"] == "quota" {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"status": {"code": 429, "msg": "quota exceeded"}})),
        )
            .into_response();
    }

    if body["model"] == "slow" && body["stream"] == true {
        let frames = async_stream::stream! {
            for i in 0..500 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let frame = format!(
                    "data:{{\"data\":{{\"id\":\"s2\",\"choices\":[{{\"delta\":\"t{i}\"}}]}}}}\n\n"
                );
                yield Ok::<_, Infallible>(Bytes::from(frame));
            }
            yield Ok(Bytes::from_static(b"data:[DONE]\n\n"));
        };
        return (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(frames),
        )
            .into_response();
    }

    if body["stream"] == true {
        return ([(header::CONTENT_TYPE, "text/event-stream")], STREAM_BODY).into_response();
    }

    Json(json!({
        "status": {"code": 0, "msg": ""},
        "data": {
            "id": "r1",
            "choices": [
                {"message": "first", "role": "assistant"},
                {"message": "second", "role": "assistant"},
                {"message": "\"third\"", "role": "assistant"}
            ],
            "usage": {"prompt_tokens": 7, "completion_tokens": 9, "total_tokens": 16}
        }
    }))
    .into_response()
}

async fn mock_embeddings(
    State(state): State<Arc<MockVendor>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("/v1/llm/embeddings", &headers, &body);
    Json(json!({
        "embeddings": [
            {"index": 0, "status_code": 0, "status_message": "success", "embedding": [0.5, -0.25, 1.0]}
        ],
        "usage": {"prompt_tokens": 3, "total_tokens": 3}
    }))
}

async fn mock_assistants(
    State(state): State<Arc<MockVendor>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("/v1/assistants", &headers, &body);
    Json(json!({"id": "asst_1"}))
}

async fn spawn_mock_vendor() -> (String, Arc<MockVendor>) {
    let state = Arc::new(MockVendor::default());
    let app = Router::new()
        .route("/v1/llm/chat-completions", post(mock_chat))
        .route("/v1/llm/embeddings", post(mock_embeddings))
        .route("/v1/assistants", post(mock_assistants))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

fn adaptor(base_url: &str) -> Adaptor {
    Adaptor::new(
        base_url,
        CredentialIssuer::new(ACCESS_KEY, SECRET_KEY),
        reqwest::Client::new(),
    )
}

fn chat_request(model: &str, stream: bool) -> GeneralRequest {
    GeneralRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: Some(ChatContent::Text("Say hello".to_string())),
        }],
        temperature: Some(1.5),
        top_p: Some(0.0),
        max_tokens: Some(64),
        stream: Some(stream),
        ..GeneralRequest::default()
    }
}

async fn collect_body(outcome: RelayOutcome) -> Value {
    match outcome {
        RelayOutcome::Json(reply) => serde_json::from_slice(&reply.body).unwrap(),
        other => panic!("Expected JSON outcome, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────
// Adaptor against the mock vendor
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_sends_signed_clamped_request() {
    let (base, vendor) = spawn_mock_vendor().await;
    let outcome = adaptor(&base)
        .chat(Some(&chat_request("SenseChat-5", false)))
        .await
        .unwrap();

    let body = collect_body(outcome).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "SenseChat-5");
    assert_eq!(body["choices"][0]["finish_reason"], "");
    assert_eq!(body["choices"][1]["finish_reason"], "");
    assert_eq!(body["choices"][2]["finish_reason"], "stop");
    assert_eq!(body["choices"][2]["message"]["content"], "third");
    assert_eq!(body["usage"]["total_tokens"], 16);

    let calls = vendor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "/v1/llm/chat-completions");
    assert_eq!(calls[0].body["temperature"], 0.99);
    assert_eq!(calls[0].body["top_p"], 0.01);
    assert_eq!(calls[0].body["max_new_tokens"], 64);
    assert_eq!(calls[0].body["messages"][0]["content"], "Say hello");

    let authorization = calls[0].authorization.clone().unwrap();
    let token = authorization.strip_prefix("Bearer ").unwrap();
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(SECRET_KEY.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .unwrap()
    .claims;
    assert_eq!(claims.iss, ACCESS_KEY);
    assert_eq!(claims.exp - claims.nbf, 1805);
}

#[tokio::test]
async fn test_vendor_error_keeps_status_and_code() {
    let (base, _vendor) = spawn_mock_vendor().await;
    let err = adaptor(&base)
        .chat(Some(&chat_request("quota", false)))
        .await
        .unwrap_err();

    let canonical = err.to_canonical();
    assert_eq!(canonical.status_code, 429);
    assert_eq!(canonical.error.code, 429);
    assert_eq!(canonical.error.message, "quota exceeded");
    assert_eq!(canonical.error.error_type, "sensetime_error");
}

#[tokio::test]
async fn test_streaming_vendor_error_keeps_status() {
    let (base, _vendor) = spawn_mock_vendor().await;
    let err = adaptor(&base)
        .chat(Some(&chat_request("quota", true)))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 429);
    assert_eq!(err.to_canonical().error.message, "quota exceeded");
}

#[tokio::test]
async fn test_streaming_chat_relays_chunks_in_order() {
    use sensetime_adaptor::translate::streaming::StreamEvent;

    let (base, _vendor) = spawn_mock_vendor().await;
    let outcome = adaptor(&base)
        .chat(Some(&chat_request("SenseChat-5", true)))
        .await
        .unwrap();

    let RelayOutcome::Stream(stream) = outcome else {
        panic!("Expected a stream");
    };
    let events: Vec<StreamEvent> = stream.collect().await;

    assert_eq!(events.len(), 3);
    let deltas: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk(c) => c.choices[0].delta.content.clone(),
            StreamEvent::Done => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert!(events[2].is_done());

    if let StreamEvent::Chunk(last) = &events[1] {
        assert_eq!(last.usage.as_ref().map(|u| u.total_tokens), Some(6));
        assert_eq!(last.model, "SenseChat-5");
    }
}

#[tokio::test]
async fn test_invalid_embeddings_never_reach_vendor() {
    let (base, vendor) = spawn_mock_vendor().await;
    let adaptor = adaptor(&base);

    for input in [json!([]), json!(["a", "b"])] {
        let req = GeneralRequest {
            model: "nova-embedding-stable".to_string(),
            input: Some(input),
            ..GeneralRequest::default()
        };
        let err = adaptor.embeddings(Some(&req)).await.unwrap_err();
        assert!(matches!(err, AdaptorError::Validation { .. }));
    }

    let err = adaptor.chat(None).await.unwrap_err();
    assert!(matches!(err, AdaptorError::Validation { .. }));

    assert!(vendor.calls().is_empty());
}

#[tokio::test]
async fn test_embeddings_roundtrip() {
    let (base, vendor) = spawn_mock_vendor().await;
    let req = GeneralRequest {
        model: "nova-embedding-stable".to_string(),
        input: Some(json!("the quick brown fox")),
        ..GeneralRequest::default()
    };

    let body = collect_body(adaptor(&base).embeddings(Some(&req)).await.unwrap()).await;
    assert_eq!(body["object"], "list");
    assert_eq!(body["model"], "nova-embedding-stable");
    assert_eq!(body["data"][0]["embedding"], json!([0.5, -0.25, 1.0]));
    assert_eq!(body["usage"]["prompt_tokens"], 3);

    let calls = vendor.calls();
    assert_eq!(calls[0].path, "/v1/llm/embeddings");
    assert_eq!(calls[0].body["input"], json!(["the quick brown fox"]));
}

#[tokio::test]
async fn test_image_is_sent_but_not_translated() {
    let (base, vendor) = spawn_mock_vendor().await;
    let req = ImageRequest {
        model: "SenseMirage".to_string(),
        prompt: "a lighthouse at dusk".to_string(),
        size: Some("512x512".to_string()),
        ..ImageRequest::default()
    };

    let outcome = adaptor(&base).image(Some(&req)).await.unwrap();
    assert!(matches!(outcome, RelayOutcome::Empty { status: 200 }));

    let calls = vendor.calls();
    assert_eq!(calls[0].path, "/v1/assistants");
    assert_eq!(
        calls[0].body,
        json!({"model": "SenseMirage", "instructions": "a lighthouse at dusk"})
    );
}

#[tokio::test]
async fn test_unreachable_vendor_is_request_error() {
    // Port 9 (discard) is almost never listening locally.
    let err = adaptor("http://127.0.0.1:9")
        .chat(Some(&chat_request("SenseChat-5", false)))
        .await
        .unwrap_err();

    assert!(matches!(err, AdaptorError::Http(_)));
    assert_eq!(err.to_canonical().status_code, 500);
}

// ────────────────────────────────────────────────────────────────
// Host router in front of the mock vendor
// ────────────────────────────────────────────────────────────────

async fn spawn_host(vendor_base: &str) -> String {
    let state = Arc::new(AppState::new(adaptor(vendor_base)));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_host_streams_sse_with_single_done() {
    let (vendor_base, _vendor) = spawn_mock_vendor().await;
    let host = spawn_host(&vendor_base).await;

    let resp = reqwest::Client::new()
        .post(format!("{host}/v1/chat/completions"))
        .json(&json!({
            "model": "SenseChat-5",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let text = resp.text().await.unwrap();
    let data_lines: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .collect();

    assert_eq!(data_lines.len(), 3);
    assert_eq!(data_lines[2], "[DONE]");
    assert_eq!(text.matches("[DONE]").count(), 1);

    let first: Value = serde_json::from_str(data_lines[0]).unwrap();
    assert_eq!(first["object"], "chat.completion.chunk");
    assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
    let second: Value = serde_json::from_str(data_lines[1]).unwrap();
    assert_eq!(second["choices"][0]["delta"]["content"], "lo");
}

async fn stream_counts(client: &reqwest::Client, host: &str) -> (u64, u64) {
    let health: Value = client
        .get(format!("{host}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    (
        health["streams"]["completed"].as_u64().unwrap(),
        health["streams"]["aborted"].as_u64().unwrap(),
    )
}

#[tokio::test]
async fn test_host_counts_completed_stream() {
    let (vendor_base, _vendor) = spawn_mock_vendor().await;
    let host = spawn_host(&vendor_base).await;
    let client = reqwest::Client::new();

    let text = client
        .post(format!("{host}/v1/chat/completions"))
        .json(&json!({"model": "SenseChat-5", "stream": true, "messages": []}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.ends_with("data: [DONE]\n\n"));

    let mut counts = (0, 0);
    for _ in 0..50 {
        counts = stream_counts(&client, &host).await;
        if counts.0 == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(counts, (1, 0));
}

#[tokio::test]
async fn test_host_reports_client_disconnect_mid_stream() {
    let (vendor_base, _vendor) = spawn_mock_vendor().await;
    let host = spawn_host(&vendor_base).await;

    let stream_client = reqwest::Client::new();
    let resp = stream_client
        .post(format!("{host}/v1/chat/completions"))
        .json(&json!({"model": "slow", "stream": true, "messages": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mut body = Box::pin(resp.bytes_stream());
    let first = body.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"data: "));

    // Walk away from the connection before the vendor finishes.
    drop(body);
    drop(stream_client);

    let client = reqwest::Client::new();
    let mut counts = (0, 0);
    for _ in 0..250 {
        counts = stream_counts(&client, &host).await;
        if counts.1 == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(counts, (0, 1));
}

#[tokio::test]
async fn test_host_maps_errors_to_canonical_envelope() {
    let (vendor_base, vendor) = spawn_mock_vendor().await;
    let host = spawn_host(&vendor_base).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{host}/v1/chat/completions"))
        .json(&json!({"model": "quota", "messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "quota exceeded");
    assert_eq!(body["error"]["code"], 429);

    let resp = client
        .post(format!("{host}/v1/embeddings"))
        .json(&json!({"model": "nova-embedding-stable", "input": ["a", "b"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{host}/v1/chat/completions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "request is nil");

    let resp = client
        .post(format!("{host}/v1/chat/completions"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Only the quota call reached the vendor.
    assert_eq!(vendor.calls().len(), 1);
}

#[tokio::test]
async fn test_host_models_and_health() {
    let (vendor_base, _vendor) = spawn_mock_vendor().await;
    let host = spawn_host(&vendor_base).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{host}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["vendor"], vendor_base.as_str());

    let models: Value = client
        .get(format!("{host}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert!(ids.contains(&"SenseChat-5"));
    assert!(ids.contains(&"nova-embedding-stable"));
}
