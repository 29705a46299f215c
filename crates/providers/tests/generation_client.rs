use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use genflow_core::{GenerationItem, GenerationRequest, ProviderKind, RetryPolicy, TaskId};
use genflow_providers::{
    GenerationApi, GenerationClient, GenerationClientConfig, ProviderError, ProviderStatus,
};
use serde_json::{Value, json};

/// What the fake provider answers on the create endpoint.
#[derive(Clone, Copy)]
enum CreateScript {
    Ok,
    FailOnceWith500,
    QuotaExhausted,
    AlwaysRateLimited,
}

struct ProviderState {
    script: CreateScript,
    create_calls: AtomicU32,
    bodies: Mutex<Vec<Value>>,
    auth_headers: Mutex<Vec<String>>,
}

struct MockProvider {
    base_url: String,
    state: Arc<ProviderState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockProvider {
    async fn spawn(script: CreateScript) -> Self {
        let state = Arc::new(ProviderState {
            script,
            create_calls: AtomicU32::new(0),
            bodies: Mutex::new(Vec::new()),
            auth_headers: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/v1/gpt4o-image/generate", post(create))
            .route("/api/v1/flux/kontext/generate", post(create))
            .route("/api/v1/gpt4o-image/record-info", get(gpt4o_record))
            .route("/api/v1/flux/kontext/record-info", get(flux_record))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    fn client(&self) -> GenerationClient {
        let config = GenerationClientConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key("test-key")
            .with_retry(RetryPolicy::linear(
                2,
                Duration::from_millis(10),
                Duration::from_millis(20),
            ));
        GenerationClient::new(config).unwrap()
    }

    fn create_calls(&self) -> u32 {
        self.state.create_calls.load(Ordering::SeqCst)
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create(
    State(state): State<Arc<ProviderState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let call = state.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.bodies.lock().unwrap().push(body);
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().unwrap().push(auth.to_string());
    }

    match state.script {
        CreateScript::FailOnceWith500 if call == 1 => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response()
        }
        CreateScript::QuotaExhausted => {
            Json(json!({"code": 402, "msg": "Insufficient credits", "data": null})).into_response()
        }
        CreateScript::AlwaysRateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"code": 429, "msg": "slow down"})),
        )
            .into_response(),
        _ => Json(json!({"code": 200, "msg": "success", "data": {"taskId": format!("task_{call}")}}))
            .into_response(),
    }
}

async fn gpt4o_record(Query(q): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
    let task_id = q.get("taskId").cloned().unwrap_or_default();
    Json(json!({
        "code": 200,
        "msg": "success",
        "data": {"taskId": task_id, "status": "GENERATING", "progress": "0.30"}
    }))
}

async fn flux_record(Query(q): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
    let task_id = q.get("taskId").cloned().unwrap_or_default();
    Json(json!({
        "code": 200,
        "msg": "success",
        "data": {
            "taskId": task_id,
            "successFlag": 1,
            "response": {"resultImageUrl": format!("https://cdn.example/{task_id}.png")}
        }
    }))
}

fn item(provider: ProviderKind, ratio: &str) -> GenerationItem {
    GenerationItem::from_request(
        TaskId::new(),
        GenerationRequest::new("a lighthouse at dusk").with_aspect_ratio(ratio.parse().unwrap()),
        provider,
    )
}

#[tokio::test]
async fn create_job_retries_transient_server_errors() {
    let provider = MockProvider::spawn(CreateScript::FailOnceWith500).await;
    let client = provider.client();

    let job = client.create_job(&item(ProviderKind::Gpt4o, "1:1")).await.unwrap();

    assert_eq!(job.provider_task_id, "task_2");
    assert_eq!(job.provider, ProviderKind::Gpt4o);
    assert_eq!(provider.create_calls(), 2);
}

#[tokio::test]
async fn quota_errors_are_not_retried() {
    let provider = MockProvider::spawn(CreateScript::QuotaExhausted).await;
    let client = provider.client();

    let err = client
        .create_job(&item(ProviderKind::Gpt4o, "1:1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Quota(_)));
    assert_eq!(provider.create_calls(), 1);
}

#[tokio::test]
async fn rate_limits_exhaust_the_retry_budget() {
    let provider = MockProvider::spawn(CreateScript::AlwaysRateLimited).await;
    let client = provider.client();

    let err = client
        .create_job(&item(ProviderKind::FluxKontext, "16:9"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited(_)));
    // One attempt plus two retries.
    assert_eq!(provider.create_calls(), 3);
}

#[tokio::test]
async fn unsupported_ratio_is_sent_as_prompt_hint() {
    let provider = MockProvider::spawn(CreateScript::Ok).await;
    let client = provider.client();

    client
        .create_job(&item(ProviderKind::Gpt4o, "16:9"))
        .await
        .unwrap();

    let bodies = provider.state.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].get("size").is_none());
    assert_eq!(bodies[0]["prompt"], "landscape 16:9, a lighthouse at dusk");
}

#[tokio::test]
async fn requests_carry_bearer_credentials() {
    let provider = MockProvider::spawn(CreateScript::Ok).await;
    let client = provider.client();

    client
        .create_job(&item(ProviderKind::FluxKontext, "16:9"))
        .await
        .unwrap();

    let headers = provider.state.auth_headers.lock().unwrap();
    assert_eq!(headers.as_slice(), ["Bearer test-key"]);
    let bodies = provider.state.bodies.lock().unwrap();
    assert_eq!(bodies[0]["aspectRatio"], "16:9");
}

#[tokio::test]
async fn status_queries_are_normalized_per_provider() {
    let provider = MockProvider::spawn(CreateScript::Ok).await;
    let client = provider.client();

    let gpt = client
        .query_status("task_9", ProviderKind::Gpt4o)
        .await
        .unwrap();
    assert_eq!(gpt, ProviderStatus::Processing { progress: Some(30) });

    let flux = client
        .query_status("task_9", ProviderKind::FluxKontext)
        .await
        .unwrap();
    assert_eq!(
        flux,
        ProviderStatus::Completed {
            artifact_url: "https://cdn.example/task_9.png".to_string()
        }
    );
}

#[tokio::test]
async fn task_ids_are_sent_as_encoded_query_values() {
    let provider = MockProvider::spawn(CreateScript::Ok).await;
    let client = provider.client();

    let flux = client
        .query_status("task 9&taskId=other#x", ProviderKind::FluxKontext)
        .await
        .unwrap();
    assert_eq!(
        flux,
        ProviderStatus::Completed {
            artifact_url: "https://cdn.example/task 9&taskId=other#x.png".to_string()
        }
    );
}
