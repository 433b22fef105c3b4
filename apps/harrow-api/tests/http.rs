use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode, header},
};
use serde_json::Value;
use tower::util::ServiceExt;

use harrow_api::{routes, state::AppState};
use harrow_config::Config;
use harrow_service::Fuser;
use harrow_testkit::{ChunkBuilder, EmbeddingFailure, FakeEmbedding, MemoryStore};

fn app_with(config: Config, embedding: FakeEmbedding) -> Router {
	let store = MemoryStore::new(vec![
		ChunkBuilder::new("a", 0.9)
			.text("Soybean aphids peak in July.")
			.tag("crops", &["soybeans"])
			.build(),
		ChunkBuilder::new("b", 0.8).text("Wheat rust spreads in wet springs.").build(),
	]);
	let service = Fuser::with_backends(config, Arc::new(embedding), Arc::new(store));

	routes::router(AppState::with_service(service))
}

fn app() -> Router {
	app_with(harrow_testkit::test_config(), FakeEmbedding::new())
}

fn post(uri: &str, payload: Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(payload.to_string()))
		.expect("Failed to build request.")
}

async fn read_json(response: axum::response::Response) -> Value {
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");

	serde_json::from_slice(&body).expect("Failed to parse response.")
}

#[tokio::test]
async fn health_ok() {
	let response = app()
		.oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn search_returns_ranked_items() {
	let payload = serde_json::json!({
		"query": "aphids",
		"filters": { "should": { "crops": ["Soybeans"] } },
		"top_k": 2
	});
	let response = app().oneshot(post("/v1/search", payload)).await.expect("search");

	assert_eq!(response.status(), StatusCode::OK);

	let json = read_json(response).await;

	assert_eq!(json["items"][0]["id"], "a");
	assert_eq!(json["items"][0]["matched_categories"][0], "crops");
	assert_eq!(json["items"][1]["id"], "b");
	assert!(json["trace_id"].is_string());
}

#[tokio::test]
async fn context_route_returns_prompt() {
	let payload = serde_json::json!({ "query": "aphids", "top_k": 1 });
	let response = app().oneshot(post("/v1/search/context", payload)).await.expect("context");

	assert_eq!(response.status(), StatusCode::OK);

	let json = read_json(response).await;
	let prompt = json["prompt"].as_str().expect("prompt");

	assert!(prompt.contains("Context 1:"));
	assert!(prompt.contains("Text: Soybean aphids peak in July."));
	assert!(prompt.ends_with("Query: aphids"));
	assert_eq!(json["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn blank_query_is_bad_request() {
	let payload = serde_json::json!({ "query": "  " });
	let response = app().oneshot(post("/v1/search", payload)).await.expect("search");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(read_json(response).await["error_code"], "invalid_request");
}

#[tokio::test]
async fn oversized_filter_reports_field_path() {
	let values: Vec<String> = (0..200).map(|index| format!("value-{index}")).collect();
	let payload = serde_json::json!({
		"query": "aphids",
		"filters": { "must": { "crops": values } }
	});
	let response = app().oneshot(post("/v1/search", payload)).await.expect("search");

	assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

	let json = read_json(response).await;

	assert_eq!(json["error_code"], "invalid_filter");
	assert_eq!(json["fields"][0], "$.filters.must.crops");
}

#[tokio::test]
async fn embedding_failure_is_bad_gateway() {
	let embedding = FakeEmbedding::new().failing(usize::MAX, EmbeddingFailure::Permanent);
	let app = app_with(harrow_testkit::test_config(), embedding);
	let response = app
		.oneshot(post("/v1/search", serde_json::json!({ "query": "aphids" })))
		.await
		.expect("search");

	assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
	assert_eq!(read_json(response).await["error_code"], "retrieval_failed");
}

#[tokio::test]
async fn bearer_token_is_enforced_when_configured() {
	let mut config = harrow_testkit::test_config();

	config.security.api_auth_token = Some("secret".to_string());

	let app = app_with(config, FakeEmbedding::new());
	let payload = serde_json::json!({ "query": "aphids" });
	let denied = app.clone().oneshot(post("/v1/search", payload.clone())).await.expect("search");

	assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(read_json(denied).await["error_code"], "unauthorized");

	let mut request = post("/v1/search", payload);

	request
		.headers_mut()
		.insert(header::AUTHORIZATION, "Bearer secret".parse().expect("header value"));

	let allowed = app.oneshot(request).await.expect("search");

	assert_eq!(allowed.status(), StatusCode::OK);
}
