use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use color_eyre::eyre;
use serde_json::Value;
use tower::util::ServiceExt;

use grove_api::{routes, state::AppState};
use grove_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use grove_domain::mentions::EntityMention;
use grove_service::{
	Backends, BoxFuture, EmbeddingProvider, Error, ExpansionProvider, GenerationProvider,
	GraphContext, GraphRelation, GroveService, Providers, RerankProvider, ResolvedEntity,
	VectorHit, VectorSearch, cache::MemoryCache,
};

#[derive(Default)]
struct FakeVector {
	fail: AtomicBool,
}

impl VectorSearch for FakeVector {
	fn search<'a>(
		&'a self,
		_query: &'a str,
		_filters: Option<&'a [String]>,
		_top_k: u32,
		_alpha: f32,
	) -> BoxFuture<'a, grove_service::Result<Vec<VectorHit>>> {
		Box::pin(async move {
			if self.fail.load(Ordering::SeqCst) {
				return Err(Error::RetrievalUnavailable { message: "qdrant down".to_string() });
			}

			Ok(vec![VectorHit {
				id: "c1".to_string(),
				source_document_id: "chimera.pdf".to_string(),
				text: "Project Chimera is led by Dr. Aris Thorne.".to_string(),
				score: 0.9,
			}])
		})
	}
}

struct NoGraph;

impl GraphContext for NoGraph {
	fn resolve_entities<'a>(
		&'a self,
		_mentions: &'a [EntityMention],
	) -> BoxFuture<'a, grove_service::Result<Vec<ResolvedEntity>>> {
		Box::pin(async { Ok(Vec::new()) })
	}

	fn neighborhood<'a>(
		&'a self,
		_entity_names: &'a [String],
		_hop_depth: u32,
		_limit: u32,
	) -> BoxFuture<'a, grove_service::Result<Vec<GraphRelation>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

struct FakeModels;

impl EmbeddingProvider for FakeModels {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async { Err(eyre::eyre!("not used")) })
	}
}

impl RerankProvider for FakeModels {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move { Ok(vec![0.5; docs.len()]) })
	}
}

impl ExpansionProvider for FakeModels {
	fn expand<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Value>> {
		Box::pin(async { Ok(serde_json::json!({ "queries": [] })) })
	}
}

impl GenerationProvider for FakeModels {
	fn generate<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async { Ok("Dr. Aris Thorne leads Project Chimera.".to_string()) })
	}
}

fn test_config(auth_token: Option<&str>) -> Config {
	let mut cfg: Config = toml::from_str(include_str!("fixtures/api_config.toml"))
		.expect("Failed to parse config.");

	cfg.retrieval.expansion.enabled = false;
	cfg.retrieval.graph.enabled = false;
	cfg.security.api_auth_token = auth_token.map(str::to_string);

	cfg
}

fn test_state(auth_token: Option<&str>) -> (AppState, Arc<FakeVector>) {
	let vector = Arc::new(FakeVector::default());
	let models = Arc::new(FakeModels);
	let service = GroveService::with_providers(
		test_config(auth_token),
		Backends::new(vector.clone(), Arc::new(NoGraph), Arc::new(MemoryCache::new(None))),
		Providers::new(models.clone(), models.clone(), models.clone(), models),
	);

	(AppState::from_service(service), vector)
}

async fn post_json(
	app: Router,
	uri: &str,
	payload: Value,
	token: Option<&str>,
) -> (StatusCode, Value) {
	let mut builder =
		Request::builder().method("POST").uri(uri).header("content-type", "application/json");

	if let Some(token) = token {
		builder = builder.header("Authorization", format!("Bearer {token}"));
	}

	let response = app
		.oneshot(builder.body(Body::from(payload.to_string())).expect("Failed to build request."))
		.await
		.expect("Failed to call route.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let (state, _) = test_state(None);
	let response = routes::router(state)
		.oneshot(
			Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn retrieve_returns_ranked_evidence() {
	let (state, _) = test_state(None);
	let (status, json) = post_json(
		routes::router(state),
		"/v1/retrieve",
		serde_json::json!({ "query": "What is Project Chimera?", "top_n": 3 }),
		None,
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["cache_hit"], false);
	assert_eq!(json["evidence"]["items"][0]["unit"]["source_document_id"], "chimera.pdf");
	assert_eq!(json["evidence"]["items"][0]["score"].as_f64().map(|score| score > 0.0), Some(true));
}

#[tokio::test]
async fn blank_query_is_a_bad_request() {
	let (state, _) = test_state(None);
	let (status, json) = post_json(
		routes::router(state),
		"/v1/retrieve",
		serde_json::json!({ "query": "  " }),
		None,
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn unavailable_retrieval_maps_to_503() {
	let (state, vector) = test_state(None);

	vector.fail.store(true, Ordering::SeqCst);

	let (status, json) = post_json(
		routes::router(state),
		"/v1/retrieve",
		serde_json::json!({ "query": "What is Project Chimera?" }),
		None,
	)
	.await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(json["error_code"], "RETRIEVAL_UNAVAILABLE");
}

#[tokio::test]
async fn answer_returns_generated_text_and_context() {
	let (state, _) = test_state(None);
	let (status, json) = post_json(
		routes::router(state),
		"/v1/answer",
		serde_json::json!({ "query": "Who leads Project Chimera?" }),
		None,
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["answer"], "Dr. Aris Thorne leads Project Chimera.");
	assert!(
		json["context"].as_str().is_some_and(|context| context.contains("Source: chimera.pdf"))
	);
}

#[tokio::test]
async fn auth_token_guards_api_routes() {
	let (state, _) = test_state(Some("secret"));
	let app = routes::router(state);
	let payload = serde_json::json!({ "query": "What is Project Chimera?" });
	let (missing, json) = post_json(app.clone(), "/v1/retrieve", payload.clone(), None).await;
	let (wrong, _) = post_json(app.clone(), "/v1/retrieve", payload.clone(), Some("nope")).await;
	let (ok, _) = post_json(app.clone(), "/v1/retrieve", payload, Some("secret")).await;
	let health = app
		.oneshot(
			Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(missing, StatusCode::UNAUTHORIZED);
	assert_eq!(json["error_code"], "UNAUTHORIZED");
	assert_eq!(wrong, StatusCode::UNAUTHORIZED);
	assert_eq!(ok, StatusCode::OK);
	assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_flush_reports_removed_entries() {
	let (state, _) = test_state(None);
	let payload = serde_json::json!({ "query": "What is Project Chimera?" });
	let (status, _) = post_json(routes::router(state.clone()), "/v1/retrieve", payload, None).await;

	assert_eq!(status, StatusCode::OK);

	let (status, json) =
		post_json(routes::admin_router(state), "/v1/admin/cache/flush", Value::Null, None).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["removed"], 1);
}
