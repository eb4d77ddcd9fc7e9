//! # threadline: chat relay for hosted assistant threads
//!
//! `threadline` serves a small chat page and one route, `POST /api/assistant`, that relays each
//! user message (and optionally a file) to the OpenAI Assistants API and streams the assistant's
//! reply back to the page as it is produced.
//!
//! ## Request flow
//!
//! The page posts `{threadId, message}`, where `message` is a stringified envelope holding the
//! user's text, the thread id, an `isAppended` flag and, when a file is attached, the file itself
//! as stringified JSON with base64 content (see [`envelope`]). The route:
//!
//! 1. rejects anything that is not JSON with `400`,
//! 2. decodes the envelope,
//! 3. when a file is appended, gets it in front of the assistant (see [`uploads`]): either by
//!    ingesting it into a shared vector store wired to the assistant's `file_search` tool, or by
//!    attaching it to the message,
//! 4. reuses the envelope's thread or creates one, and adds the user message,
//! 5. answers `200` with a `text/plain` body that starts with the thread and message ids and then
//!    carries the run's text as it streams (see [`stream`]). When the run pauses for function
//!    calls the outputs are resolved through the [`tools::ToolRegistry`] and submitted.
//!
//! Failures before the reply starts are JSON errors (see [`errors`]); failures after become a
//! final error line in the stream.
//!
//! ## Components
//!
//! - [`upstream`]: the [`upstream::AssistantApi`] trait and its reqwest implementation
//! - [`api`]: axum handlers; [`build_router`] assembles them with CORS, metrics and tracing
//! - [`prompt`]: the chat form's submission and transcript rules, shared with the embedded page
//! - [`config`]: YAML plus environment configuration; [`telemetry`]: tracing and OTLP export

pub mod api;
pub mod config;
pub mod envelope;
pub mod errors;
mod openapi;
pub mod prompt;
mod static_assets;
pub mod stream;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod uploads;
pub mod upstream;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::tools::ToolRegistry;
use crate::upstream::{AssistantApi, AssistantClient};

pub use config::Config;
pub use errors::{Error, Result};

/// Shared state handed to every handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .api(Arc::new(AssistantClient::new(&config.openai)?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub api: Arc<dyn AssistantApi>,
    #[builder(default)]
    pub tools: ToolRegistry,
}

/// Create CORS layer from configuration. `None` when no origins are allowed.
fn create_cors_layer(config: &Config) -> anyhow::Result<Option<CorsLayer>> {
    if config.cors.allowed_origins.is_empty() {
        return Ok(None);
    }

    let wildcard = config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));
    let allow_origin = if wildcard {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(Some(cors))
}

/// Build the router: the assistant route, health and docs endpoints, the embedded page as
/// fallback, and the CORS, metrics and tracing layers the configuration asks for.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let body_limit = state.config.request_body_limit;
    let enable_metrics = state.config.enable_metrics;
    let cors_layer = create_cors_layer(&state.config)?;

    let mut router = Router::new()
        .route("/api/assistant", post(api::handlers::assistant::send_message))
        .layer(DefaultBodyLimit::max(body_limit))
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .fallback(api::handlers::static_assets::serve_embedded_asset)
        .with_state(state);

    if let Some(cors_layer) = cors_layer {
        router = router.layer(cors_layer);
    }

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The configured router plus what `serve` needs to bind it.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create the application against the real assistant API.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting threadline with configuration: {:#?}", config);

        if config.openai.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; requests to the assistant API will be rejected");
        }
        if config.assistant_id.is_none() {
            warn!("ASSISTANT_ID is not set; /api/assistant will answer 500 until it is");
        }

        let api = Arc::new(AssistantClient::new(&config.openai)?);
        Self::with_api(config, api, ToolRegistry::new())
    }

    /// Create the application against any [`AssistantApi`], with the given tools.
    pub fn with_api(config: Config, api: Arc<dyn AssistantApi>, tools: ToolRegistry) -> anyhow::Result<Self> {
        if tools.is_empty() {
            info!("No local tools registered; runs asking for a function call will end with an error");
        } else {
            info!(tools = ?tools.names(), "Local tools registered");
        }

        let state = AppState::builder().config(config.clone()).api(api).tools(tools).build();
        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "threadline listening on http://{}, available at http://localhost:{}",
            bind_addr,
            listener.local_addr()?.port()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CorsConfig;
    use crate::test_utils::{MockAssistantApi, create_test_app, create_test_config};
    use axum::http::StatusCode;
    use serde_json::Value;

    #[tokio::test]
    async fn test_healthz() {
        let server = create_test_app(create_test_config(), Arc::new(MockAssistantApi::new()));

        let response = server.get("/healthz").await;

        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let server = create_test_app(create_test_config(), Arc::new(MockAssistantApi::new()));

        let response = server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let doc: Value = response.json();
        assert!(doc["paths"]["/api/assistant"]["post"].is_object());
    }

    #[tokio::test]
    async fn test_metrics_route_only_when_enabled() {
        let server = create_test_app(create_test_config(), Arc::new(MockAssistantApi::new()));
        let response = server.get("/internal/metrics").await;
        // falls through to the chat page
        assert_eq!(
            response.headers().get("content-type").map(|v| v.to_str().unwrap()),
            Some("text/html")
        );

        let mut config = create_test_config();
        config.enable_metrics = true;
        let server = create_test_app(config, Arc::new(MockAssistantApi::new()));
        server.get("/internal/metrics").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_body_limit_applies_to_assistant_route() {
        let mut config = create_test_config();
        config.request_body_limit = 16;
        let server = create_test_app(config, Arc::new(MockAssistantApi::new()));

        let response = server
            .post("/api/assistant")
            .json(&serde_json::json!({"threadId": null, "message": "a message longer than sixteen bytes"}))
            .await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_cors_disabled_without_origins() {
        let config = create_test_config();
        assert!(create_cors_layer(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let mut config = create_test_config();
        config.cors = CorsConfig {
            allowed_origins: vec![CorsOrigin::Url("https://chat.example.com".parse().unwrap())],
            max_age: Some(600),
        };
        let server = create_test_app(config, Arc::new(MockAssistantApi::new()));

        let response = server
            .get("/healthz")
            .add_header("origin", "https://chat.example.com")
            .await;

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .map(|v| v.to_str().unwrap()),
            Some("https://chat.example.com")
        );
    }
}
