//! HTTP handlers for the embedded chat page.

use axum::{
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::static_assets::Assets;

fn asset(path: &str) -> Option<Response> {
    let content = Assets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some(
        (
            [
                (header::CONTENT_TYPE, mime.as_ref().to_string()),
                (header::CACHE_CONTROL, "no-cache".to_string()),
            ],
            content.data.into_owned(),
        )
            .into_response(),
    )
}

/// Serve an embedded file, or the chat page for any path that is not one.
#[instrument]
pub async fn serve_embedded_asset(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let path = if path.is_empty() || path.ends_with('/') { "index.html" } else { path };

    if let Some(response) = asset(path) {
        return response;
    }

    debug!("No embedded asset for {}, serving the chat page", uri.path());
    asset("index.html").unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum_test::TestServer;

    fn create_test_server() -> TestServer {
        TestServer::new(Router::new().fallback(serve_embedded_asset)).unwrap()
    }

    fn header<'a>(response: &'a axum_test::TestResponse, name: &str) -> Option<&'a str> {
        response.headers().get(name).map(|v| v.to_str().unwrap())
    }

    #[tokio::test]
    async fn test_root_serves_chat_page() {
        let response = create_test_server().get("/").await;

        response.assert_status_ok();
        assert_eq!(header(&response, "content-type"), Some("text/html"));
        assert_eq!(header(&response, "cache-control"), Some("no-cache"));
        let text = response.text();
        assert!(text.contains("<!doctype html>"));
        assert!(text.contains("/api/assistant"));
    }

    #[tokio::test]
    async fn test_serves_favicon() {
        let response = create_test_server().get("/favicon.svg").await;

        response.assert_status_ok();
        assert_eq!(header(&response, "content-type"), Some("image/svg+xml"));
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back_to_chat_page() {
        let response = create_test_server().get("/chat/thread_1").await;

        response.assert_status_ok();
        assert_eq!(header(&response, "content-type"), Some("text/html"));
    }
}
