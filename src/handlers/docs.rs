//! API documentation routes: `/openapi.json`, `/docs`, `/redoc`.
//!
//! These paths are on the limiter's static exclusion list.

use axum::Json;
use axum::response::Html;
use serde_json::{Value, json};

/// OpenAPI 3 description of the service.
pub async fn openapi() -> Json<Value> {
    Json(openapi_document())
}

/// Human-readable endpoint listing.
pub async fn docs() -> Html<String> {
    let doc = openapi_document();
    let mut rows = String::new();
    if let Some(paths) = doc["paths"].as_object() {
        for (path, ops) in paths {
            for (method, op) in ops.as_object().into_iter().flatten() {
                let summary = op["summary"].as_str().unwrap_or_default();
                rows.push_str(&format!(
                    "<tr><td><code>{}</code></td><td><code>{path}</code></td><td>{summary}</td></tr>\n",
                    method.to_uppercase()
                ));
            }
        }
    }

    Html(format!(
        "<!doctype html>\n<html><head><title>Admission Gate API</title></head><body>\n\
         <h1>Admission Gate API v{}</h1>\n\
         <p>Machine-readable description: <a href=\"/openapi.json\">/openapi.json</a></p>\n\
         <table>\n<tr><th>Method</th><th>Path</th><th>Summary</th></tr>\n{rows}</table>\n\
         </body></html>\n",
        env!("CARGO_PKG_VERSION")
    ))
}

fn openapi_document() -> Value {
    let rate_limited = json!({
        "200": {"description": "Success; carries X-RateLimit-* headers"},
        "429": {"description": "Rate limit exceeded; carries Retry-After"}
    });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Admission Gate API",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/health": {"get": {"summary": "Liveness check (not rate limited)"}},
            "/ready": {"get": {"summary": "Readiness probe (not rate limited)"}},
            "/stats": {"get": {"summary": "Limiter statistics", "responses": rate_limited}},
            "/aircraft/{id}": {"get": {"summary": "Look up an aircraft", "responses": rate_limited}},
            "/regulations/{id}": {"get": {"summary": "Look up a regulation", "responses": rate_limited}},
            "/check-compliance": {"post": {
                "summary": "Check an aircraft against regulations",
                "responses": rate_limited
            }},
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes() {
        let doc = openapi_document();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/check-compliance"));
        assert_eq!(doc["openapi"], "3.0.3");
    }

    #[tokio::test]
    async fn test_docs_page_links_schema() {
        let Html(page) = docs().await;
        assert!(page.contains("/openapi.json"));
        assert!(page.contains("<code>POST</code>"));
    }
}
