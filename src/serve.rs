//! Local preview server.
//!
//! Viewers load their page maps with `fetch()` and YouTube refuses to embed
//! into `file://` pages, so the output directory has to be opened over HTTP.
//! This serves it as static files until Ctrl-C.

use axum::Router;
use std::path::Path;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::error::{Error, Result};

/// Static file router over `dir`; `/` serves `index.html`.
pub fn router(dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display(), %bind, port))]
pub async fn serve(dir: &Path, bind: &str, port: u16) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "{} is not a directory; run `generate` first or pass --dir",
            dir.display()
        )));
    }

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::io(&addr, e))?;
    info!(url = %format!("http://{addr}/"), "Serving viewers, Ctrl-C to stop");

    axum::serve(listener, router(dir))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| Error::io(dir, e))?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get(dir: &Path, uri: &str) -> (StatusCode, String) {
        let resp = router(dir)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_serves_files_and_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>index</h1>").unwrap();
        std::fs::write(dir.path().join("Tapes_data.json"), "{}").unwrap();

        let (status, body) = get(dir.path(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>index</h1>");

        let (status, body) = get(dir.path(), "/Tapes_data.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{}");

        let (status, _) = get(dir.path(), "/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve(&dir.path().join("nope"), "127.0.0.1", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
