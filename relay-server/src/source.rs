//! External data source.
//!
//! The relay does not own the datum it protects; it fetches it on every
//! `RequestEncryptedValue`. The source is a trait so tests and embedders can
//! supply their own.

use crate::config::SourceConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Something that yields the datum to protect.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the current datum as text.
    async fn fetch(&self) -> Result<String, SourceError>;
}

/// Expected response body: a post with a title and an id. Either may be
/// missing.
#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default)]
    id: Value,
}

fn default_title() -> String {
    "N/A".to_string()
}

/// Render a post the way clients expect to read it after decryption.
pub fn render(title: &str, id: &Value) -> String {
    match id {
        Value::String(id) => format!("API_DATA: {title} | ID: {id}"),
        Value::Null => format!("API_DATA: {title} | ID: None"),
        other => format!("API_DATA: {title} | ID: {other}"),
    }
}

/// HTTP GET against a JSON endpoint with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl HttpDataSource {
    /// Build a client for `config.url`.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn classify(&self, error: reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            SourceError::Request(error)
        }
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let post: Post =
            serde_json::from_slice(&body).map_err(|e| SourceError::InvalidBody(e.to_string()))?;

        tracing::debug!("Fetched datum from {}", self.url);
        Ok(render(&post.title, &post.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route(
                "/posts/1",
                get(|| async {
                    Json(serde_json::json!({
                        "userId": 1,
                        "id": 1,
                        "title": "sunt aut facere",
                        "body": "quia et suscipit"
                    }))
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/untitled", get(|| async { Json(serde_json::json!({"id": 7})) }))
            .route("/list", get(|| async { Json(serde_json::json!([1, 2, 3])) }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    Json(serde_json::json!({"id": 1, "title": "late"}))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn source(url: String, timeout_secs: u64) -> HttpDataSource {
        HttpDataSource::new(&SourceConfig { url, timeout_secs }).unwrap()
    }

    #[test]
    fn render_formats_numeric_and_string_ids() {
        assert_eq!(
            render("hello", &serde_json::json!(1)),
            "API_DATA: hello | ID: 1"
        );
        assert_eq!(
            render("hello", &serde_json::json!("abc")),
            "API_DATA: hello | ID: abc"
        );
        assert_eq!(
            render("hello", &Value::Null),
            "API_DATA: hello | ID: None"
        );
    }

    #[tokio::test]
    async fn fetch_formats_post() {
        let base = spawn_upstream().await;
        let datum = source(format!("{base}/posts/1"), 5).fetch().await.unwrap();
        assert_eq!(datum, "API_DATA: sunt aut facere | ID: 1");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let base = spawn_upstream().await;
        let result = source(format!("{base}/missing"), 5).fetch().await;
        assert!(matches!(result, Err(SourceError::Status(404))));
    }

    #[tokio::test]
    async fn missing_title_renders_placeholder() {
        let base = spawn_upstream().await;
        let datum = source(format!("{base}/untitled"), 5).fetch().await.unwrap();
        assert_eq!(datum, "API_DATA: N/A | ID: 7");
    }

    #[tokio::test]
    async fn non_object_body_is_invalid() {
        let base = spawn_upstream().await;
        let result = source(format!("{base}/list"), 5).fetch().await;
        assert!(matches!(result, Err(SourceError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let base = spawn_upstream().await;
        let result = source(format!("{base}/slow"), 1).fetch().await;
        assert!(matches!(result, Err(SourceError::Timeout { secs: 1 })));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = source(format!("http://{addr}/posts/1"), 2).fetch().await;
        assert!(result.is_err());
    }
}
