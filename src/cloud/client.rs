//! HTTP client for the cloud store's REST endpoint

use super::{CloudResponse, CloudSink, UploadError};
use crate::config::CloudConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

pub struct CloudClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl CloudClient {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CloudSink for CloudClient {
    async fn post(&self, body: &str) -> Result<CloudResponse, UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| UploadError::Transport(Box::new(e)))?;

        let status = response.status();
        // The status line arrived, so the upload completed even if the body is cut short
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read response body: {}", e);
                String::new()
            }
        };

        Ok(CloudResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{header, HeaderMap};
    use axum::routing::post;
    use axum::Router;
    use reqwest::StatusCode;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// A request as the store saw it
    struct Received {
        headers: HeaderMap,
        body: String,
    }

    #[derive(Clone)]
    struct Store {
        requests: mpsc::UnboundedSender<Received>,
        status: StatusCode,
        reply: &'static str,
    }

    async fn insert(
        State(store): State<Store>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, &'static str) {
        store.requests.send(Received { headers, body }).ok();
        (store.status, store.reply)
    }

    /// Serve the water level table, answering every insert with `status`
    async fn spawn_store(
        status: StatusCode,
        reply: &'static str,
    ) -> (String, mpsc::UnboundedReceiver<Received>) {
        let (requests, received) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/rest/v1/water_levels", post(insert))
            .with_state(Store {
                requests,
                status,
                reply,
            });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/rest/v1/water_levels", addr), received)
    }

    fn client_for(endpoint: String, timeout_ms: u64) -> CloudClient {
        CloudClient::new(&CloudConfig {
            endpoint,
            api_key: "test-key".into(),
            request_timeout_ms: timeout_ms,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_post_sends_auth_headers_and_body() {
        let (endpoint, mut requests) = spawn_store(StatusCode::CREATED, "").await;
        let client = client_for(endpoint, 5000);

        let body = r#"{"water_level":"12.5","received_at":7}"#;
        let response = client.post(body).await.expect("post failed");
        assert_eq!(response.status, StatusCode::CREATED);

        let request = requests.recv().await.expect("no request");
        assert_eq!(request.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(request.headers["apikey"], "test-key");
        assert_eq!(request.headers[header::AUTHORIZATION], "Bearer test-key");
        assert_eq!(request.body, body);
    }

    #[tokio::test]
    async fn test_error_status_is_a_completed_request() {
        let (endpoint, mut requests) =
            spawn_store(StatusCode::INTERNAL_SERVER_ERROR, "oops").await;
        let client = client_for(endpoint, 5000);

        let response = client.post("{}").await.expect("post failed");
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, "oops");
        assert_eq!(requests.recv().await.expect("no request").body, "{}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{}/", addr), 5000);
        let result = client.post("{}").await;
        assert!(matches!(result, Err(UploadError::Transport(_))));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = client_for(format!("http://{}/", addr), 200);
        let result = client.post("{}").await;
        assert!(matches!(result, Err(UploadError::Transport(_))));
    }
}
