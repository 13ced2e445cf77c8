//! Legacy webhook transport.
//!
//! Two halves that work independently:
//!
//! - [`WebhookClient`] POSTs JSON payloads to an outgoing webhook URL.
//! - [`WebhookListener`] accepts form-encoded posts from the platform and
//!   turns them into a stream of [`IncomingWebhook`]s.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use conflux_core::{ListenerHandle, TransportError, TransportResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::http::{HttpClientOptions, build_client, serve};

/// Buffer size of the incoming webhook stream.
const INCOMING_BUFFER: usize = 100;

// =============================================================================
// Outgoing
// =============================================================================

/// Client for an outgoing webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: String,
}

impl WebhookClient {
    /// Creates a client posting to `url`.
    pub fn new(url: impl Into<String>, options: &HttpClientOptions) -> TransportResult<Self> {
        Ok(Self {
            client: build_client(options)?,
            url: url.into(),
        })
    }

    /// Returns the target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs `payload` as JSON. Any non-success status is an error.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> TransportResult<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Incoming
// =============================================================================

/// A message pushed by the platform's outgoing-webhook integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IncomingWebhook {
    pub token: String,
    pub team_id: String,
    pub team_domain: String,
    pub channel_id: String,
    pub channel_name: String,
    pub timestamp: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub trigger_word: String,
    pub service_id: String,
    pub bot_id: String,
}

/// Listener for incoming webhook posts.
pub struct WebhookListener;

impl WebhookListener {
    /// Binds `addr` and starts accepting posts on every path.
    ///
    /// The receiver yields `None` once the listener has been stopped and all
    /// in-flight requests have completed.
    pub async fn bind(
        addr: &str,
    ) -> TransportResult<(ListenerHandle, mpsc::Receiver<IncomingWebhook>)> {
        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let router = Router::new()
            .route("/", post(incoming_handler))
            .route("/{*path}", post(incoming_handler))
            .with_state(tx);
        let handle = serve(addr, router).await?;
        Ok((handle, rx))
    }
}

async fn incoming_handler(
    State(tx): State<mpsc::Sender<IncomingWebhook>>,
    Form(hook): Form<IncomingWebhook>,
) -> StatusCode {
    debug!(channel = %hook.channel_name, user = %hook.user_name, "Received incoming webhook");
    if tx.send(hook).await.is_err() {
        warn!("Incoming webhook receiver dropped");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({ "text": "hi" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            WebhookClient::new(format!("{}/hook", server.uri()), &HttpClientOptions::default())
                .unwrap();
        client
            .send(&serde_json::json!({ "text": "hi" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_client_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = WebhookClient::new(server.uri(), &HttpClientOptions::default()).unwrap();
        let err = client.send(&serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_listener_yields_form_posts() {
        let (mut handle, mut rx) = WebhookListener::bind("127.0.0.1:0").await.unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://{}/hooks/in", handle.id))
            .form(&[("user_name", "alice"), ("text", "hello"), ("channel_name", "general")])
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let hook = rx.recv().await.unwrap();
        assert_eq!(hook.user_name, "alice");
        assert_eq!(hook.text, "hello");
        assert_eq!(hook.channel_name, "general");

        handle.stop();
    }
}
