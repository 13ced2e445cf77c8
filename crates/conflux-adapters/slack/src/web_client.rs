//! [`SlackApi`] over the Slack Web API.

use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{ApiError, ApiResult, TransportError};
use conflux_transport::{HttpClientOptions, build_client};
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::api::SlackApi;
use crate::model::{
    BotIdentity, Channel, OutgoingMessage, Page, UploadRequest, UploadedFile, User,
};

/// Public Web API endpoint.
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Listing page size.
const PAGE_LIMIT: &str = "200";

/// Wait used when a 429 carries no `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Slack Web API client authenticated with a bot token.
#[derive(Debug, Clone)]
pub struct WebApiClient {
    client: Client,
    token: String,
    base_url: String,
}

impl WebApiClient {
    /// Creates a client for the public endpoint.
    pub fn new(token: impl Into<String>, options: &HttpClientOptions) -> ApiResult<Self> {
        Ok(Self {
            client: build_client(options)?,
            token: token.into(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    /// Points the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
    }

    async fn call_json<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> ApiResult<Value> {
        trace!(method, "Calling Slack API");
        let resp = self.request(method).json(body).send().await;
        read_response(method, resp).await
    }

    async fn call_form(&self, method: &str, params: &[(&str, &str)]) -> ApiResult<Value> {
        trace!(method, "Calling Slack API");
        let resp = self.request(method).form(params).send().await;
        read_response(method, resp).await
    }
}

/// Maps an HTTP response onto the Web API result convention.
async fn read_response(
    method: &str,
    resp: Result<reqwest::Response, reqwest::Error>,
) -> ApiResult<Value> {
    let resp = resp.map_err(|e| TransportError::SendFailed(e.to_string()))?;
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
        debug!(method, ?retry_after, "Slack API rate limited");
        return Err(ApiError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let body: Value = resp
        .json()
        .await
        .map_err(|e| ApiError::SerializationError(e.to_string()))?;
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let code = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(ApiError::platform(code));
    }
    Ok(body)
}

/// Takes `key` out of a response body.
fn field<T: DeserializeOwned>(body: &mut Value, key: &str) -> ApiResult<T> {
    let value = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| ApiError::SerializationError(format!("missing field `{key}`")))?;
    Ok(serde_json::from_value(value)?)
}

fn next_cursor(body: &Value) -> Option<String> {
    body.pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn post_message(&self, msg: &OutgoingMessage) -> ApiResult<String> {
        let mut body = self.call_json("chat.postMessage", msg).await?;
        field(&mut body, "ts")
    }

    async fn update_message(&self, ts: &str, msg: &OutgoingMessage) -> ApiResult<()> {
        let mut body = serde_json::to_value(msg)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("ts".to_string(), Value::String(ts.to_string()));
        }
        self.call_json("chat.update", &body).await.map(drop)
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> ApiResult<()> {
        self.call_form("chat.delete", &[("channel", channel_id), ("ts", ts)])
            .await
            .map(drop)
    }

    async fn upload_file(&self, req: &UploadRequest) -> ApiResult<UploadedFile> {
        let mut form = Form::new()
            .text("channels", req.channel_id.clone())
            .text("filename", req.filename.clone())
            .part(
                "file",
                Part::bytes(req.data.clone()).file_name(req.filename.clone()),
            );
        if !req.initial_comment.is_empty() {
            form = form.text("initial_comment", req.initial_comment.clone());
        }
        if !req.thread_ts.is_empty() {
            form = form.text("thread_ts", req.thread_ts.clone());
        }
        trace!(method = "files.upload", file = %req.filename, "Calling Slack API");
        let resp = self.request("files.upload").multipart(form).send().await;
        let mut body = read_response("files.upload", resp).await?;
        field(&mut body, "file")
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> ApiResult<()> {
        self.call_form(
            "conversations.setTopic",
            &[("channel", channel_id), ("topic", topic)],
        )
        .await
        .map(drop)
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> ApiResult<()> {
        self.call_form(
            "conversations.setPurpose",
            &[("channel", channel_id), ("purpose", purpose)],
        )
        .await
        .map(drop)
    }

    async fn join_conversation(&self, channel: &str) -> ApiResult<Channel> {
        let mut body = self
            .call_form("conversations.join", &[("channel", channel)])
            .await?;
        field(&mut body, "channel")
    }

    async fn user_info(&self, user_id: &str) -> ApiResult<User> {
        let mut body = self.call_form("users.info", &[("user", user_id)]).await?;
        field(&mut body, "user")
    }

    async fn list_conversations(&self, cursor: Option<&str>) -> ApiResult<Page<Channel>> {
        let mut params = vec![
            ("types", "public_channel,private_channel"),
            ("exclude_archived", "true"),
            ("limit", PAGE_LIMIT),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let mut body = self.call_form("conversations.list", &params).await?;
        Ok(Page {
            next_cursor: next_cursor(&body),
            items: field(&mut body, "channels")?,
        })
    }

    async fn conversation_members(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> ApiResult<Page<String>> {
        let mut params = vec![("channel", channel_id), ("limit", PAGE_LIMIT)];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let mut body = self.call_form("conversations.members", &params).await?;
        Ok(Page {
            next_cursor: next_cursor(&body),
            items: field(&mut body, "members")?,
        })
    }

    async fn download_file(&self, url: &str) -> ApiResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            }
            .into());
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn auth_test(&self) -> ApiResult<BotIdentity> {
        let body = self.call_form("auth.test", &[]).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn client(server: &MockServer) -> WebApiClient {
        WebApiClient::new("xoxb-test", &HttpClientOptions::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_post_message_returns_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(json!({ "channel": "C1", "text": "hello" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "111.222" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let msg = OutgoingMessage {
            channel: "C1".into(),
            text: "hello".into(),
            ..Default::default()
        };
        let ts = client(&server).await.post_message(&msg).await.unwrap();
        assert_eq!(ts, "111.222");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(path("/chat.delete"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .delete_message("C1", "1.0")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::RateLimited { retry_after } if retry_after == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn test_platform_error_code() {
        let server = MockServer::start().await;
        Mock::given(path("/conversations.join"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "already_in_channel" })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .join_conversation("C1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("already_in_channel"));
    }

    #[tokio::test]
    async fn test_list_conversations_cursor() {
        let server = MockServer::start().await;
        Mock::given(path("/conversations.list"))
            .and(body_string_contains("cursor=page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "C2", "name": "random", "is_member": false }],
                "response_metadata": { "next_cursor": "" }
            })))
            .mount(&server)
            .await;
        Mock::given(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "C1", "name": "general", "is_member": true }],
                "response_metadata": { "next_cursor": "page2" }
            })))
            .mount(&server)
            .await;

        let api = client(&server).await;
        let first = api.list_conversations(None).await.unwrap();
        assert_eq!(first.items[0].name, "general");
        assert_eq!(first.next_cursor.as_deref(), Some("page2"));

        let second = api.list_conversations(Some("page2")).await.unwrap();
        assert_eq!(second.items[0].id, "C2");
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let server = MockServer::start().await;
        Mock::given(path("/files.upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "file": { "id": "F1", "shares": { "public": { "C1": [{ "ts": "5.5" }] } } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/F1/cat.png"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let api = client(&server).await;
        let uploaded = api
            .upload_file(&UploadRequest {
                channel_id: "C1".into(),
                filename: "cat.png".into(),
                data: vec![1, 2, 3],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(uploaded.id, "F1");
        assert_eq!(uploaded.message_ts("C1"), Some("5.5"));

        let data = api
            .download_file(&format!("{}/files/F1/cat.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(data, [1, 2, 3]);
    }
}
