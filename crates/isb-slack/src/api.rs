//! Slack Web API client
//!
//! Every call goes through [`SlackApiClient::call`], which owns the retry
//! budget and the response envelope handling.

use isb_core::SlackConfig;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, SlackError};
use crate::types::*;

/// A successful response body with the envelope fields removed
pub type JsonObject = serde_json::Map<String, Value>;

/// Envelope fields callers never see
const ENVELOPE_FIELDS: [&str; 3] = ["ok", "response_metadata", "warning"];

/// Page size for list calls
const LIST_LIMIT: &str = "1000";

/// Slack Web API client
#[derive(Clone)]
pub struct SlackApiClient {
    client: Client,
    token: String,
    base_url: String,
    retries: u32,
}

impl SlackApiClient {
    /// Create a new Slack API client
    pub fn new(token: &str, config: &SlackConfig) -> Result<Self> {
        if token.is_empty() {
            return Err(SlackError::TokenNotConfigured);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(SlackError::Http)?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retries: config.retries,
        })
    }

    /// Add authorization header
    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// Call `method`, retrying up to `retries` more times on failure.
    ///
    /// Attempts follow each other immediately; there is no backoff.
    pub async fn call(&self, method: &str, params: &[(&str, &str)], retries: u32) -> Result<JsonObject> {
        let mut body = self.call_raw(method, params, retries).await?;
        strip_envelope(&mut body);
        Ok(body)
    }

    /// Retry loop; the body keeps its envelope fields.
    async fn call_raw(&self, method: &str, params: &[(&str, &str)], retries: u32) -> Result<JsonObject> {
        let attempts = retries + 1;
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            match self.attempt(method, params).await {
                Ok(body) => return Ok(body),
                Err(reason) => {
                    if attempt < attempts {
                        warn!(method, attempt, "Slack call failed, retrying: {}", reason);
                    }
                    last_failure = reason;
                }
            }
        }

        Err(SlackError::RemoteCallFailed {
            method: method.to_string(),
            attempts,
            reason: last_failure,
        })
    }

    /// Single attempt, no retry
    pub async fn call_once(&self, method: &str, params: &[(&str, &str)]) -> Result<JsonObject> {
        self.call(method, params, 0).await
    }

    /// Call with the configured retry budget
    pub async fn call_retrying(&self, method: &str, params: &[(&str, &str)]) -> Result<JsonObject> {
        self.call(method, params, self.retries).await
    }

    /// Call with the configured retry budget and decode the body
    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        let body = self.call_retrying(method, params).await?;
        decode(method, body)
    }

    /// Follow `response_metadata.next_cursor` until it runs out, collecting
    /// the items of every page.
    async fn call_paged<P, T, F>(&self, method: &str, params: &[(&str, &str)], items: F) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
        F: Fn(P) -> Vec<T>,
    {
        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut body = {
                let mut page_params = params.to_vec();
                if let Some(cursor) = cursor.as_deref() {
                    page_params.push(("cursor", cursor));
                }
                self.call_raw(method, &page_params, self.retries).await?
            };
            pages += 1;

            let next = body
                .get("response_metadata")
                .and_then(|meta| meta.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);

            strip_envelope(&mut body);
            collected.extend(items(decode(method, body)?));

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(method, pages, items = collected.len(), "Paged call complete");
        Ok(collected)
    }

    async fn attempt(&self, method: &str, params: &[(&str, &str)]) -> std::result::Result<JsonObject, String> {
        let url = format!("{}/{}", self.base_url, method);

        debug!(method, params = params.len(), "Slack call");

        let request = if params.is_empty() {
            self.client.get(&url)
        } else {
            self.client.post(&url).form(params)
        };

        let response = self
            .add_auth(request)
            .send()
            .await
            .map_err(|e| format!("request error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("unparsable body: {}", e))?;

        let Value::Object(body) = body else {
            return Err(format!("unexpected body: {}", body));
        };

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("missing ok flag");
            return Err(error.to_string());
        }

        Ok(body)
    }

    /// Identity check for the token
    pub async fn auth_test(&self) -> Result<AuthTestResponse> {
        self.call_as("auth.test", &[]).await
    }

    /// Ask for a streaming socket URL
    pub async fn rtm_connect(&self) -> Result<RtmConnectResponse> {
        self.call_as("rtm.connect", &[]).await
    }

    /// Every workspace member, deleted ones included
    pub async fn users_list(&self) -> Result<Vec<SlackUser>> {
        self.call_paged("users.list", &[("limit", LIST_LIMIT)], |page: UsersListResponse| page.members)
            .await
    }

    pub async fn users_info(&self, user_id: &str) -> Result<SlackUser> {
        let res: UsersInfoResponse = self.call_as("users.info", &[("user", user_id)]).await?;
        Ok(res.user)
    }

    pub async fn users_get_presence(&self, user_id: &str) -> Result<String> {
        let res: PresenceResponse = self.call_as("users.getPresence", &[("user", user_id)]).await?;
        Ok(res.presence)
    }

    /// Set own presence (`auto` or `away`)
    pub async fn users_set_presence(&self, presence: &str) -> Result<()> {
        self.call_retrying("users.setPresence", &[("presence", presence)]).await?;
        Ok(())
    }

    /// Conversations of the given comma-separated types
    pub async fn conversations_list(&self, types: &str) -> Result<Vec<SlackChannel>> {
        self.call_paged(
            "conversations.list",
            &[("types", types), ("limit", LIST_LIMIT)],
            |page: ConversationsListResponse| page.channels,
        )
        .await
    }

    /// Open (or fetch) the direct message channel with a user
    pub async fn conversations_open(&self, user_id: &str) -> Result<String> {
        let res: ConversationsOpenResponse =
            self.call_as("conversations.open", &[("users", user_id)]).await?;
        Ok(res.channel.id)
    }

    /// Move the read cursor of a conversation
    pub async fn conversations_mark(&self, channel: &str, ts: &str) -> Result<()> {
        self.call_retrying("conversations.mark", &[("channel", channel), ("ts", ts)])
            .await?;
        Ok(())
    }

    /// Post a message. Not retried: a retry after a lost response would post twice.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.call_once("chat.postMessage", &[("channel", channel), ("text", text)])
            .await?;
        Ok(())
    }
}

fn strip_envelope(body: &mut JsonObject) {
    for field in ENVELOPE_FIELDS {
        body.remove(field);
    }
}

fn decode<T: DeserializeOwned>(method: &str, body: JsonObject) -> Result<T> {
    serde_json::from_value(Value::Object(body)).map_err(|e| SlackError::Parse(format!("{}: {}", method, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, retries: u32) -> SlackApiClient {
        let config = SlackConfig {
            api_base_url: server.uri(),
            retries,
            ..Default::default()
        };
        SlackApiClient::new("xoxp-test", &config).unwrap()
    }

    #[test]
    fn test_api_client_requires_token() {
        let result = SlackApiClient::new("", &SlackConfig::default());
        assert!(matches!(result, Err(SlackError::TokenNotConfigured)));
    }

    #[tokio::test]
    async fn test_call_strips_envelope_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .and(header("authorization", "Bearer xoxp-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "warning": "superfluous_charset",
                "response_metadata": { "warnings": ["superfluous_charset"] },
                "user_id": "U1",
                "team": "Acme"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server, 0).call_once("auth.test", &[]).await.unwrap();
        assert_eq!(body.get("user_id"), Some(&json!("U1")));
        assert!(!body.contains_key("ok"));
        assert!(!body.contains_key("warning"));
        assert!(!body.contains_key("response_metadata"));
    }

    #[tokio::test]
    async fn test_params_are_form_posted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_string_contains("channel=C1"))
            .and(body_string_contains("text=hello+world"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, 5).post_message("C1", "hello world").await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let server = MockServer::start().await;
        Mock::given(path("/users.setPresence"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": "ratelimited"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server, 2).users_set_presence("away").await.unwrap_err();
        match err {
            SlackError::RemoteCallFailed { method, attempts, reason } => {
                assert_eq!(method, "users.setPresence");
                assert_eq!(attempts, 3);
                assert_eq!(reason, "ratelimited");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_server_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/users.getPresence"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(path("/users.getPresence"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "presence": "away"
            })))
            .mount(&server)
            .await;

        let presence = client_for(&server, 2).users_get_presence("U1").await.unwrap();
        assert_eq!(presence, "away");
    }

    #[tokio::test]
    async fn test_post_message_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, 5).post_message("C1", "hi").await.unwrap_err();
        assert!(matches!(err, SlackError::RemoteCallFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_body_without_ok_flag_fails() {
        let server = MockServer::start().await;
        Mock::given(path("/rtm.connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "wss://x" })))
            .mount(&server)
            .await;

        let err = client_for(&server, 0).rtm_connect().await.unwrap_err();
        assert!(matches!(err, SlackError::RemoteCallFailed { .. }));
    }

    #[tokio::test]
    async fn test_list_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(path("/users.list"))
            .and(body_string_contains("cursor=page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "members": [{ "id": "U2", "name": "bob" }],
                "response_metadata": { "next_cursor": "" }
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "members": [{ "id": "U1", "name": "alice" }],
                "response_metadata": { "next_cursor": "page2" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let users = client_for(&server, 0).users_list().await.unwrap();
        let names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_list_without_metadata_is_one_page() {
        let server = MockServer::start().await;
        Mock::given(path("/conversations.list"))
            .and(body_string_contains("types=im"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "D1", "user": "U1", "is_im": true }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ims = client_for(&server, 0).conversations_list("im").await.unwrap();
        assert_eq!(ims.len(), 1);
        assert_eq!(ims[0].user.as_deref(), Some("U1"));
    }
}
