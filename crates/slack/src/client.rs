use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::{StatusCode, header::RETRY_AFTER},
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{debug, warn},
};

use loghorn_sink::{ChannelInfo, ChatApi, Credential, Error, Result};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
const LIST_PAGE_LIMIT: &str = "200";

/// Slack Web API client.
pub struct SlackApi {
    http: reqwest::Client,
    base_url: String,
}

impl SlackApi {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a different API root (test servers).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for SlackApi {
    fn default() -> Self {
        Self::new()
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<WireChannel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct WireChannel {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct PostResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

// ── Classification ──────────────────────────────────────────────────────────

/// Error codes Slack uses for a rejected or dead token.
fn is_credential_error(code: &str) -> bool {
    matches!(
        code,
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" | "token_expired"
    )
}

fn api_error(method: &str, code: String) -> Error {
    if is_credential_error(&code) {
        Error::CredentialInvalid
    } else {
        Error::transport_message(format!("{method} failed: {code}"))
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    let secs = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs))
}

#[async_trait]
impl ChatApi for SlackApi {
    async fn list_channels(&self, credential: &Credential) -> Result<Vec<ChannelInfo>> {
        let mut channels = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut request = self
                .http
                .get(format!("{}/conversations.list", self.base_url))
                .bearer_auth(credential.token().expose_secret())
                .query(&[
                    ("types", "public_channel,private_channel"),
                    ("limit", LIST_PAGE_LIMIT),
                ]);
            if !cursor.is_empty() {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::transport("conversations.list", e))?;
            let status = response.status();
            if !status.is_success() {
                warn!(status = %status, "conversations.list HTTP error");
                return Err(Error::transport_message(format!(
                    "conversations.list failed: HTTP {status}"
                )));
            }

            let body: ListResponse = response
                .json()
                .await
                .map_err(|e| Error::transport("conversations.list", e))?;
            if !body.ok {
                let code = body.error.unwrap_or_else(|| "unknown_error".into());
                warn!(code = %code, "conversations.list rejected");
                return Err(api_error("conversations.list", code));
            }

            channels.extend(
                body.channels
                    .into_iter()
                    .map(|c| ChannelInfo { id: c.id, name: c.name }),
            );
            cursor = body
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }

        debug!(channel_count = channels.len(), "channel listing fetched");
        Ok(channels)
    }

    async fn post_message(
        &self,
        credential: &Credential,
        channel_id: &str,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut request = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(credential.token().expose_secret())
            .json(&serde_json::json!({
                "channel": channel_id,
                "text": text,
            }));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport("chat.postMessage", e))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            // Only a Retry-After header makes a 429 recoverable; without the
            // hint there is nothing to schedule against.
            if let Some(wait) = retry_after_header(&response) {
                return Err(Error::rate_limited(wait));
            }
            return Err(Error::transport_message(
                "chat.postMessage failed: HTTP 429 without Retry-After",
            ));
        }
        if !status.is_success() {
            warn!(status = %status, "chat.postMessage HTTP error");
            return Err(Error::transport_message(format!(
                "chat.postMessage failed: HTTP {status}"
            )));
        }

        let body: PostResponse = response
            .json()
            .await
            .map_err(|e| Error::transport("chat.postMessage", e))?;
        if !body.ok {
            let code = body.error.unwrap_or_else(|| "unknown_error".into());
            warn!(code = %code, "chat.postMessage rejected");
            return Err(api_error("chat.postMessage", code));
        }

        debug!(channel_id, bytes = text.len(), "message posted");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use {
        axum::{
            Json, Router,
            extract::{Query, State},
            http::HeaderMap,
            response::IntoResponse,
            routing::{get, post},
        },
        tokio::sync::oneshot,
    };

    use super::*;

    async fn serve(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock slack api");
        });
        (addr, shutdown_tx)
    }

    fn api_for(addr: SocketAddr) -> SlackApi {
        SlackApi::with_base_url(format!("http://{addr}"))
    }

    #[derive(Clone, Default)]
    struct ListState {
        auth_headers: Arc<Mutex<Vec<String>>>,
        cursors: Arc<Mutex<Vec<String>>>,
    }

    async fn paginated_list(
        State(state): State<ListState>,
        Query(params): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Json<serde_json::Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        state.auth_headers.lock().unwrap().push(auth);

        let cursor = params.get("cursor").cloned().unwrap_or_default();
        state.cursors.lock().unwrap().push(cursor.clone());

        if cursor.is_empty() {
            Json(serde_json::json!({
                "ok": true,
                "channels": [
                    {"id": "C01", "name": "ops"},
                    {"id": "C02", "name": "alerts"},
                ],
                "response_metadata": {"next_cursor": "page-2"},
            }))
        } else {
            Json(serde_json::json!({
                "ok": true,
                "channels": [
                    {"id": "C03", "name": "deploys"},
                ],
                "response_metadata": {"next_cursor": ""},
            }))
        }
    }

    #[tokio::test]
    async fn list_channels_follows_pagination() {
        let state = ListState::default();
        let app = Router::new()
            .route("/conversations.list", get(paginated_list))
            .with_state(state.clone());
        let (addr, _shutdown) = serve(app).await;

        let channels = api_for(addr)
            .list_channels(&Credential::from_token("xoxb-test"))
            .await
            .expect("list channels");

        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["ops", "alerts", "deploys"]);
        assert_eq!(
            state.cursors.lock().unwrap().as_slice(),
            ["".to_owned(), "page-2".to_owned()]
        );
        assert!(
            state
                .auth_headers
                .lock()
                .unwrap()
                .iter()
                .all(|h| h == "Bearer xoxb-test")
        );
    }

    #[tokio::test]
    async fn list_channels_invalid_auth_is_credential_error() {
        let app = Router::new().route(
            "/conversations.list",
            get(|| async {
                Json(serde_json::json!({"ok": false, "error": "invalid_auth"}))
            }),
        );
        let (addr, _shutdown) = serve(app).await;

        let err = api_for(addr)
            .list_channels(&Credential::from_token("xoxb-bad"))
            .await;
        assert!(matches!(err, Err(Error::CredentialInvalid)));
    }

    #[derive(Clone, Default)]
    struct PostState {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    async fn accepting_post(
        State(state): State<PostState>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        state.bodies.lock().unwrap().push(body);
        Json(serde_json::json!({"ok": true}))
    }

    #[tokio::test]
    async fn post_message_sends_channel_and_text() {
        let state = PostState::default();
        let app = Router::new()
            .route("/chat.postMessage", post(accepting_post))
            .with_state(state.clone());
        let (addr, _shutdown) = serve(app).await;

        api_for(addr)
            .post_message(
                &Credential::from_token("xoxb-test"),
                "C01",
                "a\nb\n",
                Some(Duration::from_secs(5)),
            )
            .await
            .expect("post message");

        let bodies = state.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["channel"], "C01");
        assert_eq!(bodies[0]["text"], "a\nb\n");
    }

    #[tokio::test]
    async fn post_message_429_with_retry_after_is_rate_limited() {
        let app = Router::new().route(
            "/chat.postMessage",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER, "30")],
                    Json(serde_json::json!({"ok": false, "error": "ratelimited"})),
                )
                    .into_response()
            }),
        );
        let (addr, _shutdown) = serve(app).await;

        let err = api_for(addr)
            .post_message(&Credential::from_token("xoxb-test"), "C01", "text", None)
            .await;
        assert!(matches!(
            err,
            Err(Error::RateLimited { retry_after }) if retry_after == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn post_message_429_without_header_is_transport_error() {
        let app = Router::new().route(
            "/chat.postMessage",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({"ok": false, "error": "ratelimited"})),
                )
                    .into_response()
            }),
        );
        let (addr, _shutdown) = serve(app).await;

        let err = api_for(addr)
            .post_message(&Credential::from_token("xoxb-test"), "C01", "text", None)
            .await;
        assert!(matches!(err, Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn post_message_unknown_code_is_transport_error() {
        let app = Router::new().route(
            "/chat.postMessage",
            post(|| async {
                Json(serde_json::json!({"ok": false, "error": "channel_not_found"}))
            }),
        );
        let (addr, _shutdown) = serve(app).await;

        let err = api_for(addr)
            .post_message(&Credential::from_token("xoxb-test"), "C0X", "text", None)
            .await;
        assert!(matches!(err, Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn post_message_revoked_token_is_credential_error() {
        let app = Router::new().route(
            "/chat.postMessage",
            post(|| async {
                Json(serde_json::json!({"ok": false, "error": "token_revoked"}))
            }),
        );
        let (addr, _shutdown) = serve(app).await;

        let err = api_for(addr)
            .post_message(&Credential::from_token("xoxb-old"), "C01", "text", None)
            .await;
        assert!(matches!(err, Err(Error::CredentialInvalid)));
    }
}
