//! Client for the hosted natural-language-to-SQL analyst service.

use std::time::Duration;

use async_trait::async_trait;
use imint::{AnalystRequest, AnalystResponse};

/// Path of the message endpoint relative to the account base URL.
pub const MESSAGE_PATH: &str = "/api/v2/cortex/analyst/message";

#[derive(Debug, thiserror::Error)]
pub enum AnalystError {
    #[error("analyst service is not configured (set IMINT_ANALYST_URL and IMINT_ANALYST_TOKEN)")]
    NotConfigured,

    #[error("invalid analyst url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("analyst request timed out")]
    Timeout,

    #[error("analyst request failed: {0}")]
    Http(reqwest::Error),

    #[error("analyst returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode analyst response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for AnalystError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

/// One round-trip to the analyst service.
#[async_trait]
pub trait AnalystApi: Send + Sync {
    async fn send(&self, request: &AnalystRequest) -> Result<AnalystResponse, AnalystError>;
}

/// HTTPS analyst client with bearer authentication.
pub struct AnalystClient {
    endpoint: url::Url,
    token: String,
    client: reqwest::Client,
}

impl AnalystClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, AnalystError> {
        let endpoint = url::Url::parse(&format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            MESSAGE_PATH
        ))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            token: token.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl AnalystApi for AnalystClient {
    async fn send(&self, request: &AnalystRequest) -> Result<AnalystResponse, AnalystError> {
        tracing::debug!(
            "analyst request: {} messages to {}",
            request.messages.len(),
            self.endpoint
        );
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalystError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: AnalystResponse =
            serde_json::from_slice(&bytes).map_err(|e| AnalystError::Decode(e.to_string()))?;
        tracing::info!(
            "analyst answered (request_id: {})",
            parsed.request_id.as_deref().unwrap_or("-")
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imint::Message;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AnalystRequest {
        AnalystRequest {
            messages: vec![Message::user_text("How many images were captured?")],
            semantic_model_file: "@stage/model.yaml".into(),
        }
    }

    #[test]
    fn test_endpoint_joins_base() {
        let c =
            AnalystClient::new("https://acct.example.com/", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(
            c.endpoint(),
            "https://acct.example.com/api/v2/cortex/analyst/message"
        );
        assert!(AnalystClient::new("not a url", "t", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_send_posts_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGE_PATH))
            .and(bearer_token("secret"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{"role": "user", "content": [{"type": "text", "text": "How many images were captured?"}]}],
                "semantic_model_file": "@stage/model.yaml"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "analyst", "content": [{"type": "text", "text": "Five."}]},
                "request_id": "r-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = AnalystClient::new(&server.uri(), "secret", Duration::from_secs(5)).unwrap();
        let resp = c.send(&request()).await.unwrap();
        assert_eq!(resp.request_id.as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_error_status_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let c = AnalystClient::new(&server.uri(), "x", Duration::from_secs(5)).unwrap();
        match c.send(&request()).await {
            Err(AnalystError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let c = AnalystClient::new(&server.uri(), "x", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            c.send(&request()).await,
            Err(AnalystError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let c = AnalystClient::new(&server.uri(), "x", Duration::from_millis(50)).unwrap();
        assert!(matches!(c.send(&request()).await, Err(AnalystError::Timeout)));
    }
}
