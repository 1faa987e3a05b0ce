//! Advisory service: one prompt in, one free-text answer out
//!
//! Calls are single-attempt. Callers turn any [`AdvisorError`] into a fixed
//! apology for the user, so the error only needs to be good enough to log.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct AdvisorError {
    pub kind: AdvisorErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorErrorKind {
    /// Connection failures and timeouts
    Network,
    /// Non-2xx response (quota, auth, server errors)
    Http,
    /// Body did not match the expected shape
    Malformed,
    /// Well-formed response without any answer text
    Empty,
}

impl AdvisorError {
    pub fn new(kind: AdvisorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AdvisorErrorKind::Network, message)
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::new(AdvisorErrorKind::Http, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(AdvisorErrorKind::Malformed, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(AdvisorErrorKind::Empty, message)
    }
}

#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, prompt: &str) -> Result<String, AdvisorError>;
}

/// OpenAI chat-completions client
pub struct OpenAiAdvisor {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiAdvisor {
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self, AdvisorError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AdvisorError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!(
                "{}/chat/completions",
                config.openai_base_url.trim_end_matches('/')
            ),
            model: config.openai_model.clone(),
            temperature: config.advisor_temperature,
            max_tokens: config.advisor_max_tokens,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Advisor for OpenAiAdvisor {
    async fn advise(&self, prompt: &str) -> Result<String, AdvisorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdvisorError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    AdvisorError::network(format!("Connection failed: {e}"))
                } else {
                    AdvisorError::network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdvisorError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(AdvisorError::http(format!("HTTP {status}: {message}")));
        }

        parse_answer(&body)
    }
}

/// Extract the first choice's trimmed text from a chat-completions body
fn parse_answer(body: &str) -> Result<String, AdvisorError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| AdvisorError::malformed(format!("Failed to parse response: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AdvisorError::empty("No answer text in response"))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_answer_trims() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Drink water. \n"}}]}"#;
        assert_eq!(parse_answer(body).unwrap(), "Drink water.");
    }

    #[test]
    fn test_parse_answer_no_choices() {
        let err = parse_answer(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind, AdvisorErrorKind::Empty);
    }

    #[test]
    fn test_parse_answer_null_content() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(parse_answer(body).unwrap_err().kind, AdvisorErrorKind::Empty);
    }

    #[test]
    fn test_parse_answer_garbage() {
        let err = parse_answer("<html>oops</html>").unwrap_err();
        assert_eq!(err.kind, AdvisorErrorKind::Malformed);
    }

    #[test]
    fn test_request_shape() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        let advisor = OpenAiAdvisor::new(&config, "sk-test").unwrap();
        assert_eq!(advisor.endpoint, "http://127.0.0.1:9/v1/chat/completions");

        let json = serde_json::to_value(advisor.request("hello")).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 700);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    fn advisor_for(server: &MockServer) -> OpenAiAdvisor {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::for_test(temp_dir.path());
        config.openai_base_url = format!("{}/v1", server.uri());
        OpenAiAdvisor::new(&config, "sk-test").unwrap()
    }

    #[tokio::test]
    async fn test_advise_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Rest more."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = advisor_for(&server).advise("hello").await.unwrap();
        assert_eq!(answer, "Rest more.");
    }

    #[tokio::test]
    async fn test_advise_quota_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "You exceeded your current quota", "type": "insufficient_quota"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = advisor_for(&server).advise("hello").await.unwrap_err();
        assert_eq!(err.kind, AdvisorErrorKind::Http);
        assert!(err.message.contains("quota"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        let advisor = OpenAiAdvisor::new(&config, "sk-test").unwrap();
        let err = advisor.advise("hello").await.unwrap_err();
        assert_eq!(err.kind, AdvisorErrorKind::Network);
    }
}
