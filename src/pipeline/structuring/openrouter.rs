use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::StructuringError;
use crate::config::{self, ServiceConfig};

/// OpenAI-compatible chat-completions client for the hosted extraction service.
pub struct OpenRouterClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenRouterClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("{}/{}", config::APP_NAME, config::APP_VERSION))
            .build()
            .map_err(|e| StructuringError::ServiceUnavailable {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Request body for POST /chat/completions
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from POST /chat/completions
#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<ProviderError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Error object some providers return with a 200 status.
#[derive(Deserialize)]
struct ProviderError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl LlmClient for OpenRouterClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, StructuringError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| StructuringError::ServiceUnavailable {
                reason: format!("{} is not set", config::API_KEY_ENV),
            })?;

        let url = self.completions_url();
        let body = ChatCompletionRequest {
            model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
        };

        tracing::debug!(url = %url, model, prompt_chars = prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("X-Title", config::APP_NAME)
            .json(&body)
            .send()
            .map_err(|e| {
                let reason = if e.is_connect() {
                    format!("Cannot connect to {}: {e}", self.base_url)
                } else if e.is_timeout() {
                    format!("Request timed out after {}s", self.timeout_secs)
                } else {
                    e.to_string()
                };
                StructuringError::ServiceUnavailable { reason }
            })?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| StructuringError::ServiceUnavailable {
                reason: format!("Failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(StructuringError::ServiceUnavailable {
                reason: format!("HTTP {}: {}", status.as_u16(), text),
            });
        }

        completion_content(&text)
    }
}

/// Pull the assistant's reply out of a chat-completions response body.
fn completion_content(body: &str) -> Result<String, StructuringError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| StructuringError::ServiceUnavailable {
            reason: format!("Unreadable completion payload: {e}"),
        })?;

    if let Some(err) = parsed.error {
        let reason = match err.code {
            Some(code) => format!("Provider error ({code}): {}", err.message),
            None => format!("Provider error: {}", err.message),
        };
        return Err(StructuringError::ServiceUnavailable { reason });
    }

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty());

    content.ok_or_else(|| StructuringError::NoStructuredData {
        raw_response: body.to_string(),
    })
}

/// A request seen by [`MockLlmClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub model: String,
    pub prompt: String,
    pub system: String,
}

/// Mock LLM client for testing: returns a configurable reply and counts calls.
pub struct MockLlmClient {
    reply: Result<String, String>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockLlmClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails with `ServiceUnavailable { reason }`.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            ..Self::new("")
        }
    }

    /// Shared call counter that outlives moving the mock into a box.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn request_log(&self) -> Arc<Mutex<Vec<RecordedRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, StructuringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(RecordedRequest {
                model: model.to_string(),
                prompt: prompt.to_string(),
                system: system.to_string(),
            });
        }
        self.reply
            .clone()
            .map_err(|reason| StructuringError::ServiceUnavailable { reason })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use super::*;

    fn config_with(base_url: &str, api_key: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            api_key: api_key.map(String::from),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..ServiceConfig::default()
        }
    }

    fn unavailable_reason(err: StructuringError) -> String {
        match err {
            StructuringError::ServiceUnavailable { reason } => reason,
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn mock_client_returns_configured_reply() {
        let client = MockLlmClient::new(r#"{"patient_name":"Jane Doe"}"#);
        let reply = client.generate("m", "prompt", "system").unwrap();
        assert_eq!(reply, r#"{"patient_name":"Jane Doe"}"#);
        assert_eq!(client.call_counter().load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mock_client_records_requests() {
        let client = MockLlmClient::new("{}");
        let log = client.request_log();
        client.generate("model-a", "user text", "system text").unwrap();
        let requests = log.lock().unwrap();
        assert_eq!(
            requests[0],
            RecordedRequest {
                model: "model-a".into(),
                prompt: "user text".into(),
                system: "system text".into(),
            }
        );
    }

    #[test]
    fn mock_client_unavailable() {
        let client = MockLlmClient::unavailable("HTTP 503: busy");
        let err = client.generate("m", "p", "s").unwrap_err();
        assert_eq!(unavailable_reason(err), "HTTP 503: busy");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OpenRouterClient::new(&config_with("https://openrouter.ai/api/v1/", None)).unwrap();
        assert_eq!(client.completions_url(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn missing_api_key_fails_without_request() {
        // Port 9 is discard; never reached because the key check comes first.
        let client = OpenRouterClient::new(&config_with("http://127.0.0.1:9", None)).unwrap();
        let reason = unavailable_reason(client.generate("m", "p", "s").unwrap_err());
        assert!(reason.contains(config::API_KEY_ENV));
    }

    #[test]
    fn unreachable_service_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = config_with(&format!("http://127.0.0.1:{port}"), Some("sk-test"));
        let client = OpenRouterClient::new(&config).unwrap();
        let err = client.generate("m", "p", "s").unwrap_err();
        assert!(matches!(err, StructuringError::ServiceUnavailable { .. }));
    }

    /// Serve one canned HTTP response on an ephemeral port.
    /// The join handle yields the raw request the client sent.
    fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (base_url, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn completion_returns_assistant_content() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"id":"gen-1","choices":[{"message":{"role":"assistant","content":"{\"pcp_name\":\"Dr. Lee\"}"}}]}"#,
        );
        let client = OpenRouterClient::new(&config_with(&base_url, Some("sk-or-test"))).unwrap();

        let reply = client.generate("test-model", "user text", "system text").unwrap();
        assert_eq!(reply, r#"{"pcp_name":"Dr. Lee"}"#);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /chat/completions "));
        assert!(request.to_lowercase().contains("authorization: bearer sk-or-test"));
        assert!(request.contains(r#""model":"test-model""#));
        assert!(request.contains(r#""role":"system","content":"system text""#));
        assert!(request.contains(r#""role":"user","content":"user text""#));
    }

    #[test]
    fn non_success_status_is_unavailable_with_body() {
        let body = r#"{"error":{"message":"No auth credentials found","code":401}}"#;
        let (base_url, server) = serve_once("401 Unauthorized", body);
        let client = OpenRouterClient::new(&config_with(&base_url, Some("sk-or-bad"))).unwrap();

        let reason = unavailable_reason(client.generate("m", "p", "s").unwrap_err());
        assert_eq!(reason, format!("HTTP 401: {body}"));
        server.join().unwrap();
    }

    #[test]
    fn provider_error_with_ok_status_is_unavailable() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"error":{"message":"Rate limit exceeded","code":429}}"#);
        let client = OpenRouterClient::new(&config_with(&base_url, Some("sk-or-test"))).unwrap();

        let reason = unavailable_reason(client.generate("m", "p", "s").unwrap_err());
        assert_eq!(reason, "Provider error (429): Rate limit exceeded");
        server.join().unwrap();
    }

    #[test]
    fn request_body_shape() {
        let body = ChatCompletionRequest {
            model: "deepseek/deepseek-r1-0528:free",
            messages: [
                ChatMessage { role: "system", content: "sys" },
                ChatMessage { role: "user", content: "usr" },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek/deepseek-r1-0528:free");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "usr");
    }

    #[test]
    fn content_from_first_choice() {
        let body = r#"{"id":"gen-1","choices":[{"message":{"role":"assistant","content":"{\"pcp_name\":\"Dr. Lee\"}"}}]}"#;
        assert_eq!(completion_content(body).unwrap(), r#"{"pcp_name":"Dr. Lee"}"#);
    }

    #[test]
    fn empty_choices_is_no_structured_data() {
        let body = r#"{"id":"gen-1","choices":[]}"#;
        match completion_content(body).unwrap_err() {
            StructuringError::NoStructuredData { raw_response } => assert_eq!(raw_response, body),
            other => panic!("expected NoStructuredData, got {other:?}"),
        }
    }

    #[test]
    fn null_or_blank_content_is_no_structured_data() {
        for body in [
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
            r#"{"choices":[{"message":{"role":"assistant","content":"  \n"}}]}"#,
            r#"{"choices":[{"finish_reason":"length"}]}"#,
        ] {
            assert!(matches!(
                completion_content(body),
                Err(StructuringError::NoStructuredData { .. })
            ));
        }
    }

    #[test]
    fn provider_error_payload_is_unavailable() {
        let body = r#"{"error":{"message":"Rate limit exceeded","code":429}}"#;
        let reason = unavailable_reason(completion_content(body).unwrap_err());
        assert_eq!(reason, "Provider error (429): Rate limit exceeded");
    }

    #[test]
    fn non_json_payload_is_unavailable() {
        let reason = unavailable_reason(completion_content("<html>Bad Gateway</html>").unwrap_err());
        assert!(reason.starts_with("Unreadable completion payload"));
    }
}
