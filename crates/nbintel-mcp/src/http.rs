//! Streamable HTTP transport for remote MCP servers.
//!
//! Each JSON-RPC message is POSTed to the server URL. Responses arrive
//! either as plain JSON or as a single-message SSE body, depending on
//! the server.

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;

/// Parameters for a streamable HTTP MCP server.
#[derive(Debug, Clone, Default)]
pub struct HttpParams {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// Streamable HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    params: HttpParams,
}

impl HttpTransport {
    pub fn new(params: HttpParams) -> Self {
        Self {
            client: reqwest::Client::new(),
            params,
        }
    }

    async fn post(&self, body: String) -> McpResult<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.params.url)
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream")
            .body(body);
        for (name, value) in &self.params.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(McpError::transport(format!(
                "server returned status {}",
                status
            )));
        }
        Ok(response)
    }
}

/// Extract the JSON-RPC payload from a response body that may be SSE.
fn extract_payload(body: &str) -> &str {
    for line in body.lines() {
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data: ") {
            return data;
        }
    }
    body.trim()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let body = serde_json::to_string(&request)?;
        let response = self.post(body).await?;
        let text = response.text().await?;
        let payload = extract_payload(&text);
        serde_json::from_str(payload)
            .map_err(|e| McpError::protocol(format!("invalid response: {}", e)))
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let body = serde_json::to_string(&notification)?;
        self.post(body).await?;
        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_payload_plain_json() {
        let body = r#"{"jsonrpc": "2.0", "id": 1, "result": {}}"#;
        assert_eq!(extract_payload(body), body);
    }

    #[test]
    fn test_extract_payload_sse() {
        let body = "event: message\ndata: {\"jsonrpc\": \"2.0\", \"id\": 1, \"result\": {}}\n\n";
        assert_eq!(
            extract_payload(body),
            "{\"jsonrpc\": \"2.0\", \"id\": 1, \"result\": {}}"
        );
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"tools": []}
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpParams {
            url: server.uri(),
            headers: HashMap::new(),
        });

        let response = transport
            .request(JsonRpcRequest::new(1, "tools/list", None))
            .await
            .unwrap();
        assert_eq!(response.id, 1);
        assert!(response.result.is_some());
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpParams {
            url: server.uri(),
            headers: HashMap::new(),
        });

        let result = transport
            .request(JsonRpcRequest::new(1, "tools/list", None))
            .await;
        assert!(matches!(result, Err(McpError::Transport(_))));
    }

    #[tokio::test]
    async fn test_custom_headers_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2, "result": {}
            })))
            .mount(&server)
            .await;

        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        let transport = HttpTransport::new(HttpParams {
            url: server.uri(),
            headers,
        });

        let response = transport
            .request(JsonRpcRequest::new(2, "initialize", None))
            .await
            .unwrap();
        assert_eq!(response.id, 2);
    }
}
