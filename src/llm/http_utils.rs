//! HTTP plumbing for the backend REST endpoints
//!
//! Shared request/response handling for the image and transcription calls
//! that go over plain HTTP rather than through the chat client.

use crate::config::get_backend_http_timeout_secs;
use crate::llm::AiError;
use reqwest::multipart::Form;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Creates an HTTP client with the standard backend timeout.
///
/// Uses the `BACKEND_HTTP_TIMEOUT_SECS` environment variable or the 120s
/// default; image generation can be slow.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_backend_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends a POST request with a JSON body and returns the parsed response.
///
/// # Errors
///
/// Returns `AiError::NetworkError` on connectivity issues,
/// `AiError::ApiError` on non-success status codes, or
/// `AiError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
    auth_header: &str,
) -> Result<Value, AiError> {
    let response = client
        .post(url)
        .header("Authorization", auth_header)
        .json(body)
        .send()
        .await
        .map_err(|e| AiError::NetworkError(e.to_string()))?;

    parse_response(response).await
}

/// Sends a POST request with a multipart body and returns the parsed response.
///
/// # Errors
///
/// Returns `AiError::NetworkError` on connectivity issues,
/// `AiError::ApiError` on non-success status codes, or
/// `AiError::JsonError` if parsing fails.
pub async fn send_multipart_request(
    client: &HttpClient,
    url: &str,
    form: Form,
    auth_header: &str,
) -> Result<Value, AiError> {
    let response = client
        .post(url)
        .header("Authorization", auth_header)
        .multipart(form)
        .send()
        .await
        .map_err(|e| AiError::NetworkError(e.to_string()))?;

    parse_response(response).await
}

async fn parse_response(response: reqwest::Response) -> Result<Value, AiError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();

        // Proxies in front of the API tend to answer with HTML error pages.
        let is_html = error_text.trim_start().starts_with("<!DOCTYPE")
            || error_text.trim_start().starts_with("<html");

        let message = if is_html {
            format!("API error: {status} (server returned an HTML error page)")
        } else {
            format!("API error: {status} - {}", truncate(&error_text, 500))
        };
        return Err(AiError::ApiError(message));
    }

    response
        .json()
        .await
        .map_err(|e| AiError::JsonError(e.to_string()))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{cut}... (truncated)")
}

/// Extracts a string from a JSON response by navigating a path.
///
/// Path segments are object keys, or array indices when numeric, e.g.
/// `["data", "0", "url"]` for the image endpoints and `["text"]` for
/// transcriptions.
///
/// # Errors
///
/// Returns `AiError::ApiError` if the path is missing or the target is not
/// a string.
pub fn extract_text_content(response: &Value, path: &[&str]) -> Result<String, AiError> {
    let mut current = response;

    for segment in path {
        if let Ok(index) = segment.parse::<usize>() {
            current = current
                .get(index)
                .ok_or_else(|| AiError::ApiError(format!("Invalid path: missing index {index}")))?;
        } else {
            current = current
                .get(*segment)
                .ok_or_else(|| AiError::ApiError(format!("Invalid path: missing key {segment}")))?;
        }
    }

    current
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| AiError::ApiError(format!("Expected string at path, got: {current:?}")))
}
