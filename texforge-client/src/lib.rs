//! TexForge HTTP Client
//!
//! A simple, type-safe HTTP client for the TexForge compile service.
//!
//! # Example
//!
//! ```no_run
//! use texforge_client::CompilerClient;
//! use texforge_core::domain::job::Toolchain;
//!
//! #[tokio::main]
//! async fn main() -> texforge_client::Result<()> {
//!     let client = CompilerClient::new("http://localhost:8080");
//!
//!     let source = std::fs::read("paper.tex").expect("readable source");
//!     let result = client
//!         .compile_source("paper.tex", source, Some(Toolchain::Xelatex))
//!         .await?;
//!
//!     if let Some(pdf_url) = result.pdf_url {
//!         let pdf = client.fetch(&pdf_url).await?;
//!         println!("Rendered {} bytes", pdf.len());
//!     }
//!     Ok(())
//! }
//! ```

mod compile;
pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use texforge_core::domain::result::CompileResult;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use texforge_core::dto::job::CapacityRejection;

/// HTTP client for the TexForge API
///
/// Methods are grouped by front door:
/// - Synchronous compilation and artifact retrieval
/// - Queued jobs (submit, poll, download)
#[derive(Debug, Clone)]
pub struct CompilerClient {
    /// Base URL of the service (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CompilerClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the service (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// Compilations hold the request open until the job finishes, so a
    /// request timeout shorter than the server's deadline cuts them off.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch an artifact by the relative URL the service reported
    ///
    /// # Arguments
    /// * `url` - `logs_url` or `pdf_url` of a result, e.g. `/files/<id>.pdf`
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.url(url)).send().await?;
        let response = self.check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle a compile response
    ///
    /// Failed and timed-out compilations still carry a result body, so 500
    /// and 408 are decoded like a success.
    async fn handle_compile_response(&self, response: reqwest::Response) -> Result<CompileResult> {
        match response.status() {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::REQUEST_TIMEOUT => {
                let status = response.status();
                let text = response.text().await?;
                serde_json::from_str(&text).map_err(|_| {
                    ClientError::api_error(status.as_u16(), error_message(&text))
                })
            }
            _ => self.handle_response(response).await,
        }
    }

    /// Turn a non-success status into an error
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status == StatusCode::SERVICE_UNAVAILABLE {
            if let Ok(rejection) = serde_json::from_str::<CapacityRejection>(&error_text) {
                return Err(ClientError::Overloaded(rejection));
            }
        }

        tracing::debug!("Request failed with {}: {}", status, error_text);
        Err(ClientError::api_error(status.as_u16(), error_message(&error_text)))
    }
}

/// The `error` field of a JSON error body, or the raw text
fn error_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|body| body.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CompilerClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CompilerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url("/files/abc.pdf"),
            "http://localhost:8080/files/abc.pdf"
        );
    }

    #[test]
    fn test_error_message_prefers_json_field() {
        assert_eq!(
            error_message(r#"{"error":"Invalid file path"}"#),
            "Invalid file path"
        );
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }
}
