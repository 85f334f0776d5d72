// src/client.rs

//! Shared HTTP session
//!
//! One blocking reqwest client serves downloads, IMS and BOS. It carries the
//! bearer token and retries transport failures and gateway errors
//! (502/503/504) with exponential backoff. Retrying is invisible to callers:
//! they get the final response, whatever its status.

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for a single HTTP request. Large artifacts stream for a
/// long time, so this is generous.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Connection establishment timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for one request
const MAX_ATTEMPTS: u32 = 10;

/// Backoff factor; sleep is `factor * 2^(attempt - 1)`
const BACKOFF_FACTOR: Duration = Duration::from_secs(2);

/// Upper bound on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Statuses worth another attempt
const RETRY_STATUSES: [StatusCode; 3] = [
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Retry policy for a [`Session`]
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_factor: BACKOFF_FACTOR,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts; for tests against local mock servers
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_factor: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_factor
            .saturating_mul(exp)
            .min(self.max_backoff)
    }
}

/// HTTP session shared by every outbound call of a run
pub struct Session {
    client: Client,
    retry: RetryPolicy,
}

impl Session {
    /// Build the session described by the process configuration
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_policy(config.auth_token.as_deref(), RetryPolicy::default())
    }

    /// Build a session with an explicit token and retry policy
    pub fn with_policy(auth_token: Option<&str>, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Config(format!("invalid AUTH_TOKEN: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, retry })
    }

    /// Send a request, retrying transport errors and gateway statuses
    ///
    /// `build` is called once per attempt so request bodies can be rebuilt.
    /// The last response is returned even when its status is an error.
    pub fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build(&self.client).send() {
                Ok(response) => {
                    let status = response.status();
                    if RETRY_STATUSES.contains(&status) && attempt < self.retry.max_attempts {
                        warn!(
                            "HTTP {} from {} (attempt {}), retrying...",
                            status,
                            response.url(),
                            attempt
                        );
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retry.max_attempts => {
                    warn!("Request attempt {} failed: {}, retrying...", attempt, e);
                }
                Err(e) => return Err(Error::Http(e)),
            }
            std::thread::sleep(self.retry.backoff(attempt));
        }
    }

    /// Stream a URL to `dest_path`
    ///
    /// Data lands in a temporary file next to the destination and is renamed
    /// into place once complete, so a failed download never leaves a partial
    /// file under the final name. Returns the number of bytes written.
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<u64> {
        info!("Downloading {} to {}", url, dest_path.display());

        let download_error = |message: String| Error::DownloadFailed {
            url: url.to_string(),
            message,
        };

        let dest_dir = dest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dest_dir)?;

        let mut response = self
            .send(|c| c.get(url))
            .map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }

        let mut temp = tempfile::NamedTempFile::new_in(dest_dir)?;
        let written = io::copy(&mut response, temp.as_file_mut())
            .map_err(|e| download_error(format!("failed to write downloaded data: {e}")))?;

        temp.persist(dest_path).map_err(|e| {
            download_error(format!("failed to move download to {}: {}", dest_path.display(), e))
        })?;

        debug!("Downloaded {} bytes to {}", written, dest_path.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::with_policy(Some("secret"), RetryPolicy::immediate(3)).unwrap()
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(9), Duration::from_secs(120));
    }

    #[test]
    fn test_download_file_sends_token() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/artifacts/kernel")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body("test")
            .create();

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("kernel");
        let written = session()
            .download_file(&format!("{}/artifacts/kernel", server.url()), &dest)
            .unwrap();

        mock.assert();
        assert_eq!(written, 4);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "test");
    }

    #[test]
    fn test_retries_gateway_errors_up_to_limit() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create();

        let response = session()
            .send(|c| c.get(format!("{}/flaky", server.url())))
            .unwrap();

        mock.assert();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/missing").with_status(404).expect(1).create();

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing");
        let err = session()
            .download_file(&format!("{}/missing", server.url()), &dest)
            .unwrap_err();

        mock.assert();
        assert!(matches!(err, Error::DownloadFailed { ref message, .. } if message.contains("404")));
        assert!(!dest.exists());
    }
}
