//! Read-only fetches from the remote endpoints (version markers, catalog archive).

use std::error::Error;
use std::time::Duration;

/// Timeout for the small plain-text version markers.
pub const MARKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the catalog archive download.
pub const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(30);

fn build_http_client(timeout: Duration) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("mcpm/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout.min(Duration::from_secs(15)))
        .timeout(timeout)
        .build()
}

/// Fetch a plain-text marker and return it trimmed.
pub fn fetch_text(url: &str, timeout: Duration) -> Result<String, FetchError> {
    let bytes = fetch_bytes(url, timeout)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

/// Fetch a whole response body. Non-success statuses are errors.
pub fn fetch_bytes(url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
    log::debug!("Fetching {}", url);
    let client = build_http_client(timeout).map_err(FetchError::HttpClient)?;
    let resp = client.get(url).send().map_err(|e| classify(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = resp.bytes().map_err(|e| classify(url, e))?;
    log::debug!("Fetched {} bytes from {}", body.len(), url);
    Ok(body.to_vec())
}

fn classify(url: &str, cause: reqwest::Error) -> FetchError {
    if cause.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            cause,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("Failed to fetch {url}: {}", cause_chain(.cause))]
    Network {
        url: String,
        #[source]
        cause: reqwest::Error,
    },
    #[error("Timed out fetching {url}")]
    Timeout { url: String },
    #[error("Failed to fetch {url}: HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// True for timeouts and connection failures, false for HTTP-level answers.
    pub fn is_connection(&self) -> bool {
        matches!(self, FetchError::Network { .. } | FetchError::Timeout { .. })
    }
}

/// `err` followed by one "Caused by" line per source.
fn cause_chain(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        text.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    text
}


#[cfg(test)]
mod tests {
    use super::test_server::{closed_url, serve_once};
    use super::*;

    #[test]
    fn text_is_trimmed() {
        let url = serve_once("200 OK", b"  1.2.3\n".to_vec());
        assert_eq!(fetch_text(&format!("{}/ver.txt", url), MARKER_TIMEOUT).unwrap(), "1.2.3");
    }

    #[test]
    fn non_success_status_is_an_error() {
        let url = serve_once("404 Not Found", b"missing".to_vec());
        let err = fetch_bytes(&url, MARKER_TIMEOUT).unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!err.is_connection());
    }

    #[test]
    fn refused_connection_is_a_network_error() {
        let url = closed_url();
        let err = fetch_text(&url, MARKER_TIMEOUT).unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().starts_with(&format!("Failed to fetch {}", url)));
        assert!(err.source().is_some());
    }
}
