//! # Downloads
//!
//! HTTP GET helpers shared by the Maven pipeline, and the classification
//! that decides whether a failure becomes a `False` condition or a
//! retryable error. HTTP 429 and the 5xx range are retryable and must not
//! touch conditions; everything else is reported via conditions so the
//! record is not hammered with backoff retries it cannot recover from.

use std::path::Path;

use anyhow::Context as _;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::observability::metrics;

/// Basic-auth credentials extracted from a repository auth secret
#[derive(Debug, Clone, Default)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server answered with a non-2xx status
    #[error("Error received HTTP status {status} getting \"{url}\"")]
    Status { status: u16, url: String },
    /// The request could not be completed
    #[error("{url} download error {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The response could not be persisted locally
    #[error("unable to store download of {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DownloadError {
    /// HTTP status of the failure, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            DownloadError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this failure should be retried with backoff instead of
    /// being reported via a condition
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Status { status, .. } => *status == 429 || *status >= 500,
            DownloadError::Request { .. } => false,
            DownloadError::Io { .. } => true,
        }
    }
}

fn request(
    client: &reqwest::Client,
    url: &str,
    auth: Option<&BasicAuth>,
) -> reqwest::RequestBuilder {
    let mut builder = client.get(url);
    if let Some(auth) = auth {
        builder = builder.basic_auth(&auth.username, Some(&auth.password));
    }
    builder
}

async fn send(
    client: &reqwest::Client,
    url: &str,
    auth: Option<&BasicAuth>,
) -> Result<reqwest::Response, DownloadError> {
    metrics::increment_artifact_downloads();
    let response = request(client, url, auth)
        .send()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        metrics::increment_artifact_download_errors();
        return Err(DownloadError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// GET a URL into memory
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    auth: Option<&BasicAuth>,
) -> Result<Vec<u8>, DownloadError> {
    let response = send(client, url, auth).await?;
    let body = response
        .bytes()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;
    debug!(url, bytes = body.len(), "downloaded");
    Ok(body.to_vec())
}

/// GET a URL, streaming the body into a file
pub async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    auth: Option<&BasicAuth>,
    dest: &Path,
) -> Result<(), DownloadError> {
    let response = send(client, url, auth).await?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| DownloadError::Io {
            url: url.to_string(),
            source: anyhow::Error::new(e)
                .context(format!("unable to create {}", dest.display())),
        })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(|e| DownloadError::Io {
            url: url.to_string(),
            source: anyhow::Error::new(e)
                .context(format!("unable to write {}", dest.display())),
        })?;
    }
    file.flush()
        .await
        .context("unable to flush download")
        .map_err(|source| DownloadError::Io {
            url: url.to_string(),
            source,
        })?;
    debug!(url, dest = %dest.display(), "downloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_are_429_and_5xx() {
        let retryable = [429u16, 500, 502, 503, 599];
        for status in retryable {
            let err = DownloadError::Status {
                status,
                url: "https://repo.example/m2".into(),
            };
            assert!(err.is_retryable(), "status {status}");
        }

        let terminal = [400u16, 401, 403, 404, 418];
        for status in terminal {
            let err = DownloadError::Status {
                status,
                url: "https://repo.example/m2".into(),
            };
            assert!(!err.is_retryable(), "status {status}");
        }
    }

    #[test]
    fn status_error_message_names_the_url() {
        let err = DownloadError::Status {
            status: 404,
            url: "https://repo.example/m2/maven-metadata.xml".into(),
        };
        assert_eq!(
            err.to_string(),
            "Error received HTTP status 404 getting \"https://repo.example/m2/maven-metadata.xml\""
        );
    }
}
