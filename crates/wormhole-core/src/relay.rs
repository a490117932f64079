//! Client for the content-addressed storage relay
//!
//! The relay fronts pinned content-addressed storage:
//!
//! - `POST {relay}/ipfs-upload`: multipart field `file`, bearer auth,
//!   answers `{ success, file: { hash } }` or `{ error }`
//! - `GET {relay}/ipfs-content/{hash}`: streamed bytes, optional
//!   `Content-Length`
//! - `POST {relay}/pins/rm`: JSON `{ cid }`, bearer auth, answers
//!   `{ success }`

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RelayError;

/// Upper bound on the buffer reserved up front from `Content-Length`
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// How long to wait for a TCP connection to the relay
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated on an open connection
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    file: Option<UploadedFile>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(default)]
    hash: Option<String>,
}

#[derive(Debug, Serialize)]
struct UnpinRequest<'a> {
    cid: &'a str,
}

#[derive(Debug, Deserialize)]
struct UnpinResponse {
    #[serde(default)]
    success: bool,
}

fn build_client(read_timeout: Duration) -> Result<Client, RelayError> {
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()?)
}

/// HTTP client for one relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base: Url,
    client: Client,
    auth_token: Option<String>,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, RelayError> {
        let base = Url::parse(base_url)
            .map_err(|e| RelayError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(RelayError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            base,
            client: build_client(DEFAULT_READ_TIMEOUT)?,
            auth_token,
        })
    }

    /// Replace the read timeout. A stalled upload, download or unpin fails
    /// once the relay sends nothing for this long.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Result<Self, RelayError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// The relay's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RelayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Upload a file and return its content hash.
    pub async fn upload(
        &self,
        data: Bytes,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, RelayError> {
        let size = data.len();
        // Bytes clones share the buffer
        let file_part = || {
            Part::stream_with_length(Body::from(data.clone()), size as u64)
                .file_name(filename.to_string())
        };
        let part = match file_part().mime_str(mime_type) {
            Ok(part) => part,
            Err(_) => file_part().mime_str("application/octet-stream")?,
        };
        let form = Form::new().part("file", part);

        let url = self.endpoint(&["ipfs-upload"])?;
        debug!(%url, filename, size, "Uploading to relay");

        let response = self.authorized(self.client.post(url)).multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Option<UploadResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = body
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("Upload failed with HTTP status {}", status.as_u16()));
            return Err(RelayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = body.ok_or_else(|| RelayError::Decode(text.clone()))?;
        let hash = body
            .file
            .and_then(|f| f.hash)
            .filter(|h| !h.trim().is_empty());

        match (hash, body.error) {
            (Some(hash), _) => {
                info!(%hash, filename, size, "Uploaded to relay");
                Ok(hash)
            }
            (None, Some(message)) => Err(RelayError::Status {
                status: status.as_u16(),
                message,
            }),
            (None, None) => Err(RelayError::MissingHash),
        }
    }

    /// Stream content by hash, reporting `(loaded, total)` after each chunk.
    ///
    /// `total` is the relay's `Content-Length`, if it sent one. Chunks are
    /// appended as they arrive; the full payload is returned at the end.
    pub async fn download<F>(&self, hash: &str, mut on_chunk: F) -> Result<Bytes, RelayError>
    where
        F: FnMut(u64, Option<u64>),
    {
        let url = self.endpoint(&["ipfs-content", hash])?;
        debug!(%url, "Downloading from relay");

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                message: format!("Relay returned HTTP {}", status.as_u16()),
            });
        }

        let total = response.content_length();
        let mut buffer = BytesMut::with_capacity(total.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
        let mut loaded: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            loaded += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);
            on_chunk(loaded, total);
        }

        info!(hash, loaded, "Downloaded from relay");
        Ok(buffer.freeze())
    }

    /// Ask the relay to release its pin on `hash`.
    ///
    /// Returns the relay's success flag; transport and status failures are
    /// errors.
    pub async fn unpin(&self, hash: &str) -> Result<bool, RelayError> {
        let url = self.endpoint(&["pins", "rm"])?;
        debug!(%url, hash, "Unpinning");

        let response = self
            .authorized(self.client.post(url))
            .json(&UnpinRequest { cid: hash })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                message: format!("Unpin failed with HTTP status {}", status.as_u16()),
            });
        }

        let body: UnpinResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Decode(e.to_string()))?;
        Ok(body.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn relay(server: &MockServer) -> RelayClient {
        RelayClient::new(&server.uri(), Some("secret".to_string())).unwrap()
    }

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let client = RelayClient::new("https://relay.example.com/api/", None).unwrap();
        let url = client.endpoint(&["ipfs-content", "Qm123"]).unwrap();
        assert_eq!(url.as_str(), "https://relay.example.com/api/ipfs-content/Qm123");
    }

    #[tokio::test]
    async fn test_upload_returns_hash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ipfs-upload"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "file": {"hash": "Qm123"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let hash = relay(&server)
            .await
            .upload(Bytes::from_static(b"0123456789"), "a.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(hash, "Qm123");
    }

    #[tokio::test]
    async fn test_upload_error_prefers_relay_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ipfs-upload"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid token"})))
            .mount(&server)
            .await;

        let err = relay(&server)
            .await
            .upload(Bytes::from_static(b"x"), "x.bin", "application/octet-stream")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_upload_error_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = relay(&server)
            .await
            .upload(Bytes::from_static(b"x"), "x.bin", "application/octet-stream")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Upload failed with HTTP status 502");
    }

    #[tokio::test]
    async fn test_upload_without_hash_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let err = relay(&server)
            .await
            .upload(Bytes::from_static(b"x"), "x.bin", "not a mime")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingHash));
    }

    #[tokio::test]
    async fn test_download_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipfs-content/Qm123"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&server)
            .await;

        let mut seen = Vec::new();
        let bytes = relay(&server)
            .await
            .download("Qm123", |loaded, total| seen.push((loaded, total)))
            .await
            .unwrap();

        assert_eq!(bytes.as_ref(), b"0123456789");
        assert_eq!(seen.last(), Some(&(10, Some(10))));
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = relay(&server)
            .await
            .download("QmMissing", |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_unpin_sends_cid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pins/rm"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({"cid": "Qm123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(relay(&server).await.unpin("Qm123").await.unwrap());
    }

    #[tokio::test]
    async fn test_unpin_reports_relay_refusal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pins/rm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        assert!(!relay(&server).await.unpin("Qm123").await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_sends_payload_once_with_fallback_mime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ipfs-upload"))
            .and(body_string_contains("payload-0123456789"))
            .and(body_string_contains("application/octet-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "file": { "hash": "QmRaw" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let hash = relay(&server)
            .await
            .upload(Bytes::from_static(b"payload-0123456789"), "a.bin", "not a mime")
            .await
            .unwrap();
        assert_eq!(hash, "QmRaw");
    }

    #[tokio::test]
    async fn test_stalled_download_hits_read_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipfs-content/QmSlow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = relay(&server)
            .await
            .with_read_timeout(Duration::from_millis(200))
            .unwrap();
        let started = std::time::Instant::now();
        let err = client.download("QmSlow", |_, _| {}).await.unwrap_err();

        assert!(matches!(err, RelayError::Http(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
