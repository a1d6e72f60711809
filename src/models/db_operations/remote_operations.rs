use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const GALLERY_LISTING_ENDPOINT: &str = "galleries.php";
pub const FILE_LISTING_ENDPOINT: &str = "list-files.php";
pub const GALLERY_META_ENDPOINT: &str = "gallery-meta.php";
pub const UPLOAD_ENDPOINT: &str = "upload.php";
pub const DELETE_ENDPOINT: &str = "delete.php";

/// Characters left readable inside a single path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Remote request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Remote host answered {status} for {url}")]
    Status { url: String, status: u16, body: String },
    #[error("Remote response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },
}

/// Shared HTTP client for the external blog endpoints and the upload host.
#[derive(Clone)]
pub struct RemoteHost {
    client: Client,
}

impl RemoteHost {
    pub fn new(timeout_secs: u64) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(concat!("tubox_backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RemoteError::Client)?;
        Ok(RemoteHost { client })
    }

    /// GET a JSON document. A 404 is reported as `None`.
    pub async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<Value>, RemoteError> {
        log::debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| RemoteError::Request { url: url.to_string(), source })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value = read_checked_json(url, response).await?;
        Ok(Some(value))
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Value, RemoteError> {
        log::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| RemoteError::Request { url: url.to_string(), source })?;
        read_checked_json(url, response).await
    }

    pub async fn post_multipart(&self, url: &str, form: multipart::Form) -> Result<Value, RemoteError> {
        log::debug!("POST multipart {}", url);
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| RemoteError::Request { url: url.to_string(), source })?;
        read_checked_json(url, response).await
    }

    /// Opens a remote file for streaming. A 404 is reported as `None`.
    pub async fn get_stream(&self, url: &str) -> Result<Option<Response>, RemoteError> {
        log::debug!("GET stream {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| RemoteError::Request { url: url.to_string(), source })?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Status { url: url.to_string(), status: status.as_u16(), body })
            }
        }
    }
}

/// Non-2xx answers and `{"success": false}` bodies both count as failures.
/// Empty or non-JSON success bodies decode to `Value::Null`.
async fn read_checked_json(url: &str, response: Response) -> Result<Value, RemoteError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| RemoteError::Request { url: url.to_string(), source })?;
    if !status.is_success() {
        return Err(RemoteError::Status { url: url.to_string(), status: status.as_u16(), body });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Remote response from {} is not JSON: {}", url, e);
            return Ok(Value::Null);
        }
    };
    if value.get("success") == Some(&Value::Bool(false)) {
        return Err(RemoteError::Status { url: url.to_string(), status: status.as_u16(), body });
    }
    Ok(value)
}

pub fn endpoint_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// Absolute URL of an uploaded file on the remote host, segment-encoded.
pub fn uploads_url(base: &str, relative: &str) -> String {
    let encoded: Vec<String> = relative
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect();
    format!("{}/uploads/{}", base.trim_end_matches('/'), encoded.join("/"))
}

pub fn decode_failure(url: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::Decode { url: url.to_string(), message: message.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_url_encodes_each_segment() {
        assert_eq!(
            uploads_url("https://tubox.de/", "/2024/Hochzeit Anna/bild 1.jpg"),
            "https://tubox.de/uploads/2024/Hochzeit%20Anna/bild%201.jpg"
        );
        assert_eq!(endpoint_url("https://tubox.de/", "/galleries.php"), "https://tubox.de/galleries.php");
    }
}
