use std::fmt;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Error)]
pub enum WebdavError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("url cannot hold a collection path: {0}")]
    CannotBeABase(String),
}

/// Outcome of one WebDAV request. `status == 0` means the request never
/// produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResponse {
    pub status: u16,
    pub body: Option<String>,
}

impl DavResponse {
    pub const TRANSPORT_FAILURE: u16 = 0;

    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn with_body(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: Some(body.into()),
        }
    }

    pub fn transport_failure() -> Self {
        Self::new(Self::TRANSPORT_FAILURE)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND.as_u16()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Present,
    Created,
    /// The existence probe failed with something other than 404; the caller
    /// may still try to write into the collection.
    Unverified(u16),
    CreateFailed(u16),
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Folder and file urls of one synchronized document:
/// `<base>/<folder>/` and `<base>/<folder>/<file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocation {
    pub folder: Url,
    pub file: Url,
}

impl DocumentLocation {
    pub fn new(base_url: &str, folder: &str, file_name: &str) -> Result<Self, WebdavError> {
        let base = Url::parse(base_url.trim())?;

        let mut folder_url = base.clone();
        folder_url
            .path_segments_mut()
            .map_err(|_| WebdavError::CannotBeABase(base_url.to_string()))?
            .pop_if_empty()
            .push(folder)
            .push("");

        let mut file_url = folder_url.clone();
        file_url
            .path_segments_mut()
            .map_err(|_| WebdavError::CannotBeABase(base_url.to_string()))?
            .pop_if_empty()
            .push(file_name);

        Ok(Self {
            folder: folder_url,
            file: file_url,
        })
    }
}

/// The four WebDAV verbs the synchronizer needs. Implementations never fail:
/// transport errors come back as [`DavResponse::transport_failure`].
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    async fn propfind(&self, url: &Url, credentials: &Credentials) -> DavResponse;

    async fn mkcol(&self, url: &Url, credentials: &Credentials) -> DavResponse;

    async fn get(&self, url: &Url, credentials: &Credentials) -> DavResponse;

    async fn put(&self, url: &Url, credentials: &Credentials, body: String) -> DavResponse;

    /// Creates `folder` when a PROPFIND reports it missing. Safe to call
    /// before every write.
    async fn ensure_collection(&self, folder: &Url, credentials: &Credentials) -> CollectionStatus {
        let lookup = self.propfind(folder, credentials).await;
        if lookup.is_success() {
            return CollectionStatus::Present;
        }
        if !lookup.is_not_found() {
            return CollectionStatus::Unverified(lookup.status);
        }

        debug!(folder = %folder, "collection missing, creating it");
        let created = self.mkcol(folder, credentials).await;
        match created.status {
            200..=299 => CollectionStatus::Created,
            // Another writer created it between the probe and MKCOL.
            405 => CollectionStatus::Present,
            status => CollectionStatus::CreateFailed(status),
        }
    }
}

#[derive(Clone, Default)]
pub struct WebdavClient {
    http: Client,
}

impl WebdavClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    pub async fn send_propfind(
        &self,
        url: &Url,
        credentials: &Credentials,
    ) -> Result<DavResponse, WebdavError> {
        let response = self
            .http
            .request(dav_method(b"PROPFIND"), url.clone())
            .header("Authorization", credentials.basic_auth_header())
            .header("Depth", "0")
            .send()
            .await?;
        Ok(DavResponse::new(response.status().as_u16()))
    }

    pub async fn send_mkcol(
        &self,
        url: &Url,
        credentials: &Credentials,
    ) -> Result<DavResponse, WebdavError> {
        let response = self
            .http
            .request(dav_method(b"MKCOL"), url.clone())
            .header("Authorization", credentials.basic_auth_header())
            .send()
            .await?;
        Ok(DavResponse::new(response.status().as_u16()))
    }

    pub async fn send_get(
        &self,
        url: &Url,
        credentials: &Credentials,
    ) -> Result<DavResponse, WebdavError> {
        let response = self
            .http
            .get(url.clone())
            .header("Authorization", credentials.basic_auth_header())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(DavResponse::with_body(status, body))
    }

    pub async fn send_put(
        &self,
        url: &Url,
        credentials: &Credentials,
        body: String,
    ) -> Result<DavResponse, WebdavError> {
        let response = self
            .http
            .put(url.clone())
            .header("Authorization", credentials.basic_auth_header())
            .header("Content-Type", JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        Ok(DavResponse::new(response.status().as_u16()))
    }
}

#[async_trait]
impl RemoteDocumentStore for WebdavClient {
    async fn propfind(&self, url: &Url, credentials: &Credentials) -> DavResponse {
        absorb("PROPFIND", url, self.send_propfind(url, credentials).await)
    }

    async fn mkcol(&self, url: &Url, credentials: &Credentials) -> DavResponse {
        absorb("MKCOL", url, self.send_mkcol(url, credentials).await)
    }

    async fn get(&self, url: &Url, credentials: &Credentials) -> DavResponse {
        absorb("GET", url, self.send_get(url, credentials).await)
    }

    async fn put(&self, url: &Url, credentials: &Credentials, body: String) -> DavResponse {
        absorb("PUT", url, self.send_put(url, credentials, body).await)
    }
}

fn absorb(verb: &str, url: &Url, result: Result<DavResponse, WebdavError>) -> DavResponse {
    match result {
        Ok(response) => response,
        Err(err) => {
            warn!(verb, url = %url, error = %err, "webdav request failed");
            DavResponse::transport_failure()
        }
    }
}

fn dav_method(name: &'static [u8]) -> Method {
    // Both names are valid RFC 7230 tokens, so this never falls through.
    Method::from_bytes(name).unwrap_or(Method::GET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header_encodes_user_and_password() {
        let credentials = Credentials::new("user", "pass");
        assert_eq!(credentials.basic_auth_header(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn debug_output_hides_password() {
        let credentials = Credentials::new("user", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn location_appends_folder_and_file() {
        let location =
            DocumentLocation::new("https://dav.example/remote.php/dav", "WeiboBlocker", "config.json")
                .unwrap();
        assert_eq!(
            location.folder.as_str(),
            "https://dav.example/remote.php/dav/WeiboBlocker/"
        );
        assert_eq!(
            location.file.as_str(),
            "https://dav.example/remote.php/dav/WeiboBlocker/config.json"
        );
    }

    #[test]
    fn location_tolerates_trailing_slash() {
        let location =
            DocumentLocation::new("https://dav.example/dav/", "ZhihuBlocker", "config.json").unwrap();
        assert_eq!(
            location.file.as_str(),
            "https://dav.example/dav/ZhihuBlocker/config.json"
        );
    }

    #[test]
    fn location_rejects_garbage() {
        assert!(matches!(
            DocumentLocation::new("not a url", "A", "b.json"),
            Err(WebdavError::Url(_))
        ));
        assert!(matches!(
            DocumentLocation::new("mailto:someone@example.com", "A", "b.json"),
            Err(WebdavError::CannotBeABase(_))
        ));
    }

    #[test]
    fn success_and_not_found_checks() {
        assert!(DavResponse::new(201).is_success());
        assert!(!DavResponse::transport_failure().is_success());
        assert!(DavResponse::new(404).is_not_found());
        assert!(!DavResponse::new(410).is_not_found());
    }
}
