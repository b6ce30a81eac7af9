use blocksync_core::{
    CollectionStatus, Credentials, DavResponse, DocumentLocation, RemoteDocumentStore,
    WebdavClient,
};
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> Credentials {
    Credentials::new("user", "pass")
}

fn url(server: &MockServer, suffix: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), suffix)).unwrap()
}

#[tokio::test]
async fn get_returns_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dav/WeiboBlocker/config.json"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"keywords":["a"]}"#))
        .mount(&server)
        .await;

    let client = WebdavClient::new();
    let response = client
        .get(&url(&server, "/dav/WeiboBlocker/config.json"), &credentials())
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_deref(), Some(r#"{"keywords":["a"]}"#));
}

#[tokio::test]
async fn get_reports_missing_document_as_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dav/WeiboBlocker/config.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = WebdavClient::new();
    let response = client
        .get(&url(&server, "/dav/WeiboBlocker/config.json"), &credentials())
        .await;

    assert!(response.is_not_found());
}

#[tokio::test]
async fn put_sends_auth_content_type_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dav/WeiboBlocker/config.json"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_string("{\n  \"keywords\": []\n}"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = WebdavClient::new();
    let response = client
        .put(
            &url(&server, "/dav/WeiboBlocker/config.json"),
            &credentials(),
            "{\n  \"keywords\": []\n}".to_string(),
        )
        .await;

    assert!(response.is_success());
}

#[tokio::test]
async fn ensure_collection_skips_mkcol_when_folder_exists() {
    let server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .and(path("/dav/WeiboBlocker/"))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(207))
        .mount(&server)
        .await;
    Mock::given(method("MKCOL"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let client = WebdavClient::new();
    let status = client
        .ensure_collection(&url(&server, "/dav/WeiboBlocker/"), &credentials())
        .await;

    assert_eq!(status, CollectionStatus::Present);
}

#[tokio::test]
async fn ensure_collection_creates_missing_folder() {
    let server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .and(path("/dav/WeiboBlocker/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("MKCOL"))
        .and(path("/dav/WeiboBlocker/"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = WebdavClient::new();
    let status = client
        .ensure_collection(&url(&server, "/dav/WeiboBlocker/"), &credentials())
        .await;

    assert_eq!(status, CollectionStatus::Created);
}

#[tokio::test]
async fn ensure_collection_reports_failed_mkcol() {
    let server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("MKCOL"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = WebdavClient::new();
    let status = client
        .ensure_collection(&url(&server, "/dav/WeiboBlocker/"), &credentials())
        .await;

    assert_eq!(status, CollectionStatus::CreateFailed(403));
}

#[tokio::test]
async fn transport_failure_resolves_to_status_zero() {
    // Nothing listens on the discard port.
    let target = Url::parse("http://127.0.0.1:9/dav/config.json").unwrap();
    let client = WebdavClient::new();

    let response = client.get(&target, &credentials()).await;

    assert_eq!(response, DavResponse::transport_failure());
}

#[test]
fn location_matches_wire_layout() {
    let location =
        DocumentLocation::new("https://dav.example/dav", "HeyboxBlocker", "config.json").unwrap();
    assert_eq!(location.folder.path(), "/dav/HeyboxBlocker/");
    assert_eq!(location.file.path(), "/dav/HeyboxBlocker/config.json");
}
