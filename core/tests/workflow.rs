//! Call-sequence properties checked with a scripted in-memory transport.
//!
//! Every request the client sends is recorded, so these tests can assert
//! what did (and did not) go over the wire.

use std::cell::RefCell;
use std::collections::VecDeque;

use feedy_core::{
    ApiError, FeedyApi, FeedyClient, HttpMethod, HttpRequest, HttpResponse, Params, Transport,
    TransportError,
};
use serde_json::json;

const BASE: &str = "https://feedy.test/api";
/// `BASE` with its last path segment replaced, where method paths resolve.
const ROOT: &str = "https://feedy.test";
const UPLOAD_URL: &str = "https://upload.feedy.test/u/42";

#[derive(Default)]
struct Recorder {
    replies: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl Recorder {
    fn reply(self, status: u16, body: &str) -> Self {
        self.replies
            .borrow_mut()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    fn fail(self, message: &str) -> Self {
        self.replies
            .borrow_mut()
            .push_back(Err(TransportError::new(message)));
        self
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }
}

impl Transport for Recorder {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request);
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("unexpected request")))
    }
}

fn client() -> FeedyClient {
    FeedyClient::new(BASE, "secret").unwrap()
}

fn api(recorder: Recorder) -> FeedyApi<Recorder> {
    FeedyApi::with_transport(client(), recorder)
}

fn path_of(request: &HttpRequest) -> &str {
    request.url.split('?').next().unwrap()
}

fn temp_photo(name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("feedy-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Token injection
// ---------------------------------------------------------------------------

#[test]
fn every_operation_carries_the_token() {
    let mut recorder = Recorder::default();
    for _ in 0..9 {
        recorder = recorder.reply(200, r#"{"response":1}"#);
    }
    let api = api(recorder);

    api.get_user(0, "").unwrap();
    api.get_user_photos(0, 0, 20).unwrap();
    api.subscribe(3).unwrap();
    api.unsubscribe(3).unwrap();
    api.update_avatar("p", "h").unwrap();
    api.update_status("s").unwrap();
    api.create_post("t", "a", "th").unwrap();
    api.get_subscriptions("").unwrap();
    api.search_user("query", "").unwrap();

    let requests = api.transport().requests();
    assert_eq!(requests.len(), 9);
    for request in &requests {
        assert!(
            request.url.ends_with("access_token=secret"),
            "{} lacks the token",
            request.url
        );
        assert!(request.body.is_none());
    }
}

#[test]
fn caller_supplied_token_is_overridden() {
    let api = api(Recorder::default().reply(200, r#"{"response":true}"#));
    let params = Params::new().with("access_token", "stolen");
    api.request("feed/get", &params, HttpMethod::Get).unwrap();

    let requests = api.transport().requests();
    assert_eq!(requests[0].url, format!("{ROOT}/feed/get?access_token=secret"));
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[test]
fn short_search_sends_nothing() {
    let api = api(Recorder::default());
    let err = api.search_user("ab", "").unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(api.transport().requests().is_empty());
}

#[test]
fn search_uses_the_subscriptions_path() {
    let api = api(
        Recorder::default()
            .reply(200, r#"{"response":[]}"#)
            .reply(200, r#"{"response":[]}"#),
    );
    api.search_user("abc", "").unwrap();
    api.get_subscriptions("").unwrap();

    let requests = api.transport().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(path_of(&requests[0]), path_of(&requests[1]));
    assert_eq!(path_of(&requests[0]), format!("{ROOT}/user/subscriptions"));
    assert!(requests[0].url.contains("query=abc"));
}

// ---------------------------------------------------------------------------
// Upload workflow
// ---------------------------------------------------------------------------

#[test]
fn upload_runs_three_steps_in_order() {
    let server = json!({"response": {"server_url": UPLOAD_URL}}).to_string();
    let saved = json!({"response": {"id": 7, "photo": "ph1"}}).to_string();
    let api = api(
        Recorder::default()
            .reply(200, &server)
            .reply(200, r#"{"photo":"ph1","hash":"hs1"}"#)
            .reply(200, &saved),
    );
    let path = temp_photo("steps.jpg", b"JPEGDATA");

    let result = api.upload_photo(&path, true).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(result, json!({"id": 7, "photo": "ph1"}));

    let requests = api.transport().requests();
    assert_eq!(requests.len(), 3);

    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(
        requests[0].url,
        format!("{ROOT}/attachments/server?type=photo&access_token=secret")
    );

    assert_eq!(requests[1].method, HttpMethod::Post);
    assert_eq!(requests[1].url, UPLOAD_URL);
    let body = String::from_utf8(requests[1].body.clone().unwrap()).unwrap();
    assert!(body.contains("name=\"photo\""));
    assert!(body.contains("JPEGDATA"));
    assert!(requests[1]
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data"));

    assert_eq!(
        requests[2].url,
        format!("{ROOT}/attachments/save/photo?photo=ph1&hash=hs1&access_token=secret")
    );
}

#[test]
fn relative_upload_server_url_resolves_against_base() {
    let server = json!({"response": {"server_url": "upload/42"}}).to_string();
    let api = api(
        Recorder::default()
            .reply(200, &server)
            .reply(200, r#"{"photo":"ph1","hash":"hs1"}"#)
            .reply(200, r#"{"response":1}"#),
    );
    let path = temp_photo("relative.jpg", b"JPEGDATA");

    let result = api.upload_photo(&path, true).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(result, json!(1));

    let requests = api.transport().requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].url, format!("{ROOT}/upload/42"));
}

#[test]
fn unresolvable_upload_server_url_stops_before_upload() {
    let server = json!({"response": {"server_url": "http://[::1"}}).to_string();
    let api = api(Recorder::default().reply(200, &server));
    let path = temp_photo("unresolvable.jpg", b"x");

    let err = api.upload_photo(&path, true).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(matches!(err, ApiError::Validation(_)), "{err:?}");
    assert_eq!(api.transport().requests().len(), 1);
}

#[test]
fn upload_aborts_when_server_lookup_fails() {
    let api = api(Recorder::default().reply(200, r#"{"error":{"error_code":5}}"#));
    let path = temp_photo("abort.jpg", b"x");

    let err = api.upload_photo(&path, true).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(matches!(err, ApiError::MalformedResponse(_)));

    let requests = api.transport().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests.iter().all(|r| !r.url.starts_with(UPLOAD_URL)));
}

#[test]
fn upload_aborts_on_transport_failure() {
    let api = api(Recorder::default().fail("connection reset"));
    let err = api.upload_photo("/irrelevant.png", false).unwrap_err();
    assert!(err.is_transport());
    assert_eq!(api.transport().requests().len(), 1);
}

#[test]
fn upload_stops_on_non_200_from_upload_server() {
    let server = json!({"response": {"server_url": UPLOAD_URL}}).to_string();
    let api = api(
        Recorder::default()
            .reply(200, &server)
            .reply(413, "too large"),
    );
    let path = temp_photo("big.png", b"....");

    let err = api.upload_photo(&path, true).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert_eq!(err.status(), Some(413));
    assert_eq!(api.transport().requests().len(), 2);
}

#[test]
fn upload_stops_when_upload_reply_lacks_hash() {
    let server = json!({"response": {"server_url": UPLOAD_URL}}).to_string();
    let api = api(
        Recorder::default()
            .reply(200, &server)
            .reply(200, r#"{"photo":"ph1"}"#),
    );
    let path = temp_photo("nohash.png", b"....");

    let err = api.upload_photo(&path, true).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(matches!(err, ApiError::MalformedResponse(_)));
    assert_eq!(api.transport().requests().len(), 2);
}

#[test]
fn upload_server_without_url_is_malformed() {
    let api = api(Recorder::default().reply(200, r#"{"response":{"host":"x"}}"#));
    let err = api.upload_photo("/irrelevant.png", true).unwrap_err();
    assert!(matches!(err, ApiError::MalformedResponse(_)));
    assert_eq!(api.transport().requests().len(), 1);
}

// ---------------------------------------------------------------------------
// Transport handles
// ---------------------------------------------------------------------------

#[test]
fn boxed_transport_object_drives_the_api() {
    let transport: Box<dyn Transport> =
        Box::new(Recorder::default().reply(200, r#"{"response":[]}"#));
    let api = FeedyApi::with_transport(client(), transport);
    assert_eq!(api.get_subscriptions("").unwrap(), json!([]));
    assert!(api.search_user("ab", "").is_err());
}

#[test]
fn borrowed_transport_stays_inspectable() {
    let recorder = Recorder::default().reply(200, r#"{"response":{"id":1}}"#);
    let api = FeedyApi::with_transport(client(), &recorder);
    api.get_user(0, "name").unwrap();
    drop(api);

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url,
        format!("{ROOT}/user/get?fields=name&user_id=0&access_token=secret")
    );
}

// ---------------------------------------------------------------------------
// Wire quirks
// ---------------------------------------------------------------------------

#[test]
fn create_post_never_sends_thread() {
    let api = api(Recorder::default().reply(200, r#"{"response":{"post_id":1}}"#));
    api.create_post("hi", "att1", "thread1").unwrap();

    let request = &api.transport().requests()[0];
    assert_eq!(request.method, HttpMethod::Put);
    assert!(request.url.contains("text=hi&attachment=att1"));
    assert!(!request.url.contains("thread1"));
    assert!(request.body.is_none());
}

#[test]
fn get_user_sentinel_inversion() {
    let api = api(
        Recorder::default()
            .reply(200, r#"{"response":{}}"#)
            .reply(200, r#"{"response":{}}"#),
    );
    api.get_user(0, "").unwrap();
    api.get_user(5, "").unwrap();

    let requests = api.transport().requests();
    assert!(requests[0].url.contains("user_id=0"));
    assert!(!requests[1].url.contains("user_id"));
}
