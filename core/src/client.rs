//! Stateless HTTP request builder and response parser for the Feedy API.
//!
//! # Design
//! `FeedyClient` holds only the base URL and the access token and carries no
//! mutable state between calls. Each API method has a `build_*` method that
//! produces an `HttpRequest`; responses from the API host go through
//! `unwrap_envelope`. Executing the round-trip is left to a `Transport`
//! (see `FeedyApi`), which keeps this half deterministic and free of I/O.
//!
//! Every API parameter travels in the query string, whatever the verb, and
//! the access token is appended to every API request.
//!
//! Method paths and upload server URLs are resolved against the base URL as
//! relative references (RFC 3986). A relative path replaces the last segment
//! of the base path, so `user/get` against `https://feedy.levkopo.ru/api` is
//! `https://feedy.levkopo.ru/user/get`. Give the base a trailing slash to
//! keep its last segment.

use std::fmt;

use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::multipart::{guess_content_type, FilePart, MultipartForm};
use crate::params::Params;
use crate::types::{UploadServer, UploadedPhoto};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://feedy.levkopo.ru/api";

/// Query parameter carrying the access token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// `user_id` value meaning "the caller's own profile".
pub const DEFAULT_USER_ID: i64 = 0;

/// `start_from` value meaning "first page".
pub const DEFAULT_START_FROM: i64 = 0;

/// Default page size of `user/photos`.
pub const DEFAULT_PHOTO_COUNT: i64 = 20;

/// Shortest query `search_user` sends to the server, in bytes.
pub const MIN_SEARCH_QUERY_LEN: usize = 3;

/// Synchronous, stateless request builder for the Feedy API.
#[derive(Clone)]
pub struct FeedyClient {
    base_url: Url,
    access_token: String,
}

impl FeedyClient {
    /// Fails with `ApiError::Config` unless `base_url` is an absolute URL
    /// that relative references can be resolved against.
    pub fn new(base_url: &str, access_token: &str) -> ApiResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ApiError::config(format!("invalid base URL {base_url:?}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::config(format!(
                "base URL {base_url:?} cannot resolve relative paths"
            )));
        }
        Ok(Self {
            base_url: parsed,
            access_token: access_token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve `reference` against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, reference: &str) -> ApiResult<Url> {
        self.base_url
            .join(reference)
            .map_err(|e| ApiError::validation(format!("cannot resolve {reference:?}: {e}")))
    }

    /// Build a request for API method `path`.
    ///
    /// The token is injected under `access_token`, replacing any value the
    /// caller put there, and all parameters are encoded into the query
    /// string regardless of `method`.
    pub fn build_request(
        &self,
        path: &str,
        params: &Params,
        method: HttpMethod,
    ) -> ApiResult<HttpRequest> {
        let mut params = params.clone();
        params.insert(ACCESS_TOKEN_PARAM, self.access_token.as_str());
        let mut url = self.resolve(path)?;
        url.set_query(Some(params.to_query_string().as_str()));
        Ok(HttpRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        })
    }

    /// `user/get`. `user_id` is only sent when it equals `DEFAULT_USER_ID`;
    /// any other id is dropped. Known wire quirk, probably a server-side bug;
    /// do not "fix" without checking against the live API.
    pub fn build_get_user(&self, user_id: i64, fields: &str) -> ApiResult<HttpRequest> {
        let mut params = Params::new().with("fields", fields);
        if user_id == DEFAULT_USER_ID {
            params.insert("user_id", user_id);
        }
        self.build_request("user/get", &params, HttpMethod::Get)
    }

    /// `user/photos`. Same inverted check as `build_get_user`, applied to
    /// `start_from` against `DEFAULT_START_FROM`. `user_id` is accepted for
    /// signature parity and never sent.
    pub fn build_get_user_photos(
        &self,
        _user_id: i64,
        start_from: i64,
        count: i64,
    ) -> ApiResult<HttpRequest> {
        let mut params = Params::new().with("count", count);
        if start_from == DEFAULT_START_FROM {
            params.insert("start_from", start_from);
        }
        self.build_request("user/photos", &params, HttpMethod::Get)
    }

    pub fn build_subscribe(&self, user_id: i64) -> ApiResult<HttpRequest> {
        let params = Params::new().with("user_id", user_id);
        self.build_request("user/subscribe", &params, HttpMethod::Post)
    }

    pub fn build_unsubscribe(&self, user_id: i64) -> ApiResult<HttpRequest> {
        let params = Params::new().with("user_id", user_id);
        self.build_request("user/unsubscribe", &params, HttpMethod::Post)
    }

    pub fn build_update_avatar(&self, photo: &str, hash: &str) -> ApiResult<HttpRequest> {
        let params = Params::new().with("photo", photo).with("hash", hash);
        self.build_request("user/avatar", &params, HttpMethod::Put)
    }

    pub fn build_update_status(&self, status: &str) -> ApiResult<HttpRequest> {
        let params = Params::new().with("status", status);
        self.build_request("user/status", &params, HttpMethod::Put)
    }

    /// `feed/post`. `thread` is accepted but not transmitted.
    pub fn build_create_post(
        &self,
        text: &str,
        attachment: &str,
        _thread: &str,
    ) -> ApiResult<HttpRequest> {
        let params = Params::new().with("text", text).with("attachment", attachment);
        self.build_request("feed/post", &params, HttpMethod::Put)
    }

    pub fn build_get_subscriptions(&self, fields: &str) -> ApiResult<HttpRequest> {
        let params = Params::new().with("fields", fields);
        self.build_request("user/subscriptions", &params, HttpMethod::Get)
    }

    /// User search goes through `user/subscriptions` with an extra `query`.
    ///
    /// Queries shorter than `MIN_SEARCH_QUERY_LEN` bytes are rejected here.
    pub fn build_search_user(&self, query: &str, fields: &str) -> ApiResult<HttpRequest> {
        if query.len() < MIN_SEARCH_QUERY_LEN {
            return Err(ApiError::validation(format!(
                "search query must be at least {MIN_SEARCH_QUERY_LEN} bytes, got {}",
                query.len()
            )));
        }
        let params = Params::new().with("query", query).with("fields", fields);
        self.build_request("user/subscriptions", &params, HttpMethod::Get)
    }

    pub fn build_upload_server(&self) -> ApiResult<HttpRequest> {
        let params = Params::new().with("type", "photo");
        self.build_request("attachments/server", &params, HttpMethod::Get)
    }

    /// Multipart POST of one file to an upload server.
    ///
    /// A relative `server_url` is resolved against the base URL like a
    /// method path. No token is attached: the upload host is not the API
    /// host.
    pub fn build_photo_upload(
        &self,
        server_url: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> ApiResult<HttpRequest> {
        let url = self.resolve(server_url)?;
        let form = MultipartForm::new().file(FilePart {
            field: "photo".to_string(),
            file_name: file_name.to_string(),
            content_type: guess_content_type(file_name).to_string(),
            data,
        });
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("content-type".to_string(), form.content_type())],
            body: Some(form.encode()),
        })
    }

    pub fn build_save_photo(&self, uploaded: &UploadedPhoto) -> ApiResult<HttpRequest> {
        let params = Params::new()
            .with("photo", uploaded.photo.as_str())
            .with("hash", uploaded.hash.as_str());
        self.build_request("attachments/save/photo", &params, HttpMethod::Get)
    }

    /// Extract the `response` field of an API envelope.
    pub fn unwrap_envelope(&self, response: HttpResponse) -> ApiResult<Value> {
        check_status(&response)?;
        let envelope: Value = serde_json::from_slice(&response.body).map_err(|e| {
            warn!(error = %e, "API response is not JSON");
            ApiError::malformed(format!("invalid JSON: {e}"))
        })?;
        match envelope {
            Value::Object(mut map) => match map.remove("response") {
                Some(value) => Ok(value),
                None => {
                    let reason = describe_api_error(map.get("error"));
                    warn!(%reason, "API envelope without response");
                    Err(ApiError::malformed(reason))
                }
            },
            other => Err(ApiError::malformed(format!(
                "expected an envelope object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Read the `attachments/server` result.
    pub fn parse_upload_server(&self, value: Value) -> ApiResult<UploadServer> {
        serde_json::from_value(value)
            .map_err(|e| ApiError::malformed(format!("upload server info: {e}")))
    }

    /// Read the upload server's own reply. It is not an API envelope.
    pub fn parse_uploaded_photo(&self, response: HttpResponse) -> ApiResult<UploadedPhoto> {
        check_status(&response)?;
        serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::malformed(format!("upload result: {e}")))
    }
}

impl fmt::Debug for FeedyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedyClient")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Only 200 counts as success.
fn check_status(response: &HttpResponse) -> ApiResult<()> {
    if response.status == 200 {
        return Ok(());
    }
    warn!(status = response.status, "unexpected HTTP status");
    Err(ApiError::HttpStatus {
        status: response.status,
        body: response.body_text(),
    })
}

fn describe_api_error(error: Option<&Value>) -> String {
    let Some(error) = error else {
        return "envelope has no `response` field".to_string();
    };
    let code = error.get("error_code").map(Value::to_string);
    let message = error.get("error_msg").and_then(Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => format!("API error {code}: {message}"),
        (Some(code), None) => format!("API error {code}"),
        (None, Some(message)) => format!("API error: {message}"),
        (None, None) => format!("API error: {error}"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
