//! The Feedy API facade.
//!
//! `FeedyApi` pairs a `FeedyClient` with a `Transport` and exposes one
//! blocking method per API operation: build the request, execute it, unwrap
//! the envelope. Results are returned as `serde_json::Value`, untouched.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::FeedyClient;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::params::Params;
use crate::transport::{loggable_url, Transport};

#[cfg(feature = "ureq")]
use crate::config::ClientConfig;
#[cfg(feature = "ureq")]
use crate::transport::UreqTransport;

/// Blocking Feedy API client.
///
/// Holds the access token (inside its `FeedyClient`) and a transport handle
/// reused for every call. Neither changes after construction.
#[derive(Debug, Clone)]
pub struct FeedyApi<T> {
    client: FeedyClient,
    transport: T,
}

#[cfg(feature = "ureq")]
impl FeedyApi<UreqTransport> {
    /// Client for the production API.
    pub fn new(access_token: &str) -> ApiResult<Self> {
        Ok(Self::with_transport(
            FeedyClient::new(crate::client::DEFAULT_BASE_URL, access_token)?,
            UreqTransport::new(),
        ))
    }

    pub fn from_config(config: &ClientConfig) -> ApiResult<Self> {
        config.validate()?;
        Ok(Self::with_transport(
            FeedyClient::new(&config.base_url, &config.access_token)?,
            UreqTransport::with_timeout(config.timeout),
        ))
    }

    /// See `ClientConfig::from_env` for the variables read.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_config(&ClientConfig::from_env()?)
    }
}

impl<T: Transport> FeedyApi<T> {
    pub fn with_transport(client: FeedyClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &FeedyClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Call any API method.
    pub fn request(&self, path: &str, params: &Params, method: HttpMethod) -> ApiResult<Value> {
        self.call(self.client.build_request(path, params, method)?)
    }

    /// `user/get`. Pass `client::DEFAULT_USER_ID` for the caller's own profile.
    #[instrument(skip(self))]
    pub fn get_user(&self, user_id: i64, fields: &str) -> ApiResult<Value> {
        self.call(self.client.build_get_user(user_id, fields)?)
    }

    #[instrument(skip(self))]
    pub fn get_user_photos(&self, user_id: i64, start_from: i64, count: i64) -> ApiResult<Value> {
        self.call(self.client.build_get_user_photos(user_id, start_from, count)?)
    }

    #[instrument(skip(self))]
    pub fn subscribe(&self, user_id: i64) -> ApiResult<Value> {
        self.call(self.client.build_subscribe(user_id)?)
    }

    #[instrument(skip(self))]
    pub fn unsubscribe(&self, user_id: i64) -> ApiResult<Value> {
        self.call(self.client.build_unsubscribe(user_id)?)
    }

    #[instrument(skip(self))]
    pub fn update_avatar(&self, photo: &str, hash: &str) -> ApiResult<Value> {
        self.call(self.client.build_update_avatar(photo, hash)?)
    }

    #[instrument(skip(self))]
    pub fn update_status(&self, status: &str) -> ApiResult<Value> {
        self.call(self.client.build_update_status(status)?)
    }

    #[instrument(skip(self))]
    pub fn create_post(&self, text: &str, attachment: &str, thread: &str) -> ApiResult<Value> {
        self.call(self.client.build_create_post(text, attachment, thread)?)
    }

    #[instrument(skip(self))]
    pub fn get_subscriptions(&self, fields: &str) -> ApiResult<Value> {
        self.call(self.client.build_get_subscriptions(fields)?)
    }

    /// Fails with `ApiError::Validation` before any I/O when `query` is too
    /// short.
    #[instrument(skip(self))]
    pub fn search_user(&self, query: &str, fields: &str) -> ApiResult<Value> {
        self.call(self.client.build_search_user(query, fields)?)
    }

    /// Upload a photo and register it as an attachment.
    ///
    /// Runs `attachments/server`, a multipart POST to the returned
    /// `server_url`, then `attachments/save/photo`, stopping at the first
    /// failure. Returns the result of the last call. `private` is accepted
    /// but not sent anywhere.
    #[instrument(skip_all)]
    pub fn upload_photo(&self, path: impl AsRef<Path>, private: bool) -> ApiResult<Value> {
        let path = path.as_ref();
        debug!(path = %path.display(), private, "requesting upload server");
        let server = self.call(self.client.build_upload_server()?)?;
        let server = self.client.parse_upload_server(server)?;

        let data = std::fs::read(path).map_err(|source| ApiError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("photo");
        let bytes = data.len();
        let upload = self.client.build_photo_upload(&server.server_url, file_name, data)?;
        debug!(server = loggable_url(&upload.url), bytes, "uploading photo");
        let response = self.execute(upload)?;
        let uploaded = self.client.parse_uploaded_photo(response)?;

        debug!(photo = %uploaded.photo, "registering uploaded photo");
        self.call(self.client.build_save_photo(&uploaded)?)
    }

    fn call(&self, request: HttpRequest) -> ApiResult<Value> {
        let response = self.execute(request)?;
        self.client.unwrap_envelope(response)
    }

    fn execute(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        debug!(method = %request.method, url = loggable_url(&request.url), "sending request");
        Ok(self.transport.execute(request)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::TransportError;

    /// Replays canned responses in order and records every request.
    struct Scripted {
        responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for Scripted {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TransportError::new("no scripted response")))
        }
    }

    fn api(responses: Vec<Result<HttpResponse, TransportError>>) -> FeedyApi<Scripted> {
        FeedyApi::with_transport(
            FeedyClient::new("https://feedy.test/api", "tok").unwrap(),
            Scripted::new(responses),
        )
    }

    #[test]
    fn request_passes_response_value_through() {
        let api = api(vec![Ok(HttpResponse::new(200, r#"{"response":{"id":3}}"#))]);
        let value = api.get_user(0, "name").unwrap();
        assert_eq!(value, json!({"id": 3}));
        let seen = api.transport().seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].url,
            "https://feedy.test/user/get?fields=name&user_id=0&access_token=tok"
        );
    }

    #[test]
    fn transport_failures_surface_as_transport_errors() {
        let api = api(vec![Err(TransportError::new("dns"))]);
        let err = api.subscribe(1).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn upload_reports_unreadable_file_before_uploading() {
        let api = api(vec![Ok(HttpResponse::new(
            200,
            r#"{"response":{"server_url":"https://up.test/u"}}"#,
        ))]);
        let err = api.upload_photo("/nonexistent/photo.jpg", false).unwrap_err();
        assert!(matches!(err, ApiError::File { .. }));
        assert_eq!(api.transport().seen().len(), 1);
    }
}
