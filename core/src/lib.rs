//! Blocking client for the Feedy social network API.
//!
//! # Overview
//! `FeedyClient` builds `HttpRequest` values and interprets `HttpResponse`
//! values without touching the network. `FeedyApi` pairs it with a
//! `Transport` (by default `UreqTransport`) and exposes one method per API
//! operation.
//!
//! # Design
//! - Every API call is `GET|POST|PUT {method}?{params}`, with `{method}`
//!   resolved against the base URL as a relative reference and the access
//!   token injected into the query string; the reply is a
//!   `{"response": ...}` envelope whose inner value is returned as-is.
//! - Only 200 counts as success. Non-200 statuses, unparseable envelopes and
//!   local validation failures are `ApiError` variants distinct from
//!   `ApiError::Transport`, which is reserved for network faults.
//! - `upload_photo` is the only multi-request operation: upload server
//!   lookup, multipart POST to that server, attachment registration.
//!
//! With the default `ureq` feature:
//!
//! ```no_run
//! # #[cfg(feature = "ureq")]
//! # fn main() -> Result<(), feedy_core::ApiError> {
//! use feedy_core::client::DEFAULT_USER_ID;
//! use feedy_core::{ClientConfig, FeedyApi};
//!
//! let api = FeedyApi::from_config(&ClientConfig::new("my-token"))?;
//! let me = api.get_user(DEFAULT_USER_ID, "name,avatar")?;
//! println!("{me}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ureq"))]
//! # fn main() {}
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod multipart;
pub mod params;
pub mod transport;
pub mod types;

pub use api::FeedyApi;
pub use client::FeedyClient;
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use params::{ParamValue, Params};
pub use transport::Transport;
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::{UploadServer, UploadedPhoto};
