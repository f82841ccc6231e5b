//! DTOs for the upload workflow.
//!
//! # Design
//! The API method results are passed through as `serde_json::Value`, since
//! their shape varies per method and per `fields` selection. Only the two
//! payloads the upload workflow reads itself get a typed form.

use serde::{Deserialize, Deserializer, Serialize};

/// Result of `attachments/server`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadServer {
    /// Absolute URL that accepts the multipart upload.
    pub server_url: String,
}

/// Body returned by the upload server itself (not wrapped in `response`).
///
/// Both fields are opaque tokens handed back to `attachments/save/photo`
/// or `user/avatar`; the server may send either as a number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedPhoto {
    #[serde(deserialize_with = "string_or_number")]
    pub photo: String,
    #[serde(deserialize_with = "string_or_number")]
    pub hash: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Num(n) => n.to_string(),
    })
}
