#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Wire types for the playbox worker boundary.
//!
//! The host and the bundle worker only exchange strings. A request is a file
//! snapshot serialized as a tagged map, a response is a JSON envelope carrying
//! either the assembled document or a structured error.
//!
//! ## Snapshot format
//! ```json
//! {"dataType":"Map","value":[["/main.ts","console.log(1)"],["/logo.bin",[0,1,2]]]}
//! ```
//! Text content is a JSON string, binary content a JSON array of bytes.

use serde::{Deserialize, Serialize};

/// Protocol schema version. Bump when changing message format.
pub const PROTO_SCHEMA_VERSION: u32 = 1;

/// Schema version of the `playbox bundle --json` result.
pub const BUNDLE_RESULT_SCHEMA_VERSION: u32 = 1;

/// Error codes shared by build errors and the wire envelope.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const NOT_A_DIRECTORY: &str = "NOT_A_DIRECTORY";
    pub const IS_A_DIRECTORY: &str = "IS_A_DIRECTORY";
    pub const NOT_EMPTY: &str = "NOT_EMPTY";
    pub const INVALID_DATA: &str = "INVALID_DATA";
    pub const COMPILE_ERROR: &str = "COMPILE_ERROR";
    pub const RESOLUTION_ERROR: &str = "RESOLUTION_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const TEMPLATE_ERROR: &str = "TEMPLATE_ERROR";
    pub const PLUGIN_ERROR: &str = "PLUGIN_ERROR";

    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const WORKER_UNAVAILABLE: &str = "WORKER_UNAVAILABLE";
}

/// Marker for the `dataType` field of a tagged map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum MapTag {
    Map,
}

/// An ordered key/value collection serialized as `{"dataType":"Map","value":[[k, v], ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedMap<V> {
    #[serde(rename = "dataType")]
    data_type: MapTag,
    value: Vec<(String, V)>,
}

impl<V> TaggedMap<V> {
    #[must_use]
    pub fn new(entries: Vec<(String, V)>) -> Self {
        Self {
            data_type: MapTag::Map,
            value: entries,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.value.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(String, V)> {
        self.value
    }
}

impl<V> FromIterator<(String, V)> for TaggedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Content of one snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Wraps raw bytes, preferring the text form when they are valid UTF-8.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Binary(b) => b,
        }
    }
}

/// The request payload of the `bundle` call.
pub type SnapshotPayload = TaggedMap<FileContent>;

/// Serialize a snapshot for the worker boundary.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode_snapshot(snapshot: &SnapshotPayload) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

/// Parse a snapshot received over the worker boundary.
///
/// # Errors
/// Returns an error if the payload is not a tagged map of file contents.
pub fn decode_snapshot(payload: &str) -> serde_json::Result<SnapshotPayload> {
    serde_json::from_str(payload)
}

/// Structured error carried by a failed [`BundleResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    /// Code frame pointing at the offending source, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            module_id: None,
            diagnostic: None,
        }
    }
}

/// Response envelope returned by the worker's `bundle` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResponse {
    pub schema_version: u32,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl BundleResponse {
    #[must_use]
    pub fn success(document: String) -> Self {
        Self {
            schema_version: PROTO_SCHEMA_VERSION,
            ok: true,
            document: Some(document),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            schema_version: PROTO_SCHEMA_VERSION,
            ok: false,
            document: None,
            error: Some(error),
        }
    }

    /// Split into the document or the error.
    ///
    /// # Errors
    /// Returns the carried error, or an `INTERNAL_ERROR` when the envelope is inconsistent.
    pub fn into_result(self) -> Result<String, ErrorInfo> {
        match (self.ok, self.document, self.error) {
            (true, Some(document), _) => Ok(document),
            (false, _, Some(error)) => Err(error),
            _ => Err(ErrorInfo::new(
                codes::INTERNAL_ERROR,
                "malformed bundle response",
            )),
        }
    }
}

/// Serialize a response envelope.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode_response(response: &BundleResponse) -> serde_json::Result<String> {
    serde_json::to_string(response)
}

/// Parse a response envelope.
///
/// # Errors
/// Returns an error if the payload is not a valid envelope.
pub fn decode_response(payload: &str) -> serde_json::Result<BundleResponse> {
    serde_json::from_str(payload)
}
