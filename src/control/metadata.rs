//! Session metadata document.
//!
//! Before any websocket traffic, the client fetches a JSON document that
//! fixes the session's wire parameters:
//!
//! ```json
//! {
//!   "key_bytes": 4,
//!   "len_bytes": 4,
//!   "ws_url": "ws://host:8888/sim/abc/pos",
//!   "max_buffer_size": 40
//! }
//! ```
//!
//! Extra fields are ignored by [`SessionParams`] and handed to a
//! [`MetadataExtension`], which lets a specialised session pull its own
//! fields out of the same document.
//!
//! # Example
//!
//! ```
//! use buffered_websocket::control::{parse_metadata, SimInfo};
//!
//! let doc = r#"{
//!     "key_bytes": 4, "len_bytes": 4,
//!     "ws_url": "ws://localhost:8888/sim/1/pos",
//!     "max_buffer_size": 40,
//!     "elements": ["O", "H"], "frame_number": 100, "atom_number": 2
//! }"#;
//!
//! let meta = parse_metadata::<SimInfo>(doc).unwrap();
//! assert_eq!(meta.params.key_bytes, 4);
//! assert_eq!(meta.extension.frame_number, 100);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BufferError, Result};
use crate::protocol::FieldWidth;

/// Wire parameters of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Width of the key field, in bytes (2, 4 or 8).
    #[serde(alias = "KEY_BYTES")]
    pub key_bytes: u32,
    /// Width of the length field, in bytes (2, 4 or 8).
    #[serde(alias = "LEN_BYTES")]
    pub len_bytes: u32,
    /// Websocket endpoint carrying the frames.
    #[serde(alias = "WS_URI", alias = "ws_uri")]
    pub ws_url: String,
    /// Largest payload a frame may carry; every slot buffer has this size.
    #[serde(alias = "MAX_BUFFER_SIZE")]
    pub max_buffer_size: usize,
}

impl SessionParams {
    /// Check widths and URL scheme.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` for a width other than 2, 4 or 8.
    /// - `Metadata` for a URL that is not `ws://`.
    pub fn validate(&self) -> Result<()> {
        FieldWidth::from_bytes(self.key_bytes)?;
        FieldWidth::from_bytes(self.len_bytes)?;
        if !self.ws_url.starts_with("ws://") {
            return Err(BufferError::Metadata(format!(
                "unsupported websocket url '{}' (expected ws://)",
                self.ws_url
            )));
        }
        Ok(())
    }
}

/// Extra, session-specific fields parsed from the metadata document.
pub trait MetadataExtension: Sized + Send + Sync + 'static {
    /// Build the extension from the whole document.
    fn from_document(document: &Value) -> Result<Self>;
}

impl MetadataExtension for () {
    fn from_document(_document: &Value) -> Result<Self> {
        Ok(())
    }
}

/// Parsed metadata: wire parameters plus the extension.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata<X = ()> {
    /// Wire parameters.
    pub params: SessionParams,
    /// Session-specific fields.
    pub extension: X,
}

/// Parse and validate a metadata document.
///
/// # Errors
///
/// - `Json` if the text is not JSON.
/// - `Metadata` if a required field is missing or mistyped, or the
///   extension rejects the document.
/// - `InvalidConfiguration` for unsupported field widths.
pub fn parse_metadata<X: MetadataExtension>(json: &str) -> Result<SessionMetadata<X>> {
    let document: Value = serde_json::from_str(json)?;
    if !document.is_object() {
        return Err(BufferError::Metadata(
            "metadata document must be a JSON object".to_string(),
        ));
    }

    let params = SessionParams::deserialize(&document)
        .map_err(|e| BufferError::Metadata(e.to_string()))?;
    params.validate()?;
    let extension = X::from_document(&document)?;

    tracing::debug!(
        "Session metadata: key_bytes={}, len_bytes={}, max_buffer_size={}, ws_url={}",
        params.key_bytes,
        params.len_bytes,
        params.max_buffer_size,
        params.ws_url
    );

    Ok(SessionMetadata { params, extension })
}

/// Simulation session info served alongside the wire parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimInfo {
    /// Per-atom element symbols.
    pub elements: Vec<String>,
    /// Number of frames in the trajectory.
    pub frame_number: u64,
    /// Atoms per frame.
    pub atom_number: u64,
    /// Dataset name.
    #[serde(default)]
    pub name: Option<String>,
    /// Server-assigned session id.
    #[serde(default)]
    pub id: Option<String>,
}

impl MetadataExtension for SimInfo {
    fn from_document(document: &Value) -> Result<Self> {
        Self::deserialize(document).map_err(|e| BufferError::Metadata(e.to_string()))
    }
}
