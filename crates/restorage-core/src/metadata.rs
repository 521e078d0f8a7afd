//! Object metadata and the fixed-size on-disk header.
//!
//! Every object file starts with exactly [`META_HEADER_SIZE`] bytes: the JSON
//! encoding of an [`ObjectMetadata`], a newline, and space padding. The payload
//! follows immediately. A header never grows or shrinks, so `append` can
//! rewrite it in place and the payload offset is a constant.
//!
//! ```text
//! +--------------------------------------+------------------------+
//! | {"bucket":..,"key":..,..}\n<spaces>  | payload bytes ...      |
//! +--------------------------------------+------------------------+
//! 0                                   1024                      EOF
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Size in bytes of the metadata header at the start of every object file.
pub const META_HEADER_SIZE: usize = 1024;

/// [`META_HEADER_SIZE`] as a file offset.
pub const PAYLOAD_OFFSET: u64 = META_HEADER_SIZE as u64;

/// Caller-supplied metadata for `put` and `append`.
///
/// # Examples
///
/// ```
/// use restorage_core::metadata::ObjectAttributes;
///
/// let attrs = ObjectAttributes::new()
///     .with_content_type("image/png")
///     .with_entry("camera", "x100");
/// assert!(!attrs.is_empty());
/// assert!(ObjectAttributes::new().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAttributes {
    /// MIME type of the payload.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Free-form string pairs.
    #[serde(default)]
    pub other: BTreeMap<String, String>,
}

impl ObjectAttributes {
    /// Attributes with no content type and no pairs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add one auxiliary pair.
    #[must_use]
    pub fn with_entry(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.other.insert(name.into(), value.into());
        self
    }

    /// `true` when there is nothing to merge into an existing header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content_type.is_none() && self.other.is_empty()
    }
}

/// The record persisted in an object's header.
///
/// `content_type` is always serialized, as `null` when absent, so an absent
/// type and an empty string stay distinguishable after a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Owning bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// MIME type of the payload.
    pub content_type: Option<String>,
    /// Auxiliary string pairs.
    #[serde(rename = "other", default)]
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectMetadata {
    /// Metadata for a freshly written object.
    #[must_use]
    pub fn new(bucket: &str, key: &str, attrs: &ObjectAttributes) -> Self {
        Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            content_type: attrs.content_type.clone(),
            user_metadata: attrs.other.clone(),
        }
    }

    /// A new value with `attrs` layered on top; incoming values win.
    #[must_use]
    pub fn merged(&self, attrs: &ObjectAttributes) -> Self {
        let mut user_metadata = self.user_metadata.clone();
        user_metadata.extend(
            attrs
                .other
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            content_type: attrs
                .content_type
                .clone()
                .or_else(|| self.content_type.clone()),
            user_metadata,
        }
    }

    /// Encode into exactly [`META_HEADER_SIZE`] bytes.
    ///
    /// Fails with [`StoreError::MetaDataTooLarge`] when the JSON plus its
    /// terminating newline does not fit.
    pub fn encode_header(&self) -> StoreResult<Vec<u8>> {
        let mut buf = serde_json::to_vec(self).context("failed to encode object metadata")?;
        buf.push(b'\n');
        if buf.len() > META_HEADER_SIZE {
            return Err(StoreError::MetaDataTooLarge {
                bucket: self.bucket.clone(),
                key: self.key.clone(),
                size: buf.len(),
                limit: META_HEADER_SIZE,
            });
        }
        buf.resize(META_HEADER_SIZE, b' ');
        Ok(buf)
    }

    /// Decode a header previously produced by [`ObjectMetadata::encode_header`].
    pub fn decode_header(header: &[u8]) -> StoreResult<Self> {
        let meta = serde_json::from_slice(header).context("corrupt object metadata header")?;
        Ok(meta)
    }

    /// Read and decode the header from the start of `reader`.
    pub fn read_header<R: Read>(reader: &mut R) -> StoreResult<Self> {
        let mut header = [0u8; META_HEADER_SIZE];
        reader
            .read_exact(&mut header)
            .context("object file is shorter than its metadata header")?;
        Self::decode_header(&header)
    }
}

/// Metadata plus attributes derived from the file at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Persisted header fields.
    #[serde(flatten)]
    pub metadata: ObjectMetadata,
    /// Full payload size in bytes.
    pub object_size: u64,
    /// Bytes the accompanying stream will yield; equals `object_size`
    /// unless a range was requested.
    pub content_length: u64,
    /// File modification time.
    pub last_modified: DateTime<Utc>,
}
