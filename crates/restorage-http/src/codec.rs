//! Mapping between HTTP headers and engine types.
//!
//! Auxiliary metadata travels as `X-ReStorage-Object-Meta-{name}` headers.
//! Header names are case-insensitive on the wire, so stored names are the
//! lowercased suffix.

use chrono::{DateTime, Utc};
use http::HeaderMap;

use restorage_core::{ObjectAttributes, ObjectInfo};

use crate::body::RestorageBody;
use crate::response::{ApiError, set_header};

/// Prefix of headers carrying auxiliary object metadata.
pub const OBJECT_META_HEADER_PREFIX: &str = "x-restorage-object-meta-";

/// Content type reported for objects stored without one.
pub const DEFAULT_OBJECT_CONTENT_TYPE: &str = "application/octet-stream";

/// Build upload attributes from request headers.
pub fn attributes_from_headers(headers: &HeaderMap) -> Result<ObjectAttributes, ApiError> {
    let mut attrs = ObjectAttributes::new();
    if let Some(value) = headers.get(http::header::CONTENT_TYPE) {
        let value = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("Content-Type is not valid header text".to_owned()))?;
        attrs.content_type = Some(value.to_owned());
    }

    for (name, value) in headers {
        let Some(meta_name) = name.as_str().strip_prefix(OBJECT_META_HEADER_PREFIX) else {
            continue;
        };
        if meta_name.is_empty() {
            continue;
        }
        let value = value.to_str().map_err(|_| {
            ApiError::BadRequest(format!("Metadata header {name} is not valid header text"))
        })?;
        attrs.other.insert(meta_name.to_owned(), value.to_owned());
    }
    Ok(attrs)
}

/// Parse the `Range` header into inclusive engine bounds.
///
/// Accepts a single `bytes=a-b` or `bytes=a-`. Suffix ranges (`bytes=-n`),
/// multiple ranges, and anything unparseable are rejected as unsatisfiable.
pub fn parse_range(headers: &HeaderMap) -> Result<Option<(i64, Option<i64>)>, ApiError> {
    let Some(value) = headers.get(http::header::RANGE) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::RangeNotSatisfiable("<non-text range header>".to_owned()))?;
    let unsatisfiable = || ApiError::RangeNotSatisfiable(raw.to_owned());

    let spec = raw.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
    if spec.contains(',') {
        return Err(unsatisfiable());
    }
    let (first, last) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let start = parse_position(first).ok_or_else(unsatisfiable)?;
    let end = if last.is_empty() {
        None
    } else {
        Some(parse_position(last).ok_or_else(unsatisfiable)?)
    };
    Ok(Some((start, end)))
}

fn parse_position(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// `Content-Range` value for a partial response starting at `start`.
#[must_use]
pub fn content_range(start: i64, info: &ObjectInfo) -> String {
    let last = u64::try_from(start)
        .unwrap_or_default()
        .saturating_add(info.content_length)
        .saturating_sub(1);
    format!("bytes {start}-{last}/{}", info.object_size)
}

/// Format a timestamp as an RFC 7231 HTTP date.
#[must_use]
pub fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Write an object's metadata into response headers.
///
/// `Content-Length` is the number of payload bytes the response carries.
pub fn write_object_headers(response: &mut http::Response<RestorageBody>, info: &ObjectInfo) {
    let meta = &info.metadata;
    set_header(
        response,
        http::header::CONTENT_TYPE,
        meta.content_type.as_deref().unwrap_or(DEFAULT_OBJECT_CONTENT_TYPE),
    );
    set_header(response, http::header::CONTENT_LENGTH, &info.content_length.to_string());
    set_header(response, http::header::LAST_MODIFIED, &http_date(&info.last_modified));
    let age = (Utc::now() - info.last_modified).num_seconds().max(0);
    set_header(response, http::header::AGE, &age.to_string());
    set_header(response, http::header::ACCEPT_RANGES, "bytes");

    for (name, value) in &meta.user_metadata {
        match http::HeaderName::try_from(format!("{OBJECT_META_HEADER_PREFIX}{name}")) {
            Ok(header) => set_header(response, header, value),
            Err(_) => tracing::warn!(name = %name, "dropping metadata entry with invalid header name"),
        }
    }
}
