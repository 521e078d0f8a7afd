//! Bucket name validation.

use crate::error::StoreError;

/// Validate a bucket name.
///
/// A name is one or more characters from `[A-Za-z0-9_\-.=]`. Names are used
/// verbatim in descriptors and the audit log, so anything that could break
/// the tab-separated log format or a URL path segment is refused.
///
/// # Examples
///
/// ```
/// use restorage_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("Media_2024.v=1").is_ok());
/// assert!(validate_bucket_name("a/b").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidBucketName {
            name: name.to_owned(),
            reason: "Bucket name must not be empty".to_owned(),
        });
    }

    if let Some(bad) = name.chars().find(|c| !is_bucket_name_char(*c)) {
        return Err(StoreError::InvalidBucketName {
            name: name.to_owned(),
            reason: format!("Bucket name contains invalid character {bad:?}"),
        });
    }

    Ok(())
}

fn is_bucket_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '=')
}
