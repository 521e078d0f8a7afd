//! Byte-range resolution and bounded payload reads.

use std::io::{self, Read};

use crate::error::{StoreError, StoreResult};

/// A resolved, satisfiable byte range within an object's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Payload offset of the first byte.
    pub offset: u64,
    /// Number of bytes to return.
    pub length: u64,
}

/// Reject requests that are malformed regardless of the payload size:
/// negative bounds, or an end without a start.
pub fn check_bounds(start: Option<i64>, end: Option<i64>) -> StoreResult<()> {
    let negative = start.is_some_and(|s| s < 0) || end.is_some_and(|e| e < 0);
    if negative || (start.is_none() && end.is_some()) {
        return Err(StoreError::InvalidRangeRequest { start, end });
    }
    Ok(())
}

/// Resolve a requested `[start, end]` (both inclusive) against `size`.
///
/// - no start and no end selects the whole payload, even when it is empty;
/// - an end without a start is rejected;
/// - negative bounds are rejected;
/// - a start past the end of the payload is rejected, while a start exactly
///   at the end selects zero bytes;
/// - an end of `start - 1` selects zero bytes, anything lower is rejected;
/// - an end past the payload is clamped to the last byte.
///
/// # Examples
///
/// ```
/// use restorage_core::range::{ByteRange, resolve_range};
///
/// let r = resolve_range(Some(10), Some(20), 100).unwrap();
/// assert_eq!(r, ByteRange { offset: 10, length: 11 });
/// assert_eq!(resolve_range(Some(100), None, 100).unwrap().length, 0);
/// assert!(resolve_range(None, Some(5), 100).is_err());
/// ```
pub fn resolve_range(start: Option<i64>, end: Option<i64>, size: u64) -> StoreResult<ByteRange> {
    check_bounds(start, end)?;
    let invalid = || StoreError::InvalidRangeRequest { start, end };

    let Some(start_raw) = start else {
        return Ok(ByteRange {
            offset: 0,
            length: size,
        });
    };

    let first = u64::try_from(start_raw).map_err(|_| invalid())?;
    if first > size {
        return Err(invalid());
    }

    // Exclusive upper bound, clamped to the payload.
    let stop = match end {
        None => size,
        Some(end_raw) => {
            let stop = u64::try_from(end_raw)
                .map_err(|_| invalid())?
                .saturating_add(1);
            if stop < first {
                return Err(invalid());
            }
            stop.min(size)
        }
    };

    Ok(ByteRange {
        offset: first,
        length: stop - first,
    })
}

/// A [`Read`] adaptor that yields at most `limit` bytes from `inner`.
///
/// Once the budget is spent every read returns `Ok(0)`, even if the source
/// has more data. Dropping the stream drops the source.
#[derive(Debug)]
pub struct RangeStream<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> RangeStream<R> {
    /// Wrap `inner`, allowing `limit` more bytes to be read.
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Bytes still allowed by the budget.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read> Read for RangeStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
