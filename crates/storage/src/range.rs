//! Single byte-range parsing (`Range: bytes=...`).
//!
//! Only one range per request is supported; multipart responses are not.

use derive_more::{Display, Error};

/// Inclusive byte window within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Never zero: a satisfiable range covers at least one byte.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for this range.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[display("malformed range header: {_0}")]
    Malformed(#[error(not(source))] String),
    #[display("multiple ranges are not supported")]
    MultipleRanges,
    #[display("range not satisfiable for {size} bytes")]
    Unsatisfiable { size: u64 },
}

fn parse_offset(value: &str, header: &str) -> Result<u64, RangeError> {
    // u64::from_str would also accept a leading '+'.
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(header.to_string()));
    }
    value.parse().map_err(|_| RangeError::Malformed(header.to_string()))
}

/// Resolve a `Range` header against a file of `size` bytes.
///
/// Accepts `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`. An end
/// past the file is clamped to the last byte.
///
/// ```
/// use geocrawl_storage::range::{ByteRange, parse_range};
/// assert_eq!(parse_range("bytes=10-19", 100), Ok(ByteRange { start: 10, end: 19 }));
/// assert_eq!(parse_range("bytes=-10", 100), Ok(ByteRange { start: 90, end: 99 }));
/// ```
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let trimmed = header.trim();
    let spec = match trimmed.split_once('=') {
        Some((unit, spec)) if unit.trim().eq_ignore_ascii_case("bytes") => spec.trim(),
        _ => return Err(RangeError::Malformed(header.to_string())),
    };
    if spec.contains(',') {
        return match spec.split(',').filter(|part| !part.trim().is_empty()).count() {
            0 | 1 => Err(RangeError::Malformed(header.to_string())),
            _ => Err(RangeError::MultipleRanges),
        };
    }
    let Some((first, last)) = spec.split_once('-') else {
        return Err(RangeError::Malformed(header.to_string()));
    };
    let (first, last) = (first.trim(), last.trim());
    let (start, end) = match (first.is_empty(), last.is_empty()) {
        (true, true) => return Err(RangeError::Malformed(header.to_string())),
        // Suffix: the last n bytes.
        (true, false) => {
            let n = parse_offset(last, header)?;
            if n == 0 || size == 0 {
                return Err(RangeError::Unsatisfiable { size });
            }
            (size.saturating_sub(n), size - 1)
        },
        (false, true) => (parse_offset(first, header)?, u64::MAX),
        (false, false) => {
            let (start, end) = (parse_offset(first, header)?, parse_offset(last, header)?);
            if start > end {
                return Err(RangeError::Malformed(header.to_string()));
            }
            (start, end)
        },
    };
    if start >= size {
        return Err(RangeError::Unsatisfiable { size });
    }
    Ok(ByteRange {
        start,
        end: end.min(size - 1),
    })
}
