//! Byte-range header codec
//!
//! Encodes a [`LogRange`] request into a `Range` header and decodes the
//! server's `Content-Range` header back into a [`LogRange`].
//!
//! ```text
//! request:  Range: bytes=<low>-<high>          (either bound may be blank)
//! response: Content-Range: bytes <low>-<high>/<length>
//! ```

use crate::error::RangeParseError;
use crate::types::LogRange;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use std::sync::OnceLock;

/// The only unit the log endpoints speak
pub const BYTES_UNIT: &str = "bytes";

/// Build the `Range` header value for a request
///
/// Absent bounds are left blank, so `bytes=-2048` asks for the last 2048
/// bytes and `bytes=0-` asks for everything from the start.
pub fn request_header_value(range: &LogRange) -> String {
    let low = range.low.map(|v| v.to_string()).unwrap_or_default();
    let high = range.high.map(|v| v.to_string()).unwrap_or_default();
    format!("{}={}-{}", BYTES_UNIT, low, high)
}

/// Build the request headers for a ranged fetch
pub fn encode_request(range: &LogRange) -> HeaderMap {
    let mut headers = HeaderMap::new();
    // digits, '=' and '-' only: always a valid header value
    if let Ok(value) = HeaderValue::from_str(&request_header_value(range)) {
        headers.insert(RANGE, value);
    }
    headers
}

/// Parse a `Content-Range` header of the form `bytes <low>-<high>/<length>`
pub fn decode_response(value: &str) -> Result<LogRange, RangeParseError> {
    static CONTENT_RANGE_REGEX: OnceLock<Regex> = OnceLock::new();

    let re = CONTENT_RANGE_REGEX.get_or_init(|| {
        // Every group is required; an empty capture fails the integer parse below
        Regex::new(r"^bytes (\d*)-(\d*)/(\d*)$").unwrap()
    });

    let captures = re.captures(value).ok_or_else(|| {
        RangeParseError::new(format!("Invalid Content-Range header: '{}'", value))
    })?;

    let group = |idx: usize, name: &str| -> Result<u64, RangeParseError> {
        let raw = captures.get(idx).map(|m| m.as_str()).unwrap_or_default();
        raw.parse::<u64>().map_err(|_| {
            RangeParseError::new(format!(
                "Invalid Content-Range header: '{}' (missing or invalid {})",
                value, name
            ))
        })
    };

    let (low, high, length) = (group(1, "low")?, group(2, "high")?, group(3, "length")?);
    if low > high || high > length {
        return Err(RangeParseError::new(format!(
            "Invalid Content-Range header: '{}' (expected low <= high <= length)",
            value
        )));
    }

    Ok(LogRange {
        unit: Some(BYTES_UNIT.to_string()),
        low: Some(low),
        high: Some(high),
        length: Some(length),
    })
}
