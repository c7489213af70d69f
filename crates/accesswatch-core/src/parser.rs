//! Common Log Format line parser (C1).
//!
//! Grammar (delimiters consumed, field bytes not trimmed):
//!
//! ```text
//! IP SP PROTOCOLID SP USERID SP "[" TIMESTAMP "]" SP
//!     """ METHOD SP RESOURCE SP PROTOCOL """ SP STATUS SP SIZE
//! ```

use chrono::{DateTime, FixedOffset};

use crate::error::ParseError;
use crate::model::{Entry, Request};

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Parses one CLF line (no trailing newline) into `entry`, overwriting
/// every field. On error `entry` is left in an unspecified state; the
/// caller should recycle it rather than use it.
pub fn parse_line(raw_line: &[u8], entry: &mut Entry) -> Result<(), ParseError> {
    let mut start = 0usize;

    let (ip_end, adv) =
        find(raw_line, start, b' ').ok_or(ParseError::MissingDelimiter { field: "ip" })?;
    let ip = start as u32..ip_end as u32;
    start = ip_end + adv;

    let (proto_end, adv) = find(raw_line, start, b' ')
        .ok_or(ParseError::MissingDelimiter { field: "protocol_id" })?;
    let protocol_id = start as u32..proto_end as u32;
    start = proto_end + adv;

    let (user_end, adv) =
        find(raw_line, start, b' ').ok_or(ParseError::MissingDelimiter { field: "user_id" })?;
    let user_id = start as u32..user_end as u32;
    start = user_end + adv;

    // eat '['
    start += 1;
    let (ts_end, adv) =
        find(raw_line, start, b']').ok_or(ParseError::MissingDelimiter { field: "timestamp" })?;
    let ts_raw = &raw_line[start..ts_end];
    let timestamp = parse_timestamp(ts_raw)?;
    start = ts_end + adv;
    // eat the space between "] and the opening quote
    start += 1;

    // eat '"'
    start += 1;
    let (method_end, adv) =
        find(raw_line, start, b' ').ok_or(ParseError::MissingDelimiter { field: "method" })?;
    let method = start as u32..method_end as u32;
    start = method_end + adv;

    let (resource_end, adv) =
        find(raw_line, start, b' ').ok_or(ParseError::MissingDelimiter { field: "resource" })?;
    let resource = start as u32..resource_end as u32;
    start = resource_end + adv;

    let (protocol_end, adv) =
        find(raw_line, start, b'"').ok_or(ParseError::MissingDelimiter { field: "protocol" })?;
    let protocol = start as u32..protocol_end as u32;
    start = protocol_end + adv;

    // eat '"'
    start += 1;
    let (status_end, adv) =
        find(raw_line, start, b' ').ok_or(ParseError::MissingDelimiter { field: "status" })?;
    let status_code = convert_digits(&raw_line[start..status_end]);
    start = status_end + adv;

    let size = convert_digits(&raw_line[start..]);

    entry.repopulate(
        raw_line,
        ip,
        protocol_id,
        user_id,
        timestamp,
        Request {
            method,
            resource,
            protocol,
        },
        status_code,
        size,
    );

    Ok(())
}

/// Finds the first occurrence of `delimiter` at or after `start`.
/// Returns `(index, 1)` on a match (delimiters here are always single
/// ASCII bytes), or `None` if `delimiter` does not appear.
fn find(line: &[u8], start: usize, delimiter: u8) -> Option<(usize, usize)> {
    line.get(start..)?
        .iter()
        .position(|&b| b == delimiter)
        .map(|i| (start + i, 1))
}

fn parse_timestamp(raw: &[u8]) -> Result<DateTime<FixedOffset>, ParseError> {
    let s = std::str::from_utf8(raw).map_err(|_| ParseError::BadTimestamp {
        raw: String::from_utf8_lossy(raw).into_owned(),
    })?;
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|_| ParseError::BadTimestamp {
        raw: s.to_string(),
    })
}

/// Parses digits right-to-left with no validation, exactly matching the
/// reference `convertByteToInt`: a non-digit byte is not rejected, it is
/// folded into the accumulator as `byte - b'0'` and silently corrupts the
/// result. Preserved intentionally (see spec notes); never panics.
fn convert_digits(buf: &[u8]) -> u32 {
    let mut n: i64 = 0;
    let mut scale: i64 = 1;
    for &b in buf.iter().rev() {
        n += scale * (b as i64 - b'0' as i64);
        scale *= 10;
    }
    n as u32
}
