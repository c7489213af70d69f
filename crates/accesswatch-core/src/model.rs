//! Shared data types: the parsed log record and its sub-fields.

use std::ops::Range;

use chrono::{DateTime, FixedOffset};

/// The three space-delimited tokens inside the CLF request's quoted field.
///
/// Byte ranges index into the owning [`Entry`]'s `line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Range<u32>,
    pub resource: Range<u32>,
    pub protocol: Range<u32>,
}

/// A parsed Common Log Format record.
///
/// `line` is the entry's own copy of the raw input bytes; every other byte
/// field is a [`Range`] into `line` rather than a borrowed slice, since a
/// struct cannot safely own a buffer and borrow from it at the same time.
/// Accessors (`ip()`, `method()`, ...) slice `line` on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    line: Box<[u8]>,
    ip: Range<u32>,
    protocol_id: Range<u32>,
    user_id: Range<u32>,
    timestamp: DateTime<FixedOffset>,
    request: Request,
    status_code: u32,
    size: u32,
}

impl Entry {
    /// Builds an entry directly from already-sliced fields.
    ///
    /// Used by the parser, which owns the only valid way to construct a
    /// correctly-ranged entry. `line` must contain every byte range passed
    /// in; out-of-range inputs will panic on first access, not here.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        line: Box<[u8]>,
        ip: Range<u32>,
        protocol_id: Range<u32>,
        user_id: Range<u32>,
        timestamp: DateTime<FixedOffset>,
        request: Request,
        status_code: u32,
        size: u32,
    ) -> Self {
        Self {
            line,
            ip,
            protocol_id,
            user_id,
            timestamp,
            request,
            status_code,
            size,
        }
    }

    /// A blank entry suitable for seeding an [`crate::pool::EntryPool`].
    /// Every byte field is empty; `timestamp` is the Unix epoch at UTC.
    /// Callers must fully repopulate an entry (via the parser) before use.
    pub(crate) fn blank() -> Self {
        Self {
            line: Box::new([]),
            ip: 0..0,
            protocol_id: 0..0,
            user_id: 0..0,
            timestamp: DateTime::<chrono::Utc>::UNIX_EPOCH.fixed_offset(),
            request: Request {
                method: 0..0,
                resource: 0..0,
                protocol: 0..0,
            },
            status_code: 0,
            size: 0,
        }
    }

    fn slice(&self, r: &Range<u32>) -> &[u8] {
        &self.line[r.start as usize..r.end as usize]
    }

    pub fn ip(&self) -> &[u8] {
        self.slice(&self.ip)
    }

    pub fn protocol_id(&self) -> &[u8] {
        self.slice(&self.protocol_id)
    }

    pub fn user_id(&self) -> &[u8] {
        self.slice(&self.user_id)
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn method(&self) -> &[u8] {
        self.slice(&self.request.method)
    }

    pub fn resource(&self) -> &[u8] {
        self.slice(&self.request.resource)
    }

    pub fn protocol(&self) -> &[u8] {
        self.slice(&self.request.protocol)
    }

    pub fn status_code(&self) -> u32 {
        self.status_code
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Overwrites every field in place, reusing `self.line`'s allocation
    /// when it has enough capacity. Called only by the parser, on an entry
    /// freshly taken from the pool.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn repopulate(
        &mut self,
        raw_line: &[u8],
        ip: Range<u32>,
        protocol_id: Range<u32>,
        user_id: Range<u32>,
        timestamp: DateTime<FixedOffset>,
        request: Request,
        status_code: u32,
        size: u32,
    ) {
        let mut line = std::mem::take(&mut self.line).into_vec();
        line.clear();
        line.extend_from_slice(raw_line);
        self.line = line.into_boxed_slice();
        self.ip = ip;
        self.protocol_id = protocol_id;
        self.user_id = user_id;
        self.timestamp = timestamp;
        self.request = request;
        self.status_code = status_code;
        self.size = size;
    }
}
