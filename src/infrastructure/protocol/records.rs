//! Wire-format report encoding
//!
//! All reports are built into a growable buffer with an explicit capacity
//! limit. When a record does not fit, the writer truncates at whole-record
//! granularity and remembers that it did; partial reports are delivered
//! rather than refused.

use crate::domain::bearer::{TerminateRecord, UriRecord};
use crate::domain::call::Call;
use crate::infrastructure::protocol::opcode::ResultCode;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Capacity-checked report writer.
pub struct ReportWriter {
    buf: BytesMut,
    limit: usize,
    truncated: bool,
}

impl ReportWriter {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit.min(256)),
            limit,
            truncated: false,
        }
    }

    /// Append one `{index, state, flags}` call-state triple.
    ///
    /// Returns false (and marks the report truncated) if it does not fit.
    pub fn put_call_state(&mut self, call: &Call) -> bool {
        if self.buf.len() + 3 > self.limit {
            self.truncated = true;
            return false;
        }

        self.buf.put_u8(call.index());
        self.buf.put_u8(call.state().to_u8());
        self.buf.put_u8(call.flags().to_u8());
        true
    }

    /// Append one length-prefixed `{item_len, index, state, flags, uri}`
    /// current-calls record.
    pub fn put_current_call(&mut self, call: &Call) -> bool {
        let uri = call.remote_uri().as_bytes();
        let item_len = 3 + uri.len();

        let Ok(item_len_u8) = u8::try_from(item_len) else {
            warn!(call_index = call.index(), "Call record exceeds the item length field");
            self.truncated = true;
            return false;
        };

        if self.buf.len() + 1 + item_len > self.limit {
            self.truncated = true;
            return false;
        }

        self.buf.put_u8(item_len_u8);
        self.buf.put_u8(call.index());
        self.buf.put_u8(call.state().to_u8());
        self.buf.put_u8(call.flags().to_u8());
        self.buf.put_slice(uri);
        true
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Encode the `{call_index, opcode, status}` acknowledgement sent back to the
/// peer that wrote the control point.
pub fn status_report(call_index: u8, opcode: u8, result: ResultCode) -> [u8; 3] {
    [call_index, opcode, result.to_u8()]
}

/// Encode the two-byte terminate-reason notification.
pub fn terminate_report(record: TerminateRecord) -> [u8; 2] {
    [record.call_index, record.reason.to_u8()]
}

/// Encode a `{call_index, uri}` record; an unset record is zero-length.
pub fn uri_record(record: Option<&UriRecord>) -> Bytes {
    match record {
        Some(record) => {
            let mut buf = BytesMut::with_capacity(1 + record.uri.len());
            buf.put_u8(record.call_index);
            buf.put_slice(record.uri.as_bytes());
            buf.freeze()
        }
        None => Bytes::new(),
    }
}
