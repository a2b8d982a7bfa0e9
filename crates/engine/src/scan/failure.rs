//! Turning a scan error tree into the record kept on the storage.

use super::error::Error;
use geocrawl_cache::ErrorRecord;

/// Record for a failed scan: the kind comes from the outermost error, the
/// message spells out the chain down to the root cause.
pub(crate) fn record(err: &Error) -> ErrorRecord {
    ErrorRecord::new(err.failure_kind(), message(err))
}

fn message(err: &Error) -> String {
    let mut parts = Vec::new();
    let mut frame = err.frame();
    loop {
        parts.push(frame.error().to_string());
        match frame.children().first() {
            Some(child) => frame = child,
            None => break,
        }
    }
    parts.join(": ")
}
