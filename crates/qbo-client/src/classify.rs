//! Response status classification
//!
//! Decides whether a non-200 answer from the accounting API should trigger
//! the one-time refresh-and-retry, or be surfaced to the caller as-is.

/// What the session does with a non-200 status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Access token rejected (401/403): refresh once, retry once
    Unauthorized,
    /// Everything else: return the remote error unchanged
    Surface,
}

pub fn classify_status(status: u16) -> Classification {
    match status {
        401 | 403 => Classification::Unauthorized,
        _ => Classification::Surface,
    }
}
