//! Status codes carried in acknowledgements and returned by the agent
//! lifecycle API. Zero is success, failures are negative errno-style values.

/// Success
pub const OK: i32 = 0;
/// Unspecified failure, also used for handlers that panicked
pub const GENERIC: i32 = -1;
/// Unknown slice or trigger
pub const NOT_FOUND: i32 = -2;
/// Transport I/O failure
pub const IO: i32 = -5;
/// Identity change attempted while the session is running
pub const LOCKED: i32 = -16;
/// Slice or trigger already present
pub const ALREADY_EXISTS: i32 = -17;
/// Malformed request or configuration
pub const INVALID: i32 = -22;
/// No controller connection
pub const NOT_CONNECTED: i32 = -107;
/// Connection attempt timed out
pub const TIMED_OUT: i32 = -110;
/// `start()` called on a running agent
pub const ALREADY_STARTED: i32 = -114;

/// Returns true if `status` denotes success.
pub fn is_ok(status: i32) -> bool {
    status == OK
}
