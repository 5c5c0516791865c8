//! Scalar forms of the manager operations for hosts that talk in integers,
//! such as a scripting layer or an FFI shim.

use crate::ws::ConnectionManager;

/// Returned instead of a length when no message is queued.
pub const NO_DATA: i32 = -1;

/// 1 if the connection is open, 0 otherwise.
pub fn is_connected_flag(manager: &ConnectionManager) -> i32 {
    i32::from(manager.is_connected())
}

/// Length of the oldest queued message without removing it, or [`NO_DATA`].
pub fn next_len(manager: &mut ConnectionManager) -> i32 {
    manager.poll_events();
    manager.queue().peek_len().map_or(NO_DATA, clamp_len)
}

/// Move the oldest queued message into `buffer` (replacing its contents).
///
/// Returns the message length, or [`NO_DATA`] with `buffer` left untouched.
pub fn try_recv_into(manager: &mut ConnectionManager, buffer: &mut Vec<u8>) -> i32 {
    match manager.try_recv() {
        Some(message) => {
            let len = clamp_len(message.len());
            *buffer = message;
            len
        }
        None => NO_DATA,
    }
}

fn clamp_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
