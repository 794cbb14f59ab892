//! Host hook bindings.
//! Event and frame type codes follow the host's frame hook API numbering.

use std::cell::Cell;

use crate::error::ForkError;
use crate::hook::{FrameKind, HookEvent};

// Basic types
pub type DWORD = u32;
pub type BOOL = i32;

// Boolean constants
pub const TRUE: BOOL = 1;
pub const FALSE: BOOL = 0;

// Hook events
pub const FORKSTREAM_EVENT_READ: DWORD = 0;
pub const FORKSTREAM_EVENT_WRITE: DWORD = 1;
pub const FORKSTREAM_EVENT_ATTACHED: DWORD = 2;
pub const FORKSTREAM_EVENT_DETACHED: DWORD = 3;

// Frame types
pub const FORKSTREAM_FRAME_DTMF: DWORD = 1;
pub const FORKSTREAM_FRAME_VOICE: DWORD = 2;
pub const FORKSTREAM_FRAME_VIDEO: DWORD = 3;
pub const FORKSTREAM_FRAME_CONTROL: DWORD = 4;

// Error codes
pub const FORKSTREAM_OK: i32 = 0;
pub const FORKSTREAM_ERROR_ARGS: i32 = 1;
pub const FORKSTREAM_ERROR_DESTINATION: i32 = 2;
pub const FORKSTREAM_ERROR_SOCKET: i32 = 3;
pub const FORKSTREAM_ERROR_FRAME: i32 = 4;
pub const FORKSTREAM_ERROR_HANDLE: i32 = 5;
pub const FORKSTREAM_ERROR_STATE: i32 = 6;

/// Statistics for a fork stream handle
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkStatsFFI {
    /// Packets sent (signaling + audio)
    pub packets_sent: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Failed or partial sends
    pub send_errors: u64,
    /// Frames dropped for overflowing the length field
    pub oversized_dropped: u64,
    /// Stream identifier
    pub stream_id: u32,
    /// Last RX sequence number
    pub rx_sequence: u32,
    /// Last TX sequence number
    pub tx_sequence: u32,
}

pub fn hook_event(code: DWORD) -> Option<HookEvent> {
    match code {
        FORKSTREAM_EVENT_READ => Some(HookEvent::Read),
        FORKSTREAM_EVENT_WRITE => Some(HookEvent::Write),
        FORKSTREAM_EVENT_ATTACHED => Some(HookEvent::Attached),
        FORKSTREAM_EVENT_DETACHED => Some(HookEvent::Detached),
        _ => None,
    }
}

pub fn frame_kind(code: DWORD) -> FrameKind {
    match code {
        FORKSTREAM_FRAME_VOICE => FrameKind::Voice,
        FORKSTREAM_FRAME_VIDEO => FrameKind::Video,
        FORKSTREAM_FRAME_DTMF => FrameKind::Dtmf,
        FORKSTREAM_FRAME_CONTROL => FrameKind::Control,
        _ => FrameKind::Other,
    }
}

pub fn error_code(err: &ForkError) -> i32 {
    match err {
        ForkError::InvalidArguments(_) => FORKSTREAM_ERROR_ARGS,
        ForkError::InvalidDestination(_) => FORKSTREAM_ERROR_DESTINATION,
        ForkError::Socket(_) | ForkError::PartialSend { .. } => FORKSTREAM_ERROR_SOCKET,
        ForkError::OversizedFrame { .. } => FORKSTREAM_ERROR_FRAME,
        ForkError::NotIdle => FORKSTREAM_ERROR_STATE,
    }
}

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(FORKSTREAM_OK) };
}

/// Record the error code for the calling thread.
pub fn set_error(code: i32) {
    LAST_ERROR.with(|e| e.set(code));
}

/// Error code of the last failed call on this thread.
pub fn last_error() -> i32 {
    LAST_ERROR.with(|e| e.get())
}
