//! forkstream: Fork a telephony channel's bidirectional audio to UDP.
//!
//! A frame hook attached to a channel copies every voice frame it sees, read
//! (RX) or written (TX), into a small self-describing TLV packet and sends it
//! to a monitoring endpoint. The call audio itself is never touched.
//!
//! The crate builds as a shared library with a C entry point set for the
//! telephony switch, and as a Rust library exposing the same machinery.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;

pub mod args;
pub mod config;
pub mod error;
pub mod ffi;
pub mod hook;
pub mod session;
pub mod stream_id;
pub mod tlv;

pub use args::{parse_arguments, parse_destination, ForkArgs};
pub use error::{ForkError, ForkResult};
pub use hook::{ForkHook, Frame, FrameKind, FrameSink, HookEvent, HookState};
pub use session::{StatsSnapshot, StreamSession};
pub use stream_id::StreamIdGenerator;
pub use tlv::{Direction, PacketHeader, PacketType, StreamMetadata};

use ffi::*;

// ============================================================================
// Library Version
// ============================================================================

const FORKSTREAM_VERSION: DWORD = 0x01_00_00_00; // 1.0.0.0

lazy_static! {
    /// Stream id source shared by every hook created through the C API.
    static ref STREAM_IDS: StreamIdGenerator = StreamIdGenerator::new();
}

/// Library initialization state
static INIT_DONE: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Public FFI API
// ============================================================================

/// Initialize logging. Called once at module load; later calls are no-ops.
#[no_mangle]
pub extern "C" fn FORKSTREAM_Init() -> BOOL {
    if INIT_DONE.swap(true, Ordering::SeqCst) {
        return TRUE;
    }

    config::init_logging();
    log::info!("ForkStream library loaded (version {:#010x})", FORKSTREAM_VERSION);
    TRUE
}

/// Library version (0xMMmmppbb)
#[no_mangle]
pub extern "C" fn FORKSTREAM_GetVersion() -> DWORD {
    FORKSTREAM_VERSION
}

/// Error code of the last failed call on this thread
#[no_mangle]
pub extern "C" fn FORKSTREAM_ErrorGetCode() -> i32 {
    last_error()
}

/// Enable (non-zero) or disable (0) per-frame logging
#[no_mangle]
pub extern "C" fn FORKSTREAM_SetLogging(enabled: BOOL) -> BOOL {
    config::set_verbose(enabled != 0);
    log::info!("{}", config::logger_status());
    TRUE
}

/// Current per-frame logging state (1 = enabled)
#[no_mangle]
pub extern "C" fn FORKSTREAM_GetLogging() -> BOOL {
    if config::is_verbose() { TRUE } else { FALSE }
}

/// Start forking a channel.
///
/// # Arguments
/// * `args` - "ip:port[,channel_id][,exten][,caller_id][,called_id]"
/// * `channel_name` - Host channel name, used when no channel_id is given (may be null)
///
/// # Returns
/// Opaque hook handle, or null on failure (see FORKSTREAM_ErrorGetCode)
///
/// # Safety
/// `args` must be a valid NUL-terminated string; `channel_name` must be
/// null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn FORKSTREAM_Attach(
    args: *const c_char,
    channel_name: *const c_char,
) -> *mut c_void {
    if args.is_null() {
        set_error(FORKSTREAM_ERROR_ARGS);
        return std::ptr::null_mut();
    }

    let args = match CStr::from_ptr(args).to_str() {
        Ok(s) => s,
        Err(_) => {
            set_error(FORKSTREAM_ERROR_ARGS);
            return std::ptr::null_mut();
        }
    };

    let channel_name = if channel_name.is_null() {
        crate::args::UNKNOWN_CHANNEL.to_string()
    } else {
        CStr::from_ptr(channel_name).to_string_lossy().into_owned()
    };

    log::debug!("ForkStream called on channel {} with data: {}", channel_name, args);

    let hook = match parse_arguments(args)
        .and_then(|parsed| ForkHook::attach(&parsed, &channel_name, &STREAM_IDS))
    {
        Ok(hook) => hook,
        Err(e) => {
            log::error!("ForkStream: Failed to start on channel {}: {}", channel_name, e);
            set_error(error_code(&e));
            return std::ptr::null_mut();
        }
    };

    set_error(FORKSTREAM_OK);
    Box::into_raw(Box::new(hook)) as *mut c_void
}

/// Deliver one frame from the host's hook callback.
///
/// The host keeps ownership of the frame and processes it normally whatever
/// this returns.
///
/// # Returns
/// 1 if a packet was sent, 0 otherwise
///
/// # Safety
/// `handle` must come from FORKSTREAM_Attach and not yet be freed; `data`
/// must point to `len` readable bytes (or be null).
#[no_mangle]
pub unsafe extern "C" fn FORKSTREAM_OnFrame(
    handle: *mut c_void,
    event: DWORD,
    frame_type: DWORD,
    data: *const u8,
    len: DWORD,
) -> BOOL {
    if handle.is_null() || data.is_null() || len == 0 {
        return FALSE;
    }

    let Some(event) = hook_event(event) else {
        return FALSE;
    };

    let hook = &*(handle as *const ForkHook);
    let frame = Frame {
        kind: frame_kind(frame_type),
        data: std::slice::from_raw_parts(data, len as usize),
    };

    if hook.observe(event, &frame) { TRUE } else { FALSE }
}

/// Tear down the hook's session (socket closed, memory released).
///
/// Idempotent: returns 1 only for the call that performed the teardown.
///
/// # Safety
/// `handle` must come from FORKSTREAM_Attach and not yet be freed.
#[no_mangle]
pub unsafe extern "C" fn FORKSTREAM_Teardown(handle: *mut c_void) -> BOOL {
    if handle.is_null() {
        set_error(FORKSTREAM_ERROR_HANDLE);
        return FALSE;
    }

    let hook = &*(handle as *const ForkHook);
    if hook.on_teardown() { TRUE } else { FALSE }
}

/// Get statistics for a hook handle.
///
/// # Returns
/// 1 on success, 0 if the handle is invalid or already torn down
///
/// # Safety
/// `handle` must come from FORKSTREAM_Attach and not yet be freed; `stats`
/// must point to a writable ForkStatsFFI.
#[no_mangle]
pub unsafe extern "C" fn FORKSTREAM_GetStats(handle: *mut c_void, stats: *mut ForkStatsFFI) -> BOOL {
    if stats.is_null() {
        set_error(FORKSTREAM_ERROR_ARGS);
        return FALSE;
    }

    if handle.is_null() {
        set_error(FORKSTREAM_ERROR_HANDLE);
        return FALSE;
    }

    let hook = &*(handle as *const ForkHook);
    let filled = hook.with_session(|session| {
        let snapshot = session.stats();
        ForkStatsFFI {
            packets_sent: snapshot.packets_sent,
            bytes_sent: snapshot.bytes_sent,
            send_errors: snapshot.send_errors,
            oversized_dropped: snapshot.oversized_dropped,
            stream_id: session.stream_id(),
            rx_sequence: session.sequence(Direction::Rx),
            tx_sequence: session.sequence(Direction::Tx),
        }
    });

    match filled {
        Some(filled) => {
            (*stats) = filled;
            TRUE
        }
        None => {
            set_error(FORKSTREAM_ERROR_STATE);
            FALSE
        }
    }
}

/// Free a hook handle, tearing it down first if needed.
///
/// # Safety
/// `handle` must come from FORKSTREAM_Attach and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn FORKSTREAM_Free(handle: *mut c_void) -> BOOL {
    if handle.is_null() {
        set_error(FORKSTREAM_ERROR_HANDLE);
        return FALSE;
    }

    // Drop runs teardown if the host never did
    let _ = Box::from_raw(handle as *mut ForkHook);
    TRUE
}
