//! C-facing types and constants.
//!
//! These mirror the values a host module passes across the boundary:
//! hook event codes, frame type codes and error codes.

pub mod host;

pub use host::*;
