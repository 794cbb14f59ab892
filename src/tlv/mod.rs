//! Forkstream wire protocol.
//!
//! Provides the TLV header, signaling/audio payload encoding, and the
//! send-only UDP socket used to transmit them.

pub mod header;
pub mod payload;
pub mod socket;

pub use header::*;
pub use payload::*;
pub use socket::*;
