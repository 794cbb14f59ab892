//! Error type shared by every forkstream module.

use std::io;

use thiserror::Error;

/// Errors that can occur while setting up or feeding a fork stream.
///
/// None of these ever fails the call itself: the host keeps processing
/// audio normally whatever the fork reports.
#[derive(Error, Debug)]
pub enum ForkError {
    #[error("Invalid destination '{0}': expected ip:port with port 1-65535")]
    InvalidDestination(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("Partial send: {sent} of {expected} bytes")]
    PartialSend { sent: usize, expected: usize },

    #[error("Frame of {len} bytes would overflow the 16-bit packet length")]
    OversizedFrame { len: usize },

    #[error("Fork hook has already left the idle state")]
    NotIdle,
}

/// Result alias used across the crate.
pub type ForkResult<T> = Result<T, ForkError>;
