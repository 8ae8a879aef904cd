//! Transport, channel and command sequencing.
//!
//! [`connect`] opens the TCP transport, [`Channel`] carries it through the
//! optional TLS upgrade, and [`Connection`] runs one command/reply exchange
//! at a time over whatever channel it owns.

mod client;
mod stream;

use std::io;

pub use client::Connection;
pub use stream::{Channel, connect, with_deadline, write_fully};

/// Returns true for I/O conditions that are retried rather than reported.
///
/// Non-blocking transports surface `WouldBlock`; signals surface
/// `Interrupted`. Neither ends the session.
#[must_use]
pub fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
