//! Core SMTP types.

mod address;
mod capabilities;
mod credentials;
mod message;
mod reply;
mod verification;

pub use address::Address;
pub use capabilities::{AuthMechanism, Capabilities, Extension};
pub use credentials::Credentials;
pub use message::{DEFAULT_BODY, Message, TERMINATOR};
pub use reply::{Reply, ReplyCode};
pub use verification::VerificationResult;
