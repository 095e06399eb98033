//! Secret handling.
//!
//! API keys only leave their `SecretString` when handed to the hook process.

pub use secrecy::{ExposeSecret, SecretString};
