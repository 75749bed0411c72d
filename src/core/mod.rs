//! Core abstractions for the client
//!
//! This module provides the error types and the traits that decouple the
//! request pipeline from the transport, the clock and the UI.

pub mod error;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{ClassifiedError, ClientError, ClientResult, ErrorContext, ErrorKind};
pub use traits::*;
