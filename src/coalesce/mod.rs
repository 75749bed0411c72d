//! Request coalescing
//!
//! A [`CoalescingRegistry`] lives as long as one screen scope and merges the
//! per-row quantity and configured-flag lookups of that scope into batched
//! calls. Consumers outside a scope call the single-key endpoints of
//! [`HttpLookupSource`] behind a [`ConsumerGuard`].

pub mod guard;
pub mod registry;
pub mod source;

pub use guard::ConsumerGuard;
pub use registry::{CoalescingRegistry, Lookup};
pub use source::{BatchSource, HttpLookupSource, LookupKey};
