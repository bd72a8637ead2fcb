//! HTTP adapters

pub mod applier;

pub use applier::{HttpActionApplier, IDEMPOTENCY_HEADER};
