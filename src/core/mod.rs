//! Durable outbox and its replay loop.

/// Sync queue, replay pass and dead-letter handling.
pub mod queue;
