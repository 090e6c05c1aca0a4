//! Signal-driven sync runtime and event stream APIs.

/// Event stream types emitted by the queue.
pub mod events;
/// Driver task and handle.
pub mod handle;
