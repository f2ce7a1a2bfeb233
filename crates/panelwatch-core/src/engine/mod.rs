//! Single-flight composition of capture, model call, decode and persist.

pub mod coordinator;

pub use coordinator::{RunCoordinator, RunSettings};
