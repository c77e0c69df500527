/*!
 * Core Module
 * Shared primitives for the sandbox runtime
 */

pub mod errors;
pub mod serde;
pub mod types;

pub use errors::{SandboxError, SandboxResult};
pub use types::{now_ms, Pid, SandboxId, TimestampMs};
