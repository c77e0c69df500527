/*!
 * Platform Backend Module
 * One consistent isolation contract over per-OS primitive families
 */

pub mod linux;
pub mod macos;
pub mod manager;
pub mod traits;
pub mod types;
pub mod windows;

pub use manager::PlatformBackend;
pub use traits::IsolationProvider;
pub use types::{
    BackendError, BackendResult, ContextUsage, HardeningFlags, IsolationContext, PlatformKind,
};
