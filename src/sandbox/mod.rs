/*!
 * Sandbox Module
 * Lifecycle orchestration, monitoring, caching, and events
 */

pub mod cache;
pub mod events;
pub mod manager;
pub mod monitor;
pub mod registry;

pub use cache::{ResourceUsageCache, ResourceUsageSnapshot};
pub use events::{EventBus, SandboxEvent};
pub use manager::SandboxManager;
pub use registry::{SandboxRecord, SandboxRegistry};
