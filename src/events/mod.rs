//! # Event System
//!
//! Task progress and worker status events, the non-blocking sink they are delivered to,
//! and the broadcast publisher used as the default sink.

pub mod publisher;
pub mod relay;
pub mod types;

// Re-export key types for convenience
pub use publisher::{EventPublisher, PublishedEvent, UserSubscription};
pub use relay::spawn_progress_relay;
pub use types::{CalcEvent, EventAudience, EventSink, TaskProgress, WorkerStatusUpdate};
