//! The Relay: durable, subject-addressed message passing between agents,
//! adapters, and scheduled jobs.

pub mod adapter;
pub mod circuit;
pub mod core;
pub mod endpoint;
pub mod subscription;
pub mod trace_store;
pub mod watcher;

pub use adapter::{AdapterContext, AdapterDeliveryOutcome, AdapterRegistry, AdapterState, AdapterStatus, RelayAdapter};
pub use circuit::{BreakerState, CircuitBreakerManager};
pub use core::{AccessPolicy, InboxPage, PublishOptions, PublishResult, RelayCore};
pub use endpoint::EndpointRegistry;
pub use subscription::{Subscription, SubscriptionRegistry};
pub use trace_store::{LatencyPercentiles, TraceMetrics, TraceStore};
pub use watcher::WatcherManager;
