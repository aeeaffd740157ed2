//! Per-resource-kind handlers (spec.md §4.5–§4.7, C12–C15): the business
//! logic invoked by the controller runtime for each dequeued event.

pub mod dependency;
pub mod secret;
pub mod trafficconfig;
pub mod workload;

pub use dependency::DependencyHandler;
pub use secret::SecretHandler;
pub use trafficconfig::TrafficConfigHandler;
pub use workload::{DeploymentHandler, RolloutHandler, ServiceHandler, WorkloadHandler};
