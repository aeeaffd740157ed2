//! Remote-cluster lifecycle: the entity type and registry (spec.md §3, C7)
//! plus the resolver that turns secrets into running controllers (§4.4, C11).

pub mod resolver;
pub mod types;

pub use resolver::Resolver;
pub use types::{RemoteCluster, RemoteClusterRegistry};
