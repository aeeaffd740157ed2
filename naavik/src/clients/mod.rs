pub mod config_loader;

pub use config_loader::{ClusterClients, CredentialResolver, load_client_bundle, resolver_for};
