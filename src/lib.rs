// ClusterSim - simulated membership and replicated key-value store
// Core library module

pub mod audit;
pub mod common;
pub mod gossip;
pub mod membership;
pub mod network;
pub mod node;
pub mod params;
pub mod ring;
pub mod stabilization;
pub mod store;
pub mod wire;

pub use common::{Address, ClusterError, ReplicaRole, Result};
pub use node::Node;
pub use params::Params;

/// Crate version, surfaced for diagnostics the way a server banner would.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
