// Common Types and Errors
//
// Shared types used across the membership and store engines: the 6-byte
// cluster address, the replica role tag, the crate-wide error type, and the
// fixed-width wire framing helpers used by gossip serialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod frame;

pub use frame::FrameEntry;

/// Length in bytes of an on-wire address: 4-byte id + 2-byte port.
pub const ADDR_LEN: usize = 6;

/// A cluster node address: 4-byte id, 2-byte port.
///
/// Ordering is byte-wise: `id` compares first, then `port`, which matches
/// comparing the 6-byte wire layout lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Address {
    pub id: u32,
    pub port: u16,
}

impl Address {
    pub const fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    /// Decimal `"id:port"` form used as the ring hash input and as the
    /// exclusion-set key during gossip.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.id, self.port)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

/// Position of a key's holder among the three ring successors of its hash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum ReplicaRole {
    Primary,
    Secondary,
    Tertiary,
}

impl ReplicaRole {
    pub fn offset(&self) -> usize {
        match self {
            ReplicaRole::Primary => 0,
            ReplicaRole::Secondary => 1,
            ReplicaRole::Tertiary => 2,
        }
    }

    pub fn from_offset(offset: usize) -> Option<Self> {
        match offset {
            0 => Some(ReplicaRole::Primary),
            1 => Some(ReplicaRole::Secondary),
            2 => Some(ReplicaRole::Tertiary),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("malformed message: {0}")]
    InvalidMessage(String),

    #[error("ring unavailable: fewer than 3 live members")]
    RingUnavailable,
}

pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_ordering_is_byte_wise() {
        let a = Address::new(1, 10);
        let b = Address::new(1, 20);
        let c = Address::new(2, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn canonical_round_trips_through_display() {
        let a = Address::new(7, 9090);
        assert_eq!(a.canonical(), "7:9090");
        assert_eq!(format!("{}", a), "7:9090");
    }

    #[test]
    fn replica_role_offsets() {
        assert_eq!(ReplicaRole::Primary.offset(), 0);
        assert_eq!(ReplicaRole::from_offset(1), Some(ReplicaRole::Secondary));
        assert_eq!(ReplicaRole::from_offset(3), None);
    }
}

impl PartialEq for ReplicaRole {
    fn eq(&self, other: &Self) -> bool {
        self.offset() == other.offset()
    }
}
impl Eq for ReplicaRole {}
