// Network port trait
//
// The network emulator itself — loss, duplication, delay — is an external
// collaborator (spec §6, out of scope). This crate only depends on the
// interface a node uses to push and drain bytes.

use crate::common::Address;

/// Best-effort message transport between addresses.
///
/// Implementations may drop, duplicate, or delay delivery; nodes must not
/// assume otherwise.
pub trait NetworkPort {
    /// Enqueue `bytes` for delivery from `from` to `to`.
    fn send(&self, from: Address, to: Address, bytes: Vec<u8>);

    /// Drain all currently available messages addressed to `addr`.
    fn drain(&self, addr: Address) -> Vec<Vec<u8>>;
}
