// Fixed-width wire framing for gossip member/exclusion entries.
//
// Each entry is `{6-byte addr, 8-byte heartbeat, 1-byte separator}` per
// spec §4.2 — fixed width so the frame size never needs to be carried
// alongside the data, only the total byte count.

use super::{Address, ADDR_LEN};
use crate::common::{ClusterError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Separator byte retained for wire compatibility; not semantic.
const SEPARATOR: u8 = b',';

/// Size in bytes of one encoded frame: address + i64 heartbeat + separator.
pub const FRAME_SIZE: usize = ADDR_LEN + 8 + 1;

/// One gossiped member observation: an address and the heartbeat last
/// observed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    pub addr: Address,
    pub heartbeat: i64,
}

impl FrameEntry {
    pub fn new(addr: Address, heartbeat: i64) -> Self {
        Self { addr, heartbeat }
    }

    fn encode_into(&self, out: &mut BytesMut) {
        out.put_u32(self.addr.id);
        out.put_u16(self.addr.port);
        out.put_i64(self.heartbeat);
        out.put_u8(SEPARATOR);
    }

    fn decode_from(buf: &mut impl Buf) -> Self {
        let id = buf.get_u32();
        let port = buf.get_u16();
        let heartbeat = buf.get_i64();
        buf.advance(1); // separator
        Self {
            addr: Address::new(id, port),
            heartbeat,
        }
    }
}

/// Encode a slice of entries into their fixed-width wire form.
pub fn encode_entries(entries: &[FrameEntry]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(entries.len() * FRAME_SIZE);
    for e in entries {
        e.encode_into(&mut out);
    }
    out.to_vec()
}

/// Decode a buffer of fixed-width entries. Rejects a length that isn't a
/// multiple of [`FRAME_SIZE`] rather than silently truncating.
pub fn decode_entries(buf: &[u8]) -> Result<Vec<FrameEntry>> {
    if buf.len() % FRAME_SIZE != 0 {
        return Err(ClusterError::InvalidMessage(format!(
            "entry buffer length {} is not a multiple of frame size {}",
            buf.len(),
            FRAME_SIZE
        )));
    }
    let mut cursor = BytesMut::from(buf);
    let count = buf.len() / FRAME_SIZE;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(FrameEntry::decode_from(&mut cursor));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_entry() {
        let entries = vec![FrameEntry::new(Address::new(3, 80), 42)];
        let bytes = encode_entries(&entries);
        assert_eq!(bytes.len(), FRAME_SIZE);
        let decoded = decode_entries(&bytes).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn round_trip_many_entries() {
        let entries: Vec<_> = (0..10)
            .map(|i| FrameEntry::new(Address::new(i, 0), i as i64 * 7))
            .collect();
        let bytes = encode_entries(&entries);
        assert_eq!(decode_entries(&bytes).unwrap(), entries);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let entries = vec![FrameEntry::new(Address::new(1, 1), 1)];
        let mut bytes = encode_entries(&entries);
        bytes.pop();
        assert!(decode_entries(&bytes).is_err());
    }

    #[test]
    fn empty_buffer_decodes_to_empty_vec() {
        assert_eq!(decode_entries(&[]).unwrap(), Vec::new());
    }
}
