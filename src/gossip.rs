// Wire framing for Layer 1 messages (spec §4.2).
//
// GOSSIP payload is a packed byte sequence: a header (message type, sender
// address, timestamp, `data_size`, `sent_size`) followed by `data_size`
// bytes of member entries and `sent_size` bytes of exclusion entries, each
// in the fixed-width frame format from `common::frame`. JOINREQ/JOINREP
// carry only a sender address, heartbeat and timestamp, so they use a
// shorter fixed header with no trailing frames.
//
// Grounded on `original_source/mp1/MP1Node.cpp` (`marshall`/`unmarshall`,
// `MessageHdr`) and on `rusty_db::networking::protocol::codec::MessageCodec`'s
// header-then-payload shape.

use crate::common::frame::{decode_entries, encode_entries, FrameEntry};
use crate::common::{Address, ClusterError, Result, ADDR_LEN};
use crate::membership::MembershipMessage;

const TAG_JOINREQ: u8 = 0;
const TAG_JOINREP: u8 = 1;
const TAG_GOSSIP: u8 = 2;

fn put_addr(out: &mut Vec<u8>, addr: Address) {
    out.extend_from_slice(&addr.id.to_be_bytes());
    out.extend_from_slice(&addr.port.to_be_bytes());
}

fn get_addr(buf: &[u8]) -> Result<(Address, &[u8])> {
    if buf.len() < ADDR_LEN {
        return Err(ClusterError::InvalidMessage("truncated address".into()));
    }
    let id = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let port = u16::from_be_bytes(buf[4..6].try_into().unwrap());
    Ok((Address::new(id, port), &buf[ADDR_LEN..]))
}

fn get_i64(buf: &[u8]) -> Result<(i64, &[u8])> {
    if buf.len() < 8 {
        return Err(ClusterError::InvalidMessage("truncated integer".into()));
    }
    let v = i64::from_be_bytes(buf[0..8].try_into().unwrap());
    Ok((v, &buf[8..]))
}

fn get_u64(buf: &[u8]) -> Result<(u64, &[u8])> {
    if buf.len() < 8 {
        return Err(ClusterError::InvalidMessage("truncated length".into()));
    }
    let v = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    Ok((v, &buf[8..]))
}

/// Encode a Layer 1 message to its wire form.
pub fn encode_membership_message(msg: &MembershipMessage) -> Vec<u8> {
    let mut out = Vec::new();
    match msg {
        MembershipMessage::JoinReq { sender, heartbeat, timestamp } => {
            out.push(TAG_JOINREQ);
            put_addr(&mut out, *sender);
            out.extend_from_slice(&heartbeat.to_be_bytes());
            out.extend_from_slice(&timestamp.to_be_bytes());
        }
        MembershipMessage::JoinRep { sender, heartbeat, timestamp } => {
            out.push(TAG_JOINREP);
            put_addr(&mut out, *sender);
            out.extend_from_slice(&heartbeat.to_be_bytes());
            out.extend_from_slice(&timestamp.to_be_bytes());
        }
        MembershipMessage::Gossip { sender, timestamp, entries, excluded } => {
            let data: Vec<FrameEntry> = entries.iter().map(|(a, h)| FrameEntry::new(*a, *h)).collect();
            let sent: Vec<FrameEntry> = excluded.iter().map(|a| FrameEntry::new(*a, 0)).collect();
            let data_bytes = encode_entries(&data);
            let sent_bytes = encode_entries(&sent);

            out.push(TAG_GOSSIP);
            put_addr(&mut out, *sender);
            out.extend_from_slice(&timestamp.to_be_bytes());
            out.extend_from_slice(&(data_bytes.len() as u64).to_be_bytes());
            out.extend_from_slice(&(sent_bytes.len() as u64).to_be_bytes());
            out.extend_from_slice(&data_bytes);
            out.extend_from_slice(&sent_bytes);
            // Terminal separator retained for wire compatibility; not
            // semantic (spec §4.2).
            out.push(0);
        }
    }
    out
}

/// Decode a Layer 1 message, rejecting malformed frames rather than
/// panicking (spec §7: "malformed inbound message -> silently dropped").
pub fn decode_membership_message(buf: &[u8]) -> Result<MembershipMessage> {
    if buf.is_empty() {
        return Err(ClusterError::InvalidMessage("empty buffer".into()));
    }
    let tag = buf[0];
    let rest = &buf[1..];
    match tag {
        TAG_JOINREQ | TAG_JOINREP => {
            let (sender, rest) = get_addr(rest)?;
            let (heartbeat, rest) = get_i64(rest)?;
            let (timestamp, _rest) = get_i64(rest)?;
            Ok(if tag == TAG_JOINREQ {
                MembershipMessage::JoinReq { sender, heartbeat, timestamp }
            } else {
                MembershipMessage::JoinRep { sender, heartbeat, timestamp }
            })
        }
        TAG_GOSSIP => {
            let (sender, rest) = get_addr(rest)?;
            let (timestamp, rest) = get_i64(rest)?;
            let (data_size, rest) = get_u64(rest)?;
            let (sent_size, rest) = get_u64(rest)?;
            let data_size = data_size as usize;
            let sent_size = sent_size as usize;

            if rest.len() != data_size + sent_size + 1 {
                return Err(ClusterError::InvalidMessage(format!(
                    "gossip frame length mismatch: expected {}, got {}",
                    data_size + sent_size + 1,
                    rest.len()
                )));
            }

            let data = decode_entries(&rest[..data_size])?;
            let sent = decode_entries(&rest[data_size..data_size + sent_size])?;

            Ok(MembershipMessage::Gossip {
                sender,
                timestamp,
                entries: data.into_iter().map(|e| (e.addr, e.heartbeat)).collect(),
                excluded: sent.into_iter().map(|e| e.addr).collect(),
            })
        }
        other => Err(ClusterError::InvalidMessage(format!("unknown message tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joinreq_round_trips() {
        let msg = MembershipMessage::JoinReq { sender: Address::new(2, 0), heartbeat: 3, timestamp: 9 };
        let bytes = encode_membership_message(&msg);
        assert_eq!(decode_membership_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn gossip_round_trips_with_exclusions() {
        let msg = MembershipMessage::Gossip {
            sender: Address::new(1, 0),
            timestamp: 42,
            entries: vec![(Address::new(1, 0), 5), (Address::new(2, 0), 7)],
            excluded: vec![Address::new(1, 0), Address::new(3, 0)],
        };
        let bytes = encode_membership_message(&msg);
        assert_eq!(decode_membership_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn gossip_with_empty_lists_round_trips() {
        let msg = MembershipMessage::Gossip {
            sender: Address::new(1, 0),
            timestamp: 1,
            entries: vec![],
            excluded: vec![],
        };
        let bytes = encode_membership_message(&msg);
        assert_eq!(decode_membership_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn rejects_malformed_frame_length() {
        let msg = MembershipMessage::Gossip {
            sender: Address::new(1, 0),
            timestamp: 1,
            entries: vec![(Address::new(2, 0), 1)],
            excluded: vec![],
        };
        let mut bytes = encode_membership_message(&msg);
        bytes.pop();
        assert!(decode_membership_message(&bytes).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(decode_membership_message(&[255, 0, 0, 0, 0, 0, 0]).is_err());
    }
}
