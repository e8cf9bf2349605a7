// Wire tag dispatch shared by membership gossip and the store engine's own
// message sends. Pulled out of `node` so that `store`/`stabilization` can
// build a fully tagged frame for an internal send without `node` and
// `store` depending on each other.

use crate::common::{ClusterError, Result};
use crate::gossip;
use crate::membership::MembershipMessage;
use crate::store::{self, StoreMessage};

const TAG_MEMBERSHIP: u8 = 0;
const TAG_STORE: u8 = 1;

/// Everything a node can receive, tagged at the wire boundary the way the
/// original's `checkMessages` dispatches on a single inbound queue.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Membership(MembershipMessage),
    Store(StoreMessage),
}

pub fn encode_wire_message(msg: &WireMessage) -> Vec<u8> {
    match msg {
        WireMessage::Membership(m) => {
            let mut out = vec![TAG_MEMBERSHIP];
            out.extend_from_slice(&gossip::encode_membership_message(m));
            out
        }
        WireMessage::Store(m) => {
            let mut out = vec![TAG_STORE];
            out.extend_from_slice(&store::encode_store_message(m));
            out
        }
    }
}

pub fn decode_wire_message(buf: &[u8]) -> Result<WireMessage> {
    let (&tag, rest) = buf
        .split_first()
        .ok_or_else(|| ClusterError::InvalidMessage("empty wire message".into()))?;
    match tag {
        TAG_MEMBERSHIP => Ok(WireMessage::Membership(gossip::decode_membership_message(rest)?)),
        TAG_STORE => Ok(WireMessage::Store(store::decode_store_message(rest)?)),
        other => Err(ClusterError::InvalidMessage(format!("unknown wire tag {other}"))),
    }
}

/// Convenience for code that only ever sends the store half of the wire
/// protocol (the store engine's own replies and stabilization's internal
/// re-replication messages).
pub fn encode_store_wire_message(msg: &StoreMessage) -> Vec<u8> {
    encode_wire_message(&WireMessage::Store(msg.clone()))
}
