// Layer 2 — Store Engine: coordinator-side transactions and quorum rules,
// plus the replica-side message dispatch table.
//
// Grounded on `original_source/mp2/MP2Node.cpp` (`clientCreate`/
// `clientRead`/..., `checkMessages`'s quorum counting, and the replica
// `dispatch` functions `createKeyValue`/`readKey`/...), restructured as a
// typed match over `StoreMessage` the way
// `rusty_db::networking::protocol::codec` dispatches on a decoded frame.

use super::entry::Entry;
use super::table::HashTable;
use crate::audit::AuditSink;
use crate::common::{Address, ReplicaRole};
use crate::network::NetworkPort;
use crate::params::Params;
use crate::ring::Ring;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum StoreOp {
    Create,
    Read,
    Update,
    Delete,
}

/// Layer 2 wire messages. READREPLY and REPLY are distinct variants rather
/// than one struct with an unused field, per Design Note #4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum StoreMessage {
    Request {
        /// `None` marks an internal (stabilization) message: no reply, no
        /// audit log (spec §4.5) — this crate's typed stand-in for the
        /// original's `trans_id = -1` sentinel.
        trans_id: Option<u32>,
        origin: Address,
        op: StoreOp,
        key: String,
        value: Option<String>,
        role: ReplicaRole,
    },
    Reply {
        trans_id: u32,
        role: ReplicaRole,
        success: bool,
    },
    ReadReply {
        trans_id: u32,
        role: ReplicaRole,
        value: Option<String>,
    },
}

/// Wire encoding for the Layer 2 half of a node's inbound queue. Matches
/// the teacher's `bincode::encode_to_vec(msg, bincode::config::standard())`
/// call shape rather than the serde bridge.
pub fn encode_store_message(msg: &StoreMessage) -> Vec<u8> {
    bincode::encode_to_vec(msg, bincode::config::standard()).expect("StoreMessage always encodes")
}

pub fn decode_store_message(buf: &[u8]) -> crate::common::Result<StoreMessage> {
    let (msg, _) = bincode::decode_from_slice(buf, bincode::config::standard())
        .map_err(|e| crate::common::ClusterError::Serialization(e.to_string()))?;
    Ok(msg)
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: u32,
    pub origin: Address,
    pub op: StoreOp,
    pub key: String,
    pub value: Option<String>,
    pub started_at: i64,
    pub replies: Vec<StoreMessage>,
}

/// Owns the key-value table, in-flight coordinator transactions, and the
/// two replica-role address pairs stabilization keeps current.
pub struct StoreEngine {
    table: Box<dyn HashTable>,
    transactions: HashMap<u32, Transaction>,
    next_trans_id: u32,
    /// The two nodes that hold replicas of keys this node is PRIMARY for.
    pub has_my_replicas: Option<[Address; 2]>,
    /// The two nodes whose replicas this node holds (its ring predecessors).
    pub have_replicas_of: Option<[Address; 2]>,
    pub last_ring: Option<Ring>,
}

impl StoreEngine {
    pub fn new(table: Box<dyn HashTable>) -> Self {
        Self {
            table,
            transactions: HashMap::new(),
            next_trans_id: 0,
            has_my_replicas: None,
            have_replicas_of: None,
            last_ring: None,
        }
    }

    pub fn table(&self) -> &dyn HashTable {
        self.table.as_ref()
    }

    pub fn table_mut(&mut self) -> &mut dyn HashTable {
        self.table.as_mut()
    }

    fn alloc_trans_id(&mut self) -> u32 {
        let id = self.next_trans_id;
        self.next_trans_id += 1;
        id
    }

    fn client_request(&mut self, self_addr: Address, op: StoreOp, key: String, value: Option<String>, now: i64, ring: &Ring, net: &dyn NetworkPort) -> u32 {
        let id = self.alloc_trans_id();

        match ring.find_replicas_checked(&key) {
            Ok(replicas) => {
                for (offset, node) in replicas.iter().enumerate() {
                    let role = ReplicaRole::from_offset(offset).expect("replica index is always 0..=2");
                    let req = StoreMessage::Request {
                        trans_id: Some(id),
                        origin: self_addr,
                        op,
                        key: key.clone(),
                        value: value.clone(),
                        role,
                    };
                    net.send(self_addr, node.addr, crate::wire::encode_store_wire_message(&req));
                }
            }
            Err(err) => {
                // Ring too small: the transaction is still registered with
                // zero sent replicas so it times out and is logged as a
                // failure (spec §7, "Ring too small (<3)").
                tracing::debug!(at = %self_addr, %err, trans_id = id, "no replicas reachable for request");
            }
        }

        self.transactions.insert(
            id,
            Transaction { id, origin: self_addr, op, key, value, started_at: now, replies: Vec::new() },
        );
        id
    }

    pub fn client_create(&mut self, self_addr: Address, key: String, value: String, now: i64, ring: &Ring, net: &dyn NetworkPort) -> u32 {
        self.client_request(self_addr, StoreOp::Create, key, Some(value), now, ring, net)
    }

    pub fn client_read(&mut self, self_addr: Address, key: String, now: i64, ring: &Ring, net: &dyn NetworkPort) -> u32 {
        self.client_request(self_addr, StoreOp::Read, key, None, now, ring, net)
    }

    pub fn client_update(&mut self, self_addr: Address, key: String, value: String, now: i64, ring: &Ring, net: &dyn NetworkPort) -> u32 {
        self.client_request(self_addr, StoreOp::Update, key, Some(value), now, ring, net)
    }

    pub fn client_delete(&mut self, self_addr: Address, key: String, now: i64, ring: &Ring, net: &dyn NetworkPort) -> u32 {
        self.client_request(self_addr, StoreOp::Delete, key, None, now, ring, net)
    }

    /// Accept an inbound REPLY/READREPLY, apply the quorum rules of
    /// spec §4.4, and settle + log the transaction once decided.
    pub fn receive_reply(&mut self, msg: StoreMessage, self_addr: Address, audit: &dyn AuditSink) {
        let trans_id = match &msg {
            StoreMessage::Reply { trans_id, .. } => *trans_id,
            StoreMessage::ReadReply { trans_id, .. } => *trans_id,
            StoreMessage::Request { .. } => return,
        };

        let Some(txn) = self.transactions.get_mut(&trans_id) else {
            return; // already settled; a straggler reply is dropped
        };
        txn.replies.push(msg);

        if txn.replies.len() < 2 {
            return;
        }

        let verdict = if txn.op == StoreOp::Read {
            evaluate_read(&txn.replies)
        } else {
            evaluate_write(&txn.replies)
        };

        let Some(outcome) = verdict else {
            return; // still waiting for a tie-breaking third reply
        };

        let txn = self.transactions.remove(&trans_id).expect("just matched above");
        let op_name = match txn.op {
            StoreOp::Create => "create",
            StoreOp::Read => "read",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
        };
        // For READ, log the value the quorum agreed on; for writes, log
        // the value the client asked to write (the quorum outcome is
        // already carried by `success`).
        let (success, value) = match (txn.op, outcome) {
            (StoreOp::Read, Verdict::Success(v)) => (true, v),
            (StoreOp::Read, Verdict::Fail) => (false, None),
            (_, Verdict::Success(_)) => (true, txn.value.clone()),
            (_, Verdict::Fail) => (false, txn.value.clone()),
        };
        log_settlement(audit, op_name, self_addr, &txn.key, value.as_deref(), success);
    }

    /// Sweep transactions past `T_TXN` and settle them FAIL (spec §4.4).
    pub fn tick_timeouts(&mut self, now: i64, params: &Params, self_addr: Address, audit: &dyn AuditSink) {
        let expired: Vec<u32> = self
            .transactions
            .values()
            .filter(|t| now - t.started_at > params.t_txn)
            .map(|t| t.id)
            .collect();
        for id in expired {
            let txn = self.transactions.remove(&id).expect("id taken from this map");
            let op_name = match txn.op {
                StoreOp::Create => "create",
                StoreOp::Read => "read",
                StoreOp::Update => "update",
                StoreOp::Delete => "delete",
            };
            let err = crate::common::ClusterError::Timeout(format!("transaction {id} ({op_name} {}) exceeded t_txn", txn.key));
            tracing::debug!(at = %self_addr, %err, "settling transaction FAIL on timeout");
            log_settlement(audit, op_name, self_addr, &txn.key, None, false);
        }
    }

    /// Replica-side handling of an inbound Request (spec §4.5 table).
    /// Internal messages (`trans_id: None`) produce no reply and no log.
    pub fn dispatch(&mut self, self_addr: Address, msg: StoreMessage, now: i64, audit: &dyn AuditSink, net: &dyn NetworkPort) {
        let StoreMessage::Request { trans_id, origin, op, key, value, role } = msg else {
            return;
        };
        let internal = trans_id.is_none();

        let result = match op {
            StoreOp::Create => {
                let value = value.clone().unwrap_or_default();
                self.table.create(&key, Entry::new(value, now, role)).map(|_| None)
            }
            StoreOp::Update => {
                let value = value.clone().unwrap_or_default();
                self.table.update(&key, Entry::new(value, now, role)).map(|_| None)
            }
            StoreOp::Delete => self.table.delete(&key).map(|_| None),
            StoreOp::Read => self.table.read(&key).map(|e| Some(e.value)),
        };

        let (success, read_value) = match &result {
            Ok(v) => (true, v.clone()),
            Err(_) => (false, None),
        };

        if let Some(trans_id) = trans_id {
            let reply = if op == StoreOp::Read {
                StoreMessage::ReadReply { trans_id, role, value: if success { read_value } else { None } }
            } else {
                StoreMessage::Reply { trans_id, role, success }
            };
            net.send(self_addr, origin, crate::wire::encode_store_wire_message(&reply));
        }

        if !internal {
            let op_name = match op {
                StoreOp::Create => "create",
                StoreOp::Read => "read",
                StoreOp::Update => "update",
                StoreOp::Delete => "delete",
            };
            log_replica_result(audit, op_name, self_addr, &key, success);
        }
    }
}

enum Verdict {
    Success(Option<String>),
    Fail,
}

fn evaluate_write(replies: &[StoreMessage]) -> Option<Verdict> {
    let successes = replies
        .iter()
        .filter(|m| matches!(m, StoreMessage::Reply { success: true, .. }))
        .count();
    if successes >= 2 {
        return Some(Verdict::Success(None));
    }
    if replies.len() >= 3 {
        return Some(Verdict::Fail);
    }
    None
}

fn evaluate_read(replies: &[StoreMessage]) -> Option<Verdict> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for m in replies {
        if let StoreMessage::ReadReply { value: Some(v), .. } = m {
            *counts.entry(v.as_str()).or_insert(0) += 1;
        }
    }
    if let Some((value, _)) = counts.iter().find(|(_, count)| **count >= 2) {
        return Some(Verdict::Success(Some((*value).to_string())));
    }
    if replies.len() >= 3 {
        return Some(Verdict::Fail);
    }
    None
}

fn log_settlement(audit: &dyn AuditSink, op: &str, at: Address, key: &str, value: Option<&str>, success: bool) {
    match op {
        "create" => audit.create_result(true, None, at, key, value, success),
        "read" => audit.read_result(true, None, at, key, value, success),
        "update" => audit.update_result(true, None, at, key, value, success),
        "delete" => audit.delete_result(true, None, at, key, value, success),
        _ => unreachable!("exhaustive over StoreOp"),
    }
}

fn log_replica_result(audit: &dyn AuditSink, op: &str, at: Address, key: &str, success: bool) {
    match op {
        "create" => audit.create_result(false, None, at, key, None, success),
        "read" => audit.read_result(false, None, at, key, None, success),
        "update" => audit.update_result(false, None, at, key, None, success),
        "delete" => audit.delete_result(false, None, at, key, None, success),
        _ => unreachable!("exhaustive over StoreOp"),
    }
}
