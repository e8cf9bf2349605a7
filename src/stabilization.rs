// Layer 2 — Stabilization protocol
//
// Repairs replica placement after the ring changes: every key a node holds
// as PRIMARY is re-homed onto the ring's current successors, with an
// internal CREATE to the new holder and an internal DELETE to the
// displaced one. Grounded on `original_source/mp2/MP2Node.cpp`'s
// `stabilizationProtocol`, restated as a free function over `StoreEngine`
// rather than a method so `Node::tick` can call it only when the ring
// actually changed (spec §4.6, P8).

use crate::common::{Address, ReplicaRole};
use crate::network::NetworkPort;
use crate::ring::Ring;
use crate::store::{StoreEngine, StoreMessage, StoreOp};

/// Re-replicate every PRIMARY key this node holds onto the ring's current
/// successors, then refresh `has_my_replicas`/`have_replicas_of` from the
/// new ring. Called only when `Node::tick` detects the ring changed.
pub fn run(store: &mut StoreEngine, ring: &Ring, self_addr: Address, net: &dyn NetworkPort) {
    let old_replicas = store.has_my_replicas;

    let primary_keys: Vec<(String, String)> = store
        .table()
        .iter()
        .into_iter()
        .filter(|(_, entry)| entry.role == ReplicaRole::Primary)
        .map(|(key, entry)| (key, entry.value))
        .collect();

    for (key, value) in primary_keys {
        let Some(new_replicas) = ring.find_replicas(&key) else {
            continue; // ring too small; leave current placement as-is
        };

        for offset in 1..=2usize {
            let new_holder = new_replicas[offset].addr;
            let old_holder = old_replicas.map(|r| r[offset - 1]);

            if old_holder == Some(new_holder) {
                continue;
            }

            let role = ReplicaRole::from_offset(offset).expect("offset is 1 or 2");
            send_internal(net, self_addr, new_holder, StoreOp::Create, key.clone(), Some(value.clone()), role);

            if let Some(old_holder) = old_holder {
                if old_holder != new_holder {
                    send_internal(net, self_addr, old_holder, StoreOp::Delete, key.clone(), None, role);
                }
            }
        }
    }

    if let Some((successors, predecessors)) = ring.successors_of(&self_addr) {
        store.has_my_replicas = Some([successors[0].addr, successors[1].addr]);
        store.have_replicas_of = Some([predecessors[0].addr, predecessors[1].addr]);
    } else {
        store.has_my_replicas = None;
        store.have_replicas_of = None;
    }
}

fn send_internal(net: &dyn NetworkPort, self_addr: Address, to: Address, op: StoreOp, key: String, value: Option<String>, role: ReplicaRole) {
    let msg = StoreMessage::Request { trans_id: None, origin: self_addr, op, key, value, role };
    net.send(self_addr, to, crate::wire::encode_store_wire_message(&msg));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Address;
    use crate::store::{Entry, InMemoryHashTable};
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeNet {
        queues: RefCell<HashMap<Address, Vec<Vec<u8>>>>,
    }
    impl NetworkPort for FakeNet {
        fn send(&self, _from: Address, to: Address, bytes: Vec<u8>) {
            self.queues.borrow_mut().entry(to).or_default().push(bytes);
        }
        fn drain(&self, addr: Address) -> Vec<Vec<u8>> {
            self.queues.borrow_mut().remove(&addr).unwrap_or_default()
        }
    }

    fn addr(id: u32) -> Address {
        Address::new(id, 0)
    }

    #[test]
    fn reassigns_replica_when_successor_changes() {
        let mut store = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        store.table_mut().create("k1", Entry::new("v1".to_string(), 0, ReplicaRole::Primary)).unwrap();
        store.has_my_replicas = Some([addr(2), addr(3)]);

        let net = FakeNet::default();
        let self_addr = addr(1);
        // Ring now places a different node as secondary successor of key's primary.
        let ring = Ring::build(&[addr(1), addr(4), addr(3), addr(5)], 1024);

        run(&mut store, &ring, self_addr, &net);

        let sent_to_old: Vec<Vec<u8>> = net.drain(addr(2));
        assert!(!sent_to_old.is_empty(), "old secondary should receive a delete");
    }

    #[test]
    fn unchanged_successors_send_nothing() {
        let mut store = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        store.table_mut().create("k1", Entry::new("v1".to_string(), 0, ReplicaRole::Primary)).unwrap();
        let self_addr = addr(1);
        let ring = Ring::build(&[addr(1), addr(2), addr(3)], 1024);
        let (successors, _) = ring.successors_of(&self_addr).unwrap();
        store.has_my_replicas = Some([successors[0].addr, successors[1].addr]);

        let net = FakeNet::default();
        run(&mut store, &ring, self_addr, &net);

        assert!(net.drain(successors[0].addr).is_empty());
        assert!(net.drain(successors[1].addr).is_empty());
    }

    #[test]
    fn ring_too_small_leaves_replica_pointers_cleared() {
        let mut store = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let self_addr = addr(1);
        let ring = Ring::build(&[addr(1), addr(2)], 1024);
        run(&mut store, &ring, self_addr, &net);
        assert!(store.has_my_replicas.is_none());
    }
}
