// Layer 2 — Replicated Key-Value Store
//
// See `entry` (on-disk row shape), `table` (the opaque collaborator), and
// `engine` (coordinator transactions, quorum rules, replica dispatch).

pub mod engine;
pub mod entry;
pub mod table;

pub use engine::{decode_store_message, encode_store_message, StoreEngine, StoreMessage, StoreOp, Transaction};
pub use entry::Entry;
pub use table::{HashTable, InMemoryHashTable};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use crate::common::{Address, ReplicaRole};
    use crate::network::NetworkPort;
    use crate::params::Params;
    use crate::ring::Ring;
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

    #[derive(Default)]
    struct RecordingAudit {
        events: RefCell<Vec<(&'static str, bool, bool)>>, // (op, is_coordinator, success)
    }
    impl AuditSink for RecordingAudit {
        fn node_add(&self, _: Address, _: Address) {}
        fn node_remove(&self, _: Address, _: Address) {}
        fn create_result(&self, is_coordinator: bool, _: Option<u32>, _: Address, _: &str, _: Option<&str>, success: bool) {
            self.events.borrow_mut().push(("create", is_coordinator, success));
        }
        fn read_result(&self, is_coordinator: bool, _: Option<u32>, _: Address, _: &str, _: Option<&str>, success: bool) {
            self.events.borrow_mut().push(("read", is_coordinator, success));
        }
        fn update_result(&self, is_coordinator: bool, _: Option<u32>, _: Address, _: &str, _: Option<&str>, success: bool) {
            self.events.borrow_mut().push(("update", is_coordinator, success));
        }
        fn delete_result(&self, is_coordinator: bool, _: Option<u32>, _: Address, _: &str, _: Option<&str>, success: bool) {
            self.events.borrow_mut().push(("delete", is_coordinator, success));
        }
    }

    fn ring_of(n: u32) -> Ring {
        let members: Vec<Address> = (1..=n).map(|i| Address::new(i, 0)).collect();
        Ring::build(&members, 1024)
    }

    #[test]
    fn create_settles_success_on_two_positive_replies() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let ring = ring_of(5);
        let coordinator = Address::new(1, 0);

        let id = engine.client_create(coordinator, "k1".to_string(), "v1".to_string(), 0, &ring, &net);

        engine.receive_reply(StoreMessage::Reply { trans_id: id, role: ReplicaRole::Primary, success: true }, coordinator, &audit);
        assert!(audit.events.borrow().is_empty());
        engine.receive_reply(StoreMessage::Reply { trans_id: id, role: ReplicaRole::Secondary, success: true }, coordinator, &audit);

        let events = audit.events.borrow();
        assert_eq!(events.last(), Some(&("create", true, true)));
    }

    #[test]
    fn create_settles_fail_when_majority_fails() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let ring = ring_of(5);
        let coordinator = Address::new(1, 0);
        let id = engine.client_create(coordinator, "k1".to_string(), "v1".to_string(), 0, &ring, &net);

        engine.receive_reply(StoreMessage::Reply { trans_id: id, role: ReplicaRole::Primary, success: false }, coordinator, &audit);
        engine.receive_reply(StoreMessage::Reply { trans_id: id, role: ReplicaRole::Secondary, success: false }, coordinator, &audit);
        engine.receive_reply(StoreMessage::Reply { trans_id: id, role: ReplicaRole::Tertiary, success: true }, coordinator, &audit);

        assert_eq!(*audit.events.borrow().last().unwrap(), ("create", true, false));
    }

    #[test]
    fn read_waits_on_disagreement_then_settles_by_third() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let ring = ring_of(5);
        let coordinator = Address::new(1, 0);
        let id = engine.client_read(coordinator, "k1".to_string(), 0, &ring, &net);

        engine.receive_reply(StoreMessage::ReadReply { trans_id: id, role: ReplicaRole::Primary, value: Some("v1".to_string()) }, coordinator, &audit);
        engine.receive_reply(StoreMessage::ReadReply { trans_id: id, role: ReplicaRole::Secondary, value: Some("stale".to_string()) }, coordinator, &audit);
        assert!(audit.events.borrow().is_empty());

        engine.receive_reply(StoreMessage::ReadReply { trans_id: id, role: ReplicaRole::Tertiary, value: Some("v1".to_string()) }, coordinator, &audit);
        assert_eq!(*audit.events.borrow().last().unwrap(), ("read", true, true));
    }

    #[test]
    fn read_with_one_silent_replica_still_quorums() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let ring = ring_of(5);
        let coordinator = Address::new(1, 0);
        let id = engine.client_read(coordinator, "k1".to_string(), 0, &ring, &net);

        engine.receive_reply(StoreMessage::ReadReply { trans_id: id, role: ReplicaRole::Primary, value: Some("v1".to_string()) }, coordinator, &audit);
        engine.receive_reply(StoreMessage::ReadReply { trans_id: id, role: ReplicaRole::Secondary, value: Some("v1".to_string()) }, coordinator, &audit);

        assert_eq!(*audit.events.borrow().last().unwrap(), ("read", true, true));
    }

    #[test]
    fn timeout_settles_fail() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let ring = ring_of(5);
        let coordinator = Address::new(1, 0);
        engine.client_create(coordinator, "k1".to_string(), "v1".to_string(), 0, &ring, &net);

        let params = Params { t_txn: 3, ..Params::default() };
        engine.tick_timeouts(10, &params, coordinator, &audit);

        assert_eq!(*audit.events.borrow().last().unwrap(), ("create", true, false));
    }

    #[test]
    fn replica_dispatch_creates_and_replies() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let replica = Address::new(2, 0);
        let origin = Address::new(1, 0);

        let req = StoreMessage::Request {
            trans_id: Some(7),
            origin,
            op: StoreOp::Create,
            key: "k1".to_string(),
            value: Some("v1".to_string()),
            role: ReplicaRole::Primary,
        };
        engine.dispatch(replica, req, 0, &audit, &net);

        assert_eq!(*audit.events.borrow().last().unwrap(), ("create", false, true));
        assert_eq!(net.drain(origin).len(), 1);
    }

    #[test]
    fn internal_dispatch_produces_no_reply_and_no_log() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let replica = Address::new(2, 0);
        let origin = Address::new(1, 0);

        let req = StoreMessage::Request {
            trans_id: None,
            origin,
            op: StoreOp::Create,
            key: "k1".to_string(),
            value: Some("v1".to_string()),
            role: ReplicaRole::Secondary,
        };
        engine.dispatch(replica, req, 0, &audit, &net);

        assert!(audit.events.borrow().is_empty());
        assert!(net.drain(origin).is_empty());
    }

    #[test]
    fn ring_too_small_still_registers_a_transaction_that_times_out() {
        let mut engine = StoreEngine::new(Box::new(InMemoryHashTable::new()));
        let net = FakeNet::default();
        let audit = RecordingAudit::default();
        let ring = ring_of(2);
        let coordinator = Address::new(1, 0);
        engine.client_create(coordinator, "k1".to_string(), "v1".to_string(), 0, &ring, &net);

        let params = Params { t_txn: 1, ..Params::default() };
        engine.tick_timeouts(5, &params, coordinator, &audit);
        assert_eq!(*audit.events.borrow().last().unwrap(), ("create", true, false));
    }
}
