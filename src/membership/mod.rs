// Layer 1 — Membership / Failure Detection
//
// Gossip-style heartbeat protocol maintaining an eventually-consistent view
// of the live cluster at every node (spec §4.1). Grounded on
// `original_source/mp1/MP1Node.cpp` (`nodeLoopOps`, `updateMemberList`,
// `handleRecvJoinReq`/`handleRecvJoinRep`) and on the member-state-merge
// pattern in `rusty_db::networking::autodiscovery::gossip::GossipDiscovery`.

use crate::audit::AuditSink;
use crate::common::Address;
use crate::gossip;
use crate::network::NetworkPort;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;

/// A peer observation: the heartbeat last *observed* for a member and the
/// local time at which it was last refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberListEntry {
    pub addr: Address,
    pub heartbeat: i64,
    pub local_timestamp: i64,
}

/// The member list: at most one entry per address, enforced structurally by
/// keying a map on [`Address`].
#[derive(Debug, Default, Clone)]
pub struct MemberList {
    entries: HashMap<Address, MemberListEntry>,
}

impl MemberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &Address) -> Option<&MemberListEntry> {
        self.entries.get(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberListEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries.keys().copied().collect()
    }

    fn insert(&mut self, entry: MemberListEntry) {
        self.entries.insert(entry.addr, entry);
    }

    fn remove(&mut self, addr: &Address) -> Option<MemberListEntry> {
        self.entries.remove(addr)
    }
}

/// Join-protocol state machine (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    WaitJoinRep,
    InGroup,
    Dead,
}

/// Layer 1 wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipMessage {
    JoinReq { sender: Address, heartbeat: i64, timestamp: i64 },
    JoinRep { sender: Address, heartbeat: i64, timestamp: i64 },
    Gossip { sender: Address, timestamp: i64, entries: Vec<(Address, i64)>, excluded: Vec<Address> },
}

/// Owns the member list, heartbeat counter, and join state for one node.
pub struct MembershipEngine {
    self_addr: Address,
    heartbeat: i64,
    state: MembershipState,
    members: MemberList,
    rng: StdRng,
}

impl MembershipEngine {
    /// `seed` should be derived once per node (e.g. from its address) so
    /// gossip sampling is deterministic per-run without reseeding the RNG
    /// on every call — Design Note: a fresh `srand` per gossip round is a
    /// bug in the original, not a pattern to imitate.
    pub fn new(self_addr: Address, seed: u64) -> Self {
        Self {
            self_addr,
            heartbeat: 0,
            state: MembershipState::Dead,
            members: MemberList::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> MembershipState {
        self.state
    }

    pub fn is_in_group(&self) -> bool {
        self.state == MembershipState::InGroup
    }

    /// Current live members as Layer 2 sees them — every entry still in
    /// the list, regardless of `T_FAIL` suspicion (only `T_REMOVE`
    /// eviction removes an entry; see SPEC_FULL Open Question #2).
    pub fn snapshot(&self) -> Vec<Address> {
        let mut addrs = self.members.addresses();
        if self.is_in_group() {
            addrs.push(self.self_addr);
        }
        addrs
    }

    /// Self-elect as introducer if `join_addr` is our own address,
    /// otherwise send a JOINREQ.
    pub fn start(&mut self, join_addr: Address, now: i64, net: &dyn NetworkPort) {
        if join_addr == self.self_addr {
            self.state = MembershipState::InGroup;
        } else {
            self.state = MembershipState::WaitJoinRep;
            let msg = MembershipMessage::JoinReq {
                sender: self.self_addr,
                heartbeat: self.heartbeat,
                timestamp: now,
            };
            send(net, self.self_addr, join_addr, &msg);
        }
    }

    /// One protocol round: advance heartbeat, refresh own entry, expire
    /// stale members. Gossip emission is a separate step ([`Self::emit_gossip`])
    /// so callers can interleave ring recompute/stabilization between
    /// expiry and dissemination, per spec §5's tick ordering.
    pub fn tick(&mut self, now: i64, params: &crate::params::Params, audit: &dyn AuditSink) {
        self.heartbeat += 1;

        let stale: Vec<Address> = self
            .members
            .iter()
            .filter(|e| now - e.local_timestamp > params.t_remove)
            .map(|e| e.addr)
            .collect();
        for addr in stale {
            self.members.remove(&addr);
            audit.node_remove(self.self_addr, addr);
        }
    }

    /// Emit one round of gossip to a sampled subset of known members,
    /// excluding self. The final step of a node's tick (spec §5), run
    /// only after ring recompute and stabilization have settled so that
    /// disseminated membership reflects this round's expirations.
    pub fn emit_gossip(&mut self, now: i64, params: &crate::params::Params, net: &dyn NetworkPort) {
        if !self.is_in_group() {
            return;
        }
        let mut exclude = HashSet::new();
        exclude.insert(self.self_addr);
        self.gossip(exclude, now, params, net);
    }

    /// Consume the engine at node shutdown.
    ///
    /// `net`/`audit`/`params` are borrows the engine never owns, so there
    /// is nothing for this method to release beyond `self` itself — the
    /// point is the ordering guarantee, not cleanup work. Taking `self`
    /// by value means the member list and RNG state are dropped only
    /// after every other field access the caller could have made is
    /// already behind them, so no partially-torn-down engine is ever
    /// observable (Design Note #3). `MembershipEngine` derives no `Drop`
    /// impl of its own, so this drop order is exactly field declaration
    /// order.
    pub fn teardown(self) {}

    /// Accept a framed inbound Layer 1 message.
    pub fn deliver(&mut self, msg: MembershipMessage, now: i64, params: &crate::params::Params, net: &dyn NetworkPort, audit: &dyn AuditSink) {
        match msg {
            MembershipMessage::JoinReq { sender, heartbeat, timestamp } => {
                let rep = MembershipMessage::JoinRep {
                    sender: self.self_addr,
                    heartbeat: self.heartbeat,
                    timestamp: now,
                };
                send(net, self.self_addr, sender, &rep);
                self.merge(sender, heartbeat, timestamp.max(now), params.t_remove, audit);
            }
            MembershipMessage::JoinRep { sender, heartbeat, timestamp } => {
                self.state = MembershipState::InGroup;
                self.merge(sender, heartbeat, timestamp.max(now), params.t_remove, audit);
            }
            MembershipMessage::Gossip { sender, timestamp, entries, excluded } => {
                for (addr, hb) in &entries {
                    if *addr == self.self_addr {
                        continue;
                    }
                    self.merge(*addr, *hb, now, params.t_remove, audit);
                }

                let mut exclude: HashSet<Address> = HashSet::new();
                exclude.insert(self.self_addr);
                exclude.insert(sender);
                exclude.extend(excluded);

                self.gossip(exclude, timestamp, params, net);
            }
        }
    }

    /// Merge rule (spec §4.1): update an existing entry only on a strictly
    /// higher heartbeat; insert a new one only if the remote heartbeat is
    /// fresh enough (`my_heartbeat - t_remove < hb_remote`) not to
    /// resurrect a long-departed member via in-flight gossip.
    fn merge(&mut self, addr: Address, remote_heartbeat: i64, now: i64, t_remove: i64, audit: &dyn AuditSink) {
        if addr == self.self_addr {
            return;
        }
        if let Some(existing) = self.members.get(&addr) {
            if remote_heartbeat > existing.heartbeat {
                self.members.insert(MemberListEntry {
                    addr,
                    heartbeat: remote_heartbeat,
                    local_timestamp: now,
                });
            }
            return;
        }

        if self.heartbeat - t_remove < remote_heartbeat {
            self.members.insert(MemberListEntry {
                addr,
                heartbeat: remote_heartbeat,
                local_timestamp: now,
            });
            audit.node_add(self.self_addr, addr);
        }
    }

    /// Gossip dissemination: sample `gossip_fanout()` members without
    /// replacement, excluding the given set, and send each the full
    /// member list plus the union exclusion set (spec §4.1).
    fn gossip(&mut self, exclude: HashSet<Address>, timestamp: i64, params: &crate::params::Params, net: &dyn NetworkPort) {
        let mut candidates: Vec<Address> = self
            .members
            .addresses()
            .into_iter()
            .filter(|a| !exclude.contains(a))
            .collect();
        candidates.shuffle(&mut self.rng);
        let fanout = params.gossip_fanout();
        let targets: Vec<Address> = candidates.into_iter().take(fanout).collect();

        if targets.is_empty() {
            return;
        }

        let mut sent_exclusion: Vec<Address> = exclude.into_iter().collect();
        sent_exclusion.extend(targets.iter().copied());

        let entries: Vec<(Address, i64)> = self
            .members
            .iter()
            .map(|e| (e.addr, e.heartbeat))
            .chain(std::iter::once((self.self_addr, self.heartbeat)))
            .collect();

        for target in targets {
            let msg = MembershipMessage::Gossip {
                sender: self.self_addr,
                timestamp,
                entries: entries.clone(),
                excluded: sent_exclusion.clone(),
            };
            send(net, self.self_addr, target, &msg);
        }
    }
}

fn send(net: &dyn NetworkPort, from: Address, to: Address, msg: &MembershipMessage) {
    net.send(from, to, gossip::encode_membership_message(msg));
}
