//! In-memory directory of currently-connected switches.
//!
//! Keyed by source address; the entry at the configured sentinel address
//! is the master. Pure state, no I/O, not internally synchronized; the
//! controller serializes all access.

use std::net::IpAddr;

use indexmap::IndexMap;
use tracing::debug;

use crate::types::{Switch, SwitchId};

/// Directory of connected switches, insertion-ordered by registration.
#[derive(Debug, Clone)]
pub struct SwitchRegistry {
    master_address: IpAddr,
    switches: IndexMap<IpAddr, Switch>,
}

impl SwitchRegistry {
    /// Creates an empty registry with the given master sentinel address.
    pub fn new(master_address: IpAddr) -> Self {
        Self {
            master_address,
            switches: IndexMap::new(),
        }
    }

    /// The sentinel address that identifies the master switch.
    pub fn master_address(&self) -> IpAddr {
        self.master_address
    }

    /// Inserts or replaces the entry for `address`.
    ///
    /// A duplicate address overwrites in place, so at most one switch is
    /// registered per address and member iteration order stays stable
    /// across reconnects. Returns the registered switch.
    pub fn register(&mut self, address: IpAddr, id: SwitchId) -> Switch {
        let switch = Switch::new(id, address);
        if let Some(previous) = self.switches.insert(address, switch) {
            if previous.id != id {
                debug!(
                    address = %address,
                    old_id = %previous.id,
                    new_id = %id,
                    "Switch replaced at address"
                );
            }
        }
        switch
    }

    /// Deletes the entry for `address` if present.
    ///
    /// A no-op for unknown addresses: disconnect notifications may be
    /// duplicated or arrive for switches that never completed setup.
    pub fn remove(&mut self, address: IpAddr) -> Option<Switch> {
        // shift_remove keeps the remaining entries in registration order.
        self.switches.shift_remove(&address)
    }

    /// Returns the switch registered at `address`.
    pub fn get(&self, address: IpAddr) -> Option<&Switch> {
        self.switches.get(&address)
    }

    /// Returns the master switch, if one is registered.
    pub fn master(&self) -> Option<&Switch> {
        self.switches.get(&self.master_address)
    }

    /// Returns all registered members (every switch except the master),
    /// in registration order.
    pub fn members(&self) -> impl Iterator<Item = &Switch> {
        let master_address = self.master_address;
        self.switches
            .values()
            .filter(move |s| s.address != master_address)
    }

    /// Snapshot of the members for dispatch to a reconciliation task.
    pub fn member_snapshot(&self) -> Vec<Switch> {
        self.members().copied().collect()
    }

    /// Number of registered switches, master included.
    pub fn len(&self) -> usize {
        self.switches.len()
    }

    /// Returns true if no switch is registered.
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Returns true if a switch is registered at `address`.
    pub fn contains(&self, address: IpAddr) -> bool {
        self.switches.contains_key(&address)
    }
}
