//! Switch and tunnel-endpoint type definitions.

use std::fmt;
use std::net::IpAddr;

/// Prefix for VXLAN tunnel port names.
pub const VXLAN_PORT_PREFIX: &str = "vxlan";

/// OpenFlow datapath identifier, stable per switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchId(pub u64);

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Datapath ids are conventionally printed as 16 hex digits.
        write!(f, "{:016x}", self.0)
    }
}

/// OpenFlow port number assigned by a device to a tunnel port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a switch in the hub-and-spoke mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchRole {
    /// The switch co-located with the controller; acts as the tunnel hub.
    Master,
    /// Any other switch; gets one tunnel pair to the master.
    Member,
}

impl SwitchRole {
    /// Returns true for the master role.
    pub fn is_master(&self) -> bool {
        matches!(self, SwitchRole::Master)
    }
}

/// A connected switch as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Stable device identifier.
    pub id: SwitchId,
    /// Source address observed on connection; also the OVSDB endpoint
    /// address.
    pub address: IpAddr,
}

impl Switch {
    /// Creates a switch record.
    pub fn new(id: SwitchId, address: IpAddr) -> Self {
        Self { id, address }
    }

    /// Derives the role from the configured master sentinel address.
    pub fn role(&self, master_address: IpAddr) -> SwitchRole {
        if self.address == master_address {
            SwitchRole::Master
        } else {
            SwitchRole::Member
        }
    }
}

/// Derives the deterministic VXLAN port name for a peer and key.
///
/// The same `(remote, key)` pair always yields the same name and distinct
/// peers never collide, which is what makes every port operation
/// idempotent and safe to run concurrently for different members against
/// the same master device.
pub fn vxlan_port_name(remote: &IpAddr, key: &str) -> String {
    format!("{}_{}_{}", VXLAN_PORT_PREFIX, remote, key)
}

/// One VXLAN port configured on one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelEndpoint {
    /// The switch hosting the port.
    pub on_switch: SwitchId,
    /// The peer address this port encapsulates traffic toward.
    pub remote_address: IpAddr,
    /// Tunnel segmentation key.
    pub key: String,
}

impl TunnelEndpoint {
    /// Creates an endpoint record.
    pub fn new(on_switch: SwitchId, remote_address: IpAddr, key: impl Into<String>) -> Self {
        Self {
            on_switch,
            remote_address,
            key: key.into(),
        }
    }

    /// Returns the deterministic port name for this endpoint.
    pub fn port_name(&self) -> String {
        vxlan_port_name(&self.remote_address, &self.key)
    }
}
