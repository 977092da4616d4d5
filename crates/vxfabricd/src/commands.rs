//! `ovs-vsctl` command builders for remote OVSDB port operations.
//!
//! Every builder targets one device's OVSDB endpoint via `--db=`; the
//! caller supplies the remote string built by [`ovsdb_remote`].

use std::net::IpAddr;

use vxfabric_common::shell::{shellquote, OVS_VSCTL_CMD};

/// Builds the OVSDB remote string for a switch address.
pub fn ovsdb_remote(address: IpAddr, port: u16) -> String {
    format!("tcp:{}:{}", address, port)
}

/// Build the channel probe command.
///
/// Listing bridges is the cheapest round trip that verifies the endpoint
/// speaks OVSDB.
pub fn build_probe_cmd(remote: &str) -> String {
    format!("{} --db={} list-br", OVS_VSCTL_CMD, shellquote(remote))
}

/// Build the port-number query command.
///
/// Fails with "no row" when the named interface does not exist; prints
/// the ofport column (or `[]` while unassigned) when it does.
pub fn build_get_ofport_cmd(remote: &str, port_name: &str) -> String {
    format!(
        "{} --db={} get Interface {} ofport",
        OVS_VSCTL_CMD,
        shellquote(remote),
        shellquote(port_name)
    )
}

/// Build the VXLAN port creation command.
///
/// `--may-exist` keeps the transaction idempotent if the name appears
/// between the caller's existence check and this call.
pub fn build_add_vxlan_port_cmd(
    remote: &str,
    bridge: &str,
    port_name: &str,
    remote_ip: IpAddr,
    key: &str,
) -> String {
    format!(
        "{} --db={} --may-exist add-port {} {} -- set Interface {} type=vxlan options:remote_ip={} options:key={}",
        OVS_VSCTL_CMD,
        shellquote(remote),
        shellquote(bridge),
        shellquote(port_name),
        shellquote(port_name),
        shellquote(&remote_ip.to_string()),
        shellquote(key)
    )
}

/// Build the port deletion command.
///
/// `--if-exists` makes removal of an already-absent port succeed.
pub fn build_del_port_cmd(remote: &str, bridge: &str, port_name: &str) -> String {
    format!(
        "{} --db={} --if-exists del-port {} {}",
        OVS_VSCTL_CMD,
        shellquote(remote),
        shellquote(bridge),
        shellquote(port_name)
    )
}
