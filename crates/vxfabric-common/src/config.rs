//! Daemon configuration loading and validation.
//!
//! Configuration is read from a YAML file (default
//! `/etc/vxfabric/vxfabricd.yaml`). Every field except the controller's
//! own tunnel address has a deployment default.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::error::{FabricError, FabricResult};

fn default_master_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_ovsdb_port() -> u16 {
    6640
}

fn default_tunnel_key() -> String {
    "0".to_string()
}

fn default_bridge() -> String {
    "br-int".to_string()
}

fn default_control_timeout() -> u64 {
    5
}

fn default_event_queue_depth() -> usize {
    1024
}

/// Fabric controller configuration.
///
/// The master sentinel address distinguishes the switch co-located with
/// the controller (the tunnel hub) from member switches; the local tunnel
/// address is what member-side VXLAN endpoints encapsulate toward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FabricConfig {
    /// Source address that identifies the master switch.
    #[serde(default = "default_master_address")]
    pub master_address: IpAddr,

    /// This controller's tunnel-reachable address (member endpoints
    /// point here).
    pub local_tunnel_address: IpAddr,

    /// OVSDB control-channel port on every switch.
    #[serde(default = "default_ovsdb_port")]
    pub ovsdb_port: u16,

    /// Tunnel segmentation key. A single shared segment for now; kept as
    /// a field so per-tenant keys can be introduced without touching the
    /// reconciliation contract.
    #[serde(default = "default_tunnel_key")]
    pub tunnel_key: String,

    /// Integration bridge that VXLAN ports are attached to.
    #[serde(default = "default_bridge")]
    pub bridge: String,

    /// Per port-control call timeout in seconds.
    #[serde(default = "default_control_timeout")]
    pub control_timeout_secs: u64,

    /// Bound on the lifecycle event channel.
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

impl FabricConfig {
    /// Creates a configuration with deployment defaults for everything
    /// but the local tunnel address.
    pub fn new(local_tunnel_address: IpAddr) -> Self {
        Self {
            master_address: default_master_address(),
            local_tunnel_address,
            ovsdb_port: default_ovsdb_port(),
            tunnel_key: default_tunnel_key(),
            bridge: default_bridge(),
            control_timeout_secs: default_control_timeout(),
            event_queue_depth: default_event_queue_depth(),
        }
    }

    /// Loads and validates configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> FabricResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FabricError::invalid_config("config", format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            FabricError::invalid_config("config", format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field values.
    pub fn validate(&self) -> FabricResult<()> {
        if self.ovsdb_port == 0 {
            return Err(FabricError::invalid_config(
                "ovsdb_port",
                "must be nonzero",
            ));
        }
        if self.control_timeout_secs == 0 {
            return Err(FabricError::invalid_config(
                "control_timeout_secs",
                "must be nonzero",
            ));
        }
        if self.event_queue_depth == 0 {
            return Err(FabricError::invalid_config(
                "event_queue_depth",
                "must be nonzero",
            ));
        }
        if self.tunnel_key.is_empty() {
            return Err(FabricError::invalid_config("tunnel_key", "must not be empty"));
        }
        if self.bridge.is_empty() {
            return Err(FabricError::invalid_config("bridge", "must not be empty"));
        }
        Ok(())
    }

    /// Returns the per-call control timeout as a `Duration`.
    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }
}
