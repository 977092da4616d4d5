//! Per-switch port-control adapter over remote OVSDB.
//!
//! One [`PortControl`] implementor exists per device. The production
//! implementation, [`OvsdbClient`], drives `ovs-vsctl --db=tcp:...`
//! subprocesses with a per-call timeout; the channel is probed lazily on
//! first use and the probed state is cached for the client's lifetime.
//! [`ClientPool`] caches one client per switch id and rebuilds it when
//! the switch's observed address changes, which is what invalidates a
//! stale channel.
//!
//! All four operations are idempotent and surface failures as explicit
//! [`FabricError`] values; an absent port is `Ok(None)`, never an error.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use vxfabric_common::{shell, FabricConfig, FabricError, FabricResult};

use crate::commands;
use crate::types::{PortId, Switch, SwitchId};

/// Abstract port-control surface of one device.
#[async_trait]
pub trait PortControl: Send + Sync {
    /// Establishes (or confirms) the control channel. Idempotent:
    /// repeated calls with a still-valid channel do nothing.
    async fn connect(&self) -> FabricResult<()>;

    /// Returns the port id for `name`, or `None` if the device does not
    /// know the port. Errors only for channel failure.
    async fn get_port(&self, name: &str) -> FabricResult<Option<PortId>>;

    /// Creates the named VXLAN port toward `remote` if absent; returns
    /// the (existing or new) port id either way.
    async fn add_port(&self, name: &str, remote: IpAddr, key: &str) -> FabricResult<PortId>;

    /// Deletes the named port if present, returning the removed id;
    /// `None` if the port did not exist.
    async fn del_port(&self, name: &str) -> FabricResult<Option<PortId>>;
}

/// Shared handle to a device's port-control adapter.
pub type SharedPortControl = Arc<dyn PortControl>;

/// Parses the `ofport` column output.
///
/// OVSDB reports `[]` (empty set) while no port number is assigned and
/// `-1` for a port in error; both count as "not usable yet" and map to
/// `None`.
fn parse_ofport(output: &str) -> Option<PortId> {
    match output.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Some(PortId(n as u32)),
        _ => None,
    }
}

/// Returns true when a failed `get` means "no such row" rather than a
/// channel failure.
fn is_missing_row(err: &FabricError) -> bool {
    matches!(err, FabricError::CommandFailed { output, .. } if output.contains("no row"))
}

/// Production port-control client driving one device's OVSDB endpoint.
pub struct OvsdbClient {
    address: IpAddr,
    remote: String,
    bridge: String,
    timeout: Duration,
    /// True once the endpoint answered the probe. Guarded by an async
    /// mutex so one `Arc`-shared client can serve concurrent
    /// reconciliations against the same device.
    probed: tokio::sync::Mutex<bool>,
}

impl OvsdbClient {
    /// Creates a client for the device at `address`.
    pub fn new(address: IpAddr, config: &FabricConfig) -> Self {
        Self {
            address,
            remote: commands::ovsdb_remote(address, config.ovsdb_port),
            bridge: config.bridge.clone(),
            timeout: config.control_timeout(),
            probed: tokio::sync::Mutex::new(false),
        }
    }

    /// The OVSDB remote this client targets.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn exec(&self, cmd: &str) -> FabricResult<String> {
        shell::exec_bounded(cmd, self.timeout).await
    }
}

#[async_trait]
impl PortControl for OvsdbClient {
    async fn connect(&self) -> FabricResult<()> {
        let mut probed = self.probed.lock().await;
        if *probed {
            return Ok(());
        }

        info!(remote = %self.remote, "Connecting to OVSDB endpoint");
        let cmd = commands::build_probe_cmd(&self.remote);
        self.exec(&cmd)
            .await
            .map_err(|e| FabricError::connection(&self.remote, e.to_string()))?;

        *probed = true;
        Ok(())
    }

    async fn get_port(&self, name: &str) -> FabricResult<Option<PortId>> {
        self.connect().await?;

        let cmd = commands::build_get_ofport_cmd(&self.remote, name);
        match self.exec(&cmd).await {
            Ok(output) => Ok(parse_ofport(&output)),
            Err(e) if is_missing_row(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add_port(&self, name: &str, remote: IpAddr, key: &str) -> FabricResult<PortId> {
        if let Some(existing) = self.get_port(name).await? {
            debug!(port = name, id = %existing, "Port already exists");
            return Ok(existing);
        }

        let cmd =
            commands::build_add_vxlan_port_cmd(&self.remote, &self.bridge, name, remote, key);
        self.exec(&cmd).await?;

        match self.get_port(name).await? {
            Some(id) => Ok(id),
            None => Err(FabricError::protocol(
                &self.remote,
                format!("port {} created but no ofport assigned", name),
            )),
        }
    }

    async fn del_port(&self, name: &str) -> FabricResult<Option<PortId>> {
        let existing = match self.get_port(name).await? {
            Some(id) => id,
            None => return Ok(None),
        };

        let cmd = commands::build_del_port_cmd(&self.remote, &self.bridge, name);
        self.exec(&cmd).await?;
        Ok(Some(existing))
    }
}

/// Factory for per-switch port-control clients. Tests inject mocks here.
pub type ClientFactory = Box<dyn Fn(&Switch) -> SharedPortControl + Send + Sync>;

struct PoolEntry {
    address: IpAddr,
    client: SharedPortControl,
}

/// Process-wide cache of port-control clients, one per switch id.
///
/// A cached client is reused while the switch's observed address matches
/// the one it was built for; an address change invalidates the entry and
/// a fresh client (fresh channel) is built.
pub struct ClientPool {
    factory: ClientFactory,
    clients: Mutex<HashMap<SwitchId, PoolEntry>>,
}

impl ClientPool {
    /// Creates a pool with a custom client factory.
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a pool producing production OVSDB clients.
    pub fn ovsdb(config: Arc<FabricConfig>) -> Self {
        Self::new(Box::new(move |switch: &Switch| {
            Arc::new(OvsdbClient::new(switch.address, &config)) as SharedPortControl
        }))
    }

    /// Returns the cached client for `switch`, rebuilding it if the
    /// observed address changed since the client was created.
    pub fn client_for(&self, switch: &Switch) -> SharedPortControl {
        let mut clients = self.clients.lock().expect("client pool lock poisoned");

        if let Some(entry) = clients.get(&switch.id) {
            if entry.address == switch.address {
                return Arc::clone(&entry.client);
            }
            info!(
                switch = %switch.id,
                old = %entry.address,
                new = %switch.address,
                "Switch address changed, recreating control client"
            );
        }

        let client = (self.factory)(switch);
        clients.insert(
            switch.id,
            PoolEntry {
                address: switch.address,
                client: Arc::clone(&client),
            },
        );
        client
    }

    /// Drops the cached client for `id`. No-op if absent.
    pub fn invalidate(&self, id: SwitchId) -> bool {
        self.clients
            .lock()
            .expect("client pool lock poisoned")
            .remove(&id)
            .is_some()
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.lock().expect("client pool lock poisoned").len()
    }

    /// Returns true if no client is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_ofport() {
        assert_eq!(parse_ofport("5"), Some(PortId(5)));
        assert_eq!(parse_ofport("  7\n"), Some(PortId(7)));
        assert_eq!(parse_ofport("[]"), None);
        assert_eq!(parse_ofport("-1"), None);
        assert_eq!(parse_ofport(""), None);
    }

    #[test]
    fn test_is_missing_row() {
        let missing = FabricError::CommandFailed {
            command: "get Interface x ofport".to_string(),
            exit_code: 1,
            output: "ovs-vsctl: no row \"x\" in table Interface".to_string(),
        };
        assert!(is_missing_row(&missing));

        let channel = FabricError::CommandFailed {
            command: "get Interface x ofport".to_string(),
            exit_code: 1,
            output: "database connection failed".to_string(),
        };
        assert!(!is_missing_row(&channel));

        let timeout = FabricError::Timeout {
            command: "x".to_string(),
            secs: 5,
        };
        assert!(!is_missing_row(&timeout));
    }

    struct NullControl;

    #[async_trait]
    impl PortControl for NullControl {
        async fn connect(&self) -> FabricResult<()> {
            Ok(())
        }
        async fn get_port(&self, _name: &str) -> FabricResult<Option<PortId>> {
            Ok(None)
        }
        async fn add_port(&self, _name: &str, _remote: IpAddr, _key: &str) -> FabricResult<PortId> {
            Ok(PortId(1))
        }
        async fn del_port(&self, _name: &str) -> FabricResult<Option<PortId>> {
            Ok(None)
        }
    }

    fn counting_pool() -> (Arc<AtomicUsize>, ClientPool) {
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = Arc::clone(&built);
        let pool = ClientPool::new(Box::new(move |_switch| {
            built_clone.fetch_add(1, Ordering::SeqCst);
            Arc::new(NullControl) as SharedPortControl
        }));
        (built, pool)
    }

    #[test]
    fn test_pool_caches_by_id() {
        let (built, pool) = counting_pool();
        let sw = Switch::new(SwitchId(1), "10.0.0.2".parse().unwrap());

        pool.client_for(&sw);
        pool.client_for(&sw);
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_rebuilds_on_address_change() {
        let (built, pool) = counting_pool();
        let sw = Switch::new(SwitchId(1), "10.0.0.2".parse().unwrap());
        let moved = Switch::new(SwitchId(1), "10.0.0.9".parse().unwrap());

        pool.client_for(&sw);
        pool.client_for(&moved);
        pool.client_for(&moved);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_invalidate() {
        let (built, pool) = counting_pool();
        let sw = Switch::new(SwitchId(1), "10.0.0.2".parse().unwrap());

        pool.client_for(&sw);
        assert!(pool.invalidate(SwitchId(1)));
        assert!(!pool.invalidate(SwitchId(1)));
        assert!(pool.is_empty());

        pool.client_for(&sw);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ovsdb_client_remote() {
        let config = FabricConfig::new("10.1.10.169".parse().unwrap());
        let client = OvsdbClient::new("10.0.0.2".parse().unwrap(), &config);
        assert_eq!(client.remote(), "tcp:10.0.0.2:6640");
    }
}
