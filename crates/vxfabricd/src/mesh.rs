//! Tunnel mesh reconciliation.
//!
//! `MeshOrch` converges device state toward the desired hub-and-spoke
//! tunnel set: while a master is registered, every member carries one
//! VXLAN port toward the controller's tunnel address and the master
//! carries one VXLAN port toward each member.
//!
//! Port existence is never cached here; the device is queried before
//! every mutation, so each pass is idempotent. A port-control failure is
//! recorded against the one switch pair it concerns and iteration
//! continues; one unreachable device never aborts a mesh-wide pass.
//! Convergence is re-attempted on the next lifecycle event touching the
//! switch.

use std::net::IpAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vxfabric_common::{FabricConfig, FabricError};

use crate::port_ctl::ClientPool;
use crate::types::{vxlan_port_name, Switch, SwitchId};

/// A port-control failure scoped to one switch.
#[derive(Debug, Clone)]
pub struct PairFailure {
    /// The switch whose device rejected or missed the operation.
    pub switch: SwitchId,
    /// That switch's address.
    pub address: IpAddr,
    /// Human-readable failure detail.
    pub detail: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Ports created during the pass.
    pub created: usize,
    /// Ports deleted during the pass.
    pub deleted: usize,
    /// Creation steps skipped because removal was already accepted.
    pub skipped: usize,
    /// Per-switch failures; the pass continued past each of them.
    pub failures: Vec<PairFailure>,
}

impl ReconcileReport {
    /// Returns true if the pass completed without failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.created += other.created;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }

    fn fail(&mut self, switch: &Switch, err: &FabricError) {
        warn!(
            switch = %switch.id,
            address = %switch.address,
            error = %err,
            "Port operation failed, continuing"
        );
        self.failures.push(PairFailure {
            switch: switch.id,
            address: switch.address,
            detail: err.to_string(),
        });
    }
}

/// The tunnel-mesh reconciliation engine.
pub struct MeshOrch {
    config: Arc<FabricConfig>,
    pool: Arc<ClientPool>,
}

impl MeshOrch {
    /// Creates a reconciler over the given client pool.
    pub fn new(config: Arc<FabricConfig>, pool: Arc<ClientPool>) -> Self {
        Self { config, pool }
    }

    fn port_name(&self, remote: &IpAddr) -> String {
        vxlan_port_name(remote, &self.config.tunnel_key)
    }

    /// Ensures one leg: a VXLAN port on `on` toward `remote`, created
    /// only if absent. No creation starts once `cancel` has fired;
    /// queries in flight are allowed to finish.
    async fn ensure_leg(
        &self,
        on: &Switch,
        remote: IpAddr,
        cancel: &CancellationToken,
        report: &mut ReconcileReport,
    ) {
        let name = self.port_name(&remote);
        let client = self.pool.client_for(on);

        match client.get_port(&name).await {
            Ok(Some(id)) => {
                debug!(switch = %on.id, port = %name, id = %id, "Tunnel port already present");
            }
            Ok(None) => {
                if cancel.is_cancelled() {
                    debug!(switch = %on.id, port = %name, "Removal accepted, skipping creation");
                    report.skipped += 1;
                    return;
                }
                match client
                    .add_port(&name, remote, &self.config.tunnel_key)
                    .await
                {
                    Ok(id) => {
                        info!(switch = %on.id, port = %name, id = %id, "Tunnel port created");
                        report.created += 1;
                    }
                    Err(e) => report.fail(on, &e),
                }
            }
            Err(e) => report.fail(on, &e),
        }
    }

    /// Removes one leg: the VXLAN port on `on` toward `remote`. Absent
    /// ports are a no-op.
    async fn remove_leg(&self, on: &Switch, remote: IpAddr, report: &mut ReconcileReport) {
        let name = self.port_name(&remote);
        let client = self.pool.client_for(on);

        match client.del_port(&name).await {
            Ok(Some(id)) => {
                info!(switch = %on.id, port = %name, id = %id, "Tunnel port removed");
                report.deleted += 1;
            }
            Ok(None) => {
                debug!(switch = %on.id, port = %name, "Tunnel port already absent");
            }
            Err(e) => report.fail(on, &e),
        }
    }

    /// Ensures the tunnel pair for one member against the master.
    ///
    /// The member-originated leg always goes first so a partially-applied
    /// pass leaves the member able to reach the hub even if the
    /// master-side step fails; a failed leg does not stop the other.
    pub async fn ensure_pair(
        &self,
        member: &Switch,
        master: &Switch,
        cancel: &CancellationToken,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.ensure_leg(member, self.config.local_tunnel_address, cancel, &mut report)
            .await;
        self.ensure_leg(master, member.address, cancel, &mut report)
            .await;
        report
    }

    /// Master came up: establish the pair for every registered member.
    ///
    /// A late-arriving master retroactively tunnels to every member that
    /// connected before it.
    pub async fn master_up(
        &self,
        members: &[Switch],
        master: &Switch,
        cancel: &CancellationToken,
    ) -> ReconcileReport {
        info!(
            master = %master.id,
            members = members.len(),
            "Master active, reconciling all members"
        );
        let mut report = ReconcileReport::default();
        for member in members {
            report.merge(self.ensure_pair(member, master, cancel).await);
        }
        report
    }

    /// Master went down: remove the master-side leg toward every
    /// remaining member.
    ///
    /// Member-side legs are left in place; they are stale until the
    /// member itself disconnects or a new master re-ensures them.
    pub async fn master_down(&self, members: &[Switch], master: &Switch) -> ReconcileReport {
        info!(
            master = %master.id,
            members = members.len(),
            "Master removed, tearing down master-side tunnel ports"
        );
        let mut report = ReconcileReport::default();
        for member in members {
            self.remove_leg(master, member.address, &mut report).await;
        }
        report
    }

    /// Member came up: establish its pair if a master is registered,
    /// otherwise defer without error; the pair is established when the
    /// master's own Up transition reconciles.
    pub async fn member_up(
        &self,
        member: &Switch,
        master: Option<&Switch>,
        cancel: &CancellationToken,
    ) -> ReconcileReport {
        match master {
            Some(master) => self.ensure_pair(member, master, cancel).await,
            None => {
                debug!(
                    member = %member.id,
                    address = %member.address,
                    "No master registered, deferring tunnel setup"
                );
                ReconcileReport::default()
            }
        }
    }

    /// Member went down: remove the master-side leg toward it, if a
    /// master is registered.
    pub async fn member_down(
        &self,
        member_address: IpAddr,
        master: Option<&Switch>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if let Some(master) = master {
            self.remove_leg(master, member_address, &mut report).await;
        } else {
            debug!(address = %member_address, "Member removed with no master registered");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port_ctl::{PortControl, SharedPortControl};
    use crate::types::PortId;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use vxfabric_common::FabricResult;

    /// In-memory device: a port table plus a switchable failure mode.
    struct FakeDevice {
        label: &'static str,
        ports: Mutex<HashMap<String, u32>>,
        next_port: AtomicU32,
        unreachable: AtomicBool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeDevice {
        fn new(label: &'static str, calls: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                label,
                ports: Mutex::new(HashMap::new()),
                next_port: AtomicU32::new(1),
                unreachable: AtomicBool::new(false),
                calls,
            })
        }

        fn port_names(&self) -> Vec<String> {
            let mut names: Vec<_> = self.ports.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }

        fn check_reachable(&self) -> FabricResult<()> {
            if self.unreachable.load(Ordering::SeqCst) {
                Err(FabricError::connection(
                    format!("tcp:{}:6640", self.label),
                    "connection refused",
                ))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PortControl for FakeDevice {
        async fn connect(&self) -> FabricResult<()> {
            self.check_reachable()
        }

        async fn get_port(&self, name: &str) -> FabricResult<Option<PortId>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("get:{}:{}", self.label, name));
            self.check_reachable()?;
            Ok(self.ports.lock().unwrap().get(name).copied().map(PortId))
        }

        async fn add_port(&self, name: &str, _remote: IpAddr, _key: &str) -> FabricResult<PortId> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("add:{}:{}", self.label, name));
            self.check_reachable()?;
            let mut ports = self.ports.lock().unwrap();
            if let Some(id) = ports.get(name) {
                return Ok(PortId(*id));
            }
            let id = self.next_port.fetch_add(1, Ordering::SeqCst);
            ports.insert(name.to_string(), id);
            Ok(PortId(id))
        }

        async fn del_port(&self, name: &str) -> FabricResult<Option<PortId>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("del:{}:{}", self.label, name));
            self.check_reachable()?;
            Ok(self.ports.lock().unwrap().remove(name).map(PortId))
        }
    }

    struct Fixture {
        orch: MeshOrch,
        member_dev: Arc<FakeDevice>,
        master_dev: Arc<FakeDevice>,
        calls: Arc<Mutex<Vec<String>>>,
        member: Switch,
        master: Switch,
    }

    fn fixture() -> Fixture {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let member_dev = FakeDevice::new("member", Arc::clone(&calls));
        let master_dev = FakeDevice::new("master", Arc::clone(&calls));

        let master: Switch = Switch::new(SwitchId(1), "127.0.0.1".parse().unwrap());
        let member: Switch = Switch::new(SwitchId(2), "10.0.0.2".parse().unwrap());

        let member_for_factory = Arc::clone(&member_dev);
        let master_for_factory = Arc::clone(&master_dev);
        let pool = ClientPool::new(Box::new(move |switch: &Switch| {
            if switch.id == SwitchId(1) {
                Arc::clone(&master_for_factory) as SharedPortControl
            } else {
                Arc::clone(&member_for_factory) as SharedPortControl
            }
        }));

        let config = Arc::new(FabricConfig::new("10.1.10.169".parse().unwrap()));
        let orch = MeshOrch::new(config, Arc::new(pool));

        Fixture {
            orch,
            member_dev,
            master_dev,
            calls,
            member,
            master,
        }
    }

    #[tokio::test]
    async fn test_ensure_pair_creates_both_legs() {
        let f = fixture();
        let report = f
            .orch
            .ensure_pair(&f.member, &f.master, &CancellationToken::new())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.created, 2);
        assert_eq!(f.member_dev.port_names(), vec!["vxlan_10.1.10.169_0"]);
        assert_eq!(f.master_dev.port_names(), vec!["vxlan_10.0.0.2_0"]);
    }

    #[tokio::test]
    async fn test_ensure_pair_member_leg_first() {
        let f = fixture();
        f.orch
            .ensure_pair(&f.member, &f.master, &CancellationToken::new())
            .await;

        let calls = f.calls.lock().unwrap();
        let first_master_op = calls.iter().position(|c| c.contains(":master:")).unwrap();
        let first_member_op = calls.iter().position(|c| c.contains(":member:")).unwrap();
        assert!(first_member_op < first_master_op);
    }

    #[tokio::test]
    async fn test_ensure_pair_is_idempotent() {
        let f = fixture();
        let token = CancellationToken::new();

        let first = f.orch.ensure_pair(&f.member, &f.master, &token).await;
        let second = f.orch.ensure_pair(&f.member, &f.master, &token).await;

        assert_eq!(first.created, 2);
        assert_eq!(second.created, 0);
        assert!(second.is_clean());
        assert_eq!(f.member_dev.port_names().len(), 1);
        assert_eq!(f.master_dev.port_names().len(), 1);
    }

    #[tokio::test]
    async fn test_member_up_defers_without_master() {
        let f = fixture();
        let report = f
            .orch
            .member_up(&f.member, None, &CancellationToken::new())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.created, 0);
        assert!(f.member_dev.port_names().is_empty());
    }

    #[tokio::test]
    async fn test_member_leg_failure_does_not_stop_master_leg() {
        let f = fixture();
        f.member_dev.unreachable.store(true, Ordering::SeqCst);

        let report = f
            .orch
            .ensure_pair(&f.member, &f.master, &CancellationToken::new())
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].switch, SwitchId(2));
        // Master leg still converged
        assert_eq!(f.master_dev.port_names(), vec!["vxlan_10.0.0.2_0"]);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_creation() {
        let f = fixture();
        let token = CancellationToken::new();
        token.cancel();

        let report = f.orch.ensure_pair(&f.member, &f.master, &token).await;

        assert_eq!(report.created, 0);
        assert_eq!(report.skipped, 2);
        assert!(f.member_dev.port_names().is_empty());
        assert!(f.master_dev.port_names().is_empty());
    }

    #[tokio::test]
    async fn test_master_up_backfills_all_members() {
        let f = fixture();
        let other = Switch::new(SwitchId(3), "10.0.0.3".parse().unwrap());
        let members = vec![f.member, other];

        let report = f
            .orch
            .master_up(&members, &f.master, &CancellationToken::new())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.created, 4);
        assert_eq!(
            f.master_dev.port_names(),
            vec!["vxlan_10.0.0.2_0", "vxlan_10.0.0.3_0"]
        );
    }

    #[tokio::test]
    async fn test_master_down_removes_only_master_legs() {
        let f = fixture();
        let token = CancellationToken::new();
        f.orch.ensure_pair(&f.member, &f.master, &token).await;

        let report = f.orch.master_down(&[f.member], &f.master).await;

        assert_eq!(report.deleted, 1);
        assert!(f.master_dev.port_names().is_empty());
        // Member-side leg deliberately left stale
        assert_eq!(f.member_dev.port_names(), vec!["vxlan_10.1.10.169_0"]);
    }

    #[tokio::test]
    async fn test_member_down_is_idempotent() {
        let f = fixture();
        let token = CancellationToken::new();
        f.orch.ensure_pair(&f.member, &f.master, &token).await;

        let first = f.orch.member_down(f.member.address, Some(&f.master)).await;
        let second = f.orch.member_down(f.member.address, Some(&f.master)).await;

        assert_eq!(first.deleted, 1);
        assert_eq!(second.deleted, 0);
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn test_member_down_without_master_is_noop() {
        let f = fixture();
        let report = f.orch.member_down(f.member.address, None).await;
        assert!(report.is_clean());
        assert_eq!(report.deleted, 0);
    }
}
