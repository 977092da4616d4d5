//! Fabric Manager - switch lifecycle handling and reconciliation dispatch.
//!
//! `FabricMgr` consumes lifecycle events from the southbound adapter,
//! mutates the switch registry, and dispatches tunnel reconciliation to
//! background tasks. Events arrive serialized; registry mutations happen
//! inline on the event loop, while port-control I/O runs off it.
//!
//! Per-switch ordering: each switch id owns a gate (a fair async mutex
//! plus a cancellation token). Reconciliation tasks for the same id queue
//! on the gate's lock in dispatch order, so a Down is never applied
//! before a preceding Up finishes, while distinct switches reconcile
//! concurrently. Accepting a Down cancels the id's token first, which
//! stops any in-flight Up from starting further port creations; its
//! remaining idempotent steps are allowed to finish and the queued
//! teardown then removes whatever was created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use vxfabric_common::FabricConfig;

use crate::event::SwitchEvent;
use crate::mesh::{MeshOrch, ReconcileReport};
use crate::port_ctl::ClientPool;
use crate::registry::SwitchRegistry;
use crate::types::{Switch, SwitchId, SwitchRole};

struct SwitchGate {
    lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
}

impl SwitchGate {
    fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            cancel: CancellationToken::new(),
        }
    }
}

/// The fabric controller.
pub struct FabricMgr {
    config: Arc<FabricConfig>,
    registry: Arc<Mutex<SwitchRegistry>>,
    mesh: Arc<MeshOrch>,
    pool: Arc<ClientPool>,
    /// Gates are retained after removal so a reconnect serializes behind
    /// an in-flight teardown for the same id.
    gates: HashMap<SwitchId, SwitchGate>,
    tracker: TaskTracker,
}

impl FabricMgr {
    /// Creates a manager driving production OVSDB clients.
    pub fn new(config: Arc<FabricConfig>) -> Self {
        let pool = Arc::new(ClientPool::ovsdb(Arc::clone(&config)));
        Self::with_pool(config, pool)
    }

    /// Creates a manager over a caller-supplied client pool.
    pub fn with_pool(config: Arc<FabricConfig>, pool: Arc<ClientPool>) -> Self {
        let registry = Arc::new(Mutex::new(SwitchRegistry::new(config.master_address)));
        let mesh = Arc::new(MeshOrch::new(Arc::clone(&config), Arc::clone(&pool)));
        info!(master = %config.master_address, "FabricMgr initialized");
        Self {
            config,
            registry,
            mesh,
            pool,
            gates: HashMap::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Shared registry handle (observability surfaces read through this;
    /// they never mutate it).
    pub fn registry(&self) -> Arc<Mutex<SwitchRegistry>> {
        Arc::clone(&self.registry)
    }

    fn gate(&mut self, id: SwitchId) -> &mut SwitchGate {
        self.gates.entry(id).or_insert_with(SwitchGate::new)
    }

    /// Applies one lifecycle event.
    ///
    /// Registry mutation happens inline; any port-control work is spawned
    /// and the task handle returned so callers (tests, drain paths) can
    /// await completion.
    pub fn handle_event(&mut self, event: SwitchEvent) -> Option<JoinHandle<ReconcileReport>> {
        match event {
            SwitchEvent::Connected { id, address } => {
                let switch = self
                    .registry
                    .lock()
                    .expect("registry lock poisoned")
                    .register(address, id);
                info!(switch = %switch.id, address = %address, "Switch connected");
                None
            }
            SwitchEvent::Active { id, address } => {
                let (switch, master, members) = {
                    let mut registry = self.registry.lock().expect("registry lock poisoned");
                    let switch = registry.register(address, id);
                    (switch, registry.master().copied(), registry.member_snapshot())
                };
                info!(switch = %switch.id, address = %address, "Switch active");
                Some(self.dispatch_up(switch, master, members))
            }
            SwitchEvent::Removed { id, address } => {
                let (removed, master, members) = {
                    let mut registry = self.registry.lock().expect("registry lock poisoned");
                    let removed = registry.remove(address);
                    (removed, registry.master().copied(), registry.member_snapshot())
                };

                let Some(switch) = removed else {
                    debug!(switch = %id, address = %address, "Removal for unknown switch, ignoring");
                    return None;
                };

                info!(switch = %switch.id, address = %address, "Switch removed");
                self.pool.invalidate(switch.id);
                Some(self.dispatch_down(switch, master, members))
            }
        }
    }

    fn dispatch_up(
        &mut self,
        switch: Switch,
        master: Option<Switch>,
        members: Vec<Switch>,
    ) -> JoinHandle<ReconcileReport> {
        let gate = self.gate(switch.id);
        gate.cancel = CancellationToken::new();
        let cancel = gate.cancel.clone();
        let lock = Arc::clone(&gate.lock);

        let mesh = Arc::clone(&self.mesh);
        let role = switch.role(self.config.master_address);

        self.tracker.spawn(async move {
            let _serialized = lock.lock().await;
            let report = match role {
                SwitchRole::Master => mesh.master_up(&members, &switch, &cancel).await,
                SwitchRole::Member => mesh.member_up(&switch, master.as_ref(), &cancel).await,
            };
            log_outcome(&switch, "up", &report);
            report
        })
    }

    fn dispatch_down(
        &mut self,
        switch: Switch,
        master: Option<Switch>,
        members: Vec<Switch>,
    ) -> JoinHandle<ReconcileReport> {
        let gate = self.gate(switch.id);
        // Stop any in-flight setup for this id before queueing teardown.
        gate.cancel.cancel();
        let lock = Arc::clone(&gate.lock);

        let mesh = Arc::clone(&self.mesh);
        let role = switch.role(self.config.master_address);

        self.tracker.spawn(async move {
            let _serialized = lock.lock().await;
            let report = match role {
                SwitchRole::Master => mesh.master_down(&members, &switch).await,
                SwitchRole::Member => mesh.member_down(switch.address, master.as_ref()).await,
            };
            log_outcome(&switch, "down", &report);
            report
        })
    }

    /// Consumes lifecycle events until the channel closes or shutdown is
    /// requested, then waits for outstanding reconciliation tasks.
    pub async fn run(mut self, mut events: mpsc::Receiver<SwitchEvent>, shutdown: CancellationToken) {
        info!("Fabric event loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => {
                        info!("Event source closed");
                        break;
                    }
                }
            }
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("Fabric event loop stopped");
    }
}

fn log_outcome(switch: &Switch, transition: &str, report: &ReconcileReport) {
    if report.is_clean() {
        debug!(
            switch = %switch.id,
            transition,
            created = report.created,
            deleted = report.deleted,
            "Reconciliation complete"
        );
    } else {
        warn!(
            switch = %switch.id,
            transition,
            created = report.created,
            deleted = report.deleted,
            failures = report.failures.len(),
            "Reconciliation incomplete, will converge on a later event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port_ctl::{PortControl, SharedPortControl};
    use crate::types::PortId;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use vxfabric_common::FabricResult;

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

    fn mgr() -> FabricMgr {
        let config = Arc::new(FabricConfig::new("10.1.10.169".parse().unwrap()));
        let pool = Arc::new(ClientPool::new(Box::new(|_switch| {
            Arc::new(NullControl) as SharedPortControl
        })));
        FabricMgr::with_pool(config, pool)
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_connected_registers_without_reconciling() {
        let mut mgr = mgr();
        let handle = mgr.handle_event(SwitchEvent::Connected {
            id: SwitchId(2),
            address: addr("10.0.0.2"),
        });

        assert!(handle.is_none());
        let registry = mgr.registry();
        assert!(registry.lock().unwrap().contains(addr("10.0.0.2")));
    }

    #[tokio::test]
    async fn test_active_dispatches_reconciliation() {
        let mut mgr = mgr();
        let handle = mgr
            .handle_event(SwitchEvent::Active {
                id: SwitchId(2),
                address: addr("10.0.0.2"),
            })
            .expect("active should dispatch");

        let report = handle.await.unwrap();
        // No master registered: deferred, nothing created, no failure.
        assert!(report.is_clean());
        assert_eq!(report.created, 0);
    }

    #[tokio::test]
    async fn test_removed_unknown_switch_is_noop() {
        let mut mgr = mgr();
        let handle = mgr.handle_event(SwitchEvent::Removed {
            id: SwitchId(9),
            address: addr("10.0.0.9"),
        });
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_removed_deregisters_and_invalidates() {
        let mut mgr = mgr();
        mgr.handle_event(SwitchEvent::Active {
            id: SwitchId(2),
            address: addr("10.0.0.2"),
        })
        .unwrap()
        .await
        .unwrap();

        let handle = mgr
            .handle_event(SwitchEvent::Removed {
                id: SwitchId(2),
                address: addr("10.0.0.2"),
            })
            .expect("removal of known switch should dispatch teardown");
        handle.await.unwrap();

        let registry = mgr.registry();
        assert!(!registry.lock().unwrap().contains(addr("10.0.0.2")));

        // Duplicate removal: registry no-op, nothing dispatched.
        let dup = mgr.handle_event(SwitchEvent::Removed {
            id: SwitchId(2),
            address: addr("10.0.0.2"),
        });
        assert!(dup.is_none());
    }

    #[tokio::test]
    async fn test_same_switch_tasks_run_in_dispatch_order() {
        let mut mgr = mgr();
        let up = mgr
            .handle_event(SwitchEvent::Active {
                id: SwitchId(2),
                address: addr("10.0.0.2"),
            })
            .unwrap();
        let down = mgr
            .handle_event(SwitchEvent::Removed {
                id: SwitchId(2),
                address: addr("10.0.0.2"),
            })
            .unwrap();

        // Both complete; the gate serializes them in dispatch order.
        up.await.unwrap();
        down.await.unwrap();
    }
}
