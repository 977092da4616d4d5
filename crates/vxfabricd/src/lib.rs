//! VXLAN Overlay Fabric Controller Daemon
//!
//! vxfabricd maintains a hub-and-spoke mesh of VXLAN tunnels between the
//! master switch (co-located with the controller) and every member
//! switch, handling:
//! - Switch lifecycle tracking (connect / active / removed)
//! - Idempotent tunnel-endpoint reconciliation per lifecycle event
//! - Per-switch OVSDB control channels with address-change invalidation
//! - Deferred setup while no master is registered, with backfill when
//!   the master arrives

pub mod commands;
pub mod event;
pub mod fabric_mgr;
pub mod mesh;
pub mod port_ctl;
pub mod registry;
pub mod types;

pub use event::{SwitchEvent, Transition};
pub use fabric_mgr::FabricMgr;
pub use mesh::{MeshOrch, PairFailure, ReconcileReport};
pub use port_ctl::{ClientPool, OvsdbClient, PortControl, SharedPortControl};
pub use registry::SwitchRegistry;
pub use types::{PortId, Switch, SwitchId, SwitchRole, TunnelEndpoint};
