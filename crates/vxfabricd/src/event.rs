//! Switch lifecycle events and the Up/Down transition table.
//!
//! The southbound adapter delivers three event kinds per switch:
//! `Connected` (initial network contact), `Active` (device finished setup
//! and is ready for control operations), and `Removed` (device gone).
//! For reconciliation they collapse into two transitions: `Connected` and
//! `Active` are both Up, `Removed` is Down. Only `Active` actually
//! triggers reconciliation; `Connected` registers the switch so a
//! late-arriving master can backfill it.

use std::net::IpAddr;

use crate::types::SwitchId;

/// A lifecycle event for one switch, as delivered by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEvent {
    /// Initial network-level contact.
    Connected { id: SwitchId, address: IpAddr },
    /// Device completed setup and is ready for control operations.
    Active { id: SwitchId, address: IpAddr },
    /// Device is gone. May arrive without a preceding `Active`, and may
    /// be duplicated.
    Removed { id: SwitchId, address: IpAddr },
}

/// Logical transition driven by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Switch is present.
    Up,
    /// Switch is gone.
    Down,
}

impl Transition {
    /// Returns true for the Up transition.
    pub fn is_up(&self) -> bool {
        matches!(self, Transition::Up)
    }

    /// Returns true for the Down transition.
    pub fn is_down(&self) -> bool {
        matches!(self, Transition::Down)
    }
}

impl SwitchEvent {
    /// The switch id this event concerns.
    pub fn id(&self) -> SwitchId {
        match self {
            SwitchEvent::Connected { id, .. }
            | SwitchEvent::Active { id, .. }
            | SwitchEvent::Removed { id, .. } => *id,
        }
    }

    /// The source address this event concerns.
    pub fn address(&self) -> IpAddr {
        match self {
            SwitchEvent::Connected { address, .. }
            | SwitchEvent::Active { address, .. }
            | SwitchEvent::Removed { address, .. } => *address,
        }
    }

    /// Maps the event kind onto the two-transition table.
    pub fn transition(&self) -> Transition {
        match self {
            SwitchEvent::Connected { .. } | SwitchEvent::Active { .. } => Transition::Up,
            SwitchEvent::Removed { .. } => Transition::Down,
        }
    }

    /// Returns true if this event triggers tunnel reconciliation.
    ///
    /// `Connected` only registers; the device is not ready for port
    /// operations until `Active`.
    pub fn triggers_reconcile(&self) -> bool {
        matches!(
            self,
            SwitchEvent::Active { .. } | SwitchEvent::Removed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> IpAddr {
        "10.0.0.2".parse().unwrap()
    }

    #[test]
    fn test_transition_table() {
        let id = SwitchId(1);
        assert_eq!(
            SwitchEvent::Connected { id, address: addr() }.transition(),
            Transition::Up
        );
        assert_eq!(
            SwitchEvent::Active { id, address: addr() }.transition(),
            Transition::Up
        );
        assert_eq!(
            SwitchEvent::Removed { id, address: addr() }.transition(),
            Transition::Down
        );
    }

    #[test]
    fn test_reconcile_trigger() {
        let id = SwitchId(1);
        assert!(!SwitchEvent::Connected { id, address: addr() }.triggers_reconcile());
        assert!(SwitchEvent::Active { id, address: addr() }.triggers_reconcile());
        assert!(SwitchEvent::Removed { id, address: addr() }.triggers_reconcile());
    }

    #[test]
    fn test_accessors() {
        let ev = SwitchEvent::Active {
            id: SwitchId(9),
            address: addr(),
        };
        assert_eq!(ev.id(), SwitchId(9));
        assert_eq!(ev.address(), addr());
        assert!(ev.transition().is_up());
        assert!(!ev.transition().is_down());
    }
}
