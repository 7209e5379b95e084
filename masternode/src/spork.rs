//! Network-wide boolean feature flags ("sporks")
//!
//! The flag store itself is an external collaborator; masternode code
//! only asks whether a flag is currently active.

use dashmap::DashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SporkId {
    /// Re-sign and relay the owning broadcast on every accepted ping
    MnRebroadcastEnforcement,
    /// Enforce the masternode payment schedule in block validation
    MnPaymentEnforcement,
}

pub trait SporkOracle: Send + Sync {
    fn is_active(&self, id: SporkId) -> bool;
}

/// In-process flag set, mainly for tests and single-node setups
#[derive(Default)]
pub struct StaticSporks {
    active: DashSet<SporkId>,
}

impl StaticSporks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, id: SporkId) {
        self.active.insert(id);
    }

    pub fn deactivate(&self, id: SporkId) {
        self.active.remove(&id);
    }
}

impl SporkOracle for StaticSporks {
    fn is_active(&self, id: SporkId) -> bool {
        self.active.contains(&id)
    }
}
