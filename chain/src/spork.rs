use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Network-wide feature toggles controlled by the spork keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SporkId {
    /// Blocks must pay the elected service node or they are rejected.
    PaymentEnforcement,
    /// Only nodes that have re-announced on the current protocol are paid.
    PayUpdatedNodes,
    /// Superblock budget payments are active.
    Superblocks,
}

/// Current spork activation state.
///
/// Spork values are unix timestamps; a spork is active once the current time
/// passes its value. The default state has every spork inactive, which is
/// what a node believes until it completes the spork sync stage.
#[derive(Default)]
pub struct SporkSet {
    values: RwLock<HashMap<SporkId, u64>>,
}

impl SporkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: SporkId, activation_time: u64) {
        self.values.write().unwrap().insert(id, activation_time);
    }

    pub fn is_active(&self, id: SporkId, now: u64) -> bool {
        self.values
            .read()
            .unwrap()
            .get(&id)
            .map(|&t| now >= t)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sporks_default_inactive() {
        let sporks = SporkSet::new();
        assert!(!sporks.is_active(SporkId::PaymentEnforcement, u64::MAX));
    }

    #[test]
    fn spork_activates_at_its_timestamp() {
        let sporks = SporkSet::new();
        sporks.set(SporkId::PayUpdatedNodes, 1_000);
        assert!(!sporks.is_active(SporkId::PayUpdatedNodes, 999));
        assert!(sporks.is_active(SporkId::PayUpdatedNodes, 1_000));
    }
}
