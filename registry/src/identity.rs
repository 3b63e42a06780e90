use obol_chain::{ChainView, CollateralStatus};
use obol_crypto::msg_hash;
use obol_types::params::{
    COLLATERAL, EXPIRATION_SECONDS, HEARTBEAT_MATURITY_SECONDS, MIN_CONFIRMATIONS,
    REMOVAL_SECONDS,
};
use obol_types::{
    CollateralRef, NodeAddress, PayeeScript, PublicKey, Signature,
};
use obol_messages::{Broadcast, Heartbeat};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered service node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Announced but not yet mature; ineligible for payment.
    PreEnabled,
    Enabled,
    /// No heartbeat within the expiration window.
    Expired,
    /// Expired long enough to be pruned.
    Remove,
    /// Collateral output was spent; the registration is void.
    CollateralSpent,
}

/// A service node as tracked by the registry.
///
/// Built from a verified [`Broadcast`] and updated by heartbeats. The
/// broadcast signature is retained so the entry can be re-served to peers
/// requesting the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub collateral: CollateralRef,
    pub address: NodeAddress,
    pub collateral_pubkey: PublicKey,
    pub operator_pubkey: PublicKey,
    pub sig_time: u64,
    pub protocol_version: u32,
    pub signature: Signature,
    pub last_heartbeat: Option<Heartbeat>,
    pub state: NodeState,
    /// Cached confirmation count of the collateral, and the tip height the
    /// cache was taken at.
    #[serde(default)]
    cached_input_age: u32,
    #[serde(default)]
    cached_input_age_height: u32,
    /// Time of the last lifecycle check, for throttling.
    #[serde(skip)]
    last_checked: u64,
}

impl NodeIdentity {
    pub fn from_broadcast(bcast: &Broadcast) -> Self {
        NodeIdentity {
            collateral: bcast.collateral,
            address: bcast.address,
            collateral_pubkey: bcast.collateral_pubkey,
            operator_pubkey: bcast.operator_pubkey,
            sig_time: bcast.sig_time,
            protocol_version: bcast.protocol_version,
            signature: bcast.signature.clone(),
            last_heartbeat: bcast.last_heartbeat.clone(),
            state: NodeState::PreEnabled,
            cached_input_age: 0,
            cached_input_age_height: 0,
            last_checked: 0,
        }
    }

    /// Rebuild the announcement this entry came from, for serving the list.
    pub fn to_broadcast(&self) -> Broadcast {
        Broadcast {
            collateral: self.collateral,
            address: self.address,
            collateral_pubkey: self.collateral_pubkey,
            operator_pubkey: self.operator_pubkey,
            sig_time: self.sig_time,
            protocol_version: self.protocol_version,
            signature: self.signature.clone(),
            last_heartbeat: self.last_heartbeat.clone(),
        }
    }

    /// Payee script the network pays this node at.
    pub fn payee(&self) -> PayeeScript {
        PayeeScript::pay_to_pubkey(&self.collateral_pubkey)
    }

    /// Time of the most recent proof of life.
    pub fn last_seen(&self) -> u64 {
        self.last_heartbeat
            .as_ref()
            .map(|hb| hb.sig_time)
            .unwrap_or(self.sig_time)
            .max(self.sig_time)
    }

    pub fn is_enabled(&self) -> bool {
        self.state == NodeState::Enabled
    }

    /// Seconds since the announcement was signed.
    pub fn announce_age(&self, now: u64) -> u64 {
        now.saturating_sub(self.sig_time)
    }

    /// Accept a newer heartbeat. Returns false if it is not newer than what
    /// we already hold.
    pub fn update_heartbeat(&mut self, hb: &Heartbeat) -> bool {
        let newer = self
            .last_heartbeat
            .as_ref()
            .map(|cur| hb.sig_time > cur.sig_time)
            .unwrap_or(true);
        if newer {
            self.last_heartbeat = Some(hb.clone());
        }
        newer
    }

    /// Re-derive lifecycle state from collateral status and heartbeat age.
    ///
    /// Throttled to once per `throttle` seconds unless `force` is set, since
    /// the registry re-checks every node on a short timer.
    pub fn check(&mut self, now: u64, chain: &dyn ChainView, throttle: u64, force: bool) {
        if !force && now.saturating_sub(self.last_checked) < throttle {
            return;
        }
        self.last_checked = now;

        if self.state == NodeState::CollateralSpent {
            return;
        }
        if matches!(chain.collateral_status(&self.collateral), CollateralStatus::Spent) {
            self.state = NodeState::CollateralSpent;
            return;
        }

        let silent_for = now.saturating_sub(self.last_seen());
        self.state = if silent_for > REMOVAL_SECONDS {
            NodeState::Remove
        } else if silent_for > EXPIRATION_SECONDS {
            NodeState::Expired
        } else if self.announce_age(now) < HEARTBEAT_MATURITY_SECONDS {
            NodeState::PreEnabled
        } else {
            NodeState::Enabled
        };
    }

    /// Confirmations of the collateral output, cached per tip height.
    pub fn input_age(&mut self, chain: &dyn ChainView) -> u32 {
        let tip = chain.tip_height().unwrap_or(0);
        if tip != self.cached_input_age_height {
            self.cached_input_age = match chain.collateral_status(&self.collateral) {
                CollateralStatus::Unspent { confirmations, .. } => confirmations,
                _ => 0,
            };
            self.cached_input_age_height = tip;
        }
        self.cached_input_age
    }

    /// Seconds since this node was last paid, for ordering the payment
    /// queue. Nodes never paid fall back to announcement age, deterministic
    /// across peers. A small hash-derived offset breaks ties between nodes
    /// announced in the same second.
    pub fn seconds_since_payment(
        &self,
        now: u64,
        last_paid_time: Option<u64>,
    ) -> u64 {
        const MONTH_SECONDS: u64 = 60 * 60 * 24 * 30;
        let since = now.saturating_sub(last_paid_time.unwrap_or(self.sig_time));
        if since < MONTH_SECONDS {
            return since;
        }
        // Beyond a month the exact time stops mattering; order by a stable
        // per-node offset instead so every peer agrees.
        let digest = msg_hash(&[&self.collateral.to_bytes(), &self.sig_time.to_le_bytes()]);
        let mut limb = [0u8; 8];
        limb.copy_from_slice(&digest.as_bytes()[..8]);
        MONTH_SECONDS + (u64::from_le_bytes(limb) % MONTH_SECONDS)
    }

    /// Collateral is present, unspent, of the right value, and mature.
    pub fn has_valid_collateral(&self, chain: &dyn ChainView) -> bool {
        chain
            .collateral_status(&self.collateral)
            .is_valid_collateral(COLLATERAL, MIN_CONFIRMATIONS)
    }
}
