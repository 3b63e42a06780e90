use obol_chain::{ChainView, CollateralStatus};
use obol_messages::{Broadcast, Heartbeat, Message};
use obol_registry::Registry;
use obol_sync::SyncCoordinator;
use obol_types::params::{
    HEARTBEAT_ANCHOR_DEPTH, HEARTBEAT_SECONDS, MIN_CONFIRMATIONS, PROTOCOL_VERSION,
};
use obol_types::{CollateralRef, KeyPair, Signature};
use tracing::{info, warn};

use crate::wallet::{Connector, Wallet};

/// Where the local node stands in becoming an active service node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationState {
    Initial,
    SyncInProgress,
    /// Blocked on a precondition; the reason is operator-facing.
    NotCapable(String),
    /// Collateral found but not yet buried deep enough.
    InputTooNew { confirmations: u32 },
    Started,
}

impl ActivationState {
    pub fn status(&self) -> String {
        match self {
            ActivationState::Initial => "Node just started, not yet activated".to_owned(),
            ActivationState::SyncInProgress => "Waiting for sync to finish".to_owned(),
            ActivationState::NotCapable(reason) => format!("Not capable service node: {reason}"),
            ActivationState::InputTooNew { confirmations } => {
                format!(
                    "Collateral needs {MIN_CONFIRMATIONS} confirmations, has {confirmations}"
                )
            }
            ActivationState::Started => "Service node successfully started".to_owned(),
        }
    }
}

/// Drives the local node through announcement and periodic heartbeats.
pub struct ActivationController {
    operator: KeyPair,
    state: ActivationState,
    collateral: Option<CollateralRef>,
    collateral_key: Option<KeyPair>,
    last_heartbeat_at: u64,
}

impl ActivationController {
    pub fn new(operator: KeyPair) -> Self {
        ActivationController {
            operator,
            state: ActivationState::Initial,
            collateral: None,
            collateral_key: None,
            last_heartbeat_at: 0,
        }
    }

    pub fn state(&self) -> &ActivationState {
        &self.state
    }

    pub fn collateral(&self) -> Option<&CollateralRef> {
        self.collateral.as_ref()
    }

    pub fn operator_key(&self) -> &KeyPair {
        &self.operator
    }

    fn not_capable(&mut self, reason: &str) {
        if !matches!(&self.state, ActivationState::NotCapable(r) if r == reason) {
            warn!(reason, "service node not capable");
        }
        self.state = ActivationState::NotCapable(reason.to_owned());
    }

    fn build_heartbeat(
        &self,
        collateral: CollateralRef,
        chain: &dyn ChainView,
        now: u64,
    ) -> Option<Heartbeat> {
        let tip = chain.tip_height()?;
        let anchor = chain.hash_by_height(tip.saturating_sub(HEARTBEAT_ANCHOR_DEPTH))?;
        let mut hb = Heartbeat::new(collateral, anchor, now);
        hb.sign(&self.operator.private);
        Some(hb)
    }

    /// Periodic management pass. Returns messages the caller must relay.
    pub fn manage(
        &mut self,
        registry: &mut Registry,
        sync: &SyncCoordinator,
        chain: &dyn ChainView,
        wallet: &dyn Wallet,
        connector: &dyn Connector,
        now: u64,
    ) -> Vec<Message> {
        if !sync.is_synced() {
            self.state = ActivationState::SyncInProgress;
            return Vec::new();
        }

        if self.state == ActivationState::Started {
            return self.maintain(registry, chain, now);
        }
        self.try_start(registry, chain, wallet, connector, now)
    }

    /// Already started: keep the heartbeat going, notice if the network
    /// dropped us.
    fn maintain(
        &mut self,
        registry: &mut Registry,
        chain: &dyn ChainView,
        now: u64,
    ) -> Vec<Message> {
        let Some(collateral) = self.collateral else {
            self.state = ActivationState::Initial;
            return Vec::new();
        };
        if registry.find(&collateral).is_none() {
            warn!(node = %collateral, "we fell out of the registry, restarting activation");
            self.state = ActivationState::Initial;
            return Vec::new();
        }
        if now.saturating_sub(self.last_heartbeat_at) < HEARTBEAT_SECONDS {
            return Vec::new();
        }
        let Some(hb) = self.build_heartbeat(collateral, chain, now) else {
            return Vec::new();
        };
        // Feed our own heartbeat through the registry so local state and
        // the relay dedup agree with what peers will see.
        let outcome = registry.ingest_heartbeat(&hb, chain, now);
        if !outcome.should_relay() {
            warn!(?outcome, "local heartbeat not accepted");
            return Vec::new();
        }
        self.last_heartbeat_at = now;
        vec![Message::Heartbeat(hb)]
    }

    fn try_start(
        &mut self,
        registry: &mut Registry,
        chain: &dyn ChainView,
        wallet: &dyn Wallet,
        connector: &dyn Connector,
        now: u64,
    ) -> Vec<Message> {
        let Some(address) = connector.external_address() else {
            self.not_capable("could not resolve an external address");
            return Vec::new();
        };
        if !wallet.is_unlocked() {
            self.not_capable("wallet is locked");
            return Vec::new();
        }
        let Some((outpoint, collateral_key)) = wallet.collateral_output() else {
            self.not_capable("no collateral output in wallet");
            return Vec::new();
        };
        match chain.collateral_status(&outpoint) {
            CollateralStatus::Unspent { confirmations, .. }
                if confirmations < MIN_CONFIRMATIONS =>
            {
                self.state = ActivationState::InputTooNew { confirmations };
                return Vec::new();
            }
            CollateralStatus::Unspent { .. } => {}
            _ => {
                self.not_capable("collateral output is spent or unknown");
                return Vec::new();
            }
        }
        if !connector.is_reachable(&address) {
            self.not_capable("external address is not reachable");
            return Vec::new();
        }

        let Some(hb) = self.build_heartbeat(outpoint, chain, now) else {
            self.not_capable("chain has no usable anchor block");
            return Vec::new();
        };
        let mut bcast = Broadcast {
            collateral: outpoint,
            address,
            collateral_pubkey: collateral_key.public,
            operator_pubkey: self.operator.public,
            sig_time: now,
            protocol_version: PROTOCOL_VERSION,
            signature: Signature::empty(),
            last_heartbeat: Some(hb),
        };
        bcast.sign(&collateral_key.private);

        let outcome = registry.ingest_broadcast(&bcast, chain, now);
        if !outcome.should_relay() {
            self.not_capable("own announcement rejected locally");
            return Vec::new();
        }

        info!(node = %outpoint, %address, "service node activated");
        self.collateral = Some(outpoint);
        self.collateral_key = Some(collateral_key);
        self.last_heartbeat_at = now;
        self.state = ActivationState::Started;
        vec![Message::Announce(bcast)]
    }

    /// Hot activation: a broadcast arriving from the network that carries
    /// our operator key means the collateral holder started us remotely.
    pub fn observe_broadcast(&mut self, bcast: &Broadcast) {
        if self.state == ActivationState::Started {
            return;
        }
        if bcast.operator_pubkey == self.operator.public {
            info!(node = %bcast.collateral, "activated by network announcement");
            self.collateral = Some(bcast.collateral);
            self.last_heartbeat_at = bcast
                .last_heartbeat
                .as_ref()
                .map(|hb| hb.sig_time)
                .unwrap_or(0);
            self.state = ActivationState::Started;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{MemoryWallet, StaticConnector};
    use obol_chain::{MemoryChain, SporkSet};
    use obol_crypto::generate_keypair;
    use obol_sync::SyncCoordinator;
    use obol_types::params::COLLATERAL;
    use obol_types::{NetworkId, TxId};

    const NOW: u64 = 2_000_000;

    struct Rig {
        chain: MemoryChain,
        registry: Registry,
        sync: SyncCoordinator,
        wallet: MemoryWallet,
        connector: StaticConnector,
        controller: ActivationController,
        outpoint: CollateralRef,
    }

    fn rig() -> Rig {
        let chain = MemoryChain::new();
        chain.push_blocks(30, NOW - 1_800, 60);
        chain.set_tip_received_at(NOW - 30);

        let outpoint = CollateralRef { txid: TxId([11u8; 32]), vout: 0 };
        chain.add_collateral(outpoint, COLLATERAL, 20);

        let mut wallet = MemoryWallet::new();
        wallet.unlock();
        wallet.set_collateral(outpoint, generate_keypair());

        let sporks = SporkSet::new();
        let mut sync = SyncCoordinator::new(NOW - 300);
        // Walk the ladder with no peers so the rig counts as synced.
        let mut t = NOW - 300;
        while !sync.is_synced() {
            sync.tick(&[], &chain, &sporks, 0, t);
            t += 1;
        }

        Rig {
            chain,
            registry: Registry::new(NetworkId::Dev),
            sync,
            wallet,
            connector: StaticConnector {
                address: Some("127.0.0.1:29433".parse::<std::net::SocketAddr>().unwrap().into()),
                reachable: true,
            },
            controller: ActivationController::new(generate_keypair()),
            outpoint,
        }
    }

    fn manage(rig: &mut Rig, now: u64) -> Vec<Message> {
        rig.controller.manage(
            &mut rig.registry,
            &rig.sync,
            &rig.chain,
            &rig.wallet,
            &rig.connector,
            now,
        )
    }

    #[test]
    fn start_announces_and_registers_locally() {
        let mut rig = rig();
        let out = manage(&mut rig, NOW);
        assert_eq!(rig.controller.state(), &ActivationState::Started);
        assert!(matches!(out.as_slice(), [Message::Announce(_)]));
        assert!(rig.registry.find(&rig.outpoint).is_some());
    }

    #[test]
    fn unsynced_node_waits() {
        let mut rig = rig();
        rig.sync = SyncCoordinator::new(NOW);
        let out = manage(&mut rig, NOW);
        assert!(out.is_empty());
        assert_eq!(rig.controller.state(), &ActivationState::SyncInProgress);
    }

    #[test]
    fn locked_wallet_is_not_capable() {
        let mut rig = rig();
        rig.wallet.lock();
        manage(&mut rig, NOW);
        assert!(matches!(rig.controller.state(), ActivationState::NotCapable(_)));
    }

    #[test]
    fn shallow_collateral_is_input_too_new() {
        let mut rig = rig();
        rig.chain.add_collateral(rig.outpoint, COLLATERAL, 3);
        manage(&mut rig, NOW);
        assert_eq!(
            rig.controller.state(),
            &ActivationState::InputTooNew { confirmations: 3 }
        );

        // Once buried, the next pass starts.
        rig.chain.add_collateral(rig.outpoint, COLLATERAL, 15);
        manage(&mut rig, NOW + 1);
        assert_eq!(rig.controller.state(), &ActivationState::Started);
    }

    #[test]
    fn unreachable_address_is_not_capable() {
        let mut rig = rig();
        rig.connector.reachable = false;
        manage(&mut rig, NOW);
        assert!(matches!(rig.controller.state(), ActivationState::NotCapable(_)));
    }

    #[test]
    fn heartbeats_are_rate_limited() {
        let mut rig = rig();
        manage(&mut rig, NOW);
        assert_eq!(rig.controller.state(), &ActivationState::Started);

        // Too soon: nothing goes out.
        assert!(manage(&mut rig, NOW + 60).is_empty());
        // Past the interval: one heartbeat.
        let out = manage(&mut rig, NOW + HEARTBEAT_SECONDS + 1);
        assert!(matches!(out.as_slice(), [Message::Heartbeat(_)]));
    }

    #[test]
    fn hot_activation_from_own_broadcast() {
        let mut rig = rig();
        let out = manage(&mut rig, NOW);
        let Some(Message::Announce(bcast)) = out.first() else { panic!("no announce") };

        let op = rig.controller.operator_key();
        let remote_kp = KeyPair {
            public: op.public,
            private: obol_types::PrivateKey(op.private.0),
        };
        let mut remote = ActivationController::new(remote_kp);
        remote.observe_broadcast(bcast);
        assert_eq!(remote.state(), &ActivationState::Started);
        assert_eq!(remote.collateral(), Some(&bcast.collateral));
    }

    #[test]
    fn falling_out_of_registry_restarts_activation() {
        let mut rig = rig();
        manage(&mut rig, NOW);
        rig.registry.remove(&rig.outpoint);

        manage(&mut rig, NOW + HEARTBEAT_SECONDS + 1);
        assert_eq!(rig.controller.state(), &ActivationState::Initial);
        // The following pass re-announces.
        let out = manage(&mut rig, NOW + HEARTBEAT_SECONDS + 2);
        assert!(matches!(out.as_slice(), [Message::Announce(_)]));
        assert_eq!(rig.controller.state(), &ActivationState::Started);
    }
}
