//! End-to-end tests of the assembled node: gossip dispatch and relay,
//! staged sync, service-node activation, and checkpoint persistence.

use std::sync::Arc;

use obol_activation::{MemoryWallet, StaticConnector};
use obol_chain::{ChainView, MemoryChain, SporkSet};
use obol_crypto::generate_keypair;
use obol_messages::{Broadcast, Heartbeat, Message, Peer, QueuedPeer, SyncCategory};
use obol_node::{NodeConfig, ObolNode};
use obol_types::params::{COLLATERAL, PROTOCOL_VERSION};
use obol_types::{CollateralRef, KeyPair, NetworkId, Signature, TxId};
use obol_utils::ManualClock;

const NOW: u64 = 2_000_000;

struct Rig {
    node: Arc<ObolNode>,
    chain: Arc<MemoryChain>,
    clock: Arc<ManualClock>,
    _dir: tempfile::TempDir,
}

impl Rig {
    fn new(network: NetworkId) -> Self {
        Self::build(network, MemoryWallet::new(), false)
    }

    fn build(network: NetworkId, wallet: MemoryWallet, service_node: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MemoryChain::new());
        chain.push_blocks(150, NOW - 150 * 60, 60);
        chain.set_tip_received_at(NOW - 30);
        let clock = Arc::new(ManualClock::new(NOW));

        let mut config = NodeConfig::default();
        config.network = network;
        config.data_dir = dir.path().to_path_buf();
        config.service_node = service_node;

        let node = ObolNode::new(
            config,
            chain.clone(),
            Arc::new(SporkSet::new()),
            Arc::new(wallet),
            Arc::new(StaticConnector {
                address: Some("127.0.0.1:29433".parse::<std::net::SocketAddr>().unwrap().into()),
                reachable: true,
            }),
            clock.clone(),
        )
        .unwrap();
        Rig { node, chain, clock, _dir: dir }
    }

    async fn peer(&self, id: u64) -> Arc<QueuedPeer> {
        let peer = Arc::new(QueuedPeer::new(id, PROTOCOL_VERSION));
        let as_dyn: Arc<dyn Peer> = peer.clone();
        self.node.add_peer(as_dyn).await;
        peer
    }

    fn announce(&self, idx: u8, sig_time: u64) -> (Broadcast, KeyPair, KeyPair) {
        let collateral_kp = generate_keypair();
        let operator_kp = generate_keypair();
        let collateral = CollateralRef { txid: TxId([idx; 32]), vout: 0 };
        self.chain.add_collateral(collateral, COLLATERAL, 20);
        let mut bcast = Broadcast {
            collateral,
            address: format!("203.0.113.{idx}:19433")
                .parse::<std::net::SocketAddr>()
                .unwrap()
                .into(),
            collateral_pubkey: collateral_kp.public,
            operator_pubkey: operator_kp.public,
            sig_time,
            protocol_version: PROTOCOL_VERSION,
            signature: Signature::empty(),
            last_heartbeat: None,
        };
        bcast.sign(&collateral_kp.private);
        (bcast, collateral_kp, operator_kp)
    }

    /// Walk the bootstrap ladder to completion; with nothing served each
    /// stage is abandoned once its deadline passes.
    async fn finish_sync(&self) {
        for _ in 0..8 {
            self.clock.advance(26);
            self.node.sync_pass().await;
        }
        assert!(self.node.sync.lock().await.is_synced());
    }
}

fn as_dyn(peer: &Arc<QueuedPeer>) -> Arc<dyn Peer> {
    peer.clone()
}

#[tokio::test]
async fn announce_relays_to_everyone_but_the_sender() {
    let rig = Rig::new(NetworkId::Test);
    let a = rig.peer(1).await;
    let b = rig.peer(2).await;
    let (bcast, _, _) = rig.announce(1, NOW - 100);

    rig.node.handle_message(&as_dyn(&a), Message::Announce(bcast.clone())).await;
    assert_eq!(a.queued(), 0);
    assert_eq!(b.drain(), vec![Message::Announce(bcast.clone())]);
    assert_eq!(rig.node.status().await.node_count, 1);

    // A replay is deduplicated, not relayed again.
    rig.node.handle_message(&as_dyn(&b), Message::Announce(bcast)).await;
    assert_eq!(a.queued(), 0);
    assert_eq!(b.queued(), 0);
}

#[tokio::test]
async fn forged_announce_penalizes_the_sender() {
    let rig = Rig::new(NetworkId::Test);
    let a = rig.peer(1).await;
    let b = rig.peer(2).await;
    let (mut bcast, _, _) = rig.announce(1, NOW - 100);
    bcast.sig_time += 1;

    rig.node.handle_message(&as_dyn(&a), Message::Announce(bcast)).await;
    assert_eq!(a.misbehavior_score(), 100);
    assert_eq!(b.queued(), 0);
    assert_eq!(rig.node.status().await.node_count, 0);
}

#[tokio::test]
async fn heartbeat_for_unknown_node_asks_for_its_entry() {
    let rig = Rig::new(NetworkId::Test);
    let a = rig.peer(1).await;
    let operator = generate_keypair();
    let collateral = CollateralRef { txid: TxId([9u8; 32]), vout: 0 };
    let mut hb = Heartbeat::new(collateral, rig.chain.hash_by_height(140).unwrap(), NOW - 10);
    hb.sign(&operator.private);

    rig.node.handle_message(&as_dyn(&a), Message::Heartbeat(hb)).await;
    assert_eq!(a.drain(), vec![Message::ListRequest(Some(collateral))]);
    assert_eq!(a.misbehavior_score(), 0);
}

#[tokio::test]
async fn list_request_is_served_with_a_count_trailer() {
    let rig = Rig::new(NetworkId::Test);
    let a = rig.peer(1).await;
    let b = rig.peer(2).await;
    let (bcast, _, _) = rig.announce(1, NOW - 100);
    rig.node.handle_message(&as_dyn(&a), Message::Announce(bcast)).await;
    b.drain();

    rig.node.handle_message(&as_dyn(&b), Message::ListRequest(None)).await;
    let served = b.drain();
    assert_eq!(served.len(), 2);
    assert!(matches!(served[0], Message::Announce(_)));
    assert_eq!(
        served[1],
        Message::SyncCount { category: SyncCategory::NodeList, count: 1 }
    );
}

#[tokio::test]
async fn vote_sync_request_gets_a_trailer_even_when_empty() {
    let rig = Rig::new(NetworkId::Test);
    let a = rig.peer(1).await;

    rig.node.handle_message(&as_dyn(&a), Message::VoteSyncRequest { count: 0 }).await;
    assert_eq!(
        a.drain(),
        vec![Message::SyncCount { category: SyncCategory::PaymentVotes, count: 0 }]
    );
}

#[tokio::test]
async fn sync_ladder_completes_without_peers() {
    let rig = Rig::new(NetworkId::Test);
    assert!(!rig.node.sync.lock().await.is_synced());
    rig.finish_sync().await;
    assert_eq!(rig.node.status().await.sync_status, "Synchronization finished");
}

#[tokio::test]
async fn service_node_activates_announces_and_votes() {
    let collateral_kp = generate_keypair();
    let collateral = CollateralRef { txid: TxId([42u8; 32]), vout: 1 };
    let mut wallet = MemoryWallet::new();
    wallet.unlock();
    wallet.set_collateral(collateral, collateral_kp);

    let rig = Rig::build(NetworkId::Dev, wallet, true);
    rig.chain.add_collateral(collateral, COLLATERAL, 20);
    let watcher = rig.peer(7).await;
    rig.finish_sync().await;

    assert!(rig.node.activation_pass().await);
    let out = watcher.drain();
    assert!(out.iter().any(|m| matches!(m, Message::Announce(_))));
    let status = rig.node.status().await;
    assert_eq!(status.activation_status, "Service node successfully started");
    assert_eq!(status.node_count, 1);

    // Age past the heartbeat maturity window and the election queue's
    // minimum, keeping the heartbeat fresh, then vote on the next block.
    rig.clock.advance(400);
    rig.node.activation_pass().await;
    rig.clock.advance(400);
    rig.node.activation_pass().await;
    watcher.drain();

    let tip = rig.chain.tip_height().unwrap();
    rig.node.process_new_block(tip).await;
    let out = watcher.drain();
    assert!(out.iter().any(|m| matches!(m, Message::Vote(_))), "expected a payment vote");
}

#[tokio::test]
async fn checkpoints_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(MemoryChain::new());
    chain.push_blocks(150, NOW - 150 * 60, 60);
    chain.set_tip_received_at(NOW - 30);
    let clock = Arc::new(ManualClock::new(NOW));

    let mut config = NodeConfig::default();
    config.network = NetworkId::Test;
    config.data_dir = dir.path().to_path_buf();

    let build = || {
        ObolNode::new(
            config.clone(),
            chain.clone(),
            Arc::new(SporkSet::new()),
            Arc::new(MemoryWallet::new()),
            Arc::new(StaticConnector { address: None, reachable: false }),
            clock.clone(),
        )
        .unwrap()
    };

    let node = build();
    let peer = Arc::new(QueuedPeer::new(1, PROTOCOL_VERSION));
    node.add_peer(peer.clone() as Arc<dyn Peer>).await;

    let collateral_kp = generate_keypair();
    let operator_kp = generate_keypair();
    let collateral = CollateralRef { txid: TxId([3u8; 32]), vout: 0 };
    chain.add_collateral(collateral, COLLATERAL, 20);
    let mut bcast = Broadcast {
        collateral,
        address: "203.0.113.3:19433".parse::<std::net::SocketAddr>().unwrap().into(),
        collateral_pubkey: collateral_kp.public,
        operator_pubkey: operator_kp.public,
        sig_time: NOW - 100,
        protocol_version: PROTOCOL_VERSION,
        signature: Signature::empty(),
        last_heartbeat: None,
    };
    bcast.sign(&collateral_kp.private);
    let from: Arc<dyn Peer> = peer.clone();
    node.handle_message(&from, Message::Announce(bcast)).await;
    assert_eq!(node.status().await.node_count, 1);
    node.save_checkpoints().await.unwrap();
    drop(node);

    let node = build();
    assert_eq!(node.status().await.node_count, 1);
    drop(node);

    // A corrupted checkpoint means an empty registry, never a crash.
    let path = dir.path().join("nodecache.dat");
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let node = build();
    assert_eq!(node.status().await.node_count, 0);
}
