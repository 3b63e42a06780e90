//! Subsystem wiring and maintenance scheduling.
//!
//! Lock order, everywhere: registry, ledger, sync, activation. Maintenance
//! passes that can afford to skip a beat use `try_lock` and defer instead
//! of queueing behind message handling.

use std::sync::Arc;
use std::time::Duration;

use obol_activation::{ActivationController, ActivationState, Connector, Wallet};
use obol_chain::{ChainView, SporkSet};
use obol_crypto::{generate_keypair, keypair_from_seed};
use obol_messages::{Message, Peer, SyncCategory};
use obol_payments::PaymentLedger;
use obol_registry::{GossipOutcome, Registry, RegistrySnapshot};
use obol_store::{CheckpointFile, StoreError, NODE_CACHE_MAGIC, VOTE_CACHE_MAGIC};
use obol_sync::SyncCoordinator;
use obol_utils::Clock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::shutdown::ShutdownController;

/// Point-in-time node status for logs and RPC.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub sync_status: &'static str,
    pub activation_status: String,
    pub node_count: usize,
    pub enabled_count: usize,
}

/// The assembled service-node subsystem.
pub struct ObolNode {
    pub config: NodeConfig,
    pub chain: Arc<dyn ChainView>,
    pub sporks: Arc<SporkSet>,
    pub registry: Arc<Mutex<Registry>>,
    pub ledger: Arc<Mutex<PaymentLedger>>,
    pub sync: Arc<Mutex<SyncCoordinator>>,
    pub activation: Arc<Mutex<ActivationController>>,
    pub shutdown: Arc<ShutdownController>,
    wallet: Arc<dyn Wallet>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    peers: Mutex<Vec<Arc<dyn Peer>>>,
    node_checkpoint: CheckpointFile,
    vote_checkpoint: CheckpointFile,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ObolNode {
    pub fn new(
        config: NodeConfig,
        chain: Arc<dyn ChainView>,
        sporks: Arc<SporkSet>,
        wallet: Arc<dyn Wallet>,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, NodeError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let node_checkpoint = CheckpointFile::new(
            config.data_dir.join("nodecache.dat"),
            NODE_CACHE_MAGIC,
            config.network,
        );
        let vote_checkpoint = CheckpointFile::new(
            config.data_dir.join("votecache.dat"),
            VOTE_CACHE_MAGIC,
            config.network,
        );

        let registry = match node_checkpoint.read::<RegistrySnapshot>() {
            Ok(snapshot) => {
                let registry = Registry::restore(snapshot);
                info!(nodes = registry.len(), "registry restored from checkpoint");
                registry
            }
            Err(StoreError::Missing) => Registry::new(config.network),
            Err(e) => {
                // Start empty rather than refuse to start; gossip refills.
                warn!(error = %e, "registry checkpoint unreadable, starting empty");
                Registry::new(config.network)
            }
        };
        let ledger = match vote_checkpoint.read::<PaymentLedger>() {
            Ok(ledger) => {
                info!(votes = ledger.vote_count(), "payment votes restored from checkpoint");
                ledger
            }
            Err(StoreError::Missing) => PaymentLedger::new(),
            Err(e) => {
                warn!(error = %e, "vote checkpoint unreadable, starting empty");
                PaymentLedger::new()
            }
        };

        let operator = match config.operator_seed_bytes()? {
            Some(seed) => keypair_from_seed(&seed),
            None => generate_keypair(),
        };
        let now = clock.now();

        Ok(Arc::new(ObolNode {
            registry: Arc::new(Mutex::new(registry)),
            ledger: Arc::new(Mutex::new(ledger)),
            sync: Arc::new(Mutex::new(SyncCoordinator::new(now))),
            activation: Arc::new(Mutex::new(ActivationController::new(operator))),
            shutdown: Arc::new(ShutdownController::new()),
            wallet,
            connector,
            clock,
            peers: Mutex::new(Vec::new()),
            node_checkpoint,
            vote_checkpoint,
            tasks: Mutex::new(Vec::new()),
            chain,
            sporks,
            config,
        }))
    }

    pub async fn add_peer(&self, peer: Arc<dyn Peer>) {
        debug!(peer = peer.id(), "peer connected");
        // Steady-state list refresh; the bootstrap ladder has its own
        // fulfillment tracking and skips peers it already asked.
        if self.sync.lock().await.is_synced() {
            let now = self.clock.now();
            if self.registry.lock().await.should_request_list(peer.id(), now) {
                peer.send(Message::ListRequest(None));
            }
        }
        self.peers.lock().await.push(peer);
    }

    pub async fn remove_peer(&self, id: u64) {
        self.peers.lock().await.retain(|p| p.id() != id);
    }

    async fn relay(&self, message: Message, except: Option<u64>) {
        for peer in self.peers.lock().await.iter() {
            if except != Some(peer.id()) {
                peer.send(message.clone());
            }
        }
    }

    async fn request_entry(&self, from: &Arc<dyn Peer>, collateral: obol_types::CollateralRef) {
        let now = self.clock.now();
        if self.registry.lock().await.should_request_entry(&collateral, now) {
            from.send(Message::ListRequest(Some(collateral)));
        }
    }

    /// Dispatch one inbound message.
    pub async fn handle_message(&self, from: &Arc<dyn Peer>, message: Message) {
        let now = self.clock.now();
        match message {
            Message::Announce(bcast) => {
                let outcome = self
                    .registry
                    .lock()
                    .await
                    .ingest_broadcast(&bcast, self.chain.as_ref(), now);
                match outcome {
                    GossipOutcome::Accepted => {
                        self.sync.lock().await.note_item(SyncCategory::NodeList, now);
                        self.activation.lock().await.observe_broadcast(&bcast);
                        self.relay(Message::Announce(bcast), Some(from.id())).await;
                    }
                    GossipOutcome::Rejected { dos_score } if dos_score > 0 => {
                        from.misbehaving(dos_score);
                    }
                    _ => {}
                }
            }
            Message::Heartbeat(hb) => {
                let outcome = self
                    .registry
                    .lock()
                    .await
                    .ingest_heartbeat(&hb, self.chain.as_ref(), now);
                match outcome {
                    GossipOutcome::Accepted => {
                        self.relay(Message::Heartbeat(hb), Some(from.id())).await;
                    }
                    GossipOutcome::UnknownNode => {
                        self.request_entry(from, hb.collateral).await;
                    }
                    GossipOutcome::Rejected { dos_score } if dos_score > 0 => {
                        from.misbehaving(dos_score);
                    }
                    _ => {}
                }
            }
            Message::Vote(vote) => {
                let outcome = {
                    let registry = self.registry.lock().await;
                    self.ledger
                        .lock()
                        .await
                        .ingest_vote(&vote, &registry, self.chain.as_ref())
                };
                match outcome {
                    GossipOutcome::Accepted => {
                        self.sync
                            .lock()
                            .await
                            .note_item(SyncCategory::PaymentVotes, now);
                        self.relay(Message::Vote(vote), Some(from.id())).await;
                    }
                    GossipOutcome::UnknownNode => {
                        self.request_entry(from, vote.voter).await;
                    }
                    GossipOutcome::Rejected { dos_score } if dos_score > 0 => {
                        from.misbehaving(dos_score);
                    }
                    _ => {}
                }
            }
            Message::ListRequest(which) => {
                self.registry
                    .lock()
                    .await
                    .serve_list(from.as_ref(), which, now);
            }
            Message::VoteSyncRequest { .. } => {
                let enabled = self.registry.lock().await.count_enabled(None);
                self.ledger.lock().await.sync_to_peer(from.as_ref(), enabled);
            }
            Message::SporkRequest => {
                // Spork state is distributed by the spork oracle's own
                // signed messages, outside this subsystem.
            }
            Message::SyncCount { category, count } => {
                self.sync.lock().await.note_count(category, count);
            }
        }
    }

    /// React to a new chain tip: advance the ledger and cast our own vote
    /// when we are an active, elected node.
    pub async fn process_new_block(&self, height: u32) {
        let now = self.clock.now();
        let vote = {
            let mut registry = self.registry.lock().await;
            let mut ledger = self.ledger.lock().await;
            let synced = self.sync.lock().await.is_synced();
            let activation = self.activation.lock().await;
            let local = if synced && *activation.state() == ActivationState::Started {
                activation
                    .collateral()
                    .map(|c| (c, &activation.operator_key().private))
            } else {
                None
            };
            ledger.process_block(height, local, &mut registry, self.chain.as_ref(), now)
        };
        if let Some(vote) = vote {
            self.relay(Message::Vote(vote), None).await;
        }
    }

    /// One activation management pass; returns true when anything went out.
    pub async fn activation_pass(&self) -> bool {
        let now = self.clock.now();
        if !self.config.service_node {
            return false;
        }
        let outbound = {
            let mut registry = self.registry.lock().await;
            let sync = self.sync.lock().await;
            let mut activation = self.activation.lock().await;
            activation.manage(
                &mut registry,
                &sync,
                self.chain.as_ref(),
                self.wallet.as_ref(),
                self.connector.as_ref(),
                now,
            )
        };
        let sent = !outbound.is_empty();
        for message in outbound {
            self.relay(message, None).await;
        }
        sent
    }

    /// One sync scheduler pass.
    pub async fn sync_pass(&self) {
        let now = self.clock.now();
        let peers = self.peers.lock().await.clone();
        let refs: Vec<&dyn Peer> = peers.iter().map(|p| p.as_ref()).collect();
        let vote_hint = {
            let registry = self.registry.lock().await;
            registry.count_enabled(None) as u32
        };
        let mut sync = self.sync.lock().await;
        sync.tick(&refs, self.chain.as_ref(), &self.sporks, vote_hint, now);
    }

    /// Write both checkpoints, verify-then-rewrite.
    pub async fn save_checkpoints(&self) -> Result<(), NodeError> {
        let snapshot = self.registry.lock().await.snapshot();
        self.node_checkpoint.dump(&snapshot)?;
        let ledger = self.ledger.lock().await;
        self.vote_checkpoint.dump(&*ledger)?;
        Ok(())
    }

    pub async fn status(&self) -> NodeStatus {
        let registry = self.registry.lock().await;
        let sync = self.sync.lock().await;
        let activation = self.activation.lock().await;
        NodeStatus {
            sync_status: sync.status(),
            activation_status: activation.state().status(),
            node_count: registry.len(),
            enabled_count: registry.count_enabled(None),
        }
    }

    /// Spawn the maintenance tasks.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        // Sync scheduler.
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(node.config.sync_tick_secs));
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => node.sync_pass().await,
                }
            }
        }));

        // Registry and ledger pruning. Skips a beat under contention.
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(node.config.prune_tick_secs));
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let now = node.clock.now();
                        if let Ok(mut registry) = node.registry.try_lock() {
                            registry.check_and_prune(now, node.chain.as_ref(), false);
                            let enabled = registry.count_enabled(None);
                            let empty = registry.is_empty();
                            drop(registry);
                            if let Ok(mut ledger) = node.ledger.try_lock() {
                                ledger.cleanup(enabled);
                            }
                            // An empty registry after sync finished means we
                            // slept through the node list changing under us.
                            let mut sync = node.sync.lock().await;
                            if sync.is_synced() && empty {
                                warn!("registry empty after sync, resyncing");
                                sync.reset(now);
                            }
                        }
                    }
                }
            }
        }));

        // Activation management.
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(node.config.activation_tick_secs));
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => { node.activation_pass().await; }
                }
            }
        }));

        // Periodic checkpointing.
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(node.config.checkpoint_tick_secs));
            // The first tick fires immediately; skip it so startup does not
            // rewrite the file we just loaded.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        if let Err(e) = node.save_checkpoints().await {
                            warn!(error = %e, "checkpoint dump failed");
                        }
                    }
                }
            }
        }));
    }

    /// Run until a shutdown signal, then flush checkpoints.
    pub async fn run(self: Arc<Self>) -> Result<(), NodeError> {
        self.start().await;
        self.shutdown.wait_for_signal().await;

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        self.save_checkpoints().await?;
        info!("node stopped");
        Ok(())
    }
}
