use obol_types::{CollateralRef, KeyPair, NodeAddress, PrivateKey};

/// What the activation controller needs from the wallet collaborator.
pub trait Wallet: Send + Sync {
    fn is_unlocked(&self) -> bool;

    /// An unspent output holding exactly the collateral bond, with the key
    /// controlling it.
    fn collateral_output(&self) -> Option<(CollateralRef, KeyPair)>;
}

/// What the activation controller needs from the network layer.
pub trait Connector: Send + Sync {
    /// Our externally visible endpoint, if one could be determined.
    fn external_address(&self) -> Option<NodeAddress>;

    /// Whether the endpoint accepts inbound connections.
    fn is_reachable(&self, address: &NodeAddress) -> bool;
}

/// Test/dev wallet with a hand-placed collateral.
#[derive(Default)]
pub struct MemoryWallet {
    unlocked: bool,
    collateral: Option<(CollateralRef, KeyPair)>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlock(&mut self) {
        self.unlocked = true;
    }

    pub fn lock(&mut self) {
        self.unlocked = false;
    }

    pub fn set_collateral(&mut self, outpoint: CollateralRef, key: KeyPair) {
        self.collateral = Some((outpoint, key));
    }
}

impl Wallet for MemoryWallet {
    fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn collateral_output(&self) -> Option<(CollateralRef, KeyPair)> {
        // KeyPair is deliberately not Clone; hand out a fresh copy of the
        // key material instead.
        self.collateral.as_ref().map(|(outpoint, kp)| {
            (*outpoint, KeyPair { public: kp.public, private: PrivateKey(kp.private.0) })
        })
    }
}

/// Fixed-answer connector for tests and the dev network.
pub struct StaticConnector {
    pub address: Option<NodeAddress>,
    pub reachable: bool,
}

impl Connector for StaticConnector {
    fn external_address(&self) -> Option<NodeAddress> {
        self.address
    }

    fn is_reachable(&self, _address: &NodeAddress) -> bool {
        self.reachable
    }
}
