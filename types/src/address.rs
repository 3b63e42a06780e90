use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Advertised network endpoint of a service node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress(pub SocketAddr);

impl NodeAddress {
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Loopback or RFC1918 private address.
    pub fn is_local(&self) -> bool {
        match self.0.ip() {
            IpAddr::V4(ip) => ip.is_loopback() || ip.is_private() || ip.is_unspecified(),
            IpAddr::V6(ip) => ip.is_loopback() || ip.is_unspecified(),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        NodeAddress(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_address_detection() {
        let local: NodeAddress = "127.0.0.1:9433".parse::<SocketAddr>().unwrap().into();
        assert!(local.is_local());
        let private: NodeAddress = "192.168.1.5:9433".parse::<SocketAddr>().unwrap().into();
        assert!(private.is_local());
        let public: NodeAddress = "203.0.113.9:9433".parse::<SocketAddr>().unwrap().into();
        assert!(!public.is_local());
    }
}
