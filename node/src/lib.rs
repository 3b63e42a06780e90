//! Assembly of the Obol service-node subsystem: configuration, checkpoint
//! persistence, message dispatch, and the background maintenance tasks.

mod config;
mod error;
mod node;
mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{NodeStatus, ObolNode};
pub use shutdown::ShutdownController;
