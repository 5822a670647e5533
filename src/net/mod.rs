//! Network collaborators
//!
//! The connection manager never touches the operating system directly;
//! it drives a virtual network interface and a server reachability probe
//! through the traits defined here. Production code supplies real
//! platform implementations, tests supply mocks.

mod interface;
mod probe;

pub use interface::{
    InterfaceConfig, InterfaceHandle, InterfaceProvider, LoopbackHandle, LoopbackInterface, Route,
};
pub use probe::{ReachabilityProbe, TcpProbe};

use thiserror::Error;

/// Virtual interface errors
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// Interface establishment was refused (permissions, platform policy)
    #[error("interface establishment denied: {0}")]
    Denied(String),

    /// The interface was closed; counters can no longer be sampled
    #[error("interface closed")]
    Closed,

    #[error("interface I/O error: {0}")]
    Io(#[from] std::io::Error),
}
