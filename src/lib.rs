//! Leader-side replication agents for a Raft cluster.
//!
//! One [`PeerReplicator`] runs per follower. It tracks how far the
//! follower's log has progressed, picks between incremental appends and a
//! snapshot transfer when the follower falls behind the retained log, and
//! keeps the follower alive with adaptive heartbeats: any real traffic to
//! a follower postpones its next idle heartbeat.
//!
//! The log ([`ReplicationLog`]) and the wire ([`Transport`]) are
//! collaborators bound through [`TypeConfig`].

mod config;
mod core;
mod errors;
mod metrics;
mod network;
pub mod proto;
mod storage;
mod type_config;

pub use self::config::*;
pub use self::core::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use storage::*;
pub use type_config::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub use test_utils::*;
