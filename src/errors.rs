//! Replication Agent Error Hierarchy
//!
//! Errors are grouped by the layer that produced them: infrastructure
//! (network), configuration, and the replication protocol itself.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, background tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Raft replication protocol violations and failures
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl Error {
    /// Whether the error must not be retried by the next heartbeat or flush.
    ///
    /// A follower that logically rejects a snapshot has diverged in a way
    /// the back-off step cannot repair.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Consensus(ConsensusError::Replication(ReplicationError::SnapshotRejected { .. }))
        )
    }

    /// Whether the error means no response came back from the follower.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Error::System(SystemError::Network(_)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Endpoint unavailable (HTTP 503 equivalent)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Peer communication timeout
    #[error("Connection timeout to {peer_id} after {duration:?}")]
    Timeout { peer_id: String, duration: Duration },

    /// Persistent connection failures
    #[error("Socket connect failed error")]
    ConnectError,

    /// Malformed peer addresses
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// No address registered for the follower
    #[error("Peer {0} not found in transport")]
    PeerNotFound(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),

    #[error("{0}")]
    SignalReceiveFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Log replication failures (Section 5.3 Raft paper)
    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The log provider produced no request to dispatch
    #[error("Request required")]
    RequestRequired,

    /// Follower answered a snapshot transfer with success = false
    #[error("Peer {peer_id} rejected snapshot at term {term}")]
    SnapshotRejected { peer_id: String, term: u64 },

    #[error("Replication to peer {0} is paused")]
    PeerPaused(String),

    #[error("Replication to peer {0} is stopped")]
    PeerStopped(String),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<ReplicationError> for Error {
    fn from(e: ReplicationError) -> Self {
        Error::Consensus(ConsensusError::Replication(e))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        NetworkError::TonicStatusError(Box::new(status)).into()
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        NetworkError::TonicError(Box::new(e)).into()
    }
}
