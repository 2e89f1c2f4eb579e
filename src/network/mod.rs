//! Network abstraction used by the replication agents.
//!
//! An agent hands a request to [`Transport`] and either receives the
//! follower's response or an error meaning no response arrived. The
//! transport's own timeout is the only cancellation applied to an
//! in-flight RPC.
pub mod grpc;

pub use grpc::*;

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::proto::SnapshotRequest;
use crate::proto::SnapshotResponse;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one AppendEntries RPC to `peer_id`.
    ///
    /// # Errors
    /// Any `Err` means no response was received (timeout, connection
    /// failure, malformed response). A follower that rejects the request
    /// answers with `Ok` and `success == false`.
    async fn send_append_entries(
        &self,
        peer_id: &str,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;

    /// Sends one InstallSnapshot RPC to `peer_id`.
    async fn send_snapshot(
        &self,
        peer_id: &str,
        req: SnapshotRequest,
    ) -> Result<SnapshotResponse>;
}
