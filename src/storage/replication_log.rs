//! Core model for replication: ReplicationLog Definition

#[cfg(test)]
use mockall::automock;

use crate::proto::AppendEntriesRequest;
use crate::proto::SnapshotRequest;

/// Leader-side view of the log used to build replication requests.
///
/// Implementations guard their own state. Callers must not hold a
/// replication agent lock while blocking on this provider from the
/// heartbeat path.
#[cfg_attr(test, automock)]
pub trait ReplicationLog: Send + Sync + 'static {
    /// Index of the last entry folded into the latest snapshot, 0 if the
    /// log was never compacted.
    ///
    /// Any `prev_log_index >= start_index()` can still be served with an
    /// incremental append; anything below requires a snapshot transfer.
    fn start_index(&self) -> u64;

    /// Build an append request for entries after `prev_log_index`.
    fn build_append_request(
        &self,
        prev_log_index: u64,
    ) -> Option<AppendEntriesRequest>;

    /// Build a request carrying the latest snapshot.
    fn build_snapshot_request(&self) -> Option<SnapshotRequest>;
}
