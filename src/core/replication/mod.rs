mod peer_replicator;

pub use peer_replicator::*;


/// Term and acceptance reported by the follower for one dispatch.
///
/// The leader uses `term` to detect a newer election term and `success`
/// to decide whether the entries just sent may count toward quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushResponse {
    pub term: u64,
    pub success: bool,
}
