//! In-process follower used to drive replicators end to end.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use peer_replicator::proto::AppendEntriesRequest;
use peer_replicator::proto::AppendEntriesResponse;
use peer_replicator::proto::SnapshotRequest;
use peer_replicator::proto::SnapshotResponse;
use peer_replicator::MemReplicationLog;
use peer_replicator::NetworkError;
use peer_replicator::Result;
use peer_replicator::Transport;
use peer_replicator::TypeConfig;
use tonic::async_trait;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimTypeConfig;

impl TypeConfig for SimTypeConfig {
    type L = MemReplicationLog;

    type TR = SimulatedFollower;
}

#[derive(Debug, Default)]
struct FollowerState {
    current_term: u64,
    commit_index: u64,
    snapshot_index: u64,
    snapshot_term: u64,
    /// index -> term
    entries: BTreeMap<u64, u64>,
    reachable: bool,
    refuse_snapshots: bool,
    append_calls: usize,
    snapshot_calls: usize,
}

impl FollowerState {
    fn last_index(&self) -> u64 {
        self.entries.keys().next_back().copied().unwrap_or(self.snapshot_index)
    }

    fn term_at(
        &self,
        index: u64,
    ) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        if index == self.snapshot_index {
            return Some(self.snapshot_term);
        }
        self.entries.get(&index).copied()
    }
}

/// A follower applying the log matching rule to whatever it receives.
#[derive(Debug)]
pub struct SimulatedFollower {
    peer_id: String,
    state: Mutex<FollowerState>,
}

impl SimulatedFollower {
    pub fn new(peer_id: &str) -> Arc<Self> {
        Arc::new(Self {
            peer_id: peer_id.to_string(),
            state: Mutex::new(FollowerState {
                reachable: true,
                ..Default::default()
            }),
        })
    }

    /// Seeds the follower log with `(index, term)` pairs and a commit index.
    pub fn preload(
        &self,
        entries: &[(u64, u64)],
        commit_index: u64,
    ) {
        let mut state = self.state.lock();
        for &(index, term) in entries {
            state.entries.insert(index, term);
        }
        state.commit_index = commit_index;
    }

    pub fn set_reachable(
        &self,
        reachable: bool,
    ) {
        self.state.lock().reachable = reachable;
    }

    pub fn refuse_snapshots(&self) {
        self.state.lock().refuse_snapshots = true;
    }

    pub fn log(&self) -> Vec<(u64, u64)> {
        self.state.lock().entries.iter().map(|(i, t)| (*i, *t)).collect()
    }

    pub fn last_index(&self) -> u64 {
        self.state.lock().last_index()
    }

    pub fn commit_index(&self) -> u64 {
        self.state.lock().commit_index
    }

    pub fn snapshot_index(&self) -> u64 {
        self.state.lock().snapshot_index
    }

    pub fn append_calls(&self) -> usize {
        self.state.lock().append_calls
    }

    pub fn snapshot_calls(&self) -> usize {
        self.state.lock().snapshot_calls
    }
}

#[async_trait]
impl Transport for SimulatedFollower {
    async fn send_append_entries(
        &self,
        peer_id: &str,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        assert_eq!(peer_id, self.peer_id);
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(NetworkError::ServiceUnavailable(peer_id.to_string()).into());
        }
        state.append_calls += 1;
        state.current_term = state.current_term.max(req.term);

        if state.term_at(req.prev_log_index) != Some(req.prev_log_term) {
            return Ok(AppendEntriesResponse {
                term: state.current_term,
                success: false,
                commit_index: state.commit_index,
            });
        }

        for entry in &req.entries {
            if let Some(term) = state.entries.get(&entry.index) {
                if *term == entry.term {
                    continue;
                }
                // Drop the conflicting suffix
                let _ = state.entries.split_off(&entry.index);
            }
            state.entries.insert(entry.index, entry.term);
        }

        let last_new = req.last_entry_index().unwrap_or(req.prev_log_index);
        if req.leader_commit_index > state.commit_index {
            state.commit_index = req.leader_commit_index.min(last_new);
        }

        Ok(AppendEntriesResponse {
            term: state.current_term,
            success: true,
            commit_index: state.commit_index,
        })
    }

    async fn send_snapshot(
        &self,
        peer_id: &str,
        req: SnapshotRequest,
    ) -> Result<SnapshotResponse> {
        assert_eq!(peer_id, self.peer_id);
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(NetworkError::ServiceUnavailable(peer_id.to_string()).into());
        }
        state.snapshot_calls += 1;
        state.current_term = state.current_term.max(req.term);

        if state.refuse_snapshots {
            return Ok(SnapshotResponse {
                term: state.current_term,
                success: false,
                last_included_index: 0,
            });
        }

        state.entries.clear();
        state.snapshot_index = req.last_included_index;
        state.snapshot_term = req.last_included_term;
        state.commit_index = req.last_included_index;

        Ok(SnapshotResponse {
            term: state.current_term,
            success: true,
            last_included_index: req.last_included_index,
        })
    }
}

/// Leader log holding `terms.len()` entries, entry `i + 1` at `terms[i]`.
pub fn leader_log(terms: &[u64]) -> Arc<MemReplicationLog> {
    let log = MemReplicationLog::new("n1", 1, 4);
    for &term in terms {
        log.set_current_term(term);
        log.append(vec![]);
    }
    Arc::new(log)
}
