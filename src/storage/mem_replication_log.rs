use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::proto::AppendEntriesRequest;
use crate::proto::Entry;
use crate::proto::SnapshotRequest;
use crate::HeartbeatConfig;
use crate::ReplicationLog;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    pub last_included_index: u64,
    pub last_included_term: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemLogState {
    current_term: u64,
    commit_index: u64,
    entries: BTreeMap<u64, Entry>,
    snapshot: Option<SnapshotMeta>,
}

impl MemLogState {
    fn start_index(&self) -> u64 {
        self.snapshot.as_ref().map(|s| s.last_included_index).unwrap_or(0)
    }

    fn last_index(&self) -> u64 {
        self.entries
            .keys()
            .next_back()
            .copied()
            .unwrap_or_else(|| self.start_index())
    }

    fn term_at(
        &self,
        index: u64,
    ) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        if let Some(entry) = self.entries.get(&index) {
            return Some(entry.term);
        }
        self.snapshot
            .as_ref()
            .filter(|s| s.last_included_index == index)
            .map(|s| s.last_included_term)
    }
}

/// In-memory leader log with snapshot compaction.
#[derive(Debug)]
pub struct MemReplicationLog {
    leader_id: String,
    max_entries_per_request: u64,
    state: RwLock<MemLogState>,
}

impl MemReplicationLog {
    pub fn new(
        leader_id: impl Into<String>,
        current_term: u64,
        max_entries_per_request: u64,
    ) -> Self {
        Self {
            leader_id: leader_id.into(),
            max_entries_per_request: max_entries_per_request.max(1),
            state: RwLock::new(MemLogState {
                current_term,
                ..Default::default()
            }),
        }
    }

    pub fn from_config(
        leader_id: impl Into<String>,
        current_term: u64,
        config: &HeartbeatConfig,
    ) -> Self {
        Self::new(leader_id, current_term, config.max_entries_per_request)
    }

    /// Append a command at the current term, returning its index.
    pub fn append(
        &self,
        command: Vec<u8>,
    ) -> u64 {
        let mut state = self.state.write();
        let index = state.last_index() + 1;
        let term = state.current_term;
        state.entries.insert(index, Entry { index, term, command });
        trace!("appended entry {} at term {}", index, term);
        index
    }

    pub fn last_index(&self) -> u64 {
        self.state.read().last_index()
    }

    pub fn current_term(&self) -> u64 {
        self.state.read().current_term
    }

    pub fn set_current_term(
        &self,
        term: u64,
    ) {
        self.state.write().current_term = term;
    }

    pub fn commit_index(&self) -> u64 {
        self.state.read().commit_index
    }

    pub fn set_commit_index(
        &self,
        commit_index: u64,
    ) {
        let mut state = self.state.write();
        state.commit_index = commit_index.min(state.last_index());
    }

    pub fn snapshot(&self) -> Option<SnapshotMeta> {
        self.state.read().snapshot.clone()
    }

    /// Fold every entry up to and including `index` into a snapshot
    /// carrying `data`, dropping those entries from the log.
    ///
    /// Returns false when `index` is not ahead of the current snapshot or
    /// not present in the log.
    pub fn compact_up_to(
        &self,
        index: u64,
        data: Vec<u8>,
    ) -> bool {
        let mut state = self.state.write();
        if index <= state.start_index() || index > state.last_index() {
            warn!(
                "ignore compaction to {}: retained range is ({}, {}]",
                index,
                state.start_index(),
                state.last_index()
            );
            return false;
        }

        let last_included_term = match state.term_at(index) {
            Some(term) => term,
            None => return false,
        };
        state.entries = state.entries.split_off(&(index + 1));
        state.snapshot = Some(SnapshotMeta {
            last_included_index: index,
            last_included_term,
            data,
        });
        debug!("log compacted up to {} (term {})", index, last_included_term);
        true
    }
}

impl ReplicationLog for MemReplicationLog {
    fn start_index(&self) -> u64 {
        self.state.read().start_index()
    }

    fn build_append_request(
        &self,
        prev_log_index: u64,
    ) -> Option<AppendEntriesRequest> {
        let state = self.state.read();
        if prev_log_index < state.start_index() || prev_log_index > state.last_index() {
            debug!(
                "cannot build append request after {}: retained range is ({}, {}]",
                prev_log_index,
                state.start_index(),
                state.last_index()
            );
            return None;
        }

        let prev_log_term = state.term_at(prev_log_index)?;
        let until = state
            .last_index()
            .min(prev_log_index.saturating_add(self.max_entries_per_request));
        let entries: Vec<Entry> = if until > prev_log_index {
            state
                .entries
                .range(prev_log_index + 1..=until)
                .map(|(_, e)| e.clone())
                .collect()
        } else {
            Vec::new()
        };

        Some(AppendEntriesRequest {
            term: state.current_term,
            leader_id: self.leader_id.clone(),
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit_index: state.commit_index,
        })
    }

    fn build_snapshot_request(&self) -> Option<SnapshotRequest> {
        let state = self.state.read();
        let snapshot = state.snapshot.as_ref()?;
        Some(SnapshotRequest {
            term: state.current_term,
            leader_id: self.leader_id.clone(),
            last_included_index: snapshot.last_included_index,
            last_included_term: snapshot.last_included_term,
            data: snapshot.data.clone(),
        })
    }
}
