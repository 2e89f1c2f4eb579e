//! Leader-side replication agent for a single follower.
//!
//! A [`PeerReplicator`] owns the follower's replication cursor
//! (`prev_log_index`) and a heartbeat timer. Two callers reach the same
//! dispatch logic:
//! - the background heartbeat loop, on every timer tick;
//! - the leader, through [`PeerReplicator::internal_flush`], right after
//!   new entries are appended.
//!
//! # Locking
//! The agent lock is held across the RPC, so at most one request is in
//! flight per follower. The heartbeat loop copies the cursor and releases
//! the agent lock before asking the log for a request, then takes the
//! agent lock again to dispatch. The agent lock is never awaited while the
//! log is being consulted from the heartbeat path. A heartbeat whose cursor
//! moved while it was unlocked is dropped rather than dispatched.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::FlushResponse;
use crate::alias::LOF;
use crate::alias::TROF;
use crate::proto::AppendEntriesRequest;
use crate::proto::SnapshotRequest;
use crate::HeartbeatConfig;
use crate::HeartbeatTicker;
use crate::HeartbeatTimer;
use crate::NetworkError;
use crate::ReplicationError;
use crate::ReplicationLog;
use crate::Result;
use crate::SchedulerState;
use crate::SharedInterval;
use crate::Transport;
use crate::TypeConfig;
use crate::PEER_PREV_LOG_INDEX;
use crate::REPLICATION_RPC_COUNTER;

const APPEND: &str = "append";
const SNAPSHOT: &str = "snapshot";

#[derive(Debug)]
struct PeerState {
    /// Last log index known to be present on the follower
    prev_log_index: u64,
    /// `None` once the agent is stopped
    heartbeat_timer: Option<HeartbeatTimer>,
}

impl PeerState {
    fn scheduler_state(&self) -> SchedulerState {
        self.heartbeat_timer
            .as_ref()
            .map(|t| t.state())
            .unwrap_or(SchedulerState::Stopped)
    }

    fn is_running(&self) -> bool {
        self.scheduler_state() == SchedulerState::Running
    }

    fn postpone_heartbeat(&self) {
        if let Some(timer) = &self.heartbeat_timer {
            timer.postpone();
        }
    }
}

enum ReplicationRequest {
    Append(Option<AppendEntriesRequest>),
    Snapshot(Option<SnapshotRequest>),
}

pub struct PeerReplicator<T>
where
    T: TypeConfig,
{
    peer_id: String,
    log: Arc<LOF<T>>,
    transport: Arc<TROF<T>>,
    heartbeat_interval: SharedInterval,
    state: Mutex<PeerState>,
    heartbeat_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<T> std::fmt::Debug for PeerReplicator<T>
where
    T: TypeConfig,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PeerReplicator")
            .field("peer_id", &self.peer_id)
            .field("heartbeat_interval", &self.heartbeat_interval())
            .finish()
    }
}

impl<T> PeerReplicator<T>
where
    T: TypeConfig,
{
    /// Creates an agent with an empty replication cursor.
    ///
    /// See [`create_with_prev_log_index`](Self::create_with_prev_log_index).
    pub async fn create(
        peer_id: impl Into<String>,
        log: Arc<LOF<T>>,
        transport: Arc<TROF<T>>,
        heartbeat_interval: Duration,
    ) -> Result<Arc<Self>> {
        Self::create_with_prev_log_index(peer_id, log, transport, heartbeat_interval, 0).await
    }

    pub async fn create_with_config(
        peer_id: impl Into<String>,
        log: Arc<LOF<T>>,
        transport: Arc<TROF<T>>,
        config: &HeartbeatConfig,
    ) -> Result<Arc<Self>> {
        Self::create(peer_id, log, transport, config.heartbeat_interval()).await
    }

    /// Creates an agent and starts its heartbeat loop.
    ///
    /// Returns only after the loop is ready to receive ticks, so `pause` or
    /// `stop` issued right after creation always reach a live loop.
    pub async fn create_with_prev_log_index(
        peer_id: impl Into<String>,
        log: Arc<LOF<T>>,
        transport: Arc<TROF<T>>,
        heartbeat_interval: Duration,
        prev_log_index: u64,
    ) -> Result<Arc<Self>> {
        let peer_id = peer_id.into();
        let heartbeat_interval: SharedInterval = Arc::new(RwLock::new(heartbeat_interval));
        let timer = HeartbeatTimer::new(heartbeat_interval.clone());
        let ticker = timer.ticker();

        let replicator = Arc::new(Self {
            peer_id: peer_id.clone(),
            log,
            transport,
            heartbeat_interval,
            state: Mutex::new(PeerState {
                prev_log_index,
                heartbeat_timer: Some(timer),
            }),
            heartbeat_task: parking_lot::Mutex::new(None),
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(Self::heartbeat_loop(
            Arc::downgrade(&replicator),
            peer_id.clone(),
            ticker,
            ready_tx,
        ));
        *replicator.heartbeat_task.lock() = Some(handle);

        ready_rx.await.map_err(|e| {
            error!("[{}] heartbeat loop did not start: {:?}", peer_id, e);
            NetworkError::SignalReceiveFailed(format!("heartbeat loop for {peer_id} did not start"))
        })?;

        PEER_PREV_LOG_INDEX
            .with_label_values(&[&peer_id])
            .set(prev_log_index as i64);
        info!("[{}] replicator created, prev_log_index={}", peer_id, prev_log_index);
        Ok(replicator)
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn heartbeat_interval(&self) -> Duration {
        *self.heartbeat_interval.read()
    }

    /// Takes effect from the next scheduling cycle; the current countdown
    /// is left untouched.
    pub fn set_heartbeat_interval(
        &self,
        interval: Duration,
    ) {
        debug!("[{}] heartbeat interval set to {:?}", self.peer_id, interval);
        *self.heartbeat_interval.write() = interval;
    }

    pub async fn prev_log_index(&self) -> u64 {
        self.state.lock().await.prev_log_index
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.state.lock().await.scheduler_state()
    }

    /// Whether the background heartbeat loop has exited.
    pub fn is_heartbeat_finished(&self) -> bool {
        self.heartbeat_task
            .lock()
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    //--------------------------------------
    // Lifecycle
    //--------------------------------------

    /// Re-arms the heartbeat timer. Safe on a running agent.
    pub async fn resume(&self) {
        let state = self.state.lock().await;
        if let Some(timer) = &state.heartbeat_timer {
            timer.reset();
            info!("[{}] replication resumed", self.peer_id);
        }
    }

    /// Suspends heartbeats and flushes, keeping the cursor.
    pub async fn pause(&self) {
        let state = self.state.lock().await;
        if let Some(timer) = &state.heartbeat_timer {
            timer.pause();
            info!("[{}] replication paused", self.peer_id);
        }
    }

    /// Tears the timer down for good. Waits for an in-flight dispatch to
    /// finish; the heartbeat loop exits on its own afterwards.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.heartbeat_timer.take() {
            timer.stop();
            info!("[{}] replication stopped", self.peer_id);
        }
    }

    //--------------------------------------
    // Flush
    //--------------------------------------

    /// Replicates to the follower right away instead of waiting for the
    /// next heartbeat. Called by the leader after appending entries.
    ///
    /// # Errors
    /// - [`ReplicationError::PeerPaused`] / [`ReplicationError::PeerStopped`]
    ///   when the agent is not running; the transport is not contacted.
    /// - Transport errors when no response came back; the cursor is kept.
    /// - [`ReplicationError::SnapshotRejected`] when the follower refuses a
    ///   snapshot. This is fatal for the follower.
    pub async fn internal_flush(&self) -> Result<FlushResponse> {
        let mut state = self.state.lock().await;
        match state.scheduler_state() {
            SchedulerState::Running => {}
            SchedulerState::Paused => return Err(ReplicationError::PeerPaused(self.peer_id.clone()).into()),
            SchedulerState::Stopped => return Err(ReplicationError::PeerStopped(self.peer_id.clone()).into()),
        }

        let request = self.build_request(state.prev_log_index);
        self.dispatch(&mut state, request).await
    }

    fn build_request(
        &self,
        prev_log_index: u64,
    ) -> ReplicationRequest {
        // Re-evaluated on every dispatch: compaction may have moved it.
        let start_index = self.log.start_index();
        if prev_log_index < start_index {
            debug!(
                "[{}] prev_log_index {} behind retained log start {}, sending snapshot",
                self.peer_id, prev_log_index, start_index
            );
            ReplicationRequest::Snapshot(self.log.build_snapshot_request())
        } else {
            ReplicationRequest::Append(self.log.build_append_request(prev_log_index))
        }
    }

    async fn dispatch(
        &self,
        state: &mut PeerState,
        request: ReplicationRequest,
    ) -> Result<FlushResponse> {
        match request {
            ReplicationRequest::Append(req) => self.send_append_request(state, req).await,
            ReplicationRequest::Snapshot(req) => self.send_snapshot_request(state, req).await,
        }
    }

    async fn send_append_request(
        &self,
        state: &mut PeerState,
        req: Option<AppendEntriesRequest>,
    ) -> Result<FlushResponse> {
        let req = req.ok_or(ReplicationError::RequestRequired)?;
        let last_entry_index = req.last_entry_index();
        trace!(
            "[{}] append prev_log_index={} entries={}",
            self.peer_id,
            req.prev_log_index,
            req.entries.len()
        );

        let result = self.transport.send_append_entries(&self.peer_id, req).await;
        state.postpone_heartbeat();

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!("[{}] append entries failed: {}", self.peer_id, e);
                self.record(APPEND, "error", state.prev_log_index);
                return Err(e);
            }
        };

        if resp.success {
            if let Some(index) = last_entry_index {
                state.prev_log_index = index;
            }
            self.record(APPEND, "success", state.prev_log_index);
        } else {
            // Step back one entry, but never below what the follower has
            // already committed.
            let prior = state.prev_log_index;
            state.prev_log_index = prior.saturating_sub(1).max(resp.commit_index);
            debug!(
                "[{}] log mismatch, prev_log_index {} -> {} (follower commit {})",
                self.peer_id, prior, state.prev_log_index, resp.commit_index
            );
            self.record(APPEND, "rejected", state.prev_log_index);
        }

        Ok(FlushResponse {
            term: resp.term,
            success: resp.success,
        })
    }

    async fn send_snapshot_request(
        &self,
        state: &mut PeerState,
        req: Option<SnapshotRequest>,
    ) -> Result<FlushResponse> {
        let req = req.ok_or(ReplicationError::RequestRequired)?;
        let sent_index = req.last_included_index;
        debug!(
            "[{}] snapshot last_included_index={} ({} bytes)",
            self.peer_id,
            req.last_included_index,
            req.data.len()
        );

        let result = self.transport.send_snapshot(&self.peer_id, req).await;
        state.postpone_heartbeat();

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!("[{}] snapshot transfer failed: {}", self.peer_id, e);
                self.record(SNAPSHOT, "error", state.prev_log_index);
                return Err(e);
            }
        };

        if !resp.success {
            error!(
                "[{}] follower rejected snapshot at term {}, prev_log_index stays {}",
                self.peer_id, resp.term, state.prev_log_index
            );
            self.record(SNAPSHOT, "rejected", state.prev_log_index);
            return Err(ReplicationError::SnapshotRejected {
                peer_id: self.peer_id.clone(),
                term: resp.term,
            }
            .into());
        }

        if resp.last_included_index != sent_index {
            warn!(
                "[{}] follower acknowledged snapshot at {} but {} was sent",
                self.peer_id, resp.last_included_index, sent_index
            );
        }
        // The cursor never exceeds the index that was sent
        state.prev_log_index = sent_index;
        self.record(SNAPSHOT, "success", state.prev_log_index);
        info!(
            "[{}] snapshot installed, prev_log_index={}",
            self.peer_id, state.prev_log_index
        );

        Ok(FlushResponse {
            term: resp.term,
            success: resp.success,
        })
    }

    fn record(
        &self,
        kind: &str,
        outcome: &str,
        prev_log_index: u64,
    ) {
        REPLICATION_RPC_COUNTER
            .with_label_values(&[&self.peer_id, kind, outcome])
            .inc();
        PEER_PREV_LOG_INDEX
            .with_label_values(&[&self.peer_id])
            .set(prev_log_index as i64);
    }

    //--------------------------------------
    // Heartbeat
    //--------------------------------------

    async fn heartbeat_loop(
        replicator: Weak<Self>,
        peer_id: String,
        mut ticker: HeartbeatTicker,
        ready: oneshot::Sender<()>,
    ) {
        let _ = ready.send(());
        debug!("[{}] heartbeat loop started", peer_id);

        while ticker.tick().await.is_some() {
            let Some(replicator) = replicator.upgrade() else {
                break;
            };
            replicator.heartbeat().await;
        }

        debug!("[{}] heartbeat loop exited", peer_id);
    }

    async fn heartbeat(&self) {
        let prev_log_index = {
            let state = self.state.lock().await;
            if !state.is_running() {
                return;
            }
            state.prev_log_index
        };

        let request = self.build_request(prev_log_index);

        let mut state = self.state.lock().await;
        if !state.is_running() {
            trace!("[{}] scheduler left running state, skip heartbeat", self.peer_id);
            return;
        }
        // A flush got in between and already dispatched (and postponed the
        // timer); the request built above is stale.
        if state.prev_log_index != prev_log_index {
            trace!(
                "[{}] prev_log_index moved {} -> {}, skip heartbeat",
                self.peer_id, prev_log_index, state.prev_log_index
            );
            return;
        }

        match self.dispatch(&mut state, request).await {
            Ok(resp) => trace!("[{}] heartbeat response: {:?}", self.peer_id, resp),
            Err(e) if e.is_fatal() => {
                // Do not resend the same snapshot every tick; the leader
                // decides whether to resume or stop this follower.
                error!("[{}] pausing replication: {}", self.peer_id, e);
                if let Some(timer) = &state.heartbeat_timer {
                    timer.pause();
                }
            }
            Err(e) => debug!("[{}] heartbeat dispatch failed: {}", self.peer_id, e),
        }
    }
}
