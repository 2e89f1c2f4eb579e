//! Followers that are behind, diverged or compacted away catch up with the
//! leader through a single replicator.

use std::sync::Arc;
use std::time::Duration;

use peer_replicator::ConsensusError;
use peer_replicator::Error;
use peer_replicator::PeerReplicator;
use peer_replicator::ReplicationError;
use peer_replicator::SchedulerState;

use crate::common::leader_log;
use crate::common::SimTypeConfig;
use crate::common::SimulatedFollower;

/// Heartbeats stay out of the way of flush-driven tests.
const IDLE: Duration = Duration::from_secs(3600);

async fn flush_until_caught_up(
    replicator: &PeerReplicator<SimTypeConfig>,
    follower: &SimulatedFollower,
    leader_last_index: u64,
) -> usize {
    let mut rounds = 0;
    while replicator.prev_log_index().await != leader_last_index || follower.last_index() != leader_last_index {
        rounds += 1;
        assert!(rounds <= 50, "replication did not converge");
        replicator.internal_flush().await.expect("follower reachable");
    }
    rounds
}

/// Scenario:
/// 1. Leader holds 10 entries at term 1 and commit index 10.
/// 2. Follower is empty; the cursor starts at the leader's last index.
///
/// Expected: the cursor backs off to 0, then entries are shipped in
/// batches of 4 and the follower ends with the leader's log and commit.
#[tokio::test]
async fn test_empty_follower_converges_from_optimistic_cursor() {
    let log = leader_log(&[1; 10]);
    log.set_commit_index(10);
    let follower = SimulatedFollower::new("n2");

    let replicator = PeerReplicator::<SimTypeConfig>::create_with_prev_log_index(
        "n2",
        log.clone(),
        follower.clone(),
        IDLE,
        10,
    )
    .await
    .unwrap();

    let rounds = flush_until_caught_up(&replicator, &follower, 10).await;

    // 10 rejections, then 3 batches
    assert_eq!(rounds, 13);
    assert_eq!(follower.log(), (1..=10).map(|i| (i, 1)).collect::<Vec<_>>());
    assert_eq!(follower.commit_index(), 10);
    assert_eq!(follower.snapshot_calls(), 0);
}

/// Scenario:
/// 1. Leader log: 1..=3 at term 1, 4..=8 at term 3.
/// 2. Follower log: 1..=3 at term 1, 4..=5 at term 2, committed up to 3.
///
/// Expected: back-off stops at the follower's commit index and the stale
/// term-2 suffix is overwritten.
#[tokio::test]
async fn test_diverged_follower_suffix_is_replaced() {
    let log = leader_log(&[1, 1, 1, 3, 3, 3, 3, 3]);
    let follower = SimulatedFollower::new("n2");
    follower.preload(&[(1, 1), (2, 1), (3, 1), (4, 2), (5, 2)], 3);

    let replicator = PeerReplicator::<SimTypeConfig>::create_with_prev_log_index(
        "n2",
        log.clone(),
        follower.clone(),
        IDLE,
        8,
    )
    .await
    .unwrap();

    flush_until_caught_up(&replicator, &follower, 8).await;

    assert_eq!(
        follower.log(),
        vec![(1, 1), (2, 1), (3, 1), (4, 3), (5, 3), (6, 3), (7, 3), (8, 3)]
    );
}

/// Scenario:
/// 1. Leader holds 20 entries, compacted up to 12.
/// 2. Follower is empty.
///
/// Expected: one snapshot moves the cursor to 12, appends cover the rest.
#[tokio::test]
async fn test_follower_behind_compaction_receives_snapshot() {
    let log = leader_log(&[1; 20]);
    assert!(log.compact_up_to(12, b"state@12".to_vec()));
    let follower = SimulatedFollower::new("n2");

    let replicator = PeerReplicator::<SimTypeConfig>::create("n2", log.clone(), follower.clone(), IDLE)
        .await
        .unwrap();

    let resp = replicator.internal_flush().await.unwrap();
    assert!(resp.success);
    assert_eq!(replicator.prev_log_index().await, 12);
    assert_eq!(follower.snapshot_index(), 12);

    flush_until_caught_up(&replicator, &follower, 20).await;

    assert_eq!(follower.snapshot_calls(), 1);
    assert_eq!(follower.log(), (13..=20).map(|i| (i, 1)).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_unreachable_follower_keeps_cursor() {
    let log = leader_log(&[1; 3]);
    let follower = SimulatedFollower::new("n2");
    follower.set_reachable(false);

    let replicator = PeerReplicator::<SimTypeConfig>::create("n2", log.clone(), follower.clone(), IDLE)
        .await
        .unwrap();

    let err = replicator.internal_flush().await.unwrap_err();
    assert!(err.is_transport_failure());
    assert_eq!(replicator.prev_log_index().await, 0);

    follower.set_reachable(true);
    flush_until_caught_up(&replicator, &follower, 3).await;
    assert_eq!(follower.append_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_alone_bring_follower_up_to_date() {
    let log = leader_log(&[1; 10]);
    let follower = SimulatedFollower::new("n2");

    let replicator = PeerReplicator::<SimTypeConfig>::create_with_prev_log_index(
        "n2",
        log.clone(),
        follower.clone(),
        Duration::from_millis(50),
        10,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(replicator.prev_log_index().await, 10);
    assert_eq!(follower.last_index(), 10);

    // New entries ride the next heartbeat
    log.append(vec![]);
    log.append(vec![]);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(follower.last_index(), 12);

    replicator.stop().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(replicator.is_heartbeat_finished());
}

/// Scenario: the follower refuses every snapshot.
///
/// Expected: the heartbeat loop sends one snapshot and pauses; flushes
/// are refused until the leader resumes the follower.
#[tokio::test(start_paused = true)]
async fn test_refused_snapshot_pauses_replication() {
    let log = leader_log(&[1; 8]);
    assert!(log.compact_up_to(5, b"state@5".to_vec()));
    let follower = SimulatedFollower::new("n2");
    follower.refuse_snapshots();

    let replicator = PeerReplicator::<SimTypeConfig>::create("n2", log.clone(), follower.clone(), Duration::from_millis(50))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(follower.snapshot_calls(), 1);
    assert_eq!(replicator.scheduler_state().await, SchedulerState::Paused);
    assert_eq!(replicator.prev_log_index().await, 0);
    assert!(matches!(
        replicator.internal_flush().await,
        Err(Error::Consensus(ConsensusError::Replication(ReplicationError::PeerPaused(_))))
    ));

    replicator.resume().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(follower.snapshot_calls(), 2);
    assert_eq!(replicator.scheduler_state().await, SchedulerState::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_independent_followers_progress_separately() {
    let log = leader_log(&[1; 6]);
    let fast = SimulatedFollower::new("n2");
    let slow = SimulatedFollower::new("n3");
    slow.set_reachable(false);

    let interval = Duration::from_millis(50);
    let replicators: Vec<Arc<PeerReplicator<SimTypeConfig>>> = vec![
        PeerReplicator::<SimTypeConfig>::create("n2", log.clone(), fast.clone(), interval).await.unwrap(),
        PeerReplicator::<SimTypeConfig>::create("n3", log.clone(), slow.clone(), interval).await.unwrap(),
    ];

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(replicators[0].prev_log_index().await, 6);
    assert_eq!(replicators[1].prev_log_index().await, 0);
    assert_eq!(replicators[1].scheduler_state().await, SchedulerState::Running);

    slow.set_reachable(true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(replicators[1].prev_log_index().await, 6);
    assert_eq!(slow.log(), fast.log());
}
