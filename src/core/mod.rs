mod replication;
mod timer;

pub use replication::*;
pub use timer::*;


/// Whether a follower reported a term newer than the leader's.
///
/// The leader steps down when this returns true for any
/// [`FlushResponse`] it receives.
pub fn if_higher_term_found(
    my_current_term: u64,
    term: u64,
) -> bool {
    if my_current_term < term {
        tracing::warn!("follower term {} is ahead of leader term {}", term, my_current_term);
        return true;
    }

    false
}
