//! Log and snapshot provider consumed by the replication agents.

mod mem_replication_log;
mod replication_log;

pub use mem_replication_log::*;
pub use replication_log::*;
