use std::fmt::Debug;

use crate::GrpcTransport;
use crate::MemReplicationLog;
use crate::ReplicationLog;
use crate::Transport;

/// **This coding style learned from OpenRaft project type config.**
pub trait TypeConfig:
    Sync + Send + Sized + Debug + Clone + Copy + Default + Eq + PartialEq + Ord + PartialOrd + 'static
{
    type L: ReplicationLog;

    type TR: Transport;
}

pub mod alias {
    use super::TypeConfig;

    pub type LOF<T> = <T as TypeConfig>::L;

    pub type TROF<T> = <T as TypeConfig>::TR;
}

/// In-memory log replicated over gRPC.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct GrpcTypeConfig;

impl TypeConfig for GrpcTypeConfig {
    type L = MemReplicationLog;

    type TR = GrpcTransport;
}
