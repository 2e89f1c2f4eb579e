use crate::MemReplicationLog;
use crate::MockReplicationLog;
use crate::MockTransport;
use crate::ScriptedTransport;
use crate::TypeConfig;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockTypeConfig;

impl TypeConfig for MockTypeConfig {
    type L = MockReplicationLog;

    type TR = MockTransport;
}

/// Real in-memory log driven through a [`ScriptedTransport`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct ScriptedTypeConfig;

impl TypeConfig for ScriptedTypeConfig {
    type L = MemReplicationLog;

    type TR = ScriptedTransport;
}

/// Mocked log with a scripted transport, for tests that need both exact
/// request contents and real RPC latency.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockLogTypeConfig;

impl TypeConfig for MockLogTypeConfig {
    type L = MockReplicationLog;

    type TR = ScriptedTransport;
}
