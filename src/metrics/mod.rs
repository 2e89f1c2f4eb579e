use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;


lazy_static! {
    /// Labels: peer_id, kind (append | snapshot), outcome (success | rejected | error)
    pub static ref REPLICATION_RPC_COUNTER: IntCounterVec = IntCounterVec::new(
        Opts::new("replication_rpc_total", "Replication RPCs dispatched to followers"),
        &["peer_id", "kind", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref PEER_PREV_LOG_INDEX: IntGaugeVec = IntGaugeVec::new(
        Opts::new("peer_prev_log_index", "Last log index known to be present on the follower"),
        &["peer_id"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers the replication collectors into `registry`.
///
/// Fails when they are already registered there.
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(REPLICATION_RPC_COUNTER.clone()))?;
    registry.register(Box::new(PEER_PREV_LOG_INDEX.clone()))?;
    Ok(())
}

/// Registers the collectors into [`REGISTRY`]; later calls are no-ops.
pub fn init_metrics() {
    REGISTER.call_once(|| {
        if let Err(e) = register_custom_metrics(&REGISTRY) {
            tracing::warn!("could not register replication metrics: {}", e);
        }
    });
}

/// Text exposition of [`REGISTRY`].
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
