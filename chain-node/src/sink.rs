//! A `tracing`-based [`EventSink`], the node's default observability
//! backend. Grounded on `sled_state.rs`'s inline `tracing::trace!` and
//! `metrics::counter!`/`metrics::gauge!` calls at each commit point —
//! here the same call sites are centralized behind the `Event` enum
//! instead of scattered through the state machine.

use chain_types::event::{Event, EventSink};

pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match event {
            Event::BlockConnected { height, hash } => {
                tracing::info!(height, hash = %hash, "block connected");
            }
            Event::BlockRejected { hash, reason } => {
                tracing::warn!(hash = %hash, reason = %reason, "block rejected");
            }
            Event::ChainReorganized { from, to, disconnected, connected } => {
                tracing::info!(
                    from = %from,
                    to = %to,
                    disconnected,
                    connected,
                    "chain reorganized"
                );
            }
            Event::ReorgAborted { attempted_tip, reason } => {
                tracing::warn!(attempted_tip = %attempted_tip, reason = %reason, "reorg aborted");
            }
            Event::MempoolAdmitted { txid, fee_per_byte } => {
                tracing::trace!(txid = %txid, fee_per_byte, "mempool admitted");
            }
            Event::MempoolEvicted { txid, reason } => {
                tracing::trace!(txid = %txid, reason = %reason, "mempool evicted");
            }
            Event::SecurityViolation { kind, detail } => {
                tracing::error!(kind = %kind, detail = %detail, "security violation");
            }
        }
    }

    fn emit_security(&self, event: Event) {
        if let Event::SecurityViolation { ref kind, ref detail } = event {
            tracing::error!(kind = %kind, detail = %detail, "security violation");
            return;
        }
        self.emit(event);
    }
}
