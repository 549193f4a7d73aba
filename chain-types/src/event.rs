//! Structured event emission. The core never formats strings for user
//! consumption — it hands a typed [`Event`] to whatever [`EventSink`]
//! the embedder supplied (a log line, a metrics counter, a remote
//! pipeline; `chain-node` ships one concrete `tracing`-based sink, see
//! `chain-node::sink`).

use crate::hash::Hash;

/// Every event the core can emit. Fields are the minimal set a sink
/// needs to render something useful; nothing here is pre-formatted.
#[derive(Clone, Debug)]
pub enum Event {
    BlockConnected {
        height: u64,
        hash: Hash,
    },
    BlockRejected {
        hash: Hash,
        reason: String,
    },
    ChainReorganized {
        from: Hash,
        to: Hash,
        disconnected: usize,
        connected: usize,
    },
    ReorgAborted {
        attempted_tip: Hash,
        reason: String,
    },
    MempoolAdmitted {
        txid: Hash,
        fee_per_byte: f64,
    },
    MempoolEvicted {
        txid: Hash,
        reason: String,
    },
    SecurityViolation {
        kind: String,
        detail: String,
    },
}

/// Abstract emission target. Implementations are free to map events to
/// files, structured logs, or remote pipelines — this crate defines
/// only the interface, never a formatting policy.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);

    /// Security-relevant events (path escape attempts, malformed
    /// input that looks adversarial) go through this instead of
    /// `emit` so sinks can route them distinctly, e.g. to a
    /// higher-priority log level or alerting channel.
    fn emit_security(&self, event: Event) {
        self.emit(event);
    }
}

/// A sink that discards every event. Useful for tests and for embedders
/// that genuinely don't want observability.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}
