//! The node crate: ties `chain-types`, `chain-state`, `chain-consensus`,
//! and `chain-mempool` together behind one facade, with a
//! `tracing`-based event sink and a configuration surface covering
//! every externally-tunable option.

pub mod config;
pub mod error;
pub mod node;
pub mod sink;

pub use config::Config;
pub use error::NodeError;
pub use node::Node;
pub use sink::TracingEventSink;
