//! Alerting Core
//!
//! Keeps one canonical alert record in sync across chat and paging
//! channels: deduplication on ingest, silence checks, acknowledgment
//! propagation, and point-in-time summaries.

mod ack;
mod config;
mod error;
mod ingest;
mod manager;
mod silence;
mod summary;

#[cfg(test)]
mod testing;

pub use ack::{AckOutcome, AckPolicy, AckTransition};
pub use config::{
    BridgeConfig, ChannelConfig, ChannelKind, LogConfig, RetryConfig, ServerConfig,
    StorageBackend, StorageConfig, SummaryConfig,
};
pub use error::{parse_duration, AlertError};
pub use ingest::{AlertEvent, EventStatus, IngestAction, IngestOutcome};
pub use manager::AlertManager;
pub use silence::{SilenceAction, SilenceRequest, SilenceResult};
pub use summary::{AckCount, AlertSummary};
