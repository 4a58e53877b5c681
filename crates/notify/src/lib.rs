//! Notification Channels
//!
//! Delivers alerts to external channels (chat, paging):
//! - `Channel` contract over deliver / update / identify
//! - Exponential backoff with jitter for transient failures
//! - Sequential fan-out where one channel's failure never blocks the rest

mod channel;
mod error;
mod fanout;
mod retry;

pub use channel::{Channel, LogChannel, MockCall, MockChannel};
pub use error::ChannelError;
pub use fanout::{NotificationOp, NotificationResult, NotificationStatus, Notifier};
pub use retry::{retry, RetryPolicy, RetryReport, RetryingChannel};
pub use tokio_util::sync::CancellationToken;
