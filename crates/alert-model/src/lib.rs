//! Alert Model
//!
//! The canonical alert record shared by every channel:
//! - Severity and lifecycle state
//! - Firing → Acknowledged → Resolved transitions
//! - Silence marks and the matcher that decides suppression

mod alert;
mod error;
mod silence;

pub use alert::{Alert, AlertState, Severity};
pub use error::ModelError;
pub use silence::{SilenceMark, FINGERPRINT_KEY};
