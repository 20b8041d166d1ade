//! CSRF token issuance, one-time validation and expiry sweeping.

mod store;
mod sweeper;

pub use store::{CsrfConfig, StoreCsrfTokens};
pub use sweeper::spawn_sweeper;
