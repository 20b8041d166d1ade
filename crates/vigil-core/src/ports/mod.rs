//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod counter_store;
mod csrf;
mod rate_limit;
mod signing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter_store::{BucketUpdate, CounterStore, StoreError};
pub use csrf::{CsrfError, CsrfTokenStore};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use signing::{RequestSigner, SignatureError};
