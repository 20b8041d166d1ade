//! Domain types - pure admission-control logic.

pub mod bucket;
pub mod csrf;
pub mod decision;
pub mod policy;
pub mod signing;
pub mod window;

pub use bucket::{BucketState, BucketStep};
pub use csrf::CsrfToken;
pub use decision::RateLimitDecision;
pub use policy::{PolicySpec, RateLimitPolicy, Strategy, Tier};
pub use signing::SignedRequest;
pub use window::{FixedWindow, WindowSample};
