//! # Vigil Shared
//!
//! Wire-level types shared with the HTTP layer that embeds the gateway.

pub mod headers;
pub mod response;

pub use headers::SECURITY_HEADERS;
pub use response::ErrorResponse;
