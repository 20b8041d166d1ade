//! Request signing implementations.

mod hmac_signer;

pub use hmac_signer::HmacRequestSigner;
