//! # Vigil Core
//!
//! The domain layer of Vigil's admission-control subsystem.
//! Policies, decisions, time-window arithmetic and the port traits that
//! storage, signing and CSRF adapters implement. This crate performs no I/O.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::ConfigError;
