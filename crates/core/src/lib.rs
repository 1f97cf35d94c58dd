//! Shared domain layer for declone.
//!
//! This crate has zero internal dependencies so it can be used by the
//! store, the server, and any future CLI tooling. It contains the common
//! scalar types, the typed domain error, byte-size and cron-expression
//! parsing, and the driver for the external `fclones` engine.

pub mod bytesize;
pub mod cronexpr;
pub mod error;
pub mod fclones;
pub mod types;
