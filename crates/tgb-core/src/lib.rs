//! Core of the Telegram Bot API client.
//!
//! This crate is transport-agnostic. It owns the wire model, typed method
//! parameters and the update-polling engine; HTTP lives behind the
//! [`ports::UpdateSource`] port implemented in an adapter crate.

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod model;
pub mod params;
pub mod polling;
pub mod ports;

pub use errors::{Error, Result};
