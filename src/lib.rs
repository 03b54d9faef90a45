//! Apex Genesis Connection Library
//!
//! Reconnection engine for the Apex Genesis dashboard: a fixed registry of
//! logical connections (hosted datastore, HTTP API, websocket, local
//! storage), probed on a schedule, retried with capped backoff, and
//! published to subscribers.

pub mod connection;
pub mod constants;
pub mod domain;
pub mod error;
pub mod helpers;
pub mod services;
pub mod utils;
