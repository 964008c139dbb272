//! Sensor bridge agent
//!
//! Hosts a [`bridge_lib::Bridge`] behind an HTTP API and forwards its
//! batches through the configured transmitter.

pub mod api;
pub mod config;
pub mod events;
pub mod transmitters;
