//! Operator CLI for the sensor bridge agent

pub mod client;
pub mod commands;
pub mod config;
pub mod output;
