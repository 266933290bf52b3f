//! Exclusive viewing sessions for privately shared media collections.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod http;
pub mod lease;
pub mod negotiator;
pub mod stats;
