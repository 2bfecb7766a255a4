//! beltwatchd: belt alignment monitoring daemon.
//!
//! Samples the active source on a timer, sends frames to the remote
//! analyzer, and keeps the overlay and measurement history current.
//! Controlled over a JSON-lines TCP socket.

pub mod client;
pub mod config;
pub mod controller;
pub mod paths;
pub mod sampler;
pub mod server;
