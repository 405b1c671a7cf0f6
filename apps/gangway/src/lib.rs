pub mod client;
pub mod config;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;
