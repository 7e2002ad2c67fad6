//! Decoy service: listener, detection driver and event sinks.

pub mod detect;
pub mod http;
pub mod server;
pub mod sink;

pub use detect::Detector;
pub use server::Server;
pub use sink::{FileSink, MemorySink};
