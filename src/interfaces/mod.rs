//! Transports that feed raw requests into the dispatcher.

pub mod http;
pub mod tcp;
