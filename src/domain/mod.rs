//! Domain types and the ports the application layer is written against.

pub mod account;
pub mod command;
pub mod money;
pub mod ports;
pub mod transaction;
